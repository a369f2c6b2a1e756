//! Bounded-parallel dispatch of cases with results reported in discovery order.
//!
//! Every case is spawned up front and waits for a permit from a shared semaphore, so at
//! most `jobs` cases execute at once. Finished outcomes land in a slot indexed by
//! discovery position; the contiguous finished prefix is handed to the caller as soon
//! as it grows, which keeps streaming output deterministic.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, trace};

use crate::cancel::CancelSignal;
use crate::fixture::Expectation;
use crate::process::ProcessDriver;
use crate::runner::{CaseRunner, Outcome, Phase};

#[derive(Debug)]
enum Slot {
    Pending,
    Done(Box<Outcome>),
    /// Never dispatched because the run was aborted first.
    NotRun,
}

/// Fixed-order result buffer, one slot per discovered case.
#[derive(Debug)]
pub struct ResultSlots {
    slots: Vec<Slot>,
    reported: usize,
}

impl ResultSlots {
    pub fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| Slot::Pending).collect(),
            reported: 0,
        }
    }

    fn fill(&mut self, index: usize, slot: Slot) {
        if let Some(target) = self.slots.get_mut(index) {
            *target = slot;
        }
    }

    /// Outcomes that became reportable since the last call: the finished slots directly
    /// after everything already reported, up to the first one still pending.
    pub fn drain_ready(&mut self) -> impl Iterator<Item = &Outcome> {
        let start = self.reported;
        while self
            .slots
            .get(self.reported)
            .is_some_and(|slot| !matches!(slot, Slot::Pending))
        {
            self.reported += 1;
        }
        self.slots[start..self.reported].iter().filter_map(|slot| match slot {
            Slot::Done(outcome) => Some(outcome.as_ref()),
            _ => None,
        })
    }

    /// Cases that produced no outcome.
    pub fn not_run(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| !matches!(slot, Slot::Done(_)))
            .count()
    }

    /// All produced outcomes, in discovery order.
    pub fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Done(outcome) => Some(outcome.as_ref()),
            _ => None,
        })
    }

    pub fn into_outcomes(self) -> Vec<Outcome> {
        self.slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Done(outcome) => Some(*outcome),
                _ => None,
            })
            .collect()
    }
}

/// Runs cases on a fixed-size pool of workers.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    jobs: usize,
}

impl Scheduler {
    pub fn new(jobs: usize) -> Self {
        Self { jobs: jobs.max(1) }
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Runs every case and returns the filled slots. `on_ready` sees each outcome
    /// exactly once, in discovery order, as soon as all earlier cases have finished.
    ///
    /// Once `cancel` is raised no further case is dispatched; in-flight cases are
    /// terminated by their driver and still produce outcomes.
    pub async fn run<D, F>(
        &self,
        runner: Arc<CaseRunner<D>>,
        cases: &[Arc<Expectation>],
        cancel: CancelSignal,
        mut on_ready: F,
    ) -> ResultSlots
    where
        D: ProcessDriver + 'static,
        F: FnMut(&Outcome),
    {
        let permits = Arc::new(Semaphore::new(self.jobs));
        let (tx, mut rx) = mpsc::unbounded_channel();
        debug!(cases = cases.len(), jobs = self.jobs, "scheduling");

        for (index, case) in cases.iter().cloned().enumerate() {
            let tx = tx.clone();
            let runner = runner.clone();
            let permits = permits.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let slot = dispatch(runner, case, permits, cancel).await;
                // The receiver only goes away if the caller stopped waiting.
                let _ = tx.send((index, slot));
            });
        }
        drop(tx);

        let mut slots = ResultSlots::new(cases.len());
        while let Some((index, slot)) = rx.recv().await {
            slots.fill(index, slot);
            for outcome in slots.drain_ready() {
                on_ready(outcome);
            }
        }
        slots
    }
}

async fn dispatch<D>(
    runner: Arc<CaseRunner<D>>,
    case: Arc<Expectation>,
    permits: Arc<Semaphore>,
    cancel: CancelSignal,
) -> Slot
where
    D: ProcessDriver + 'static,
{
    let Ok(_permit) = permits.acquire_owned().await else {
        return Slot::NotRun;
    };
    if cancel.is_cancelled() {
        trace!(case = %case.id(), "skipped after abort");
        return Slot::NotRun;
    }
    trace!(case = %case.id(), "dispatched");

    // A panic inside the runner must only cost this case.
    let worker = tokio::spawn({
        let case = case.clone();
        async move { runner.run(case, &cancel).await }
    });
    match worker.await {
        Ok(outcome) => Slot::Done(Box::new(outcome)),
        Err(err) => {
            error!(case = %case.id(), error = %err, "worker failed");
            Slot::Done(Box::new(Outcome::internal(
                case,
                Phase::Setup,
                format!("worker failed: {err}"),
            )))
        }
    }
}
