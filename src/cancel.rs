//! Global abort plumbing: one [`CancelHandle`] flips every cloned [`CancelSignal`].

use tokio::sync::watch;

/// Cloneable read side of the abort flag.
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

/// Write side of the abort flag.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

/// Creates a connected handle/signal pair, initially not cancelled.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelSignal(rx))
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal(self.0.subscribe())
    }
}

impl CancelSignal {
    /// A signal that is never raised.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        CancelSignal(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the abort flag is raised; pends forever if it never will be.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
