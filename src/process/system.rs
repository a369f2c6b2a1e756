use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::{ExitSummary, ProcessDriver, ProcessOutput, ProcessRequest};
use crate::cancel::CancelSignal;
use crate::diagnostics::DriverError;

/// Runs programs as real OS processes via `tokio::process`.
///
/// On Unix each child leads its own process group, and the whole group is killed when
/// the run ends, whichever way it ends, so grandchildren cannot outlive a case or hold
/// its output pipes open.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDriver;

#[async_trait]
impl ProcessDriver for SystemDriver {
    async fn run(
        &self,
        request: &ProcessRequest,
        cancel: &CancelSignal,
    ) -> Result<ProcessOutput, DriverError> {
        let program = request.program.clone();
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .current_dir(&request.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if request.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let started = Instant::now();
        let deadline = started + request.timeout;
        let mut child = cmd.spawn().map_err(|source| DriverError::Spawn {
            program: program.clone(),
            source,
        })?;
        let mut group = GroupGuard::new(child.id());
        debug!(command = %request.command_line(), pid = ?child.id(), "spawned");

        let mut pipes = Pipes {
            stdout: child.stdout.take().map(|pipe| tokio::spawn(drain(pipe))),
            stderr: child.stderr.take().map(|pipe| tokio::spawn(drain(pipe))),
        };
        if let (Some(mut stdin), Some(payload)) = (child.stdin.take(), request.stdin.clone()) {
            tokio::spawn(async move {
                // A program that exits without reading its input closes the pipe early.
                if let Err(err) = stdin.write_all(&payload).await {
                    trace!(error = %err, "stdin not fully consumed");
                }
            });
        }

        let mut cancel = cancel.clone();
        let waited = tokio::select! {
            waited = tokio::time::timeout_at(deadline, child.wait()) => match waited {
                Ok(status) => Waited::Exited(status),
                Err(_) => Waited::TimedOut,
            },
            _ = cancel.cancelled() => Waited::Cancelled,
        };

        let status = match waited {
            Waited::Exited(Ok(status)) => status,
            Waited::Exited(Err(source)) => return Err(DriverError::Io { program, source }),
            Waited::TimedOut => {
                warn!(command = %request.command_line(), timeout = ?request.timeout, "deadline expired; killing");
                group.kill();
                let _ = child.kill().await;
                return Err(DriverError::Timeout {
                    program,
                    after: request.timeout,
                });
            }
            Waited::Cancelled => {
                warn!(command = %request.command_line(), "aborting");
                group.kill();
                let _ = child.kill().await;
                return Err(DriverError::Cancelled { program });
            }
        };

        // Stragglers in the group would keep the pipes open; the leader is done.
        group.kill();
        // A descendant outside the group can still hold a pipe, so the drain shares
        // the process deadline and honors cancellation.
        let drained = tokio::select! {
            drained = tokio::time::timeout_at(deadline, pipes.collect(&program)) => Some(drained),
            _ = cancel.cancelled() => None,
        };
        let (stdout, stderr) = match drained {
            Some(Ok(collected)) => collected?,
            None => {
                warn!(command = %request.command_line(), "aborting while output is still open");
                return Err(DriverError::Cancelled { program });
            }
            Some(Err(_)) => {
                warn!(command = %request.command_line(), timeout = ?request.timeout, "output still open at deadline");
                return Err(DriverError::Timeout {
                    program,
                    after: request.timeout,
                });
            }
        };
        let exit = ExitSummary::from(status);
        let elapsed = started.elapsed();
        debug!(command = %request.command_line(), %exit, ?elapsed, "exited");

        Ok(ProcessOutput {
            stdout,
            stderr,
            exit,
            elapsed,
        })
    }
}

enum Waited {
    Exited(io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

async fn drain<R: AsyncRead + Unpin>(mut pipe: R) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Reader tasks for the child's output pipes; aborted if the run ends early.
struct Pipes {
    stdout: Option<JoinHandle<io::Result<Vec<u8>>>>,
    stderr: Option<JoinHandle<io::Result<Vec<u8>>>>,
}

impl Pipes {
    /// Waits for both readers. The handles stay owned here, so dropping this future
    /// midway still lets [`Drop`] abort them.
    async fn collect(&mut self, program: &str) -> Result<(Vec<u8>, Vec<u8>), DriverError> {
        let stdout = collect(self.stdout.as_mut(), program).await?;
        let stderr = collect(self.stderr.as_mut(), program).await?;
        Ok((stdout, stderr))
    }
}

impl Drop for Pipes {
    fn drop(&mut self) {
        for handle in [self.stdout.take(), self.stderr.take()].into_iter().flatten() {
            handle.abort();
        }
    }
}

async fn collect(
    handle: Option<&mut JoinHandle<io::Result<Vec<u8>>>>,
    program: &str,
) -> Result<Vec<u8>, DriverError> {
    let Some(handle) = handle else {
        return Ok(Vec::new());
    };
    let io_err = |source: io::Error| DriverError::Io {
        program: program.to_string(),
        source,
    };
    handle
        .await
        .map_err(|join| io_err(io::Error::new(io::ErrorKind::Other, join.to_string())))?
        .map_err(io_err)
}

/// Kills the child's process group when dropped or when [`GroupGuard::kill`] is called.
struct GroupGuard {
    #[cfg_attr(not(unix), allow(dead_code))]
    pgid: Option<u32>,
}

impl GroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn kill(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.take() {
            // SAFETY: killpg only sends a signal; a group that no longer exists yields ESRCH.
            let rc = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
            if rc == 0 {
                trace!(pgid, "killed process group");
            }
        }
        #[cfg(not(unix))]
        {
            self.pgid = None;
        }
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}
