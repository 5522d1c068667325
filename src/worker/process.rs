// src/worker/process.rs

//! `tokio::process` backed workers.

use std::io;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::types::JobId;

use super::launcher::{LaunchedWorker, WaitFuture, WorkerInvocation, WorkerLauncher, WorkerProcess};

/// Buffered stdout lines per worker before the reader applies backpressure.
const STDOUT_BUFFER: usize = 256;

/// Launches workers as real OS processes.
#[derive(Debug, Default, Clone)]
pub struct CommandLauncher;

impl CommandLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl WorkerLauncher for CommandLauncher {
    fn launch(&self, job: JobId, invocation: &WorkerInvocation) -> io::Result<LaunchedWorker> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        info!(
            job_id = %job,
            pid = child.id(),
            program = %invocation.program,
            args = ?invocation.args,
            "worker process started"
        );

        let (line_tx, line_rx) = mpsc::channel(STDOUT_BUFFER);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    trace!(job_id = %job, "stdout: {}", line);
                    if line_tx.send(line).await.is_err() {
                        break;
                    }
                }
                debug!(job_id = %job, "stdout reader ended");
            });
        }

        // Drain stderr; lines are logged at debug.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(job_id = %job, "stderr: {}", line);
                }
            });
        }

        Ok(LaunchedWorker {
            process: Box::new(ChildProcess { child }),
            stdout: line_rx,
        })
    }
}

struct ChildProcess {
    child: Child,
}

impl WorkerProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn interrupt(&mut self) -> io::Result<()> {
        #[cfg(unix)]
        {
            // `id()` is None once the child has been reaped; nothing to signal.
            let Some(pid) = self.child.id() else {
                return Ok(());
            };
            // SAFETY: pid comes from our own, not yet reaped, Child handle.
            #[allow(unsafe_code, clippy::cast_possible_wrap)]
            let ret = unsafe { libc::kill(pid as i32, libc::SIGINT) };
            if ret != 0 {
                let err = io::Error::last_os_error();
                warn!(pid, error = %err, "failed to send SIGINT");
                return Err(err);
            }
            Ok(())
        }

        #[cfg(not(unix))]
        {
            self.child.start_kill()
        }
    }

    fn wait(&mut self) -> WaitFuture<'_, Option<i32>> {
        Box::pin(async move {
            let status = self.child.wait().await?;
            Ok(status.code())
        })
    }

    fn kill(&mut self) -> WaitFuture<'_, ()> {
        Box::pin(async move { self.child.kill().await })
    }
}
