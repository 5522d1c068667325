// src/worker/launcher.rs

use std::future::Future;
use std::io;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::job::JobSpec;
use crate::types::JobId;

/// Boxed future returned by [`WorkerProcess::wait`] and
/// [`WorkerProcess::kill`].
pub type WaitFuture<'a, T> = Pin<Box<dyn Future<Output = io::Result<T>> + Send + 'a>>;

/// How the worker executable is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Executable to run.
    pub program: String,
    /// Arguments placed before the positional job parameters (e.g. a script
    /// path for an interpreter).
    pub args: Vec<String>,
    /// Opaque input source passed as the fifth positional argument.
    pub source: Option<String>,
    /// Flags appended after the positional arguments.
    pub flags: Vec<String>,
}

/// Fully resolved command line for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl WorkerInvocation {
    /// `program args… target duration rate threads [source] flags… extra…`
    pub fn build(settings: &WorkerSettings, spec: &JobSpec) -> Self {
        let mut args = settings.args.clone();
        args.push(spec.target.clone());
        args.push(spec.duration_secs.to_string());
        args.push(spec.rate.to_string());
        args.push(spec.threads.to_string());
        if let Some(ref source) = settings.source {
            args.push(source.clone());
        }
        args.extend(settings.flags.iter().cloned());
        args.extend(spec.extra_args.iter().cloned());

        Self {
            program: settings.program.clone(),
            args,
        }
    }
}

/// Handle to one running worker, exclusively owned by its job task.
pub trait WorkerProcess: Send {
    /// OS process id, if known.
    fn id(&self) -> Option<u32>;

    /// Ask the worker to shut down gracefully (SIGINT on unix).
    fn interrupt(&mut self) -> io::Result<()>;

    /// Wait for exit. Resolves to the exit code, or `None` when the process
    /// was terminated by a signal. Must be cancel-safe.
    fn wait(&mut self) -> WaitFuture<'_, Option<i32>>;

    /// Forcefully terminate the worker.
    fn kill(&mut self) -> WaitFuture<'_, ()>;
}

/// A freshly spawned worker: the process handle plus its stdout, already
/// split into lines.
pub struct LaunchedWorker {
    pub process: Box<dyn WorkerProcess>,
    pub stdout: mpsc::Receiver<String>,
}

impl std::fmt::Debug for LaunchedWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchedWorker")
            .field("pid", &self.process.id())
            .finish_non_exhaustive()
    }
}

/// Trait abstracting how workers are started.
///
/// Production code uses [`CommandLauncher`](super::CommandLauncher); tests
/// provide an implementation that doesn't spawn real processes.
pub trait WorkerLauncher: Send + Sync {
    /// Start a worker for `job`. Must be called from within a Tokio runtime.
    fn launch(&self, job: JobId, invocation: &WorkerInvocation) -> io::Result<LaunchedWorker>;
}
