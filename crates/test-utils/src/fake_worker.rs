//! A scripted stand-in for worker processes.
//!
//! Tests drive each fake worker through its [`WorkerControl`]: emit stdout
//! lines, make it exit with a code, and observe whether the supervisor sent
//! an interrupt or a kill. Nothing here touches the OS.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use jobvisor::types::JobId;
use jobvisor::worker::{
    LaunchedWorker, WaitFuture, WorkerInvocation, WorkerLauncher, WorkerProcess,
};

const STDOUT_CAPACITY: usize = 1024;

/// What a fake worker does when it receives an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptBehaviour {
    /// Exit right away with this code (`None` = terminated by signal).
    Exit(Option<i32>),
    /// Keep running; only a kill ends it.
    Ignore,
}

struct WorkerShared {
    job: JobId,
    pid: u32,
    behaviour: InterruptBehaviour,
    stdout: Mutex<Option<mpsc::Sender<String>>>,
    exit: watch::Sender<Option<Option<i32>>>,
    interrupts: AtomicUsize,
    killed: AtomicBool,
}

impl WorkerShared {
    /// Close stdout, then publish the exit. Later calls are no-ops.
    fn finish(&self, code: Option<i32>) {
        self.stdout.lock().unwrap().take();
        self.exit.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(code);
            true
        });
    }
}

/// Test-side handle to one launched fake worker.
#[derive(Clone)]
pub struct WorkerControl {
    shared: Arc<WorkerShared>,
}

impl WorkerControl {
    pub fn job(&self) -> JobId {
        self.shared.job
    }

    /// Write a line to the worker's stdout. Ignored after exit.
    pub fn emit(&self, line: impl Into<String>) {
        if let Some(tx) = self.shared.stdout.lock().unwrap().as_ref() {
            tx.try_send(line.into())
                .expect("fake worker stdout buffer full");
        }
    }

    /// Emit a progress line in the default grammar.
    pub fn emit_status(&self, pairs: &[(&str, u64)]) {
        let body = pairs
            .iter()
            .map(|(code, count)| format!("{code}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        self.emit(format!("Status: [{body}]"));
    }

    /// Make the worker exit on its own.
    pub fn exit(&self, code: i32) {
        self.shared.finish(Some(code));
    }

    /// Make the worker die as if killed by a signal.
    pub fn crash(&self) {
        self.shared.finish(None);
    }

    pub fn interrupts(&self) -> usize {
        self.shared.interrupts.load(Ordering::SeqCst)
    }

    pub fn was_killed(&self) -> bool {
        self.shared.killed.load(Ordering::SeqCst)
    }

    pub fn has_exited(&self) -> bool {
        self.shared.exit.borrow().is_some()
    }
}

struct FakeProcess {
    shared: Arc<WorkerShared>,
}

impl WorkerProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(self.shared.pid)
    }

    fn interrupt(&mut self) -> io::Result<()> {
        self.shared.interrupts.fetch_add(1, Ordering::SeqCst);
        if let InterruptBehaviour::Exit(code) = self.shared.behaviour {
            self.shared.finish(code);
        }
        Ok(())
    }

    fn wait(&mut self) -> WaitFuture<'_, Option<i32>> {
        let mut rx = self.shared.exit.subscribe();
        Box::pin(async move {
            let state: Option<Option<i32>> = *rx
                .wait_for(|state| state.is_some())
                .await
                .map_err(|_| io::Error::other("fake worker dropped"))?;
            Ok(state.flatten())
        })
    }

    fn kill(&mut self) -> WaitFuture<'_, ()> {
        Box::pin(async move {
            self.shared.killed.store(true, Ordering::SeqCst);
            self.shared.finish(None);
            Ok(())
        })
    }
}

/// A [`WorkerLauncher`] that hands out scripted fake workers.
pub struct ScriptedLauncher {
    behaviour: InterruptBehaviour,
    fail: AtomicBool,
    next_pid: AtomicU32,
    workers: Mutex<Vec<WorkerControl>>,
    invocations: Mutex<Vec<WorkerInvocation>>,
}

impl Default for ScriptedLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLauncher {
    /// Workers exit with status 130 on interrupt, like a well-behaved
    /// process terminated by SIGINT.
    pub fn new() -> Self {
        Self::with_interrupt_behaviour(InterruptBehaviour::Exit(Some(130)))
    }

    pub fn with_interrupt_behaviour(behaviour: InterruptBehaviour) -> Self {
        Self {
            behaviour,
            fail: AtomicBool::new(false),
            next_pid: AtomicU32::new(10_000),
            workers: Mutex::new(Vec::new()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Make subsequent launches fail as if the executable were missing.
    pub fn fail_launches(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn launched(&self) -> usize {
        self.workers.lock().unwrap().len()
    }

    pub fn worker(&self, index: usize) -> WorkerControl {
        self.workers.lock().unwrap()[index].clone()
    }

    pub fn worker_for(&self, job: JobId) -> Option<WorkerControl> {
        self.workers
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.job() == job)
            .cloned()
    }

    pub fn invocations(&self) -> Vec<WorkerInvocation> {
        self.invocations.lock().unwrap().clone()
    }
}

impl WorkerLauncher for ScriptedLauncher {
    fn launch(&self, job: JobId, invocation: &WorkerInvocation) -> io::Result<LaunchedWorker> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: not found", invocation.program),
            ));
        }

        let (line_tx, line_rx) = mpsc::channel(STDOUT_CAPACITY);
        let (exit, _) = watch::channel(None);
        let shared = Arc::new(WorkerShared {
            job,
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            behaviour: self.behaviour,
            stdout: Mutex::new(Some(line_tx)),
            exit,
            interrupts: AtomicUsize::new(0),
            killed: AtomicBool::new(false),
        });

        self.invocations.lock().unwrap().push(invocation.clone());
        self.workers.lock().unwrap().push(WorkerControl {
            shared: Arc::clone(&shared),
        });

        Ok(LaunchedWorker {
            process: Box::new(FakeProcess { shared }),
            stdout: line_rx,
        })
    }
}
