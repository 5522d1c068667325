// src/worker/mod.rs

//! Worker process layer.
//!
//! The supervisor talks to a [`WorkerLauncher`] instead of `tokio::process`
//! directly. Production uses [`CommandLauncher`], which spawns a real
//! executable; tests can swap in a scripted fake that emits lines and exits
//! on command.
//!
//! - [`launcher`] defines the traits and the argv contract.
//! - [`process`] is the `tokio::process` implementation.

pub mod launcher;
pub mod process;

pub use launcher::{
    LaunchedWorker, WaitFuture, WorkerInvocation, WorkerLauncher, WorkerProcess, WorkerSettings,
};
pub use process::CommandLauncher;
