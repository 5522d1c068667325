pub mod builders;
pub mod fake_worker;
pub mod recording_sink;

use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

pub use fake_worker::{InterruptBehaviour, ScriptedLauncher, WorkerControl};
pub use recording_sink::RecordingSink;

static INIT: Once = Once::new();

/// Route `tracing` output through the test harness capture.
///
/// Output shows up for failing tests only (or with `--nocapture`). Filter
/// with `RUST_LOG`, e.g. `RUST_LOG=jobvisor::supervisor=debug`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("jobvisor=info"));
        // Another subscriber may already be installed by the test binary.
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    with_timeout_of(Duration::from_secs(5), f).await
}

pub async fn with_timeout_of<F, T>(limit: Duration, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    match tokio::time::timeout(limit, f).await {
        Ok(value) => value,
        Err(_) => panic!("timed out after {limit:?}"),
    }
}

/// Let spawned tasks run until they are all parked.
///
/// Under a paused clock this does not advance time.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
