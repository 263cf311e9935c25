//! Clock and backoff sleeping behind a trait.
//!
//! Retry loops never call `tokio::time::sleep` directly; they go through a
//! [`Timer`] so tests can drive backoff with a virtual clock and process
//! shutdown can cut an in-flight backoff short.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;

/// How a backoff sleep ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    /// The full duration elapsed.
    Completed,
    /// Process shutdown was signalled before the duration elapsed.
    Interrupted,
}

/// Monotonic clock plus interruptible sleep.
#[async_trait]
pub trait Timer: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration) -> SleepOutcome;
}

/// Creates the process shutdown signal shared by timers and background tasks.
///
/// Send `true` to request shutdown.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolves once `true` is published on the shutdown channel.
///
/// Never resolves if the sender is dropped without signalling.
pub async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// [`Timer`] backed by the tokio clock.
#[derive(Clone, Default)]
pub struct TokioTimer {
    shutdown: Option<watch::Receiver<bool>>,
}

impl TokioTimer {
    /// A timer whose sleeps always run to completion.
    pub fn new() -> Self {
        Self { shutdown: None }
    }

    /// A timer whose sleeps end early once shutdown is signalled.
    pub fn with_shutdown(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            shutdown: Some(shutdown),
        }
    }
}

#[async_trait]
impl Timer for TokioTimer {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) -> SleepOutcome {
        let Some(shutdown) = self.shutdown.clone() else {
            tokio::time::sleep(duration).await;
            return SleepOutcome::Completed;
        };

        tokio::select! {
            _ = tokio::time::sleep(duration) => SleepOutcome::Completed,
            _ = wait_for_shutdown(shutdown) => SleepOutcome::Interrupted,
        }
    }
}
