//! Step scheduling for the batch executor.

use async_trait::async_trait;
use std::time::Duration;

/// Decides how a batch yields between two operations.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn pause(&self, delay: Duration);
}

/// Sleeps on the tokio timer for the configured interval.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn pause(&self, delay: Duration) {
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Ignores the interval and only yields to the runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

#[async_trait]
impl Scheduler for ImmediateScheduler {
    async fn pause(&self, _delay: Duration) {
        tokio::task::yield_now().await;
    }
}
