//! Batch partitioning, retrying execution, and concurrent fan-out.
//!
//! The remote service caps a single batch call at 25 writes or 100 gets
//! and may return any subset as unprocessed. The builders here partition
//! arbitrary-sized operation sets into capped groups, and the executors
//! resubmit unprocessed residuals with exponential backoff under an
//! injectable [`RetryPolicy`]. Hard service errors are never retried at
//! this layer; only partial results are.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use dynaverse_model::ServiceError;

use crate::{Error, Result};

pub mod get;
pub mod processor;
pub mod table;
pub mod write;

pub use processor::BatchProcessor;
pub use table::Batch;

/// Hard cap on put/delete requests in one batch write call.
pub const MAX_WRITE_ITEMS: usize = 25;

/// Hard cap on keys in one batch get call.
pub const MAX_GET_ITEMS: usize = 100;

/// Hard cap on concurrent fan-out workers.
pub const MAX_PROCESSOR_SIZE: usize = 20;

/// Retry budget and backoff shape for unprocessed residuals.
///
/// `max_retry` is the total number of submissions allowed per group,
/// including the first. The backoff interval doubles per resubmission,
/// starting from `base_interval` and saturating at `max_interval`; it
/// resets for every group.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total submissions allowed per group.
    pub max_retry: u32,
    /// Wait before the first resubmission.
    pub base_interval: Duration,
    /// Ceiling on the doubled interval.
    pub max_interval: Duration,
    /// Optional cancellation; observed before every wait and submission.
    pub cancellation: Option<CancellationToken>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry: 3,
            base_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
            cancellation: None,
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits between submissions. Intended for tests
    /// and local emulators.
    #[must_use]
    pub fn immediate(max_retry: u32) -> Self {
        Self {
            max_retry,
            base_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            cancellation: None,
        }
    }

    /// The interval preceding resubmission number `attempt + 1`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let doubled = self
            .base_interval
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        doubled.min(self.max_interval)
    }

    /// Fail fast when the policy's token is already cancelled.
    pub(crate) fn check_cancelled(&self) -> Result<()> {
        match &self.cancellation {
            Some(token) if token.is_cancelled() => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    /// Sleep out the backoff for `attempt`, aborting early on cancellation.
    pub(crate) async fn wait(&self, attempt: u32) -> Result<()> {
        let interval = self.backoff(attempt);
        debug!(attempt, ?interval, "backing off before resubmit");
        match &self.cancellation {
            Some(token) => {
                tokio::select! {
                    () = token.cancelled() => Err(Error::Cancelled),
                    () = tokio::time::sleep(interval) => Ok(()),
                }
            }
            None => {
                tokio::time::sleep(interval).await;
                Ok(())
            }
        }
    }
}

/// Observation hook for dispatched batch groups.
///
/// Implementations see every submission and its outcome; they can never
/// alter control flow.
pub trait Monitor<I, O>: Send + Sync {
    /// A group (or residual) is about to be submitted.
    fn dispatched(&self, input: &I, attempt: u32);
    /// The submission returned.
    fn completed(&self, output: &O);
    /// The submission failed with a service error.
    fn failed(&self, error: &ServiceError, attempt: u32);
}
