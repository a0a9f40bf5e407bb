//! Retry utilities: backoff builders and the retrying push pipeline.
//!
//! Uses `backon` for exponential backoff with jitter. The engine itself
//! never retries; callers opt in here and rerun the whole
//! prepare-and-push pipeline, which is safe because a failed push persisted
//! nothing.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

use crate::config::RetryConfig;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::eventstore::Eventstore;
use crate::preparation::Validation;

/// Standard backoff for retryable push failures (store contention).
/// [`Eventstore::retry_backoff`] gives the configured one.
///
/// - Min delay: 10ms
/// - Max delay: 1s
/// - Max attempts: 5
/// - Jitter enabled
pub fn push_backoff() -> ExponentialBuilder {
    RetryConfig::default().backoff()
}

impl RetryConfig {
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.min_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_max_times(self.max_times)
            .with_jitter()
    }
}

/// Only store contention is worth another attempt.
pub fn is_retryable(err: &Error) -> bool {
    err.is_retryable()
}

/// Prepare and push, rerunning everything while the failure is retryable.
///
/// Validations are consumed by a run, so `validations` builds a fresh set
/// for every attempt.
pub async fn prepare_and_push_with_retry<F>(
    eventstore: &Eventstore,
    ctx: &Context,
    validations: F,
    backoff: ExponentialBuilder,
) -> Result<Vec<Event>>
where
    F: Fn() -> Vec<Validation>,
{
    (|| async { eventstore.prepare_and_push(ctx, validations()).await })
        .retry(backoff)
        .when(is_retryable)
        .notify(|err: &Error, dur: Duration| {
            warn!(error = %err, delay = ?dur, "Push contended, retrying");
        })
        .await
}
