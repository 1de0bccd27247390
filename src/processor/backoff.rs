use super::pacing::{sleep_or_cancel, JitterSource, TilePacing};
use crate::runtime::status::{StatusEvent, StatusSink};
use crate::upstream::{FetchFailure, FetchSession, TileCoord, TilePayload};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Extra attempts after the first failure.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub fetch_timeout: Duration,
    pub pacing: TilePacing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success { payload: TilePayload, attempts: u32 },
    Failed { failure: FetchFailure, attempts: u32 },
    Cancelled,
}

/// Delay slept after the failed attempt with zero-based index `attempt`.
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

/// Wraps one tile fetch with bounded retry and pure exponential delay. When
/// retries run out the tile pacing pause is taken instead of a further
/// backoff sleep, so per-tile spacing matches the success path.
#[derive(Debug, Clone)]
pub struct BackoffController {
    policy: BackoffPolicy,
}

impl BackoffController {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub async fn attempt(
        &self,
        session: &dyn FetchSession,
        tile: TileCoord,
        jitter: &mut JitterSource,
        status: &dyn StatusSink,
        token: &CancellationToken,
    ) -> FetchOutcome {
        let mut attempt = 0u32;

        loop {
            let result = tokio::select! {
                _ = token.cancelled() => return FetchOutcome::Cancelled,
                result = timeout(self.policy.fetch_timeout, session.fetch(tile)) => {
                    result.unwrap_or(Err(FetchFailure::Timeout))
                }
            };
            let attempts = attempt + 1;

            let failure = match result {
                Ok(payload) => {
                    if attempt > 0 {
                        status.report(&StatusEvent::BackoffRecovered { tile, attempts });
                    }
                    return FetchOutcome::Success { payload, attempts };
                }
                Err(failure) => failure,
            };

            tracing::debug!(
                %tile,
                attempt = attempts,
                error = %failure,
                "tile fetch attempt failed"
            );

            if attempt >= self.policy.max_retries {
                status.report(&StatusEvent::BackoffExhausted {
                    tile,
                    attempts,
                    failure: failure.clone(),
                });
                let pause = self.policy.pacing.next_pause(jitter);
                if sleep_or_cancel(pause, token).await.is_cancelled() {
                    return FetchOutcome::Cancelled;
                }
                return FetchOutcome::Failed { failure, attempts };
            }

            let delay = retry_delay(self.policy.base_delay, attempt);
            status.report(&StatusEvent::BackoffRetry {
                tile,
                attempt: attempts,
                delay,
                failure,
            });
            if sleep_or_cancel(delay, token).await.is_cancelled() {
                return FetchOutcome::Cancelled;
            }
            attempt += 1;
        }
    }
}
