//! Cancellable sleeps and the jitter source shared by every delay in the
//! collector loop.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Outcome of a sleep that can be interrupted by shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    Elapsed,
    Cancelled,
}

impl SleepOutcome {
    pub fn is_cancelled(self) -> bool {
        matches!(self, SleepOutcome::Cancelled)
    }
}

pub async fn sleep_or_cancel(delay: Duration, token: &CancellationToken) -> SleepOutcome {
    if token.is_cancelled() {
        return SleepOutcome::Cancelled;
    }
    if delay.is_zero() {
        yield_now().await;
        return SleepOutcome::Elapsed;
    }

    tokio::select! {
        _ = token.cancelled() => SleepOutcome::Cancelled,
        _ = sleep(delay) => SleepOutcome::Elapsed,
    }
}

/// Randomness for pacing and tile order. Seedable so tests are repeatable.
#[derive(Debug, Clone)]
pub struct JitterSource {
    rng: StdRng,
}

impl JitterSource {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `base + uniform(-spread, +spread)`, floored at zero.
    pub fn symmetric(&mut self, base: Duration, spread: Duration) -> Duration {
        if spread.is_zero() {
            return base;
        }
        let spread_secs = spread.as_secs_f64();
        let offset = self.rng.gen_range(-spread_secs..=spread_secs);
        Duration::from_secs_f64((base.as_secs_f64() + offset).max(0.0))
    }

    /// `base + uniform(0, spread)`.
    pub fn upward(&mut self, base: Duration, spread: Duration) -> Duration {
        if spread.is_zero() {
            return base;
        }
        let extra = self.rng.gen_range(0.0..=spread.as_secs_f64());
        base + Duration::from_secs_f64(extra)
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }
}

impl Default for JitterSource {
    fn default() -> Self {
        Self::from_entropy()
    }
}

/// Inter-tile spacing: `pause ± jitter`, applied after every tile whether it
/// succeeded or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePacing {
    pub pause: Duration,
    pub jitter: Duration,
}

impl TilePacing {
    pub fn next_pause(&self, jitter: &mut JitterSource) -> Duration {
        jitter.symmetric(self.pause, self.jitter)
    }
}

/// Time left until the next cycle: the unused part of `interval`, shifted by
/// `± jitter` and floored at zero.
pub fn cadence_wait(
    interval: Duration,
    elapsed: Duration,
    spread: Duration,
    jitter: &mut JitterSource,
) -> Duration {
    jitter.symmetric(interval.saturating_sub(elapsed), spread)
}
