//! Failure-ratio driven cooldown and recycle policy.
//!
//! Upstream degradation tends to show up as empty pages rather than hard
//! errors, so the monitor looks at the share of failed tiles per cycle:
//!
//! | fail ratio                       | state       | action                          |
//! |----------------------------------|-------------|---------------------------------|
//! | `< cooldown_threshold`           | `Normal`    | none                            |
//! | `< recycle_threshold`            | `Cooldown`  | sleep, keep the session         |
//! | `>= recycle_threshold`           | `Recycling` | drop session, sleep, open fresh |
//!
//! Both non-normal states fall back to `Normal` once handled. Sessions are
//! also recycled after `cycles_per_session` completed cycles regardless of
//! their failure ratio.

use super::lifecycle::SessionLifecycle;
use super::pacing::{sleep_or_cancel, JitterSource, SleepOutcome};
use crate::runtime::status::{StatusEvent, StatusSink};
use crate::runtime::telemetry::{RecycleCause, Telemetry};
use anyhow::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionHealthState {
    Normal,
    Cooldown,
    Recycling,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthPolicy {
    pub cooldown_threshold: f64,
    pub recycle_threshold: f64,
    pub cooldown: Duration,
    pub cooldown_jitter: Duration,
    pub cycles_per_session: u32,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            cooldown_threshold: 0.4,
            recycle_threshold: 0.6,
            cooldown: Duration::from_secs(120),
            cooldown_jitter: Duration::from_secs(60),
            cycles_per_session: 30,
        }
    }
}

pub fn fail_ratio(failed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    failed as f64 / total as f64
}

/// Reporting handles the monitor needs while applying a transition.
#[derive(Clone, Copy)]
pub struct HealthContext<'a> {
    pub status: &'a dyn StatusSink,
    pub telemetry: &'a Telemetry,
    pub token: &'a CancellationToken,
}

pub struct SessionHealthMonitor {
    policy: HealthPolicy,
    state: SessionHealthState,
}

impl SessionHealthMonitor {
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            policy,
            state: SessionHealthState::Normal,
        }
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    pub fn state(&self) -> SessionHealthState {
        self.state
    }

    pub fn evaluate(&self, failed: usize, total: usize) -> SessionHealthState {
        let ratio = fail_ratio(failed, total);
        if ratio >= self.policy.recycle_threshold {
            SessionHealthState::Recycling
        } else if ratio >= self.policy.cooldown_threshold {
            SessionHealthState::Cooldown
        } else {
            SessionHealthState::Normal
        }
    }

    pub fn session_expired(&self, lifecycle: &SessionLifecycle) -> bool {
        lifecycle.cycles_on_session() >= self.policy.cycles_per_session
    }

    /// Replaces a session that has served its quota of cycles. Returns
    /// whether a recycle happened.
    pub async fn recycle_if_aged(
        &mut self,
        lifecycle: &mut SessionLifecycle,
        status: &dyn StatusSink,
        telemetry: &Telemetry,
    ) -> Result<bool> {
        if !lifecycle.is_open() || !self.session_expired(lifecycle) {
            return Ok(false);
        }

        let cycles = lifecycle.cycles_on_session();
        status.report(&StatusEvent::SessionAged { cycles });
        lifecycle.release().await;
        lifecycle.acquire().await?;
        telemetry.record_recycle(RecycleCause::Age);
        Ok(true)
    }

    /// Applies the end-of-cycle transition. Cancellation during the cooldown
    /// sleep is reported back; a recycled session is only reopened when the
    /// sleep ran to completion.
    pub async fn apply(
        &mut self,
        failed: usize,
        total: usize,
        lifecycle: &mut SessionLifecycle,
        jitter: &mut JitterSource,
        ctx: HealthContext<'_>,
    ) -> Result<SleepOutcome> {
        let HealthContext {
            status,
            telemetry,
            token,
        } = ctx;
        self.state = self.evaluate(failed, total);
        let ratio = fail_ratio(failed, total);

        let outcome = match self.state {
            SessionHealthState::Normal => SleepOutcome::Elapsed,
            SessionHealthState::Cooldown => {
                let sleep = jitter.upward(self.policy.cooldown, self.policy.cooldown_jitter);
                status.report(&StatusEvent::Cooldown {
                    fail_ratio: ratio,
                    failed,
                    total,
                    sleep,
                });
                telemetry.record_cooldown();
                sleep_or_cancel(sleep, token).await
            }
            SessionHealthState::Recycling => {
                let sleep = jitter.upward(self.policy.cooldown, self.policy.cooldown_jitter);
                status.report(&StatusEvent::Recycle {
                    fail_ratio: ratio,
                    failed,
                    total,
                    sleep,
                });
                lifecycle.release().await;
                telemetry.record_recycle(RecycleCause::FailureRatio);
                let outcome = sleep_or_cancel(sleep, token).await;
                if outcome == SleepOutcome::Elapsed {
                    lifecycle.acquire().await?;
                }
                outcome
            }
        };

        self.state = SessionHealthState::Normal;
        Ok(outcome)
    }
}
