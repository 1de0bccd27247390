//! Human-facing status channel.
//!
//! The orchestrator and its helpers report progress as [`StatusEvent`]s through
//! a single [`StatusSink`]. Where those events end up (a log, a terminal, a
//! test buffer) is the sink's business.

use crate::preprocessors::normalizer::DropCounts;
use crate::upstream::{FetchFailure, TileCoord};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

pub const STATUS_TARGET: &str = "tanker_collector::status";

#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    Setup {
        total_tiles: usize,
        tiles_per_cycle: usize,
        interval: Duration,
    },
    BackoffRetry {
        tile: TileCoord,
        attempt: u32,
        delay: Duration,
        failure: FetchFailure,
    },
    BackoffRecovered {
        tile: TileCoord,
        attempts: u32,
    },
    BackoffExhausted {
        tile: TileCoord,
        attempts: u32,
        failure: FetchFailure,
    },
    TileFetched {
        index: usize,
        of: usize,
        tile: TileCoord,
        received: usize,
        kept: usize,
        attempted: u64,
    },
    CycleSummary(CycleSummary),
    Cooldown {
        fail_ratio: f64,
        failed: usize,
        total: usize,
        sleep: Duration,
    },
    Recycle {
        fail_ratio: f64,
        failed: usize,
        total: usize,
        sleep: Duration,
    },
    SessionAged {
        cycles: u32,
    },
    NextCycle {
        sleep: Duration,
    },
}

/// Counts reported at the end of every cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary {
    pub finished_at: DateTime<Utc>,
    pub received: u64,
    pub kept: u64,
    pub attempted: u64,
    pub tiles_ok: usize,
    pub tiles: usize,
    pub drops: DropCounts,
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::Setup {
                total_tiles,
                tiles_per_cycle,
                interval,
            } => write!(
                f,
                "[SETUP] tiles={total_tiles} | per_cycle={tiles_per_cycle} | interval={}s",
                interval.as_secs()
            ),
            StatusEvent::BackoffRetry {
                tile,
                attempt,
                delay,
                failure,
            } => write!(
                f,
                "[BACKOFF] tile {tile} attempt {attempt} failed ({failure}) -> sleeping {:.1}s",
                delay.as_secs_f64()
            ),
            StatusEvent::BackoffRecovered { tile, attempts } => write!(
                f,
                "[BACKOFF] tile {tile} succeeded after {attempts} attempt(s)"
            ),
            StatusEvent::BackoffExhausted {
                tile,
                attempts,
                failure,
            } => write!(
                f,
                "[BACKOFF] tile {tile} exhausted retries {attempts} ({failure}); continuing"
            ),
            StatusEvent::TileFetched {
                index,
                of,
                tile,
                received,
                kept,
                attempted,
            } => write!(
                f,
                "[FETCH] tile {index}/{of} {tile} (recv={received} kept={kept} ins={attempted})"
            ),
            StatusEvent::CycleSummary(summary) => write!(
                f,
                "[LATEST] {} | received={} | kept={} | inserted={} | tiles this cycle={}/{} | dropped {}",
                summary.finished_at.format("%Y-%m-%d %H:%M:%S"),
                summary.received,
                summary.kept,
                summary.attempted,
                summary.tiles_ok,
                summary.tiles,
                summary.drops
            ),
            StatusEvent::Cooldown {
                fail_ratio,
                failed,
                total,
                sleep,
            } => write!(
                f,
                "[COOLDOWN] fail_ratio={fail_ratio:.2} (failed={failed} of {total}) -> sleeping {}s",
                sleep.as_secs()
            ),
            StatusEvent::Recycle {
                fail_ratio,
                failed,
                total,
                sleep,
            } => write!(
                f,
                "[RECYCLE] fail_ratio={fail_ratio:.2} (failed={failed} of {total}) -> sleeping {}s",
                sleep.as_secs()
            ),
            StatusEvent::SessionAged { cycles } => write!(
                f,
                "[RECYCLE] session served {cycles} cycles; opening a fresh one"
            ),
            StatusEvent::NextCycle { sleep } => {
                write!(f, "[NEXT] sleeping {:.1}s until next cycle", sleep.as_secs_f64())
            }
        }
    }
}

pub trait StatusSink: Send + Sync {
    fn report(&self, event: &StatusEvent);
}

/// Renders events as log lines under [`STATUS_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn report(&self, event: &StatusEvent) {
        match event {
            StatusEvent::BackoffRetry { .. }
            | StatusEvent::BackoffExhausted { .. }
            | StatusEvent::Cooldown { .. }
            | StatusEvent::Recycle { .. }
            | StatusEvent::SessionAged { .. } => {
                tracing::warn!(target: STATUS_TARGET, "{event}");
            }
            StatusEvent::TileFetched { .. } | StatusEvent::NextCycle { .. } => {
                tracing::debug!(target: STATUS_TARGET, "{event}");
            }
            _ => tracing::info!(target: STATUS_TARGET, "{event}"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullStatusSink;

impl StatusSink for NullStatusSink {
    fn report(&self, _event: &StatusEvent) {}
}

/// Keeps every event in memory. Handy for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStatusSink {
    events: Mutex<Vec<StatusEvent>>,
}

impl MemoryStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl StatusSink for MemoryStatusSink {
    fn report(&self, event: &StatusEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}
