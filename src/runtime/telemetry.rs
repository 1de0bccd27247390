use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(60);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Why a fetch session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecycleCause {
    FailureRatio,
    Age,
}

impl RecycleCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecycleCause::FailureRatio => "failure_ratio",
            RecycleCause::Age => "age",
        }
    }
}

/// Lifetime counters for the collector. Per-cycle numbers live in
/// `CycleStats`; these only ever grow.
#[derive(Default, Debug)]
pub struct Telemetry {
    cycles: AtomicU64,
    tiles_fetched: AtomicU64,
    tiles_failed: AtomicU64,
    fetch_timeouts: AtomicU64,
    rows_received: AtomicU64,
    fixes_kept: AtomicU64,
    fixes_attempted: AtomicU64,
    cooldowns: AtomicU64,
    ratio_recycles: AtomicU64,
    age_recycles: AtomicU64,
    skipped_refreshes: AtomicU64,
}

impl Telemetry {
    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tile_success(&self, rows: usize) {
        self.tiles_fetched.fetch_add(1, Ordering::Relaxed);
        self.rows_received.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub fn record_tile_failure(&self) {
        self.tiles_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_timeout(&self) {
        self.fetch_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fixes(&self, kept: usize, attempted: u64) {
        self.fixes_kept.fetch_add(kept as u64, Ordering::Relaxed);
        self.fixes_attempted.fetch_add(attempted, Ordering::Relaxed);
    }

    pub fn record_cooldown(&self) {
        self.cooldowns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recycle(&self, cause: RecycleCause) {
        let counter = match cause {
            RecycleCause::FailureRatio => &self.ratio_recycles,
            RecycleCause::Age => &self.age_recycles,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_refresh(&self) {
        self.skipped_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            tiles_fetched: self.tiles_fetched.load(Ordering::Relaxed),
            tiles_failed: self.tiles_failed.load(Ordering::Relaxed),
            fetch_timeouts: self.fetch_timeouts.load(Ordering::Relaxed),
            rows_received: self.rows_received.load(Ordering::Relaxed),
            fixes_kept: self.fixes_kept.load(Ordering::Relaxed),
            fixes_attempted: self.fixes_attempted.load(Ordering::Relaxed),
            cooldowns: self.cooldowns.load(Ordering::Relaxed),
            ratio_recycles: self.ratio_recycles.load(Ordering::Relaxed),
            age_recycles: self.age_recycles.load(Ordering::Relaxed),
            skipped_refreshes: self.skipped_refreshes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub cycles: u64,
    pub tiles_fetched: u64,
    pub tiles_failed: u64,
    pub fetch_timeouts: u64,
    pub rows_received: u64,
    pub fixes_kept: u64,
    pub fixes_attempted: u64,
    pub cooldowns: u64,
    pub ratio_recycles: u64,
    pub age_recycles: u64,
    pub skipped_refreshes: u64,
}

impl TelemetrySnapshot {
    pub fn recycles(&self) -> u64 {
        self.ratio_recycles + self.age_recycles
    }
}

/// Spawns a background task that periodically logs fix throughput and the
/// lifetime tile/session counters.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(
                        target: "tanker_collector::metrics",
                        "metrics reporter shutting down"
                    );
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let kept_delta = current.fixes_kept.saturating_sub(last_snapshot.fixes_kept);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        kept_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "tanker_collector::metrics",
                        fixes_per_sec = format!("{throughput:.2}"),
                        cycles = current.cycles,
                        tiles_fetched = current.tiles_fetched,
                        tiles_failed = current.tiles_failed,
                        fetch_timeouts = current.fetch_timeouts,
                        fixes_kept = current.fixes_kept,
                        fixes_attempted = current.fixes_attempted,
                        cooldowns = current.cooldowns,
                        recycles = current.recycles(),
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
