//! The collector loop.
//!
//! One control task drives everything: tiles are fetched strictly in sequence,
//! each successful payload is normalized and persisted before the next fetch
//! starts, and cycles never overlap. The only background work is the
//! downstream aggregate refresh, which is spawned once per cycle and never
//! awaited by the loop itself.

use super::backoff::{BackoffController, FetchOutcome};
use super::health::{HealthContext, SessionHealthMonitor};
use super::lifecycle::SessionLifecycle;
use super::pacing::{cadence_wait, sleep_or_cancel, JitterSource, TilePacing};
use super::scheduler::TileCycleScheduler;
use crate::preprocessors::batch::FixChunker;
use crate::preprocessors::normalizer::{DropCounts, RowNormalizer};
use crate::preprocessors::prefilter::SpatialPrefilter;
use crate::runtime::config::CollectorConfig;
use crate::runtime::status::{CycleSummary, StatusEvent, StatusSink};
use crate::runtime::telemetry::Telemetry;
use crate::store::{persist_in_chunks, AggregateRefresher, FixStore, RegionSource};
use crate::upstream::{FetchFailure, SessionFactory, TileCoord};
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

/// Upper bound on waiting for an in-flight aggregate refresh at shutdown.
pub const REFRESH_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Collaborators the orchestrator drives.
pub struct CollectorParts {
    pub sessions: Arc<dyn SessionFactory>,
    pub store: Arc<dyn FixStore>,
    pub refresher: Option<Arc<dyn AggregateRefresher>>,
    pub regions: Option<Arc<dyn RegionSource>>,
    pub status: Arc<dyn StatusSink>,
}

/// Per-cycle counters. Reset at the start of every cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleStats {
    pub tiles: usize,
    pub failed_tiles: usize,
    pub received: u64,
    pub kept: u64,
    pub attempted: u64,
    pub drops: DropCounts,
}

impl CycleStats {
    pub fn tiles_ok(&self) -> usize {
        self.tiles.saturating_sub(self.failed_tiles)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(CycleStats),
    Cancelled,
}

pub struct CycleOrchestrator {
    config: CollectorConfig,
    scheduler: TileCycleScheduler,
    backoff: BackoffController,
    health: SessionHealthMonitor,
    lifecycle: SessionLifecycle,
    normalizer: RowNormalizer,
    prefilter: SpatialPrefilter,
    chunker: FixChunker,
    pacing: TilePacing,
    store: Arc<dyn FixStore>,
    refresher: Option<Arc<dyn AggregateRefresher>>,
    regions: Option<Arc<dyn RegionSource>>,
    status: Arc<dyn StatusSink>,
    telemetry: Arc<Telemetry>,
    jitter: JitterSource,
    refresh_task: Option<JoinHandle<()>>,
}

impl CycleOrchestrator {
    pub fn new(config: CollectorConfig, parts: CollectorParts) -> Result<Self> {
        let CollectorParts {
            sessions,
            store,
            refresher,
            regions,
            status,
        } = parts;

        let scheduler = TileCycleScheduler::new(config.tiles().to_vec())?;
        Ok(Self {
            scheduler,
            backoff: BackoffController::new(config.backoff_policy()),
            health: SessionHealthMonitor::new(config.health_policy()),
            lifecycle: SessionLifecycle::new(sessions),
            normalizer: RowNormalizer::new(config.normalizer_settings()),
            prefilter: SpatialPrefilter::empty(),
            chunker: FixChunker::new(config.insert_batch_size()),
            pacing: config.tile_pacing(),
            store,
            refresher,
            regions,
            status,
            telemetry: Arc::new(Telemetry::default()),
            jitter: JitterSource::from_entropy(),
            refresh_task: None,
            config,
        })
    }

    /// Replaces the entropy-seeded jitter source, e.g. with a seeded one.
    pub fn with_jitter(mut self, jitter: JitterSource) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        Arc::clone(&self.telemetry)
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn prefilter(&self) -> &SpatialPrefilter {
        &self.prefilter
    }

    /// Loads the buffered region boxes. No-op when the prefilter is disabled
    /// or no region source was supplied.
    pub async fn reload_prefilter(&mut self) -> usize {
        if !self.config.prefilter_enabled() {
            return 0;
        }
        match &self.regions {
            Some(regions) => {
                self.prefilter
                    .reload(regions.as_ref(), self.config.prefilter_buffer_deg())
                    .await
            }
            None => 0,
        }
    }

    /// Runs cycles until `token` is cancelled or persistence fails. The fetch
    /// session is released on every exit path.
    pub async fn run(&mut self, token: CancellationToken) -> Result<()> {
        self.reload_prefilter().await;
        self.status.report(&StatusEvent::Setup {
            total_tiles: self.scheduler.total_tiles(),
            tiles_per_cycle: self.config.tiles_per_cycle(),
            interval: self.config.cycle_interval(),
        });

        let result = self.run_loop(&token).await;
        if let Err(err) = &result {
            tracing::error!(error = %err, "collector loop stopped on error");
        }
        self.shutdown().await;
        result
    }

    async fn run_loop(&mut self, token: &CancellationToken) -> Result<()> {
        loop {
            match self.run_cycle(token).await? {
                CycleOutcome::Completed(_) => continue,
                CycleOutcome::Cancelled => {
                    tracing::info!("collector loop cancelled");
                    return Ok(());
                }
            }
        }
    }

    /// Executes one full cycle including the health transition and the
    /// cadence wait that follows it.
    pub async fn run_cycle(&mut self, token: &CancellationToken) -> Result<CycleOutcome> {
        if token.is_cancelled() {
            return Ok(CycleOutcome::Cancelled);
        }
        let started = Instant::now();

        self.health
            .recycle_if_aged(
                &mut self.lifecycle,
                self.status.as_ref(),
                self.telemetry.as_ref(),
            )
            .await?;

        let mut tiles = self.scheduler.next_batch(self.config.tiles_per_cycle());
        self.jitter.shuffle(&mut tiles);

        let mut stats = CycleStats {
            tiles: tiles.len(),
            ..CycleStats::default()
        };

        for (index, tile) in tiles.iter().copied().enumerate() {
            if !self.process_tile(index, tile, &mut stats, token).await? {
                return Ok(CycleOutcome::Cancelled);
            }
        }

        self.lifecycle.record_cycle();
        self.telemetry.record_cycle();
        self.spawn_refresh();
        self.report_summary(&stats);

        let health = self
            .health
            .apply(
                stats.failed_tiles,
                stats.tiles,
                &mut self.lifecycle,
                &mut self.jitter,
                HealthContext {
                    status: self.status.as_ref(),
                    telemetry: self.telemetry.as_ref(),
                    token,
                },
            )
            .await?;
        if health.is_cancelled() {
            return Ok(CycleOutcome::Cancelled);
        }

        let wait = cadence_wait(
            self.config.cycle_interval(),
            started.elapsed(),
            self.config.cycle_jitter(),
            &mut self.jitter,
        );
        self.status.report(&StatusEvent::NextCycle { sleep: wait });
        if sleep_or_cancel(wait, token).await.is_cancelled() {
            return Ok(CycleOutcome::Cancelled);
        }

        Ok(CycleOutcome::Completed(stats))
    }

    /// Fetches, normalizes and persists one tile. Returns `false` when the
    /// cycle was cancelled mid-way.
    async fn process_tile(
        &mut self,
        index: usize,
        tile: TileCoord,
        stats: &mut CycleStats,
        token: &CancellationToken,
    ) -> Result<bool> {
        let session = self.lifecycle.acquire().await?;
        let outcome = self
            .backoff
            .attempt(session, tile, &mut self.jitter, self.status.as_ref(), token)
            .await;

        let payload = match outcome {
            FetchOutcome::Cancelled => return Ok(false),
            FetchOutcome::Failed { failure, .. } => {
                stats.failed_tiles += 1;
                self.telemetry.record_tile_failure();
                if failure == FetchFailure::Timeout {
                    self.telemetry.record_fetch_timeout();
                }
                return Ok(true);
            }
            FetchOutcome::Success { payload, .. } => payload,
        };

        let fetched_at = Utc::now();
        let received = payload.len();
        let batch = self
            .normalizer
            .normalize_batch(payload.rows(), fetched_at, &self.prefilter);
        let attempted = persist_in_chunks(self.store.as_ref(), self.chunker, &batch.fixes).await?;

        stats.received += received as u64;
        stats.kept += batch.fixes.len() as u64;
        stats.attempted += attempted;
        stats.drops.merge(&batch.drops);
        self.telemetry.record_tile_success(received);
        self.telemetry.record_fixes(batch.fixes.len(), attempted);

        self.status.report(&StatusEvent::TileFetched {
            index: index + 1,
            of: stats.tiles,
            tile,
            received,
            kept: batch.fixes.len(),
            attempted,
        });

        let pause = self.pacing.next_pause(&mut self.jitter);
        Ok(!sleep_or_cancel(pause, token).await.is_cancelled())
    }

    fn report_summary(&self, stats: &CycleStats) {
        tracing::info!(
            received = stats.received,
            kept = stats.kept,
            attempted = stats.attempted,
            tiles_ok = stats.tiles_ok(),
            tiles = stats.tiles,
            dropped = stats.drops.total(),
            "cycle summary"
        );
        self.status.report(&StatusEvent::CycleSummary(CycleSummary {
            finished_at: Utc::now(),
            received: stats.received,
            kept: stats.kept,
            attempted: stats.attempted,
            tiles_ok: stats.tiles_ok(),
            tiles: stats.tiles,
            drops: stats.drops,
        }));
    }

    /// Starts a best-effort aggregate refresh unless the previous one is still
    /// running.
    fn spawn_refresh(&mut self) {
        let Some(refresher) = &self.refresher else {
            return;
        };

        if let Some(handle) = &self.refresh_task {
            if !handle.is_finished() {
                tracing::warn!("previous aggregate refresh still running; skipping this cycle");
                self.telemetry.record_skipped_refresh();
                return;
            }
        }

        let refresher = Arc::clone(refresher);
        let backfill_days = self.config.refresh_backfill_days();
        self.refresh_task = Some(tokio::spawn(async move {
            if let Err(err) = refresher.refresh_aggregates(backfill_days).await {
                tracing::warn!(error = %err, backfill_days, "aggregate refresh failed");
            }
        }));
    }

    /// Releases the fetch session and gives an in-flight refresh a bounded
    /// amount of time to finish.
    pub async fn shutdown(&mut self) {
        self.lifecycle.release().await;

        if let Some(mut handle) = self.refresh_task.take() {
            match timeout(REFRESH_SHUTDOWN_GRACE, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "aggregate refresh task panicked");
                }
                Err(_) => {
                    tracing::warn!("aggregate refresh did not finish in time; aborting");
                    handle.abort();
                }
            }
        }
    }
}
