use crate::preprocessors::batch::MAX_FIXES_PER_STATEMENT;
use crate::preprocessors::normalizer::NormalizerSettings;
use crate::processor::backoff::BackoffPolicy;
use crate::processor::health::HealthPolicy;
use crate::processor::pacing::TilePacing;
use crate::runtime::telemetry;
use crate::upstream::options::{validate_url_template, DEFAULT_TILE_URL_TEMPLATE};
use crate::upstream::{HttpSessionOptions, TileCoord};
use anyhow::{bail, Context, Result};
use std::time::Duration;

pub const DEFAULT_TILES_PER_CYCLE: usize = 8;
const DEFAULT_CYCLE_INTERVAL_SECS: u64 = 150;
const DEFAULT_CYCLE_JITTER_SECS: u64 = 10;
const DEFAULT_TILE_PAUSE_MS: u64 = 2500;
const DEFAULT_TILE_JITTER_MS: u64 = 600;
const DEFAULT_MAX_RETRIES: u32 = 0;
const DEFAULT_BACKOFF_BASE_SECS: u64 = 5;
const DEFAULT_COOLDOWN_THRESHOLD: f64 = 0.4;
const DEFAULT_COOLDOWN_SECS: u64 = 120;
const DEFAULT_COOLDOWN_JITTER_SECS: u64 = 60;
const DEFAULT_RECYCLE_THRESHOLD: f64 = 0.6;
const DEFAULT_CYCLES_PER_SESSION: u32 = 30;
const DEFAULT_MAX_OBSERVATION_AGE_MINUTES: i64 = 720;
/// Ten years; larger caps would let row ages overflow timestamp arithmetic.
pub const MAX_OBSERVATION_AGE_MINUTES: i64 = 10 * 365 * 24 * 60;
const DEFAULT_MAX_SOG_KNOTS: f64 = 35.0;
const DEFAULT_PREFILTER_BUFFER_DEG: f64 = 0.15;
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 2000;
const DEFAULT_REFRESH_BACKFILL_DAYS: u32 = 2;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Operating parameters for the collector loop.
///
/// All instances must be constructed via [`CollectorConfig::builder`] or
/// [`CollectorConfig::new`] so invariants are validated before any consumer
/// observes the values.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    tiles: Vec<TileCoord>,
    tiles_per_cycle: usize,
    cycle_interval: Duration,
    cycle_jitter: Duration,
    tile_pause: Duration,
    tile_jitter: Duration,
    max_retries: u32,
    backoff_base: Duration,
    cooldown_threshold: f64,
    cooldown: Duration,
    cooldown_jitter: Duration,
    recycle_threshold: f64,
    cycles_per_session: u32,
    max_observation_age_minutes: i64,
    max_sog_knots: f64,
    prefilter_enabled: bool,
    prefilter_buffer_deg: f64,
    keep_satellite: bool,
    insert_batch_size: usize,
    refresh_backfill_days: u32,
    fetch_timeout: Duration,
    tile_url_template: String,
    metrics_interval: Duration,
    database_url: Option<String>,
}

pub struct CollectorConfigParams {
    pub tiles: Vec<TileCoord>,
    pub tiles_per_cycle: usize,
    pub cycle_interval: Duration,
    pub cycle_jitter: Duration,
    pub tile_pause: Duration,
    pub tile_jitter: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub cooldown_threshold: f64,
    pub cooldown: Duration,
    pub cooldown_jitter: Duration,
    pub recycle_threshold: f64,
    pub cycles_per_session: u32,
    pub max_observation_age_minutes: i64,
    pub max_sog_knots: f64,
    pub prefilter_enabled: bool,
    pub prefilter_buffer_deg: f64,
    pub keep_satellite: bool,
    pub insert_batch_size: usize,
    pub refresh_backfill_days: u32,
    pub fetch_timeout: Duration,
    pub tile_url_template: String,
    pub metrics_interval: Duration,
    pub database_url: Option<String>,
}

impl CollectorConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> CollectorConfigBuilder {
        CollectorConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: CollectorConfigParams) -> Result<Self> {
        let CollectorConfigParams {
            tiles,
            tiles_per_cycle,
            cycle_interval,
            cycle_jitter,
            tile_pause,
            tile_jitter,
            max_retries,
            backoff_base,
            cooldown_threshold,
            cooldown,
            cooldown_jitter,
            recycle_threshold,
            cycles_per_session,
            max_observation_age_minutes,
            max_sog_knots,
            prefilter_enabled,
            prefilter_buffer_deg,
            keep_satellite,
            insert_batch_size,
            refresh_backfill_days,
            fetch_timeout,
            tile_url_template,
            metrics_interval,
            database_url,
        } = params;

        let config = Self {
            tiles,
            tiles_per_cycle,
            cycle_interval,
            cycle_jitter,
            tile_pause,
            tile_jitter,
            max_retries,
            backoff_base,
            cooldown_threshold,
            cooldown,
            cooldown_jitter,
            recycle_threshold,
            cycles_per_session,
            max_observation_age_minutes,
            max_sog_knots,
            prefilter_enabled,
            prefilter_buffer_deg,
            keep_satellite,
            insert_batch_size,
            refresh_backfill_days,
            fetch_timeout,
            tile_url_template: tile_url_template.trim().to_owned(),
            metrics_interval,
            database_url: database_url
                .map(|url| url.trim().to_owned())
                .filter(|url| !url.is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Ordered tile set the scheduler cycles over.
    pub fn tiles(&self) -> &[TileCoord] {
        &self.tiles
    }

    pub fn tiles_per_cycle(&self) -> usize {
        self.tiles_per_cycle
    }

    /// Target cadence between cycle starts.
    pub fn cycle_interval(&self) -> Duration {
        self.cycle_interval
    }

    pub fn cycle_jitter(&self) -> Duration {
        self.cycle_jitter
    }

    pub fn tile_pause(&self) -> Duration {
        self.tile_pause
    }

    pub fn tile_jitter(&self) -> Duration {
        self.tile_jitter
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    pub fn cooldown_threshold(&self) -> f64 {
        self.cooldown_threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn cooldown_jitter(&self) -> Duration {
        self.cooldown_jitter
    }

    pub fn recycle_threshold(&self) -> f64 {
        self.recycle_threshold
    }

    pub fn cycles_per_session(&self) -> u32 {
        self.cycles_per_session
    }

    pub fn max_observation_age_minutes(&self) -> i64 {
        self.max_observation_age_minutes
    }

    pub fn max_sog_knots(&self) -> f64 {
        self.max_sog_knots
    }

    pub fn prefilter_enabled(&self) -> bool {
        self.prefilter_enabled
    }

    pub fn prefilter_buffer_deg(&self) -> f64 {
        self.prefilter_buffer_deg
    }

    /// Whether satellite-classified rows survive normalization.
    pub fn keep_satellite(&self) -> bool {
        self.keep_satellite
    }

    /// Upper bound on fixes per insert statement.
    pub fn insert_batch_size(&self) -> usize {
        self.insert_batch_size
    }

    pub fn refresh_backfill_days(&self) -> u32 {
        self.refresh_backfill_days
    }

    /// Outer timeout around a single tile fetch.
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub fn tile_url_template(&self) -> &str {
        &self.tile_url_template
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref()
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_retries: self.max_retries,
            base_delay: self.backoff_base,
            fetch_timeout: self.fetch_timeout,
            pacing: self.tile_pacing(),
        }
    }

    pub fn tile_pacing(&self) -> TilePacing {
        TilePacing {
            pause: self.tile_pause,
            jitter: self.tile_jitter,
        }
    }

    pub fn health_policy(&self) -> HealthPolicy {
        HealthPolicy {
            cooldown_threshold: self.cooldown_threshold,
            recycle_threshold: self.recycle_threshold,
            cooldown: self.cooldown,
            cooldown_jitter: self.cooldown_jitter,
            cycles_per_session: self.cycles_per_session,
        }
    }

    pub fn normalizer_settings(&self) -> NormalizerSettings {
        NormalizerSettings {
            max_observation_age_minutes: self.max_observation_age_minutes,
            max_sog_knots: self.max_sog_knots,
            prefilter_enabled: self.prefilter_enabled,
            keep_satellite: self.keep_satellite,
            ..NormalizerSettings::default()
        }
    }

    pub fn session_options(&self) -> HttpSessionOptions {
        HttpSessionOptions {
            url_template: self.tile_url_template.clone(),
            request_timeout: self.fetch_timeout,
            ..HttpSessionOptions::default()
        }
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.tiles.is_empty() {
            bail!("tiles cannot be empty");
        }

        if self.tiles_per_cycle == 0 {
            bail!("tiles_per_cycle must be greater than 0");
        }

        if self.cycle_interval.is_zero() {
            bail!("cycle_interval must be greater than 0");
        }

        ensure_ratio(self.cooldown_threshold, "cooldown_threshold")?;
        ensure_ratio(self.recycle_threshold, "recycle_threshold")?;
        if self.cooldown_threshold > self.recycle_threshold {
            bail!(
                "cooldown_threshold ({}) must not exceed recycle_threshold ({})",
                self.cooldown_threshold,
                self.recycle_threshold
            );
        }

        if self.cycles_per_session == 0 {
            bail!("cycles_per_session must be greater than 0");
        }

        if !(0..=MAX_OBSERVATION_AGE_MINUTES).contains(&self.max_observation_age_minutes) {
            bail!(
                "max_observation_age_minutes must be in 0..={}, got {}",
                MAX_OBSERVATION_AGE_MINUTES,
                self.max_observation_age_minutes
            );
        }

        if !(self.max_sog_knots.is_finite() && self.max_sog_knots > 0.0) {
            bail!("max_sog_knots must be a positive number");
        }

        if !(self.prefilter_buffer_deg.is_finite() && self.prefilter_buffer_deg >= 0.0) {
            bail!("prefilter_buffer_deg cannot be negative");
        }

        if self.insert_batch_size == 0 || self.insert_batch_size > MAX_FIXES_PER_STATEMENT {
            bail!(
                "insert_batch_size must be between 1 and {MAX_FIXES_PER_STATEMENT}, got {}",
                self.insert_batch_size
            );
        }

        if self.fetch_timeout.is_zero() {
            bail!("fetch_timeout must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        validate_url_template(&self.tile_url_template)?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct CollectorConfigBuilder {
    tiles: Option<Vec<TileCoord>>,
    tiles_per_cycle: Option<usize>,
    cycle_interval: Option<Duration>,
    cycle_jitter: Option<Duration>,
    tile_pause: Option<Duration>,
    tile_jitter: Option<Duration>,
    max_retries: Option<u32>,
    backoff_base: Option<Duration>,
    cooldown_threshold: Option<f64>,
    cooldown: Option<Duration>,
    cooldown_jitter: Option<Duration>,
    recycle_threshold: Option<f64>,
    cycles_per_session: Option<u32>,
    max_observation_age_minutes: Option<i64>,
    max_sog_knots: Option<f64>,
    prefilter_enabled: Option<bool>,
    prefilter_buffer_deg: Option<f64>,
    keep_satellite: Option<bool>,
    insert_batch_size: Option<usize>,
    refresh_backfill_days: Option<u32>,
    fetch_timeout: Option<Duration>,
    tile_url_template: Option<String>,
    metrics_interval: Option<Duration>,
    database_url: Option<String>,
}

impl CollectorConfigBuilder {
    pub fn tiles(mut self, tiles: impl IntoIterator<Item = TileCoord>) -> Self {
        self.tiles = Some(tiles.into_iter().collect());
        self
    }

    pub fn tiles_per_cycle(mut self, count: usize) -> Self {
        self.tiles_per_cycle = Some(count);
        self
    }

    pub fn cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval = Some(interval);
        self
    }

    pub fn cycle_jitter(mut self, jitter: Duration) -> Self {
        self.cycle_jitter = Some(jitter);
        self
    }

    pub fn tile_pause(mut self, pause: Duration) -> Self {
        self.tile_pause = Some(pause);
        self
    }

    pub fn tile_jitter(mut self, jitter: Duration) -> Self {
        self.tile_jitter = Some(jitter);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = Some(base);
        self
    }

    pub fn cooldown_threshold(mut self, ratio: f64) -> Self {
        self.cooldown_threshold = Some(ratio);
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    pub fn cooldown_jitter(mut self, jitter: Duration) -> Self {
        self.cooldown_jitter = Some(jitter);
        self
    }

    pub fn recycle_threshold(mut self, ratio: f64) -> Self {
        self.recycle_threshold = Some(ratio);
        self
    }

    pub fn cycles_per_session(mut self, cycles: u32) -> Self {
        self.cycles_per_session = Some(cycles);
        self
    }

    pub fn max_observation_age_minutes(mut self, minutes: i64) -> Self {
        self.max_observation_age_minutes = Some(minutes);
        self
    }

    pub fn max_sog_knots(mut self, knots: f64) -> Self {
        self.max_sog_knots = Some(knots);
        self
    }

    pub fn prefilter_enabled(mut self, enabled: bool) -> Self {
        self.prefilter_enabled = Some(enabled);
        self
    }

    pub fn prefilter_buffer_deg(mut self, degrees: f64) -> Self {
        self.prefilter_buffer_deg = Some(degrees);
        self
    }

    pub fn keep_satellite(mut self, keep: bool) -> Self {
        self.keep_satellite = Some(keep);
        self
    }

    pub fn insert_batch_size(mut self, size: usize) -> Self {
        self.insert_batch_size = Some(size);
        self
    }

    pub fn refresh_backfill_days(mut self, days: u32) -> Self {
        self.refresh_backfill_days = Some(days);
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn tile_url_template(mut self, template: impl Into<String>) -> Self {
        self.tile_url_template = Some(template.into());
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn build(self) -> Result<CollectorConfig> {
        let params = CollectorConfigParams {
            tiles: self.tiles.context("tiles is required")?,
            tiles_per_cycle: self.tiles_per_cycle.unwrap_or(DEFAULT_TILES_PER_CYCLE),
            cycle_interval: self
                .cycle_interval
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_CYCLE_INTERVAL_SECS)),
            cycle_jitter: self
                .cycle_jitter
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_CYCLE_JITTER_SECS)),
            tile_pause: self
                .tile_pause
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_TILE_PAUSE_MS)),
            tile_jitter: self
                .tile_jitter
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_TILE_JITTER_MS)),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            backoff_base: self
                .backoff_base
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_BACKOFF_BASE_SECS)),
            cooldown_threshold: self
                .cooldown_threshold
                .unwrap_or(DEFAULT_COOLDOWN_THRESHOLD),
            cooldown: self
                .cooldown
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_COOLDOWN_SECS)),
            cooldown_jitter: self
                .cooldown_jitter
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_COOLDOWN_JITTER_SECS)),
            recycle_threshold: self.recycle_threshold.unwrap_or(DEFAULT_RECYCLE_THRESHOLD),
            cycles_per_session: self
                .cycles_per_session
                .unwrap_or(DEFAULT_CYCLES_PER_SESSION),
            max_observation_age_minutes: self
                .max_observation_age_minutes
                .unwrap_or(DEFAULT_MAX_OBSERVATION_AGE_MINUTES),
            max_sog_knots: self.max_sog_knots.unwrap_or(DEFAULT_MAX_SOG_KNOTS),
            prefilter_enabled: self.prefilter_enabled.unwrap_or(true),
            prefilter_buffer_deg: self
                .prefilter_buffer_deg
                .unwrap_or(DEFAULT_PREFILTER_BUFFER_DEG),
            keep_satellite: self.keep_satellite.unwrap_or(false),
            insert_batch_size: self.insert_batch_size.unwrap_or(DEFAULT_INSERT_BATCH_SIZE),
            refresh_backfill_days: self
                .refresh_backfill_days
                .unwrap_or(DEFAULT_REFRESH_BACKFILL_DAYS),
            fetch_timeout: self
                .fetch_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS)),
            tile_url_template: self
                .tile_url_template
                .unwrap_or_else(|| DEFAULT_TILE_URL_TEMPLATE.to_owned()),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            database_url: self.database_url,
        };

        CollectorConfig::new(params)
    }
}

fn ensure_ratio(value: f64, field: &str) -> Result<()> {
    if !(value > 0.0 && value <= 1.0) {
        bail!("{field} must be within (0, 1], got {value}");
    }
    Ok(())
}
