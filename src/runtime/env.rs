//! `COLLECTOR_*` environment loading.
//!
//! Unset or blank variables fall back to the builder defaults; values that are
//! present but malformed are errors naming the variable.

use crate::runtime::config::{CollectorConfig, CollectorConfigBuilder};
use crate::upstream::parse_tile_list;
use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const TILES_VAR: &str = "COLLECTOR_TILES";
pub const DATABASE_URL_VAR: &str = "COLLECTOR_DATABASE_URL";
const FALLBACK_DATABASE_URL_VAR: &str = "DATABASE_URL";

/// Reads the configuration from the process environment.
pub fn config_from_env() -> Result<CollectorConfig> {
    config_from_lookup(|key| env::var(key).ok())
}

/// Reads the configuration through `lookup`, which maps a variable name to
/// its value.
pub fn config_from_lookup<F>(lookup: F) -> Result<CollectorConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let vars = EnvVars { lookup };

    let tiles_raw = vars
        .text(TILES_VAR)
        .with_context(|| format!("{TILES_VAR} is required"))?;
    let tiles =
        parse_tile_list(&tiles_raw).with_context(|| format!("failed to parse {TILES_VAR}"))?;

    let mut builder = CollectorConfig::builder().tiles(tiles);
    builder = apply_cadence(&vars, builder)?;
    builder = apply_health(&vars, builder)?;
    builder = apply_normalizer(&vars, builder)?;
    builder = apply_outputs(&vars, builder)?;

    builder.build()
}

fn apply_cadence<F>(
    vars: &EnvVars<F>,
    mut builder: CollectorConfigBuilder,
) -> Result<CollectorConfigBuilder>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(count) = vars.parsed("COLLECTOR_TILES_PER_CYCLE")? {
        builder = builder.tiles_per_cycle(count);
    }
    if let Some(secs) = vars.parsed("COLLECTOR_INTERVAL_SECS")? {
        builder = builder.cycle_interval(Duration::from_secs(secs));
    }
    if let Some(secs) = vars.parsed("COLLECTOR_CYCLE_JITTER_SECS")? {
        builder = builder.cycle_jitter(Duration::from_secs(secs));
    }
    if let Some(ms) = vars.parsed("COLLECTOR_TILE_PAUSE_MS")? {
        builder = builder.tile_pause(Duration::from_millis(ms));
    }
    if let Some(ms) = vars.parsed("COLLECTOR_TILE_JITTER_MS")? {
        builder = builder.tile_jitter(Duration::from_millis(ms));
    }
    if let Some(retries) = vars.parsed("COLLECTOR_MAX_RETRIES")? {
        builder = builder.max_retries(retries);
    }
    if let Some(secs) = vars.parsed("COLLECTOR_BACKOFF_BASE_SECS")? {
        builder = builder.backoff_base(Duration::from_secs(secs));
    }
    if let Some(secs) = vars.parsed("COLLECTOR_FETCH_TIMEOUT_SECS")? {
        builder = builder.fetch_timeout(Duration::from_secs(secs));
    }
    if let Some(template) = vars.text("COLLECTOR_TILE_URL_TEMPLATE") {
        builder = builder.tile_url_template(template);
    }
    Ok(builder)
}

fn apply_health<F>(
    vars: &EnvVars<F>,
    mut builder: CollectorConfigBuilder,
) -> Result<CollectorConfigBuilder>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(ratio) = vars.parsed("COLLECTOR_COOLDOWN_FAIL_RATIO")? {
        builder = builder.cooldown_threshold(ratio);
    }
    if let Some(secs) = vars.parsed("COLLECTOR_COOLDOWN_SECS")? {
        builder = builder.cooldown(Duration::from_secs(secs));
    }
    if let Some(secs) = vars.parsed("COLLECTOR_COOLDOWN_JITTER_SECS")? {
        builder = builder.cooldown_jitter(Duration::from_secs(secs));
    }
    if let Some(ratio) = vars.parsed("COLLECTOR_RECYCLE_FAIL_RATIO")? {
        builder = builder.recycle_threshold(ratio);
    }
    if let Some(cycles) = vars.parsed("COLLECTOR_CYCLES_PER_SESSION")? {
        builder = builder.cycles_per_session(cycles);
    }
    Ok(builder)
}

fn apply_normalizer<F>(
    vars: &EnvVars<F>,
    mut builder: CollectorConfigBuilder,
) -> Result<CollectorConfigBuilder>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(minutes) = vars.parsed("COLLECTOR_MAX_OBS_AGE_MIN")? {
        builder = builder.max_observation_age_minutes(minutes);
    }
    if let Some(knots) = vars.parsed("COLLECTOR_MAX_SOG_KN")? {
        builder = builder.max_sog_knots(knots);
    }
    if let Some(enabled) = vars.flag("COLLECTOR_PREFILTER")? {
        builder = builder.prefilter_enabled(enabled);
    }
    if let Some(degrees) = vars.parsed("COLLECTOR_PREFILTER_BUFFER_DEG")? {
        builder = builder.prefilter_buffer_deg(degrees);
    }
    if let Some(keep) = vars.flag("COLLECTOR_KEEP_SATELLITE")? {
        builder = builder.keep_satellite(keep);
    }
    Ok(builder)
}

fn apply_outputs<F>(
    vars: &EnvVars<F>,
    mut builder: CollectorConfigBuilder,
) -> Result<CollectorConfigBuilder>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(size) = vars.parsed("COLLECTOR_INSERT_BATCH_SIZE")? {
        builder = builder.insert_batch_size(size);
    }
    if let Some(days) = vars.parsed("COLLECTOR_REFRESH_BACKFILL_DAYS")? {
        builder = builder.refresh_backfill_days(days);
    }
    if let Some(secs) = vars.parsed("COLLECTOR_METRICS_INTERVAL_SECS")? {
        builder = builder.metrics_interval(Duration::from_secs(secs));
    }
    if let Some(url) = vars
        .text(DATABASE_URL_VAR)
        .or_else(|| vars.text(FALLBACK_DATABASE_URL_VAR))
    {
        builder = builder.database_url(url);
    }
    Ok(builder)
}

struct EnvVars<F> {
    lookup: F,
}

impl<F> EnvVars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn text(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.text(key) {
            Some(value) => value
                .parse::<T>()
                .map(Some)
                .with_context(|| format!("failed to parse {key}='{value}'")),
            None => Ok(None),
        }
    }

    fn flag(&self, key: &str) -> Result<Option<bool>> {
        let Some(value) = self.text(key) else {
            return Ok(None);
        };
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => bail!("failed to parse {key}='{value}': expected a boolean flag"),
        }
    }
}
