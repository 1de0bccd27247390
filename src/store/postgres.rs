//! PostgreSQL/PostGIS backed store. Geometry enrichment, area membership and
//! deduplication are handled by triggers in the database; this module only
//! submits the canonical column set and kicks aggregate refreshes.

use super::{AggregateRefresher, FixStore, RegionSource};
use crate::preprocessors::fix::{CanonicalFix, FixSource};
use crate::preprocessors::prefilter::BBox;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Executor, Postgres, QueryBuilder, Row};
use std::time::Duration;

const DEFAULT_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

const INSERT_FIX_PREFIX: &str = "INSERT INTO public.ais_fix \
     (ts, src, vessel_uid, lat, lon, sog, cog, heading, elapsed, \
      destination, flag, length_m, width_m, dwt, shipname, shiptype, ship_id, rot) ";

const REFRESH_WINDOW_SQL: &str = "SELECT \
       date_trunc('day', now() - make_interval(days => $1)) AS d0, \
       date_trunc('day', now()) + interval '1 day' AS d1";

const CONTINUOUS_AGGREGATES: [&str; 4] = [
    "public.ca_port_lifts_daily",
    "public.ca_lane_transit_daily",
    "public.ca_ballast_return_daily",
    "public.ca_class_mix_daily",
];

const MATERIALIZED_VIEWS: [&str; 2] = [
    "public.mv_lane_transit_time_daily",
    "public.mv_area_occupancy_daily",
];

const REGION_BBOXES_SQL: &str = "WITH all_geoms AS ( \
       SELECT ST_Envelope(ST_Expand(geom, $1::float8)) AS g FROM public.area \
       UNION ALL \
       SELECT ST_Envelope(ST_Expand(geom, $1::float8)) AS g FROM public.area_gate \
     ) \
     SELECT ST_XMin(g) AS xmin, ST_YMin(g) AS ymin, ST_XMax(g) AS xmax, ST_YMax(g) AS ymax \
     FROM all_geoms";

#[derive(Debug, Clone)]
pub struct PgFixStore {
    pool: PgPool,
}

impl PgFixStore {
    /// Connects and verifies the store is reachable. Failure here is fatal at
    /// startup.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .acquire_timeout(DEFAULT_ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await
            .context("failed to connect to the fix store")?;

        let store = Self::from_pool(pool);
        store.ping().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("fix store is unreachable")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn insert_fixes(&self, fixes: &[CanonicalFix]) -> Result<u64> {
        if fixes.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Postgres>::new(INSERT_FIX_PREFIX);
        builder.push_values(fixes, |mut row, fix| {
            row.push_bind(fix.observed_at)
                .push_bind(source_column(fix.source))
                .push_bind(fix.vessel_uid.clone())
                .push_bind(fix.lat)
                .push_bind(fix.lon)
                .push_bind(fix.sog)
                .push_bind(fix.cog)
                .push_bind(fix.heading)
                .push_bind(fix.elapsed_minutes)
                .push_bind(fix.destination.clone())
                .push_bind(fix.flag.clone())
                .push_bind(fix.length_m)
                .push_bind(fix.width_m)
                .push_bind(fix.dwt)
                .push_bind(fix.shipname.clone())
                .push_bind(fix.shiptype)
                .push_bind(fix.ship_id.clone())
                .push_bind(fix.rot);
        });

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to insert {} fixes", fixes.len()))?;

        // Dedupe triggers may silently swallow rows, so the affected count is
        // only informational.
        tracing::debug!(
            submitted = fixes.len(),
            affected = result.rows_affected(),
            "fix batch submitted"
        );
        Ok(fixes.len() as u64)
    }

    async fn refresh_window(&self, backfill_days: u32) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("failed to acquire connection for aggregate refresh")?;

        (&mut *conn)
            .execute("SET TIME ZONE 'UTC'")
            .await
            .context("failed to pin refresh session time zone")?;

        let days = i32::try_from(backfill_days).unwrap_or(i32::MAX);
        let window = sqlx::query(REFRESH_WINDOW_SQL)
            .bind(days)
            .fetch_one(&mut *conn)
            .await
            .context("failed to compute refresh window")?;
        let start: DateTime<Utc> = window.try_get("d0")?;
        let end: DateTime<Utc> = window.try_get("d1")?;

        for aggregate in CONTINUOUS_AGGREGATES {
            let statement = format!(
                "CALL refresh_continuous_aggregate('{aggregate}', $1::timestamptz, $2::timestamptz)"
            );
            sqlx::query(&statement)
                .bind(start)
                .bind(end)
                .execute(&mut *conn)
                .await
                .with_context(|| format!("failed to refresh continuous aggregate {aggregate}"))?;
        }

        for view in MATERIALIZED_VIEWS {
            let statement = format!("REFRESH MATERIALIZED VIEW CONCURRENTLY {view}");
            (&mut *conn)
                .execute(statement.as_str())
                .await
                .with_context(|| format!("failed to refresh materialized view {view}"))?;
        }

        tracing::debug!(%start, %end, "downstream aggregates refreshed");
        Ok(())
    }

    async fn region_bboxes(&self, buffer_deg: f64) -> Result<Vec<BBox>> {
        let rows = sqlx::query(REGION_BBOXES_SQL)
            .bind(buffer_deg)
            .fetch_all(&self.pool)
            .await
            .context("failed to load region bounding boxes")?;

        rows.iter()
            .map(|row| {
                Ok(BBox::new(
                    row.try_get("xmin")?,
                    row.try_get("ymin")?,
                    row.try_get("xmax")?,
                    row.try_get("ymax")?,
                ))
            })
            .collect()
    }
}

/// The `src` column predates the enum and stores satellite rows as `sat`.
fn source_column(source: FixSource) -> &'static str {
    match source {
        FixSource::Terrestrial => "terrestrial",
        FixSource::Satellite => "sat",
    }
}

impl FixStore for PgFixStore {
    fn insert_batch<'a>(&'a self, fixes: &'a [CanonicalFix]) -> BoxFuture<'a, Result<u64>> {
        Box::pin(self.insert_fixes(fixes))
    }
}

impl AggregateRefresher for PgFixStore {
    fn refresh_aggregates(&self, backfill_days: u32) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.refresh_window(backfill_days))
    }
}

impl RegionSource for PgFixStore {
    fn load_bboxes(&self, buffer_deg: f64) -> BoxFuture<'_, Result<Vec<BBox>>> {
        Box::pin(self.region_bboxes(buffer_deg))
    }
}
