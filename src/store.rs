//! Collaborator boundaries for persistence, aggregate maintenance, and
//! region-of-interest lookups, plus the PostgreSQL implementation.

pub mod postgres;

use crate::preprocessors::batch::FixChunker;
use crate::preprocessors::fix::CanonicalFix;
use crate::preprocessors::prefilter::BBox;
use anyhow::{Context, Result};
use futures::future::BoxFuture;

pub use postgres::PgFixStore;

/// Sink for normalized fixes.
///
/// The returned count is the number of rows *submitted*; the store performs
/// its own deduplication and may keep fewer.
pub trait FixStore: Send + Sync {
    fn insert_batch<'a>(&'a self, fixes: &'a [CanonicalFix]) -> BoxFuture<'a, Result<u64>>;
}

/// Idempotent downstream aggregate refresh over the trailing `backfill_days`.
pub trait AggregateRefresher: Send + Sync {
    fn refresh_aggregates(&self, backfill_days: u32) -> BoxFuture<'_, Result<()>>;
}

/// Supplier of buffered bounding boxes for the spatial prefilter.
pub trait RegionSource: Send + Sync {
    fn load_bboxes(&self, buffer_deg: f64) -> BoxFuture<'_, Result<Vec<BBox>>>;
}

/// Submits `fixes` in chunks no larger than the chunker's limit and returns
/// the total attempted count. The first failing chunk aborts the call.
pub async fn persist_in_chunks(
    store: &dyn FixStore,
    chunker: FixChunker,
    fixes: &[CanonicalFix],
) -> Result<u64> {
    let mut attempted = 0u64;
    for (index, chunk) in chunker.chunks(fixes).enumerate() {
        let submitted = store
            .insert_batch(chunk)
            .await
            .with_context(|| format!("failed to persist chunk {index} ({} fixes)", chunk.len()))?;
        attempted = attempted.saturating_add(submitted);
    }
    Ok(attempted)
}
