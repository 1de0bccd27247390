use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use tanker_collector::{AggregateRefresher, BBox, CanonicalFix, FixStore, RegionSource};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// A terrestrial tanker row as the provider serves it.
pub fn tanker_row(mmsi: u32, lat: f64, lon: f64) -> Value {
    json!({
        "SHIPTYPE": "80",
        "LAT": lat.to_string(),
        "LON": lon.to_string(),
        "SPEED": "105",
        "COURSE": "270",
        "HEADING": "268",
        "ELAPSED": "3",
        "MMSI": mmsi.to_string(),
        "SHIP_ID": (mmsi % 1_000_000).to_string(),
        "SHIPNAME": format!("TANKER {mmsi}"),
        "FLAG": "PA",
        "DESTINATION": "FUJAIRAH",
    })
}

pub fn cargo_row(mmsi: u32) -> Value {
    json!({
        "SHIPTYPE": "70",
        "LAT": "25.1",
        "LON": "55.2",
        "MMSI": mmsi.to_string(),
        "SHIP_ID": "4412",
    })
}

/// In-memory store that records every submitted chunk.
#[derive(Default)]
pub struct RecordingStore {
    chunks: Mutex<Vec<usize>>,
    fixes: Mutex<Vec<CanonicalFix>>,
    refreshes: AtomicUsize,
    fail_inserts: AtomicBool,
    regions: Mutex<Vec<BBox>>,
}

impl RecordingStore {
    pub fn failing() -> Self {
        let store = Self::default();
        store.fail_inserts.store(true, Ordering::SeqCst);
        store
    }

    pub fn with_regions(regions: Vec<BBox>) -> Self {
        let store = Self::default();
        *store.regions.lock().expect("regions poisoned") = regions;
        store
    }

    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.chunks.lock().expect("chunks poisoned").clone()
    }

    pub fn fixes(&self) -> Vec<CanonicalFix> {
        self.fixes.lock().expect("fixes poisoned").clone()
    }

    pub fn fix_count(&self) -> usize {
        self.fixes.lock().expect("fixes poisoned").len()
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl FixStore for RecordingStore {
    fn insert_batch<'a>(&'a self, fixes: &'a [CanonicalFix]) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            if self.fail_inserts.load(Ordering::SeqCst) {
                bail!("recording store is read-only");
            }
            self.chunks.lock().expect("chunks poisoned").push(fixes.len());
            self.fixes
                .lock()
                .expect("fixes poisoned")
                .extend_from_slice(fixes);
            Ok(fixes.len() as u64)
        })
    }
}

impl AggregateRefresher for RecordingStore {
    fn refresh_aggregates(&self, _backfill_days: u32) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

impl RegionSource for RecordingStore {
    fn load_bboxes(&self, buffer_deg: f64) -> BoxFuture<'_, Result<Vec<BBox>>> {
        Box::pin(async move {
            let regions = self.regions.lock().expect("regions poisoned").clone();
            Ok(regions
                .into_iter()
                .map(|bbox| {
                    BBox::new(
                        bbox.xmin - buffer_deg,
                        bbox.ymin - buffer_deg,
                        bbox.xmax + buffer_deg,
                        bbox.ymax + buffer_deg,
                    )
                })
                .collect())
        })
    }
}

pub async fn wait_for_fixes(
    store: &RecordingStore,
    expected: usize,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let count = store.fix_count();
        if count >= expected {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("timed out waiting for {expected} fixes (have {count})");
        }
        sleep(Duration::from_millis(20)).await;
    }
}
