use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{cargo_row, init_tracing, tanker_row, RecordingStore},
    mock_tiles::{MockTileServer, MockTiles, TileResponse},
};
use anyhow::{bail, Result};
use tanker_collector::{
    BBox, CollectorConfig, CollectorConfigBuilder, CollectorParts, CycleOrchestrator,
    CycleOutcome, CycleStats, DropReason, FixSource, HttpSessionFactory, JitterSource,
    MemoryStatusSink, StatusEvent, StatusSink, TileCoord,
};
use tokio_util::sync::CancellationToken;

const TILE_A: TileCoord = TileCoord::new(7, 84, 54);
const TILE_B: TileCoord = TileCoord::new(7, 85, 54);
const TILE_C: TileCoord = TileCoord::new(7, 85, 55);

fn base_config(server: &MockTileServer, tiles: &[TileCoord]) -> CollectorConfigBuilder {
    CollectorConfig::builder()
        .tiles(tiles.iter().copied())
        .tiles_per_cycle(tiles.len())
        .cycle_interval(Duration::from_millis(200))
        .cycle_jitter(Duration::ZERO)
        .tile_pause(Duration::from_millis(10))
        .tile_jitter(Duration::ZERO)
        .cooldown(Duration::from_millis(50))
        .cooldown_jitter(Duration::ZERO)
        .fetch_timeout(Duration::from_secs(2))
        .tile_url_template(server.url_template())
}

struct Harness {
    orchestrator: CycleOrchestrator,
    sessions: Arc<HttpSessionFactory>,
    store: Arc<RecordingStore>,
    status: Arc<MemoryStatusSink>,
}

fn harness(config: CollectorConfig, store: RecordingStore) -> Result<Harness> {
    let sessions = Arc::new(HttpSessionFactory::new(config.session_options())?);
    let store = Arc::new(store);
    let status = Arc::new(MemoryStatusSink::new());
    let orchestrator = CycleOrchestrator::new(
        config,
        CollectorParts {
            sessions: sessions.clone(),
            store: store.clone(),
            refresher: Some(store.clone()),
            regions: Some(store.clone()),
            status: status.clone() as Arc<dyn StatusSink>,
        },
    )?
    .with_jitter(JitterSource::seeded(7));

    Ok(Harness {
        orchestrator,
        sessions,
        store,
        status,
    })
}

async fn single_cycle(harness: &mut Harness) -> Result<CycleStats> {
    let outcome = harness
        .orchestrator
        .run_cycle(&CancellationToken::new())
        .await?;
    match outcome {
        CycleOutcome::Completed(stats) => Ok(stats),
        CycleOutcome::Cancelled => bail!("cycle was cancelled unexpectedly"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn healthy_cycle_normalizes_and_persists_every_tile() -> Result<()> {
    init_tracing();
    let tiles = MockTiles::new();
    tiles.set(
        TILE_A,
        TileResponse::Rows(vec![tanker_row(311_000_101, 25.2, 55.3), cargo_row(636_000_001)]),
    );
    tiles.set(
        TILE_B,
        TileResponse::Rows(vec![tanker_row(311_000_102, 25.3, 55.4), cargo_row(636_000_002)]),
    );
    tiles.set(
        TILE_C,
        TileResponse::Rows(vec![tanker_row(311_000_103, 25.4, 55.5), cargo_row(636_000_003)]),
    );
    let server = MockTileServer::start(tiles.clone()).await?;

    let config = base_config(&server, &[TILE_A, TILE_B, TILE_C])
        .prefilter_enabled(false)
        .build()?;
    let mut harness = harness(config, RecordingStore::default())?;

    let stats = single_cycle(&mut harness).await?;
    assert_eq!(stats.tiles, 3);
    assert_eq!(stats.failed_tiles, 0);
    assert_eq!(stats.received, 6);
    assert_eq!(stats.kept, 3);
    assert_eq!(stats.attempted, 3);
    assert_eq!(stats.drops.get(DropReason::VesselClass), 3);

    let fixes = harness.store.fixes();
    assert_eq!(fixes.len(), 3);
    for fix in &fixes {
        assert!(fix.vessel_uid.starts_with("a:311000"), "uid {}", fix.vessel_uid);
        assert_eq!(fix.source, FixSource::Terrestrial);
        assert_eq!(fix.sog, Some(10.5));
        assert_eq!(fix.elapsed_minutes, Some(3));
    }

    for tile in [TILE_A, TILE_B, TILE_C] {
        assert_eq!(tiles.hits(tile), 1);
    }
    assert_eq!(harness.sessions.sessions_opened(), 1);

    let fetched = harness
        .status
        .events()
        .iter()
        .filter(|event| matches!(event, StatusEvent::TileFetched { kept: 1, .. }))
        .count();
    assert_eq!(fetched, 3);

    harness.orchestrator.shutdown().await;
    assert_eq!(harness.store.refreshes(), 1);
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refused_tiles_recycle_the_http_session() -> Result<()> {
    init_tracing();
    let tiles = MockTiles::new();
    for tile in [TILE_A, TILE_B, TILE_C] {
        tiles.set(tile, TileResponse::Status(503));
    }
    let server = MockTileServer::start(tiles.clone()).await?;

    let config = base_config(&server, &[TILE_A, TILE_B, TILE_C]).build()?;
    let mut harness = harness(config, RecordingStore::default())?;

    let stats = single_cycle(&mut harness).await?;
    assert_eq!(stats.failed_tiles, 3);
    assert_eq!(stats.kept, 0);
    assert!(harness.store.chunk_sizes().is_empty());
    assert_eq!(tiles.total_hits(), 3);
    assert_eq!(harness.sessions.sessions_opened(), 2);

    let snapshot = harness.orchestrator.telemetry().snapshot();
    assert_eq!(snapshot.tiles_failed, 3);
    assert_eq!(snapshot.ratio_recycles, 1);
    assert!(harness.status.events().iter().any(|event| matches!(
        event,
        StatusEvent::Recycle {
            failed: 3,
            total: 3,
            ..
        }
    )));

    harness.orchestrator.shutdown().await;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_and_empty_pages_count_as_failures() -> Result<()> {
    init_tracing();
    let tiles = MockTiles::new();
    tiles.set(TILE_A, TileResponse::Rows(vec![tanker_row(311_000_201, 25.2, 55.3)]));
    tiles.set(TILE_B, TileResponse::Raw("<html>blocked</html>".into()));
    tiles.set(TILE_C, TileResponse::Rows(Vec::new()));
    let server = MockTileServer::start(tiles.clone()).await?;

    let config = base_config(&server, &[TILE_A, TILE_B, TILE_C])
        .recycle_threshold(0.9)
        .build()?;
    let mut harness = harness(config, RecordingStore::default())?;

    let stats = single_cycle(&mut harness).await?;
    assert_eq!(stats.tiles, 3);
    assert_eq!(stats.failed_tiles, 2);
    assert_eq!(stats.kept, 1);
    assert_eq!(harness.sessions.sessions_opened(), 1);

    let snapshot = harness.orchestrator.telemetry().snapshot();
    assert_eq!(snapshot.cooldowns, 1);
    assert_eq!(snapshot.recycles(), 0);
    assert!(harness.status.events().iter().any(|event| matches!(
        event,
        StatusEvent::Cooldown {
            failed: 2,
            total: 3,
            ..
        }
    )));

    harness.orchestrator.shutdown().await;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stalled_tile_times_out() -> Result<()> {
    init_tracing();
    let tiles = MockTiles::new();
    tiles.set(TILE_A, TileResponse::Stall(Duration::from_secs(5)));
    let server = MockTileServer::start(tiles.clone()).await?;

    let config = base_config(&server, &[TILE_A])
        .fetch_timeout(Duration::from_millis(200))
        .build()?;
    let mut harness = harness(config, RecordingStore::default())?;

    let stats = single_cycle(&mut harness).await?;
    assert_eq!(stats.failed_tiles, 1);
    let snapshot = harness.orchestrator.telemetry().snapshot();
    assert_eq!(snapshot.fetch_timeouts, 1);
    assert_eq!(snapshot.tiles_failed, 1);

    harness.orchestrator.shutdown().await;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retries_hit_the_provider_again() -> Result<()> {
    init_tracing();
    let tiles = MockTiles::new();
    tiles.set(TILE_A, TileResponse::Status(500));
    let server = MockTileServer::start(tiles.clone()).await?;

    let config = base_config(&server, &[TILE_A])
        .max_retries(1)
        .backoff_base(Duration::from_millis(20))
        .build()?;
    let mut harness = harness(config, RecordingStore::default())?;

    let stats = single_cycle(&mut harness).await?;
    assert_eq!(stats.failed_tiles, 1);
    assert_eq!(tiles.hits(TILE_A), 2);
    assert!(harness.status.events().iter().any(|event| matches!(
        event,
        StatusEvent::BackoffExhausted { attempts: 2, .. }
    )));

    harness.orchestrator.shutdown().await;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn large_tiles_are_persisted_in_bounded_chunks() -> Result<()> {
    init_tracing();
    let tiles = MockTiles::new();
    let rows = (0..5)
        .map(|idx| tanker_row(311_000_300 + idx, 25.0 + f64::from(idx) * 0.01, 55.0))
        .collect();
    tiles.set(TILE_A, TileResponse::Rows(rows));
    let server = MockTileServer::start(tiles.clone()).await?;

    let config = base_config(&server, &[TILE_A])
        .insert_batch_size(2)
        .build()?;
    let mut harness = harness(config, RecordingStore::default())?;

    let stats = single_cycle(&mut harness).await?;
    assert_eq!(stats.kept, 5);
    assert_eq!(stats.attempted, 5);
    assert_eq!(harness.store.chunk_sizes(), vec![2, 2, 1]);

    let uids: Vec<String> = harness
        .store
        .fixes()
        .into_iter()
        .map(|fix| fix.vessel_uid)
        .collect();
    let mut sorted = uids.clone();
    sorted.sort();
    assert_eq!(uids, sorted);

    harness.orchestrator.shutdown().await;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn prefilter_drops_positions_far_from_regions() -> Result<()> {
    init_tracing();
    let tiles = MockTiles::new();
    tiles.set(
        TILE_A,
        TileResponse::Rows(vec![
            tanker_row(311_000_401, 25.2, 55.3),
            tanker_row(311_000_402, 10.0, 10.0),
        ]),
    );
    let server = MockTileServer::start(tiles.clone()).await?;

    let config = base_config(&server, &[TILE_A]).build()?;
    let store = RecordingStore::with_regions(vec![BBox::new(55.0, 25.0, 55.5, 25.5)]);
    let mut harness = harness(config, store)?;

    assert_eq!(harness.orchestrator.reload_prefilter().await, 1);
    let stats = single_cycle(&mut harness).await?;
    assert_eq!(stats.kept, 1);
    assert_eq!(stats.drops.get(DropReason::OutsideRegions), 1);
    assert_eq!(harness.store.fixes()[0].vessel_uid, "a:311000401");

    harness.orchestrator.shutdown().await;
    server.shutdown().await;
    Ok(())
}
