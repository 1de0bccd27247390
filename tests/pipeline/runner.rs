use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, tanker_row, wait_for_fixes, RecordingStore},
    mock_tiles::{MockTileServer, MockTiles, TileResponse},
};
use anyhow::{Context, Result};
use tanker_collector::{
    config_from_lookup, CollectorParts, HttpSessionFactory, NullStatusSink, Runner, TileCoord,
};
use tokio::time::timeout;

const TILES: [TileCoord; 2] = [TileCoord::new(7, 84, 54), TileCoord::new(7, 85, 54)];

fn serve_tankers(tiles: &MockTiles) {
    for (idx, tile) in TILES.iter().enumerate() {
        let mmsi = 311_000_500 + idx as u32;
        tiles.set(*tile, TileResponse::Rows(vec![tanker_row(mmsi, 25.2, 55.3)]));
    }
}

fn runner_from_env(server: &MockTileServer, store: Arc<RecordingStore>) -> Result<Runner> {
    let template = server.url_template();
    let config = config_from_lookup(|key| {
        let value = match key {
            "COLLECTOR_TILES" => "7/84/54;7/85/54",
            "COLLECTOR_INTERVAL_SECS" => "1",
            "COLLECTOR_CYCLE_JITTER_SECS" => "0",
            "COLLECTOR_TILE_PAUSE_MS" => "10",
            "COLLECTOR_TILE_JITTER_MS" => "0",
            "COLLECTOR_PREFILTER" => "false",
            "COLLECTOR_TILE_URL_TEMPLATE" => template.as_str(),
            _ => return None,
        };
        Some(value.to_owned())
    })?;

    let sessions = Arc::new(HttpSessionFactory::new(config.session_options())?);
    Runner::new(
        config,
        CollectorParts {
            sessions,
            store: store.clone(),
            refresher: Some(store),
            regions: None,
            status: Arc::new(NullStatusSink),
        },
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runner_collects_until_cancelled() -> Result<()> {
    init_tracing();
    let tiles = MockTiles::new();
    serve_tankers(&tiles);
    let server = MockTileServer::start(tiles.clone()).await?;
    let store = Arc::new(RecordingStore::default());

    let mut runner = runner_from_env(&server, store.clone())?;
    let token = runner.cancellation_token();
    let handle = tokio::spawn(async move {
        let result = runner.run().await;
        (runner, result)
    });

    wait_for_fixes(&store, 2, Duration::from_secs(5)).await?;
    token.cancel();

    let (runner, result) = timeout(Duration::from_secs(5), handle)
        .await
        .context("runner did not stop after cancellation")??;
    result?;

    let snapshot = runner.telemetry().snapshot();
    assert!(snapshot.cycles >= 1);
    assert!(snapshot.fixes_kept >= 2);
    assert_eq!(snapshot.tiles_failed, 0);
    assert!(tiles.total_hits() >= 2);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runner_surfaces_store_failures() -> Result<()> {
    init_tracing();
    let tiles = MockTiles::new();
    serve_tankers(&tiles);
    let server = MockTileServer::start(tiles.clone()).await?;
    let store = Arc::new(RecordingStore::failing());

    let mut runner = runner_from_env(&server, store.clone())?;
    let err = timeout(Duration::from_secs(5), runner.run())
        .await
        .context("runner did not stop after a store failure")?
        .expect_err("store failure should stop the runner");

    let message = format!("{err:#}");
    assert!(
        message.contains("recording store is read-only"),
        "unexpected error: {message}"
    );
    assert_eq!(tiles.total_hits(), 1);
    assert!(!runner.cancellation_token().is_cancelled());

    server.shutdown().await;
    Ok(())
}
