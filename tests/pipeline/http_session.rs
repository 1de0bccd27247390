use crate::support::{
    helpers::{init_tracing, tanker_row},
    mock_tiles::{MockTileServer, MockTiles, TileResponse},
};
use anyhow::Result;
use serde_json::json;
use tanker_collector::{
    FetchFailure, HttpSessionFactory, HttpSessionOptions, SessionFactory, TileCoord, TilePayload,
};

const SMALL: TileCoord = TileCoord::new(7, 84, 54);
const DECLARED: TileCoord = TileCoord::new(7, 85, 54);
const STREAMED: TileCoord = TileCoord::new(7, 85, 55);

fn oversized_page() -> String {
    let rows: Vec<_> = (0..40)
        .map(|idx| tanker_row(311_000_600 + idx, 25.2, 55.3))
        .collect();
    json!({ "type": 1, "data": { "rows": rows } }).to_string()
}

fn assert_oversized(outcome: Result<TilePayload, FetchFailure>) {
    match outcome {
        Err(FetchFailure::Malformed(reason)) => {
            assert!(reason.contains("exceeds limit of 1024"), "reason: {reason}")
        }
        other => panic!("expected an oversized body failure, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn body_limit_applies_to_declared_and_streamed_bodies() -> Result<()> {
    init_tracing();
    let tiles = MockTiles::new();
    tiles.set(SMALL, TileResponse::Rows(vec![tanker_row(311_000_599, 25.2, 55.3)]));
    tiles.set(DECLARED, TileResponse::Raw(oversized_page()));
    tiles.set(STREAMED, TileResponse::Chunked(oversized_page()));
    let server = MockTileServer::start(tiles.clone()).await?;

    let factory = HttpSessionFactory::new(HttpSessionOptions {
        url_template: server.url_template(),
        max_body_bytes: 1024,
        ..HttpSessionOptions::default()
    })?;
    let session = factory.open().await?;

    let payload = session.fetch(SMALL).await?;
    assert_eq!(payload.len(), 1);

    assert_oversized(session.fetch(DECLARED).await);
    assert_oversized(session.fetch(STREAMED).await);

    session.close().await;
    server.shutdown().await;
    Ok(())
}
