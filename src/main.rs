use anyhow::{Context, Result};
use std::sync::Arc;
use tanker_collector::runtime::env::DATABASE_URL_VAR;
use tanker_collector::{
    config_from_env, init_tracing, CollectorParts, HttpSessionFactory, PgFixStore, Runner,
    TracingStatusSink,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = config_from_env()?;
    let database_url = config
        .database_url()
        .with_context(|| format!("{DATABASE_URL_VAR} (or DATABASE_URL) is required"))?
        .to_owned();

    let store = Arc::new(PgFixStore::connect(&database_url).await?);
    let sessions = Arc::new(HttpSessionFactory::new(config.session_options())?);

    tracing::info!(
        tiles = config.tiles().len(),
        tiles_per_cycle = config.tiles_per_cycle(),
        interval_secs = config.cycle_interval().as_secs(),
        "starting tanker collector"
    );

    let parts = CollectorParts {
        sessions,
        store: store.clone(),
        refresher: Some(store.clone()),
        regions: Some(store.clone()),
        status: Arc::new(TracingStatusSink),
    };
    let mut runner = Runner::new(config, parts)?;

    let run_result = runner.run_until_ctrl_c().await;
    let snapshot = runner.telemetry().snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        tiles_fetched = snapshot.tiles_fetched,
        tiles_failed = snapshot.tiles_failed,
        fixes_kept = snapshot.fixes_kept,
        recycles = snapshot.recycles(),
        "collector stopped"
    );

    store.close().await;
    run_result
}
