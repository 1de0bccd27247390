use crate::processor::orchestrator::{CollectorParts, CycleOrchestrator};
use crate::runtime::config::CollectorConfig;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Drives the collector loop and handles OS signals for graceful shutdowns.
pub struct Runner {
    orchestrator: CycleOrchestrator,
    shutdown: CancellationToken,
}

impl Runner {
    /// Builds the orchestrator and wires a root [`CancellationToken`] that is
    /// handed to the collector loop and the metrics reporter.
    pub fn new(config: CollectorConfig, parts: CollectorParts) -> Result<Self> {
        Ok(Self::from_orchestrator(CycleOrchestrator::new(config, parts)?))
    }

    pub fn from_orchestrator(orchestrator: CycleOrchestrator) -> Self {
        Self {
            orchestrator,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.orchestrator.telemetry()
    }

    /// Runs the collector until the shutdown token is cancelled or the loop
    /// fails. The metrics reporter lives exactly as long as the loop.
    pub async fn run(&mut self) -> Result<()> {
        let token = self.shutdown.clone();
        let reporter = spawn_metrics_reporter(
            self.orchestrator.telemetry(),
            token.child_token(),
            self.orchestrator.config().metrics_interval(),
        );

        let result = self.orchestrator.run(token.clone()).await;
        self.finish(reporter).await;
        result
    }

    /// Runs until a Ctrl-C (SIGINT) is received, the shutdown token is cancelled
    /// elsewhere, or the loop fails.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        let token = self.shutdown.clone();
        let reporter = spawn_metrics_reporter(
            self.orchestrator.telemetry(),
            token.child_token(),
            self.orchestrator.config().metrics_interval(),
        );
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        let result = {
            let run = self.orchestrator.run(token.clone());
            tokio::pin!(run);

            tokio::select! {
                result = &mut run => result,
                _ = signal::ctrl_c() => {
                    tracing::info!("Ctrl-C received; shutting down runner");
                    token.cancel();
                    run.await
                }
            }
        };

        self.finish(reporter).await;
        result
    }

    async fn finish(&mut self, reporter: tokio::task::JoinHandle<()>) {
        self.shutdown.cancel();
        if let Err(err) = reporter.await {
            tracing::warn!(error = %err, "metrics reporter task failed");
        }
        self.shutdown = CancellationToken::new();
        tracing::info!("runner stopped");
    }
}
