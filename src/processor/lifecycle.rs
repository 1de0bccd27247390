//! Scoped ownership of the fetch session.

use crate::upstream::{FetchSession, SessionFactory};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Holds at most one live session. Opening is lazy; `release` tears the
/// session down explicitly and is safe to call when nothing is open.
pub struct SessionLifecycle {
    factory: Arc<dyn SessionFactory>,
    session: Option<Box<dyn FetchSession>>,
    cycles_on_session: u32,
    generation: u64,
}

impl SessionLifecycle {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            session: None,
            cycles_on_session: 0,
            generation: 0,
        }
    }

    /// Returns the live session, opening a fresh one if needed.
    pub async fn acquire(&mut self) -> Result<&dyn FetchSession> {
        let session = match self.session.take() {
            Some(session) => session,
            None => {
                let session = self
                    .factory
                    .open()
                    .await
                    .context("failed to open fetch session")?;
                self.generation += 1;
                self.cycles_on_session = 0;
                tracing::info!(generation = self.generation, "fetch session opened");
                session
            }
        };
        Ok(&**self.session.insert(session))
    }

    pub async fn release(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
            tracing::info!(
                generation = self.generation,
                cycles = self.cycles_on_session,
                "fetch session released"
            );
        }
        self.cycles_on_session = 0;
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn record_cycle(&mut self) {
        self.cycles_on_session = self.cycles_on_session.saturating_add(1);
    }

    pub fn cycles_on_session(&self) -> u32 {
        self.cycles_on_session
    }

    /// Number of sessions opened so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for SessionLifecycle {
    fn drop(&mut self) {
        if self.session.is_some() {
            tracing::warn!(
                generation = self.generation,
                "fetch session dropped without explicit release"
            );
        }
    }
}
