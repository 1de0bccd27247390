use super::payload::{FetchFailure, TilePayload};
use super::tile::TileCoord;
use anyhow::Result;
use futures::future::BoxFuture;

/// One live connection context to the tile provider (cookies, connection
/// pool, browser profile, ...). Sessions degrade over time and are recycled
/// by the health policy.
pub trait FetchSession: Send + Sync {
    fn fetch(&self, tile: TileCoord) -> BoxFuture<'_, Result<TilePayload, FetchFailure>>;

    /// Tears the session down. Called exactly once on every exit path.
    fn close(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// Creates fresh sessions on startup and on every recycle.
pub trait SessionFactory: Send + Sync {
    fn open(&self) -> BoxFuture<'_, Result<Box<dyn FetchSession>>>;
}
