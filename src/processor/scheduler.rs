use crate::upstream::TileCoord;
use anyhow::{bail, Result};

/// Cyclic cursor over the fixed tile set. Membership of each batch is fully
/// determined by the cursor; callers shuffle the order.
#[derive(Debug, Clone)]
pub struct TileCycleScheduler {
    tiles: Vec<TileCoord>,
    cursor: usize,
}

impl TileCycleScheduler {
    pub fn new(tiles: Vec<TileCoord>) -> Result<Self> {
        if tiles.is_empty() {
            bail!("tile set cannot be empty");
        }
        Ok(Self { tiles, cursor: 0 })
    }

    pub fn total_tiles(&self) -> usize {
        self.tiles.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Returns the next `n` tiles, wrapping around the set as needed. A batch
    /// larger than the set repeats tiles.
    pub fn next_batch(&mut self, n: usize) -> Vec<TileCoord> {
        let mut batch = Vec::with_capacity(n);
        for _ in 0..n {
            batch.push(self.tiles[self.cursor]);
            self.cursor = (self.cursor + 1) % self.tiles.len();
        }
        batch
    }
}
