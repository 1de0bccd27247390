//! Tile payload decoding and failure classification.
//!
//! A tile fetch only counts as a success when the body decodes to an object
//! carrying a non-empty `data.rows` list. Empty-but-valid responses are
//! indistinguishable from soft blocks upstream, so they are failures too.

use crate::preprocessors::row::RawRow;
use serde_json::Value;
use std::fmt;

/// Why a tile fetch did not yield rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    Transport(String),
    Timeout,
    Status(u16),
    Malformed(String),
    MissingRows,
    EmptyRows,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Transport(reason) => write!(f, "tile transport failed: {reason}"),
            FetchFailure::Timeout => write!(f, "tile fetch timed out"),
            FetchFailure::Status(code) => write!(f, "tile endpoint returned HTTP {code}"),
            FetchFailure::Malformed(reason) => write!(f, "tile payload is malformed: {reason}"),
            FetchFailure::MissingRows => write!(f, "tile payload has no data.rows list"),
            FetchFailure::EmptyRows => write!(f, "tile payload has an empty data.rows list"),
        }
    }
}

impl std::error::Error for FetchFailure {}

/// Decoded rows of a successful tile fetch. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct TilePayload {
    rows: Vec<RawRow>,
}

impl TilePayload {
    /// Wraps already decoded rows, applying the same non-empty rule as
    /// [`decode_tile_payload`].
    pub fn from_rows(rows: Vec<RawRow>) -> Result<Self, FetchFailure> {
        if rows.is_empty() {
            return Err(FetchFailure::EmptyRows);
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[RawRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<RawRow> {
        self.rows
    }
}

pub fn decode_tile_payload(body: &str) -> Result<TilePayload, FetchFailure> {
    let body = body.trim();
    if body.is_empty() {
        return Err(FetchFailure::Malformed("empty body".into()));
    }

    let document: Value =
        serde_json::from_str(body).map_err(|err| FetchFailure::Malformed(err.to_string()))?;
    let rows = document
        .get("data")
        .and_then(|data| data.get("rows"))
        .and_then(Value::as_array)
        .ok_or(FetchFailure::MissingRows)?;

    let rows: Vec<RawRow> = rows
        .iter()
        .cloned()
        .filter_map(RawRow::from_value)
        .collect();
    TilePayload::from_rows(rows)
}
