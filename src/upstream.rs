//! Tile provider plumbing: coordinates, payload decoding, and fetch sessions.

pub mod http;
pub mod options;
pub mod payload;
pub mod session;
pub mod tile;

pub use http::{HttpFetchSession, HttpSessionFactory};
pub use options::HttpSessionOptions;
pub use payload::{decode_tile_payload, FetchFailure, TilePayload};
pub use session::{FetchSession, SessionFactory};
pub use tile::{parse_tile_list, TileCoord, TileParseError};
