//! Row decoding, filtering, identity resolution, and insert chunking applied
//! to every tile payload before persistence.

pub mod batch;
pub mod fix;
pub mod identity;
pub mod normalizer;
pub mod prefilter;
pub mod row;
