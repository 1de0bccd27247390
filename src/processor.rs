//! Collector orchestration covering pacing, retry backoff, tile scheduling,
//! session lifecycle, and failure-ratio health handling.

pub mod backoff;
pub mod health;
pub mod lifecycle;
pub mod orchestrator;
pub mod pacing;
pub mod scheduler;
