//! Runtime glue that wires configuration, environment loading, status
//! reporting, telemetry, and the signal-aware runner.

pub mod config;
pub mod env;
pub mod runner;
pub mod status;
pub mod telemetry;
