pub mod preprocessors;
pub mod processor;
pub mod runtime;
pub mod store;
pub mod upstream;

pub use preprocessors::batch::{FixChunker, MAX_FIXES_PER_STATEMENT};
pub use preprocessors::fix::{CanonicalFix, FixSource};
pub use preprocessors::identity::{VesselIdentity, VesselIdentityResolver};
pub use preprocessors::normalizer::{
    DropCounts, DropReason, NormalizedBatch, NormalizerSettings, RowNormalizer,
};
pub use preprocessors::prefilter::{BBox, SpatialPrefilter};
pub use preprocessors::row::RawRow;
pub use processor::orchestrator::{CollectorParts, CycleOrchestrator, CycleOutcome, CycleStats};
pub use processor::pacing::JitterSource;
pub use runtime::config::{CollectorConfig, CollectorConfigBuilder, CollectorConfigParams};
pub use runtime::env::{config_from_env, config_from_lookup};
pub use runtime::runner::Runner;
pub use runtime::status::{
    CycleSummary, MemoryStatusSink, NullStatusSink, StatusEvent, StatusSink, TracingStatusSink,
};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use store::{AggregateRefresher, FixStore, PgFixStore, RegionSource};
pub use upstream::{
    FetchFailure, FetchSession, HttpSessionFactory, HttpSessionOptions, SessionFactory, TileCoord,
    TilePayload,
};
