//! Core types, pipeline, and query service for the EcoMonitor pollution aggregator.

/// Run settings and index table loading.
pub mod config;
/// HTML and JSON table extraction shared by source adapters.
pub mod extract;
/// Composite index calculation.
pub mod index;
/// Domain models shared by all sources.
pub mod model;
/// Raw row to candidate normalization.
pub mod normalize;
/// Aggregation run orchestration.
pub mod orchestrator;
/// Registry and helpers for plugging sources into a run.
pub mod plugin;
/// Traits describing the source interface.
pub mod ports;
/// High-level read facade used by clients.
pub mod service;
/// Atomically swapped, persisted snapshot holder.
pub mod snapshot;

pub use config::*;
pub use extract::*;
pub use index::*;
pub use model::*;
pub use normalize::*;
pub use orchestrator::*;
pub use plugin::*;
pub use ports::*;
pub use service::*;
pub use snapshot::*;
