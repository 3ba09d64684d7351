//! Inventory Analytics - incremental inventory and movement metrics
//!
//! Provides:
//! - Watermark-based incremental extraction from a queryable store and a flat file
//! - Normalization into canonical inventory and movement records
//! - Inventory, movement, warehouse and financial metric engines
//! - CSV and Parquet table output
//! - An orchestrator tying one run together

pub mod config;
pub mod extract;
pub mod pipeline;
pub mod records;
pub mod sink;
pub mod transform;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export commonly used types
pub use config::{ConfigError, EtlConfig};
pub use extract::{
    Checkpoint, CheckpointError, CheckpointStore, Extractor, FileCheckpointStore, SourceError,
};
pub use pipeline::{PipelineError, PipelineExecutor, PipelineReport, PipelineResult, run_pipeline};
pub use records::{CanonicalRecords, InventoryRecord, MovementRecord};
pub use sink::{MetricTable, SinkError, TableSink};
pub use transform::{EngineSet, MetricEngine};
