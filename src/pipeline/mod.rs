//! End-to-end incremental run
//!
//! One run performs, in order:
//! - Load the checkpoint and read new rows from each enabled source
//! - Normalize rows into canonical inventory and movement records
//! - Advance and persist the watermarks
//! - Compute the four metric tables concurrently
//! - Write every non-empty table with each configured sink
//!
//! # Example
//!
//! ```rust,ignore
//! use inventory_analytics::config::EtlConfig;
//! use inventory_analytics::pipeline::PipelineExecutor;
//!
//! let config = EtlConfig::from_file("etl.yaml".as_ref())?
//!     .with_out_dir("/data/metrics");
//!
//! let executor = PipelineExecutor::new(config)?;
//! let report = executor.run()?;
//!
//! println!("Pipeline completed in {}", report.duration_formatted());
//! ```
//!
//! # Dry Run
//!
//! Validate configuration and source availability without reading data,
//! touching the checkpoint or writing output:
//!
//! ```rust,ignore
//! let report = PipelineExecutor::new(config)?.with_dry_run(true).run()?;
//! ```
//!
//! Running twice with no new source rows writes nothing the second time:
//! every table is empty and empty tables are skipped.

mod error;
mod executor;

pub use error::{PipelineError, PipelineResult};
pub use executor::{MetricTables, PipelineExecutor, PipelineReport, RunStatus, TableReport};

use crate::config::EtlConfig;

/// Run a pipeline with the given configuration
///
/// This is a convenience function for simple pipeline execution.
pub fn run_pipeline(config: EtlConfig) -> PipelineResult<PipelineReport> {
    PipelineExecutor::new(config)?.run()
}
