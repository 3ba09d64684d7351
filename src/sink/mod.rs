//! Metric table output
//!
//! Engines produce [`MetricTable`]s; a [`TableSink`] persists one table to
//! one file. Empty tables are never written.

mod csv;
mod error;
#[cfg(feature = "parquet-sink")]
mod parquet;
mod table;

use std::path::PathBuf;

use tracing::warn;

pub use self::csv::{CsvSink, read_csv, write_csv};
pub use error::SinkError;
#[cfg(feature = "parquet-sink")]
pub use self::parquet::{ParquetSink, table_schema, to_record_batch};
pub use table::{Cell, Column, ColumnType, MetricTable, TableRow};

use crate::config::OutputConfig;

/// Persists a metric table
pub trait TableSink: Send + Sync {
    /// Short format name for logs and reports
    fn format(&self) -> &'static str;

    /// Write the table, returning the file written
    fn write(&self, table: &MetricTable) -> Result<PathBuf, SinkError>;
}

/// Sinks enabled by the output configuration
pub fn sinks_from_config(output: &OutputConfig) -> Vec<Box<dyn TableSink>> {
    let mut sinks: Vec<Box<dyn TableSink>> = Vec::new();

    if output.parquet {
        #[cfg(feature = "parquet-sink")]
        sinks.push(Box::new(ParquetSink::new(output.out_dir.clone())));
        #[cfg(not(feature = "parquet-sink"))]
        warn!("Parquet output requested but the parquet-sink feature is disabled");
    }

    if output.csv {
        sinks.push(Box::new(CsvSink::new(output.out_dir.clone())));
    }

    if sinks.is_empty() {
        warn!("No output format enabled; metric tables will not be written");
    }
    sinks
}
