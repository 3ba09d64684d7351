//! Error types for metric table sinks

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while writing a metric table
#[derive(Error, Debug)]
pub enum SinkError {
    /// IO error with path context
    #[error("Cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Delimited writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Columnar encoding error
    #[error("Parquet error: {message}")]
    Parquet { message: String },
}

impl SinkError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SinkError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(feature = "parquet-sink")]
impl From<parquet::errors::ParquetError> for SinkError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        SinkError::Parquet {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "parquet-sink")]
impl From<arrow::error::ArrowError> for SinkError {
    fn from(err: arrow::error::ArrowError) -> Self {
        SinkError::Parquet {
            message: format!("arrow: {err}"),
        }
    }
}
