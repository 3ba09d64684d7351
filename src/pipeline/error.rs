//! Error types for pipeline operations
//!
//! Only configuration problems stop a run. Source, checkpoint and sink
//! failures are logged and reported in the
//! [`PipelineReport`](super::PipelineReport) instead.

use thiserror::Error;

use crate::config::ConfigError;
use crate::extract::CheckpointError;
use crate::sink::SinkError;

/// Errors that can occur during pipeline execution
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Dry-run validation found problems
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Checkpoint could not be written (checkpoint maintenance commands)
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// A metric table could not be written
    #[error("Writing {table} as {format} failed: {source}")]
    Sink {
        table: String,
        format: String,
        #[source]
        source: SinkError,
    },
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Create a sink error with table context
    pub fn sink(table: impl Into<String>, format: impl Into<String>, source: SinkError) -> Self {
        Self::Sink {
            table: table.into(),
            format: format.into(),
            source,
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Config(err) => err.user_message(),
            PipelineError::Validation(msg) => {
                format!("Validation failed:\n  {msg}\n\nHint: Fix the listed problems or run without --dry-run to let unavailable sources be skipped.")
            }
            PipelineError::Checkpoint(err) => err.user_message(),
            PipelineError::Sink { table, .. } => format!(
                "{self}\n\nHint: Check that output.out_dir is writable; table '{table}' will be recomputed on the next run."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_display() {
        let err = PipelineError::Config(ConfigError::Invalid("bad rate".to_string()));
        assert!(err.to_string().contains("bad rate"));

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = PipelineError::sink(
            "inventory_summary",
            "csv",
            SinkError::Io {
                path: PathBuf::from("/out/inventory_summary.csv"),
                source: io,
            },
        );
        assert!(err.to_string().contains("inventory_summary"));
    }

    #[test]
    fn test_user_message() {
        let err = PipelineError::Validation("file source missing".to_string());
        let msg = err.user_message();
        assert!(msg.contains("file source missing"));
        assert!(msg.contains("Hint:"));

        let err = PipelineError::Config(ConfigError::Invalid("x".to_string()));
        assert!(err.user_message().contains("Hint:"));
    }
}
