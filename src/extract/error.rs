//! Error types for extraction
//!
//! None of these escape [`Extractor::extract`](super::Extractor::extract):
//! source errors degrade to an empty record set and checkpoint errors are
//! logged. They exist so readers and stores can be tested directly.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while persisting the checkpoint
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// IO error with path context
    #[error("Cannot write checkpoint {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Cannot encode checkpoint: {0}")]
    Encode(#[from] serde_json::Error),

    /// Store refused the write (used by in-memory stores)
    #[error("Checkpoint store rejected write: {0}")]
    Rejected(String),
}

impl CheckpointError {
    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            CheckpointError::Io { path, .. } => format!(
                "Cannot write checkpoint file: {}\n\nHint: The next run will re-extract data already processed. Check permissions on the state file directory.",
                path.display()
            ),
            _ => self.to_string(),
        }
    }
}

/// Errors that can occur while reading a source
#[derive(Error, Debug)]
pub enum SourceError {
    /// Source path does not exist
    #[error("Source not found: {0}")]
    NotFound(PathBuf),

    /// Could not connect to the store
    #[error("Connection failed ({backend}): {message}")]
    Connection { backend: String, message: String },

    /// Query execution failed
    #[error("Query failed ({backend}): {message}")]
    Query { backend: String, message: String },

    /// File content could not be parsed
    #[error("Cannot parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The configured backend was not compiled into this build
    #[error("Backend '{0}' is not available in this build")]
    BackendNotCompiled(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited file error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl SourceError {
    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            SourceError::NotFound(path) => format!(
                "Source not found: {}\n\nHint: The source is treated as unavailable for this run.",
                path.display()
            ),
            SourceError::Connection { backend, message } => format!(
                "Cannot connect to {backend}: {message}\n\nHint: Check host, port, user and the password environment variable."
            ),
            SourceError::BackendNotCompiled(backend) => format!(
                "Backend '{backend}' is not available.\n\nHint: Rebuild with the '{backend}-backend' feature."
            ),
            _ => self.to_string(),
        }
    }
}

#[cfg(feature = "duckdb-backend")]
impl From<duckdb::Error> for SourceError {
    fn from(err: duckdb::Error) -> Self {
        SourceError::Query {
            backend: "duckdb".to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_display() {
        let err = SourceError::Connection {
            backend: "postgres".to_string(),
            message: "refused".to_string(),
        };
        assert!(err.to_string().contains("postgres"));
        assert!(err.user_message().contains("Hint:"));

        let err = SourceError::NotFound(PathBuf::from("/data/moves.csv"));
        assert!(err.user_message().contains("/data/moves.csv"));
    }

    #[test]
    fn test_checkpoint_error_user_message() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = CheckpointError::Io {
            path: PathBuf::from("/state/etl.json"),
            source: io,
        };
        assert!(err.to_string().contains("/state/etl.json"));
        assert!(err.user_message().contains("re-extract"));
    }
}
