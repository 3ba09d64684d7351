//! CLI error types

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::extract::CheckpointError;
use crate::pipeline::PipelineError;

/// Errors surfaced by CLI commands
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("Logging setup failed: {0:#}")]
    Logging(#[from] anyhow::Error),

    #[error("Pipeline finished with errors")]
    RunFailed,
}

impl CliError {
    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            CliError::InvalidArgument(msg) => format!("Invalid argument: {msg}"),
            CliError::ConfigNotFound(path) => format!(
                "Configuration file not found: {}\n\nHint: Pass an existing YAML file with --config.",
                path.display()
            ),
            CliError::Config(err) => err.user_message(),
            CliError::Pipeline(err) => err.user_message(),
            CliError::Checkpoint(err) => err.user_message(),
            CliError::Logging(err) => format!(
                "Logging setup failed: {err:#}\n\nHint: Use one of trace, debug, info, warn, error."
            ),
            CliError::RunFailed => {
                "Pipeline finished with errors\n\nHint: See the warnings above; rerun once output is writable.".to_string()
            }
        }
    }

    /// Process exit code
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidArgument(_) | CliError::Logging(_) => 2,
            _ => 1,
        }
    }
}
