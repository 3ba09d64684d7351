//! CLI command implementations

pub mod checkpoint;
pub mod run;

use std::path::Path;

use super::error::CliError;
use crate::config::EtlConfig;

/// Load and validate the configuration named on the command line
pub fn load_config(path: &Path) -> Result<EtlConfig, CliError> {
    if !path.exists() {
        return Err(CliError::ConfigNotFound(path.to_path_buf()));
    }
    let config = EtlConfig::from_file(path)?;
    config.validate()?;
    Ok(config)
}
