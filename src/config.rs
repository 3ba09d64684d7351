//! Pipeline configuration
//!
//! Loaded from YAML. Every field carries a serde default so that partial
//! files work; only a missing or unparsable file is fatal.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest accepted cold-start window (about a century)
pub const MAX_LOOKBACK_DAYS: i64 = 36_500;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Cannot read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid YAML for this schema
    #[error("Invalid configuration syntax: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Configuration parsed but is semantically invalid
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::Io { path, .. } => format!(
                "Cannot read configuration file: {}\n\nHint: Pass an existing file with --config.",
                path.display()
            ),
            ConfigError::Parse(err) => format!(
                "Configuration is not valid YAML: {err}\n\nHint: Compare against the documented keys (sources, incremental, output)."
            ),
            ConfigError::Invalid(msg) => {
                format!("Invalid configuration: {msg}\n\nHint: Check your configuration file.")
            }
        }
    }
}

/// Top-level ETL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub sources: SourcesConfig,
    pub incremental: IncrementalConfig,
    /// Days without movement after which stock counts as dead
    pub dead_stock_days: i64,
    /// Annual holding cost as a fraction of inventory value
    pub holding_cost_rate: f64,
    /// Capacity applied to sites without an explicit entry
    pub default_capacity: f64,
    /// Per-site capacity overrides
    pub site_capacities: BTreeMap<String, f64>,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            sources: SourcesConfig::default(),
            incremental: IncrementalConfig::default(),
            dead_stock_days: 180,
            holding_cost_rate: 0.20,
            default_capacity: 100_000.0,
            site_capacities: BTreeMap::new(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EtlConfig {
    /// Create a config with all defaults (both sources disabled)
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Enable the flat-file movement source
    pub fn with_file_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.file.enabled = true;
        self.sources.file.path = Some(path.into());
        self
    }

    /// Enable the queryable inventory source against the given table
    pub fn with_queryable_source(mut self, table: impl Into<String>) -> Self {
        self.sources.queryable.enabled = true;
        self.sources.queryable.incremental_table = Some(table.into());
        self
    }

    /// Set the checkpoint state file
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.incremental.state_file = path.into();
        self
    }

    /// Set the output directory
    pub fn with_out_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output.out_dir = path.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.holding_cost_rate.is_finite() || self.holding_cost_rate < 0.0 {
            return Err(ConfigError::Invalid(
                "holding_cost_rate must be a non-negative number".to_string(),
            ));
        }

        if !self.default_capacity.is_finite() || self.default_capacity <= 0.0 {
            return Err(ConfigError::Invalid(
                "default_capacity must be positive".to_string(),
            ));
        }

        for (site, capacity) in &self.site_capacities {
            if !capacity.is_finite() || *capacity <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "capacity for site '{site}' must be positive"
                )));
            }
        }

        if self.dead_stock_days < 0 {
            return Err(ConfigError::Invalid(
                "dead_stock_days must not be negative".to_string(),
            ));
        }

        if !(0..=MAX_LOOKBACK_DAYS).contains(&self.incremental.default_lookback_days) {
            return Err(ConfigError::Invalid(format!(
                "incremental.default_lookback_days must be between 0 and {MAX_LOOKBACK_DAYS}"
            )));
        }

        let queryable = &self.sources.queryable;
        if queryable.enabled {
            let table = queryable.incremental_table.as_deref().ok_or_else(|| {
                ConfigError::Invalid(
                    "sources.queryable.incremental_table is required when the source is enabled"
                        .to_string(),
                )
            })?;
            ensure_identifier("sources.queryable.incremental_table", table)?;
            ensure_identifier(
                "sources.queryable.incremental_column",
                &queryable.incremental_column,
            )?;
            if queryable.backend == QueryBackendKind::Duckdb && queryable.path.is_none() {
                return Err(ConfigError::Invalid(
                    "sources.queryable.path is required for the duckdb backend".to_string(),
                ));
            }
        }

        let file = &self.sources.file;
        if file.enabled && file.path.is_none() {
            return Err(ConfigError::Invalid(
                "sources.file.path is required when the source is enabled".to_string(),
            ));
        }

        Ok(())
    }
}

/// Only plain (optionally schema-qualified) identifiers are interpolated into SQL.
fn ensure_identifier(key: &str, value: &str) -> Result<(), ConfigError> {
    let mut chars = value.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{key} must be a plain SQL identifier, got '{value}'"
        )))
    }
}

/// Both record sources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Inventory positions from a queryable store
    #[serde(alias = "postgres")]
    pub queryable: QueryableSourceConfig,
    /// Stock movements from a flat file
    #[serde(alias = "csv")]
    pub file: FileSourceConfig,
}

/// Queryable store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryBackendKind {
    #[default]
    Postgres,
    Duckdb,
}

impl std::fmt::Display for QueryBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::Duckdb => write!(f, "duckdb"),
        }
    }
}

/// Queryable (database) source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryableSourceConfig {
    pub enabled: bool,
    pub backend: QueryBackendKind,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub database: String,
    /// Name of the environment variable holding the password
    pub password_env: Option<String>,
    /// Database file for embedded backends
    pub path: Option<PathBuf>,
    pub incremental_table: Option<String>,
    pub incremental_column: String,
}

impl Default for QueryableSourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: QueryBackendKind::default(),
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            database: "postgres".to_string(),
            password_env: None,
            path: None,
            incremental_table: None,
            incremental_column: "last_updated".to_string(),
        }
    }
}

impl QueryableSourceConfig {
    /// Resolve the password from the configured environment variable
    pub fn password(&self) -> String {
        self.password_env
            .as_deref()
            .filter(|name| !name.is_empty())
            .and_then(|name| std::env::var(name).ok())
            .unwrap_or_default()
    }
}

/// Flat-file source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSourceConfig {
    pub enabled: bool,
    pub path: Option<PathBuf>,
    pub incremental_column: String,
}

impl Default for FileSourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: None,
            incremental_column: "modified_date".to_string(),
        }
    }
}

/// Watermark persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IncrementalConfig {
    pub state_file: PathBuf,
    /// Cold-start window for the queryable source
    pub default_lookback_days: i64,
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from(".etl_state.json"),
            default_lookback_days: 7,
        }
    }
}

/// Metric table output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub out_dir: PathBuf,
    /// Also write delimited files
    pub csv: bool,
    /// Write columnar files
    pub parquet: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("output"),
            csv: false,
            parquet: true,
        }
    }
}

/// Logging settings consumed by the binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EtlConfig::default();
        assert_eq!(config.dead_stock_days, 180);
        assert_eq!(config.holding_cost_rate, 0.20);
        assert_eq!(config.default_capacity, 100_000.0);
        assert_eq!(config.incremental.default_lookback_days, 7);
        assert_eq!(config.sources.file.incremental_column, "modified_date");
        assert_eq!(config.sources.queryable.incremental_column, "last_updated");
        assert!(!config.sources.queryable.enabled);
        assert!(!config.sources.file.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml_with_legacy_source_names() {
        let yaml = r#"
sources:
  postgres:
    enabled: true
    host: db.internal
    port: 6543
    user: etl
    database: stock
    password_env: PG_PASS
    incremental_table: inventory
    incremental_column: last_updated
  csv:
    enabled: true
    path: data/movements.csv
    incremental_column: modified_date
incremental:
  state_file: state/etl.json
  default_lookback_days: 14
dead_stock_days: 90
holding_cost_rate: 0.25
output:
  out_dir: out
  csv: true
"#;
        let config = EtlConfig::from_yaml_str(yaml).unwrap();
        assert!(config.sources.queryable.enabled);
        assert_eq!(config.sources.queryable.host, "db.internal");
        assert_eq!(config.sources.queryable.port, 6543);
        assert_eq!(
            config.sources.file.path,
            Some(PathBuf::from("data/movements.csv"))
        );
        assert_eq!(config.incremental.default_lookback_days, 14);
        assert_eq!(config.dead_stock_days, 90);
        assert_eq!(config.holding_cost_rate, 0.25);
        assert_eq!(config.default_capacity, 100_000.0);
        assert!(config.output.csv);
        assert!(config.output.parquet);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let err = EtlConfig::from_yaml_str("sources: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = EtlConfig::from_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.user_message().contains("Hint:"));
    }

    #[test]
    fn test_validation_rules() {
        let config = EtlConfig {
            holding_cost_rate: -0.1,
            ..EtlConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EtlConfig {
            default_capacity: 0.0,
            ..EtlConfig::default()
        };
        assert!(config.validate().is_err());

        let mut config = EtlConfig::default();
        config.sources.queryable.enabled = true;
        assert!(config.validate().is_err(), "table is required");

        let config = EtlConfig::default().with_queryable_source("inventory; DROP TABLE x");
        assert!(config.validate().is_err(), "identifier must be plain");

        let config = EtlConfig::default().with_queryable_source("public.inventory");
        assert!(config.validate().is_ok());

        let mut config = EtlConfig::default();
        config.sources.file.enabled = true;
        assert!(config.validate().is_err(), "path is required");
    }

    #[test]
    fn test_lookback_window_is_bounded() {
        let mut config = EtlConfig::default();
        config.incremental.default_lookback_days = MAX_LOOKBACK_DAYS;
        assert!(config.validate().is_ok());

        config.incremental.default_lookback_days = 1_000_000_000_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("default_lookback_days"));

        config.incremental.default_lookback_days = -1;
        assert!(config.validate().is_err());
    }
}
