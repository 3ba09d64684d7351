//! Pipeline executor
//!
//! Runs one extract, compute and write cycle. Extraction is sequential;
//! the four metric engines are fanned out with rayon; tables are then
//! written by every configured sink.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{Span, error, info, info_span, warn};
use uuid::Uuid;

use super::error::{PipelineError, PipelineResult};
use crate::config::{EtlConfig, QueryBackendKind};
use crate::extract::{CheckpointStore, ExtractReport, Extractor, QueryBackend};
use crate::records::CanonicalRecords;
use crate::sink::{MetricTable, TableSink, sinks_from_config};
use crate::transform::{EngineSet, MetricEngine};

/// Outcome of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every non-empty table was written by every sink
    Completed,
    /// Some table could not be written
    CompletedWithErrors,
    /// Configuration and sources checked, nothing read or written
    Validated,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::CompletedWithErrors => write!(f, "completed with errors"),
            Self::Validated => write!(f, "validated"),
        }
    }
}

/// The four metric tables of one run
#[derive(Debug, Clone)]
pub struct MetricTables {
    pub inventory: MetricTable,
    pub movement: MetricTable,
    pub warehouse: MetricTable,
    pub financial: MetricTable,
}

impl MetricTables {
    /// Tables in output order
    pub fn iter(&self) -> impl Iterator<Item = &MetricTable> {
        [&self.inventory, &self.movement, &self.warehouse, &self.financial].into_iter()
    }

    /// Look up a table by name
    pub fn get(&self, name: &str) -> Option<&MetricTable> {
        self.iter().find(|t| t.name() == name)
    }
}

/// What happened to one table
#[derive(Debug, Clone, Default)]
pub struct TableReport {
    pub rows: usize,
    pub files: Vec<PathBuf>,
    pub errors: Vec<String>,
}

impl TableReport {
    /// Empty tables are never written
    pub fn skipped(&self) -> bool {
        self.rows == 0
    }
}

/// Summary of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub extract: ExtractReport,
    pub inventory_rows: usize,
    pub movement_rows: usize,
    /// Keyed by table name
    pub tables: BTreeMap<String, TableReport>,
    pub warnings: Vec<String>,
    /// Computed tables; `None` for a dry run
    pub output: Option<MetricTables>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.status != RunStatus::CompletedWithErrors
    }

    pub fn is_dry_run(&self) -> bool {
        self.status == RunStatus::Validated
    }

    /// All files written, ordered by table name
    pub fn files_written(&self) -> Vec<PathBuf> {
        self.tables
            .values()
            .flat_map(|t| t.files.iter().cloned())
            .collect()
    }

    /// Get duration as human-readable string
    pub fn duration_formatted(&self) -> String {
        let secs = self.duration_ms / 1000;
        let mins = secs / 60;
        let remaining_secs = secs % 60;

        if mins > 0 {
            format!("{}m {}s", mins, remaining_secs)
        } else if secs > 0 {
            format!("{}s", secs)
        } else {
            format!("{}ms", self.duration_ms)
        }
    }

    /// Print summary to stderr
    pub fn print_summary(&self) {
        eprintln!();
        eprintln!("Pipeline {} - {}", self.run_id, self.status);
        eprintln!("Duration: {}", self.duration_formatted());

        if self.is_dry_run() {
            return;
        }

        eprintln!(
            "Extracted: {} inventory rows ({}), {} movement rows ({})",
            self.inventory_rows,
            self.extract.queryable.status,
            self.movement_rows,
            self.extract.file.status
        );
        for (name, table) in &self.tables {
            let status = if table.skipped() {
                "skipped (empty)".to_string()
            } else if table.errors.is_empty() {
                format!("{} rows, {} file(s)", table.rows, table.files.len())
            } else {
                format!("{} rows, {} error(s)", table.rows, table.errors.len())
            };
            eprintln!("  - {name}: {status}");
        }
        for warning in &self.warnings {
            eprintln!("Warning: {warning}");
        }
    }
}

/// Pipeline executor
pub struct PipelineExecutor {
    config: EtlConfig,
    extractor: Extractor,
    engines: EngineSet,
    sinks: Vec<Box<dyn TableSink>>,
    dry_run: bool,
}

impl PipelineExecutor {
    /// Create a new executor; fails only on invalid configuration
    pub fn new(config: EtlConfig) -> PipelineResult<Self> {
        config.validate()?;

        Ok(Self {
            extractor: Extractor::from_config(&config),
            engines: EngineSet::from_config(&config),
            sinks: sinks_from_config(&config.output),
            dry_run: false,
            config,
        })
    }

    /// Persist watermarks somewhere other than `incremental.state_file`
    pub fn with_checkpoint_store(mut self, store: Box<dyn CheckpointStore>) -> Self {
        self.extractor = self.extractor.with_store(store);
        self
    }

    /// Replace the queryable backend built from configuration
    pub fn with_queryable_backend(mut self, backend: Box<dyn QueryBackend>) -> Self {
        self.extractor = self.extractor.with_queryable_backend(backend);
        self
    }

    /// Replace the configured sinks
    pub fn with_sinks(mut self, sinks: Vec<Box<dyn TableSink>>) -> Self {
        self.sinks = sinks;
        self
    }

    /// Only validate; do not read sources, touch the checkpoint or write output
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// Run the pipeline using the current wall clock
    pub fn run(&self) -> PipelineResult<PipelineReport> {
        self.run_at(Utc::now())
    }

    /// Run the pipeline as of `now`
    pub fn run_at(&self, now: DateTime<Utc>) -> PipelineResult<PipelineReport> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("pipeline_run", run_id = %run_id, dry_run = self.dry_run);
        let _guard = span.enter();

        let started_at = Utc::now();
        let start = Instant::now();

        if self.dry_run {
            self.validate_sources()?;
            info!("Dry run: configuration and sources are valid");
            return Ok(PipelineReport {
                run_id,
                status: RunStatus::Validated,
                started_at,
                duration_ms: start.elapsed().as_millis() as u64,
                extract: ExtractReport::default(),
                inventory_rows: 0,
                movement_rows: 0,
                tables: BTreeMap::new(),
                warnings: Vec::new(),
                output: None,
            });
        }

        info!("Starting pipeline");

        let extraction = self.extractor.extract_at(now);
        let mut warnings = extraction.report.warnings();
        for warning in &warnings {
            warn!("{warning}");
        }

        let output = self.compute(&extraction.records, now);

        let mut tables = BTreeMap::new();
        for table in output.iter() {
            let report = self.write_table(table);
            for message in &report.errors {
                warnings.push(message.clone());
            }
            tables.insert(table.name().to_string(), report);
        }

        let failed = tables.values().any(|t| !t.errors.is_empty());
        let status = if failed {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        };

        let report = PipelineReport {
            run_id,
            status,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            inventory_rows: extraction.records.inventory.len(),
            movement_rows: extraction.records.movements.len(),
            extract: extraction.report,
            tables,
            warnings,
            output: Some(output),
        };

        info!(
            status = %report.status,
            files = report.files_written().len(),
            duration_ms = report.duration_ms,
            "Pipeline finished"
        );

        Ok(report)
    }

    /// Evaluate all four engines concurrently
    pub fn compute(&self, records: &CanonicalRecords, now: DateTime<Utc>) -> MetricTables {
        let parent = Span::current();
        let run = |engine: &dyn MetricEngine| {
            let _span =
                info_span!(parent: &parent, "engine", table = engine.table_name()).entered();
            let start = Instant::now();
            let table = engine.compute(records, now);
            info!(
                rows = table.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Computed table"
            );
            table
        };

        let [inventory, movement, warehouse, financial] = self.engines.engines();
        let ((inventory, movement), (warehouse, financial)) = rayon::join(
            || rayon::join(|| run(inventory), || run(movement)),
            || rayon::join(|| run(warehouse), || run(financial)),
        );

        MetricTables {
            inventory,
            movement,
            warehouse,
            financial,
        }
    }

    /// Write one table with every sink; failures are logged, never raised
    fn write_table(&self, table: &MetricTable) -> TableReport {
        let mut report = TableReport {
            rows: table.len(),
            ..Default::default()
        };

        if table.is_empty() {
            info!(table = table.name(), "Skipping empty table");
            return report;
        }

        for sink in &self.sinks {
            match sink.write(table) {
                Ok(path) => report.files.push(path),
                Err(e) => {
                    let err = PipelineError::sink(table.name(), sink.format(), e);
                    error!(table = table.name(), format = sink.format(), error = %err, "Write failed");
                    report.errors.push(err.to_string());
                }
            }
        }
        report
    }

    /// Checks a dry run performs beyond configuration validation
    fn validate_sources(&self) -> PipelineResult<()> {
        let mut problems = Vec::new();

        let queryable = &self.config.sources.queryable;
        if queryable.enabled {
            let compiled = match queryable.backend {
                QueryBackendKind::Duckdb => cfg!(feature = "duckdb-backend"),
                QueryBackendKind::Postgres => cfg!(feature = "postgres-backend"),
            };
            if !compiled {
                problems.push(format!(
                    "queryable backend '{}' is not compiled into this build",
                    queryable.backend
                ));
            }
            let missing_db = queryable
                .path
                .as_ref()
                .filter(|p| queryable.backend == QueryBackendKind::Duckdb && !p.exists());
            if let Some(path) = missing_db {
                problems.push(format!("database file not found: {}", path.display()));
            }
        }

        let file = &self.config.sources.file;
        if let (true, Some(path)) = (file.enabled, &file.path) {
            if !path.exists() {
                problems.push(format!("movement file not found: {}", path.display()));
            }
        }

        if self.sinks.is_empty() {
            problems.push("no output format enabled".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Validation(problems.join("\n  ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::MemoryCheckpointStore;
    use crate::sink::CsvSink;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn movement_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("movements.csv");
        std::fs::write(
            &path,
            "product_id,quantity,movement_type,modified_date,from_site,to_site\n\
             1,5,out,2025-05-01T00:00:00,WH1,WH2\n\
             1,3,in,2025-05-20T00:00:00,,\n\
             2,7,sale,2025-05-25T00:00:00,,\n",
        )
        .unwrap();
        path
    }

    fn executor(dir: &TempDir) -> PipelineExecutor {
        let config = EtlConfig::default()
            .with_file_source(movement_file(dir))
            .with_out_dir(dir.path().join("out"));
        PipelineExecutor::new(config)
            .unwrap()
            .with_checkpoint_store(Box::new(MemoryCheckpointStore::new()))
            .with_sinks(vec![Box::new(CsvSink::new(dir.path().join("out")))])
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EtlConfig {
            holding_cost_rate: -1.0,
            ..EtlConfig::default()
        };
        let err = PipelineExecutor::new(config).err().unwrap();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_run_writes_only_non_empty_tables() {
        let dir = TempDir::new().unwrap();
        let report = executor(&dir).run_at(now()).unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.inventory_rows, 0);
        assert_eq!(report.movement_rows, 3);

        // no inventory source: only movement analytics has rows
        assert_eq!(report.tables["movement_summary"].rows, 2);
        assert!(report.tables["inventory_summary"].skipped());
        assert!(report.tables["financial_summary"].skipped());
        assert_eq!(report.files_written().len(), 1);
        assert!(dir.path().join("out/movement_summary.csv").exists());
        assert!(!dir.path().join("out/inventory_summary.csv").exists());
    }

    #[test]
    fn test_sink_failure_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "not a directory").unwrap();

        let report = executor(&dir)
            .with_sinks(vec![Box::new(CsvSink::new(blocker.join("out")))])
            .run_at(now())
            .unwrap();

        assert_eq!(report.status, RunStatus::CompletedWithErrors);
        assert!(!report.is_success());
        assert!(!report.tables["movement_summary"].errors.is_empty());
        assert!(report.warnings.iter().any(|w| w.contains("movement_summary")));
    }

    #[test]
    fn test_dry_run_reads_nothing() {
        let dir = TempDir::new().unwrap();
        let report = executor(&dir).with_dry_run(true).run_at(now()).unwrap();

        assert!(report.is_dry_run());
        assert!(report.output.is_none());
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_dry_run_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = EtlConfig::default().with_file_source(dir.path().join("absent.csv"));
        let err = PipelineExecutor::new(config)
            .unwrap()
            .with_dry_run(true)
            .run_at(now())
            .unwrap_err();

        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(err.to_string().contains("absent.csv"));
    }

    #[test]
    fn test_compute_on_empty_records() {
        let dir = TempDir::new().unwrap();
        let tables = executor(&dir).compute(&CanonicalRecords::default(), now());
        assert!(tables.iter().all(|t| t.is_empty()));
        assert!(tables.get("warehouse_summary").is_some());
        assert!(tables.get("nope").is_none());
    }

    #[test]
    fn test_duration_formatted() {
        let dir = TempDir::new().unwrap();
        let mut report = executor(&dir).run_at(now()).unwrap();
        report.duration_ms = 65_000;
        assert_eq!(report.duration_formatted(), "1m 5s");
        report.duration_ms = 5_000;
        assert_eq!(report.duration_formatted(), "5s");
        report.duration_ms = 42;
        assert_eq!(report.duration_formatted(), "42ms");
    }
}
