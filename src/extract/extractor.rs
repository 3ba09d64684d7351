//! Incremental extraction over both sources

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, info_span, warn};

use super::checkpoint::{CheckpointStore, FILE_WATERMARK, FileCheckpointStore, QUERYABLE_WATERMARK};
use super::file::{FileSourceReader, SourceOutcome};
use super::normalize::{NormalizeReport, Normalized, normalize_inventory, normalize_movements};
use super::queryable::{QueryBackend, QueryableSourceReader, backend_from_config};
use crate::config::{EtlConfig, IncrementalConfig, SourcesConfig};
use crate::records::{CanonicalRecords, RawRecord};

/// How one source fared in a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceStatus {
    /// Turned off in configuration; watermark untouched
    #[default]
    Disabled,
    /// Read succeeded (possibly with zero rows)
    Read,
    /// Source absent this run; watermark untouched
    Unavailable,
    /// Read attempted and failed; no rows
    Failed,
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Read => write!(f, "read"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Per-source extraction summary
#[derive(Debug, Clone, Default)]
pub struct SourceReport {
    pub status: SourceStatus,
    pub rows_read: usize,
    pub normalize: NormalizeReport,
    pub watermark_advanced: bool,
    /// Failure or unavailability reason
    pub message: Option<String>,
}

impl SourceReport {
    fn from_outcome(outcome: &SourceOutcome) -> Self {
        let (status, message) = match outcome {
            SourceOutcome::Records(_) => (SourceStatus::Read, None),
            SourceOutcome::Unavailable(reason) => (SourceStatus::Unavailable, Some(reason.clone())),
            SourceOutcome::Failed(e) => (SourceStatus::Failed, Some(e.to_string())),
        };
        Self {
            status,
            rows_read: outcome.row_count(),
            message,
            ..Default::default()
        }
    }
}

/// Summary of one extraction
#[derive(Debug, Clone, Default)]
pub struct ExtractReport {
    pub queryable: SourceReport,
    pub file: SourceReport,
    /// Whether the checkpoint was persisted this run
    pub checkpoint_saved: bool,
}

impl ExtractReport {
    /// Human-readable warnings (drift, failed sources, unsaved checkpoint)
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for (name, source) in [("queryable", &self.queryable), ("file", &self.file)] {
            if let Some(message) = &source.message {
                warnings.push(format!("{name} source {}: {message}", source.status));
            }
            if source.normalize.has_drift() {
                warnings.push(format!(
                    "{name} source missing columns: {}",
                    source.normalize.missing_columns.join(", ")
                ));
            }
        }
        let attempted = [&self.queryable, &self.file]
            .iter()
            .any(|s| s.watermark_advanced);
        if attempted && !self.checkpoint_saved {
            warnings.push("checkpoint not saved; next run will re-extract".to_string());
        }
        warnings
    }
}

/// Canonical records and the report that produced them
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub records: CanonicalRecords,
    pub report: ExtractReport,
}

/// Pulls new rows from both sources and advances their watermarks
///
/// The queryable source feeds inventory, the flat file feeds movements. A
/// disabled source yields no records and its watermark is left as is.
pub struct Extractor {
    queryable: Option<QueryableSourceReader>,
    file: Option<FileSourceReader>,
    movement_column: String,
    store: Box<dyn CheckpointStore>,
}

impl Extractor {
    /// Create an extractor with an injected checkpoint store
    pub fn new(
        sources: &SourcesConfig,
        incremental: &IncrementalConfig,
        store: Box<dyn CheckpointStore>,
    ) -> Self {
        let queryable = sources.queryable.enabled.then(|| {
            QueryableSourceReader::new(
                backend_from_config(&sources.queryable),
                sources.queryable.incremental_table.clone().unwrap_or_default(),
                sources.queryable.incremental_column.clone(),
                incremental.default_lookback_days,
            )
        });

        let file = match (&sources.file.path, sources.file.enabled) {
            (Some(path), true) => Some(FileSourceReader::new(
                path.clone(),
                sources.file.incremental_column.clone(),
            )),
            (None, true) => {
                warn!("File source enabled without a path, treating as disabled");
                None
            }
            _ => None,
        };

        Self {
            queryable,
            file,
            movement_column: sources.file.incremental_column.clone(),
            store,
        }
    }

    /// Create an extractor persisting to `incremental.state_file`
    pub fn from_config(config: &EtlConfig) -> Self {
        let store = FileCheckpointStore::new(config.incremental.state_file.clone());
        Self::new(&config.sources, &config.incremental, Box::new(store))
    }

    /// Replace the queryable backend (keeps table, column and lookback)
    ///
    /// Has no effect when the queryable source is disabled.
    pub fn with_queryable_backend(mut self, backend: Box<dyn QueryBackend>) -> Self {
        if let Some(reader) = self.queryable.take() {
            self.queryable = Some(reader.with_backend(backend));
        }
        self
    }

    /// Replace the checkpoint store
    pub fn with_store(mut self, store: Box<dyn CheckpointStore>) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &dyn CheckpointStore {
        self.store.as_ref()
    }

    /// Extract using the current wall clock
    pub fn extract(&self) -> Extraction {
        self.extract_at(Utc::now())
    }

    /// Extract as of `now`
    ///
    /// `now` is the cold-start reference for the queryable source and the
    /// value written as the new watermark for every source that was read.
    pub fn extract_at(&self, now: DateTime<Utc>) -> Extraction {
        let _span = info_span!("extract", now = %now).entered();

        let mut checkpoint = self.store.load();
        let mut report = ExtractReport::default();

        let inventory = match &self.queryable {
            Some(reader) => {
                let outcome = reader.read(checkpoint.watermark(QUERYABLE_WATERMARK), now);
                let advances = outcome.advances_watermark();
                let (records, mut source) = finish("queryable", outcome, normalize_inventory);
                if advances {
                    source.watermark_advanced = checkpoint.advance(QUERYABLE_WATERMARK, now);
                }
                report.queryable = source;
                records
            }
            None => Vec::new(),
        };

        let movements = match &self.file {
            Some(reader) => {
                let outcome = reader.read(checkpoint.watermark(FILE_WATERMARK));
                let advances = outcome.advances_watermark();
                let (records, mut source) = finish("file", outcome, |raw| {
                    normalize_movements(raw, &self.movement_column)
                });
                if advances {
                    source.watermark_advanced = checkpoint.advance(FILE_WATERMARK, now);
                }
                report.file = source;
                records
            }
            None => Vec::new(),
        };

        if report.queryable.watermark_advanced || report.file.watermark_advanced {
            match self.store.save(&checkpoint) {
                Ok(()) => report.checkpoint_saved = true,
                Err(e) => error!(error = %e, "Failed to persist checkpoint"),
            }
        }

        info!(
            inventory_rows = inventory.len(),
            movement_rows = movements.len(),
            checkpoint_saved = report.checkpoint_saved,
            "Extraction complete"
        );

        Extraction {
            records: CanonicalRecords::new(inventory, movements),
            report,
        }
    }
}

/// Log the outcome, normalize its rows and build the source report
fn finish<T>(
    source: &str,
    outcome: SourceOutcome,
    normalize: impl FnOnce(Vec<RawRecord>) -> Normalized<T>,
) -> (Vec<T>, SourceReport) {
    outcome.log(source);
    let mut report = SourceReport::from_outcome(&outcome);
    let normalized = normalize(outcome.into_records());
    debug!(
        source,
        rows_in = normalized.report.rows_in,
        rows_out = normalized.report.rows_out(),
        "Normalized"
    );
    report.normalize = normalized.report;
    (normalized.records, report)
}
