//! Flat-file source reader (stock movements)

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::error::SourceError;
use crate::records::value::parse_timestamp;
use crate::records::{RawRecord, movement_fields};

/// What a reader produced for one run
#[derive(Debug)]
pub enum SourceOutcome {
    /// Rows newer than the watermark (possibly none)
    Records(Vec<RawRecord>),
    /// The source does not exist right now
    Unavailable(String),
    /// The read was attempted and failed
    Failed(SourceError),
}

impl SourceOutcome {
    /// Rows to hand to the normalizer; failures degrade to nothing
    pub fn into_records(self) -> Vec<RawRecord> {
        match self {
            SourceOutcome::Records(rows) => rows,
            SourceOutcome::Unavailable(_) | SourceOutcome::Failed(_) => Vec::new(),
        }
    }

    /// Whether the extractor should stamp a new watermark for this source
    ///
    /// A failed read still counts as attempted; an absent source does not.
    pub fn advances_watermark(&self) -> bool {
        !matches!(self, SourceOutcome::Unavailable(_))
    }

    pub fn row_count(&self) -> usize {
        match self {
            SourceOutcome::Records(rows) => rows.len(),
            _ => 0,
        }
    }

    /// Log the outcome on the reader boundary
    pub(crate) fn log(&self, source: &str) {
        match self {
            SourceOutcome::Records(rows) => info!(source, rows = rows.len(), "Source read"),
            SourceOutcome::Unavailable(reason) => {
                warn!(source, reason = %reason, "Source unavailable, skipping")
            }
            SourceOutcome::Failed(e) => {
                error!(source, error = %e, "Source read failed, continuing without it")
            }
        }
    }
}

/// Reads a delimited or JSON file and filters it by an incremental column
#[derive(Debug, Clone)]
pub struct FileSourceReader {
    path: PathBuf,
    incremental_column: String,
}

impl FileSourceReader {
    pub fn new(path: impl Into<PathBuf>, incremental_column: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            incremental_column: incremental_column.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read rows at or after `watermark`
    ///
    /// With no watermark (first run) the whole file is returned. Never
    /// returns an error; see [`SourceOutcome`].
    pub fn read(&self, watermark: Option<DateTime<Utc>>) -> SourceOutcome {
        if !self.path.exists() {
            return SourceOutcome::Unavailable(SourceError::NotFound(self.path.clone()).to_string());
        }

        let rows = match parse_records(&self.path) {
            Ok(rows) => rows,
            Err(e) => return SourceOutcome::Failed(e),
        };

        match watermark {
            Some(since) => SourceOutcome::Records(self.filter_since(rows, since)),
            None => {
                debug!(path = %self.path.display(), "No watermark, reading entire file");
                SourceOutcome::Records(rows)
            }
        }
    }

    /// Keep rows whose timestamp is at or after `since`
    ///
    /// The timestamp column is resolved the same way the normalizer resolves
    /// it, so every row that later becomes a movement was filtered here.
    fn filter_since(&self, rows: Vec<RawRecord>, since: DateTime<Utc>) -> Vec<RawRecord> {
        let present: BTreeSet<String> = rows
            .iter()
            .flat_map(|row| row.keys().map(|k| k.trim().to_lowercase()))
            .collect();

        let Some(column) =
            movement_fields::timestamp_column(&self.incremental_column, |c| present.contains(c))
        else {
            if !rows.is_empty() {
                warn!(
                    path = %self.path.display(),
                    column = %self.incremental_column,
                    "No timestamp column found, cannot filter; passing all rows"
                );
            }
            return rows;
        };

        let before = rows.len();
        let kept: Vec<RawRecord> = rows
            .into_iter()
            .filter(|row| {
                row.iter()
                    .find(|(k, _)| k.trim().to_lowercase() == column)
                    .and_then(|(_, v)| parse_timestamp(v))
                    .is_some_and(|ts| ts >= since)
            })
            .collect();
        debug!(column = %column, before, after = kept.len(), "Filtered rows by watermark");
        kept
    }
}

/// Parse a file based on its extension, sniffing content when unknown
pub fn parse_records(path: &Path) -> Result<Vec<RawRecord>, SourceError> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match extension.to_lowercase().as_str() {
        "csv" => parse_csv(path),
        "jsonl" | "ndjson" => parse_jsonl(path, &fs::read_to_string(path)?),
        "json" => parse_json(path, &fs::read_to_string(path)?),
        _ => {
            let content = fs::read_to_string(path)?;
            let trimmed = content.trim_start();
            if trimmed.starts_with('[') {
                parse_json(path, &content)
            } else if trimmed.starts_with('{') {
                parse_jsonl(path, &content)
            } else {
                parse_csv(path)
            }
        }
    }
}

/// Delimited file with a header row; empty cells become null
fn parse_csv(path: &Path) -> Result<Vec<RawRecord>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();

    for result in reader.records() {
        let record = result?;
        let mut row = RawRecord::new();
        for (name, cell) in headers.iter().zip(record.iter()) {
            let value = if cell.trim().is_empty() {
                Value::Null
            } else {
                Value::String(cell.to_string())
            };
            row.insert(name.to_string(), value);
        }
        rows.push(row);
    }

    Ok(rows)
}

/// A single JSON array of objects (or one object)
fn parse_json(path: &Path, content: &str) -> Result<Vec<RawRecord>, SourceError> {
    let value: Value = serde_json::from_str(content).map_err(|e| SourceError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(obj) => Some(obj),
                _ => None,
            })
            .collect()),
        Value::Object(obj) => Ok(vec![obj]),
        _ => Err(SourceError::Parse {
            path: path.to_path_buf(),
            message: "expected an array of objects".to_string(),
        }),
    }
}

/// One JSON object per line; blank lines are skipped
fn parse_jsonl(path: &Path, content: &str) -> Result<Vec<RawRecord>, SourceError> {
    let mut rows = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(obj)) => rows.push(obj),
            Ok(_) => {
                warn!(path = %path.display(), line = line_no + 1, "Skipping non-object line")
            }
            Err(e) => {
                return Err(SourceError::Parse {
                    path: path.to_path_buf(),
                    message: format!("line {}: {}", line_no + 1, e),
                });
            }
        }
    }
    Ok(rows)
}
