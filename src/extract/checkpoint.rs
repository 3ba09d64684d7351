//! Per-source watermark persistence

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::CheckpointError;
use crate::records::value::{format_timestamp, parse_timestamp_str};

/// Watermark key for the queryable (inventory) source
pub const QUERYABLE_WATERMARK: &str = "queryable_last";
/// Watermark key for the flat-file (movement) source
pub const FILE_WATERMARK: &str = "file_last";

/// Keys written by earlier deployments, mapped onto the current ones.
const LEGACY_KEYS: [(&str, &str); 2] = [
    ("postgres_last", QUERYABLE_WATERMARK),
    ("csv_last", FILE_WATERMARK),
];

/// Flat mapping of source key to ISO-8601 watermark
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint {
    watermarks: BTreeMap<String, Option<String>>,
}

impl Checkpoint {
    /// Create an empty checkpoint (no prior runs)
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode persisted state, folding legacy keys into the current ones
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let mut checkpoint: Self = serde_json::from_str(json)?;
        for (legacy, current) in LEGACY_KEYS {
            if let Some(value) = checkpoint.watermarks.remove(legacy) {
                checkpoint
                    .watermarks
                    .entry(current.to_string())
                    .or_insert(value);
            }
        }
        Ok(checkpoint)
    }

    /// Encode for persistence
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Stored watermark text for a source
    pub fn raw(&self, source: &str) -> Option<&str> {
        self.watermarks.get(source).and_then(|v| v.as_deref())
    }

    /// Parsed watermark for a source
    ///
    /// An unparsable stored value counts as absent, which sends the source
    /// down its cold-start path.
    pub fn watermark(&self, source: &str) -> Option<DateTime<Utc>> {
        let raw = self.raw(source)?;
        let parsed = parse_timestamp_str(raw);
        if parsed.is_none() {
            warn!(source, value = raw, "Ignoring unparsable watermark");
        }
        parsed
    }

    /// Move a source's watermark forward
    ///
    /// Returns `false` and leaves the stored value alone when `ts` is not
    /// strictly newer than the current watermark.
    pub fn advance(&mut self, source: &str, ts: DateTime<Utc>) -> bool {
        if let Some(current) = self.watermark(source) {
            if ts <= current {
                debug!(source, "Watermark not advanced (would regress)");
                return false;
            }
        }
        self.watermarks
            .insert(source.to_string(), Some(format_timestamp(&ts)));
        true
    }

    /// Forget a source's watermark
    pub fn clear(&mut self, source: &str) -> bool {
        self.watermarks.remove(source).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.watermarks.is_empty()
    }

    /// Iterate over `(source, watermark)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.watermarks
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

/// Persistence for the checkpoint
///
/// `load` never fails: unreadable or malformed state is treated as "no
/// prior runs". `save` overwrites the whole state.
pub trait CheckpointStore: Send + Sync {
    fn load(&self) -> Checkpoint;
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;
}

/// JSON file store with write-to-temp-then-rename replacement
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Checkpoint {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No checkpoint file, starting fresh");
            return Checkpoint::new();
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read checkpoint, starting fresh");
                return Checkpoint::new();
            }
        };

        match Checkpoint::from_json_str(&content) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Malformed checkpoint, starting fresh");
                Checkpoint::new()
            }
        }
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let json = checkpoint.to_json_string()?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let tmp_path = self.temp_path();
        let mut file = File::create(&tmp_path).map_err(|e| self.io_error(e))?;
        file.write_all(json.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| self.io_error(e))?;
        drop(file);

        std::fs::rename(&tmp_path, &self.path).map_err(|e| self.io_error(e))?;
        debug!(path = %self.path.display(), "Checkpoint saved");
        Ok(())
    }
}

/// In-process store for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    state: Mutex<Checkpoint>,
    reject_writes: bool,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing state
    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        Self {
            state: Mutex::new(checkpoint),
            reject_writes: false,
        }
    }

    /// A store whose `save` always fails
    pub fn rejecting() -> Self {
        Self {
            state: Mutex::new(Checkpoint::new()),
            reject_writes: true,
        }
    }

    /// Current stored state
    pub fn snapshot(&self) -> Checkpoint {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> Checkpoint {
        self.snapshot()
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        if self.reject_writes {
            return Err(CheckpointError::Rejected("store is read-only".to_string()));
        }
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = checkpoint.clone();
        Ok(())
    }
}
