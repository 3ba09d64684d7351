//! Incremental extraction
//!
//! Each run loads the checkpoint, reads rows newer than each source's
//! watermark, normalizes them into [`CanonicalRecords`](crate::records::CanonicalRecords)
//! and stamps the extraction time as the new watermark.
//!
//! Watermarks are wall-clock time of extraction, not the newest value seen
//! in the data. Rows committed to a source with a timestamp older than the
//! extractor's clock at the time of the previous run are not picked up.
//!
//! ```rust,ignore
//! use inventory_analytics::config::EtlConfig;
//! use inventory_analytics::extract::Extractor;
//!
//! let config = EtlConfig::from_file("etl.yaml".as_ref())?;
//! let extraction = Extractor::from_config(&config).extract();
//! println!("{} movements", extraction.records.movements.len());
//! ```

mod checkpoint;
mod error;
mod extractor;
mod file;
mod normalize;
mod queryable;

pub use checkpoint::{
    Checkpoint, CheckpointStore, FILE_WATERMARK, FileCheckpointStore, MemoryCheckpointStore,
    QUERYABLE_WATERMARK,
};
pub use error::{CheckpointError, SourceError};
pub use extractor::{ExtractReport, Extraction, Extractor, SourceReport, SourceStatus};
pub use file::{FileSourceReader, SourceOutcome, parse_records};
pub use normalize::{NormalizeReport, Normalized, normalize_inventory, normalize_movements};
pub use queryable::{QueryBackend, QueryableSourceReader, UnavailableBackend, backend_from_config};

#[cfg(feature = "duckdb-backend")]
pub use queryable::DuckDbBackend;

#[cfg(feature = "postgres-backend")]
pub use queryable::PostgresBackend;
