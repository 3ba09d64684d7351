//! Checkpoint inspection and reset

use std::path::PathBuf;

use crate::cli::error::CliError;
use crate::cli::output::format_checkpoint;
use crate::extract::{CheckpointStore, FILE_WATERMARK, FileCheckpointStore, QUERYABLE_WATERMARK};

/// Arguments shared by the `checkpoint` subcommands
pub struct CheckpointArgs {
    /// Configuration file naming the state file
    pub config: PathBuf,
    /// Restrict to one source (`queryable` or `file`)
    pub source: Option<String>,
}

/// Map a source name to its watermark key
pub fn watermark_key(source: &str) -> Result<&'static str, CliError> {
    match source {
        "queryable" | "postgres" => Ok(QUERYABLE_WATERMARK),
        "file" | "csv" => Ok(FILE_WATERMARK),
        other => Err(CliError::InvalidArgument(format!(
            "Unknown source '{other}'; expected 'queryable' or 'file'"
        ))),
    }
}

fn store_for(args: &CheckpointArgs) -> Result<FileCheckpointStore, CliError> {
    let config = super::load_config(&args.config)?;
    Ok(FileCheckpointStore::new(config.incremental.state_file))
}

/// Handle `checkpoint show`
pub fn handle_show(args: &CheckpointArgs) -> Result<(), CliError> {
    let store = store_for(args)?;
    let checkpoint = store.load();

    println!("State file: {}", store.path().display());
    match &args.source {
        Some(source) => {
            let key = watermark_key(source)?;
            println!("{key}  {}", checkpoint.raw(key).unwrap_or("(none)"));
        }
        None => print!("{}", format_checkpoint(&checkpoint)),
    }
    Ok(())
}

/// Handle `checkpoint reset`
///
/// Without `--source` every watermark is dropped and the next run is a
/// full cold start.
pub fn handle_reset(args: &CheckpointArgs) -> Result<(), CliError> {
    let store = store_for(args)?;
    let mut checkpoint = store.load();

    let keys = match &args.source {
        Some(source) => vec![watermark_key(source)?],
        None => vec![QUERYABLE_WATERMARK, FILE_WATERMARK],
    };

    let mut cleared = 0;
    for key in keys {
        if checkpoint.clear(key) {
            cleared += 1;
        }
    }
    store.save(&checkpoint)?;

    eprintln!("Cleared {cleared} watermark(s) in {}", store.path().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn setup(temp: &TempDir) -> (PathBuf, FileCheckpointStore) {
        let state = temp.path().join("state.json");
        let config = temp.path().join("etl.yaml");
        std::fs::write(
            &config,
            format!("incremental:\n  state_file: {}\n", state.display()),
        )
        .unwrap();

        let store = FileCheckpointStore::new(&state);
        let mut checkpoint = store.load();
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        checkpoint.advance(QUERYABLE_WATERMARK, ts);
        checkpoint.advance(FILE_WATERMARK, ts);
        store.save(&checkpoint).unwrap();
        (config, store)
    }

    #[test]
    fn test_watermark_key() {
        assert_eq!(watermark_key("file").unwrap(), FILE_WATERMARK);
        assert_eq!(watermark_key("postgres").unwrap(), QUERYABLE_WATERMARK);
        assert!(watermark_key("s3").is_err());
    }

    #[test]
    fn test_reset_single_source() {
        let temp = TempDir::new().unwrap();
        let (config, store) = setup(&temp);

        handle_reset(&CheckpointArgs {
            config,
            source: Some("file".to_string()),
        })
        .unwrap();

        let checkpoint = store.load();
        assert!(checkpoint.raw(FILE_WATERMARK).is_none());
        assert!(checkpoint.raw(QUERYABLE_WATERMARK).is_some());
    }

    #[test]
    fn test_reset_all() {
        let temp = TempDir::new().unwrap();
        let (config, store) = setup(&temp);

        handle_reset(&CheckpointArgs {
            config,
            source: None,
        })
        .unwrap();

        assert!(store.load().is_empty());
    }
}
