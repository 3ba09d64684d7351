//! Run command implementation

use std::path::PathBuf;

use tracing::info;

use crate::cli::error::CliError;
use crate::pipeline::PipelineExecutor;

/// Arguments for the `run` command
pub struct RunArgs {
    /// Configuration file
    pub config: PathBuf,
    /// Overrides `output.out_dir`
    pub out_dir: Option<PathBuf>,
    /// Overrides `incremental.state_file`
    pub state_file: Option<PathBuf>,
    /// Validate without reading or writing
    pub dry_run: bool,
}

/// Handle the `run` command
pub fn handle_run(args: &RunArgs) -> Result<(), CliError> {
    let mut config = super::load_config(&args.config)?;
    if let Some(out_dir) = &args.out_dir {
        config = config.with_out_dir(out_dir);
    }
    if let Some(state_file) = &args.state_file {
        config = config.with_state_file(state_file);
    }

    info!(config = %args.config.display(), "Loaded configuration");

    let report = PipelineExecutor::new(config)?
        .with_dry_run(args.dry_run)
        .run()?;

    report.print_summary();

    if report.is_success() {
        eprintln!();
        if report.is_dry_run() {
            eprintln!("Dry run passed.");
        } else {
            eprintln!("Pipeline completed successfully!");
        }
        Ok(())
    } else {
        Err(CliError::RunFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_handle_run_missing_config() {
        let args = RunArgs {
            config: PathBuf::from("/no/such/etl.yaml"),
            out_dir: None,
            state_file: None,
            dry_run: false,
        };
        assert!(matches!(handle_run(&args), Err(CliError::ConfigNotFound(_))));
    }

    #[test]
    fn test_handle_run_writes_csv() {
        let temp = TempDir::new().unwrap();
        let movements = temp.path().join("movements.csv");
        std::fs::write(
            &movements,
            "product_id,quantity,movement_type,modified_date\n9,4,out,2025-05-01T00:00:00\n",
        )
        .unwrap();
        let config = temp.path().join("etl.yaml");
        std::fs::write(
            &config,
            format!(
                "sources:\n  file:\n    enabled: true\n    path: {}\noutput:\n  csv: true\n  parquet: false\n",
                movements.display()
            ),
        )
        .unwrap();

        let args = RunArgs {
            config,
            out_dir: Some(temp.path().join("out")),
            state_file: Some(temp.path().join("state.json")),
            dry_run: false,
        };
        handle_run(&args).unwrap();

        assert!(temp.path().join("out/movement_summary.csv").exists());
        assert!(temp.path().join("state.json").exists());
    }
}
