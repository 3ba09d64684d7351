//! inventory-etl - incremental inventory and movement metrics

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing::error;

use inventory_analytics::cli::CliError;
use inventory_analytics::cli::commands::checkpoint::{CheckpointArgs, handle_reset, handle_show};
use inventory_analytics::cli::commands::run::{RunArgs, handle_run};
use inventory_analytics::cli::logging::init_logging;
use inventory_analytics::config::EtlConfig;

#[derive(Parser)]
#[command(name = "inventory-etl", version, about = "Incremental inventory and movement metrics")]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract new rows, compute metric tables and write them
    Run {
        /// Path to the YAML configuration
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Output directory (overrides output.out_dir)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Checkpoint file (overrides incremental.state_file)
        #[arg(long)]
        state_file: Option<PathBuf>,

        /// Validate configuration and sources without running
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect or reset source watermarks
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommand,
    },
}

#[derive(Subcommand)]
enum CheckpointCommand {
    /// Print stored watermarks
    Show {
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Only this source (queryable or file)
        #[arg(long)]
        source: Option<String>,
    },
    /// Forget watermarks so the next run starts cold
    Reset {
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Only this source (queryable or file)
        #[arg(long)]
        source: Option<String>,
    },
}

/// Level from the flag, else from the config file, else `info`
fn log_level(cli: &Cli) -> String {
    if let Some(level) = &cli.log_level {
        return level.clone();
    }
    let config = match &cli.command {
        Commands::Run { config, .. } => config,
        Commands::Checkpoint { command } => match command {
            CheckpointCommand::Show { config, .. } | CheckpointCommand::Reset { config, .. } => {
                config
            }
        },
    };
    EtlConfig::from_file(config)
        .map(|c| c.logging.level)
        .unwrap_or_else(|_| "info".to_string())
}

fn execute(cli: Cli) -> Result<(), CliError> {
    init_logging(&log_level(&cli))?;

    match cli.command {
        Commands::Run {
            config,
            out_dir,
            state_file,
            dry_run,
        } => handle_run(&RunArgs {
            config,
            out_dir,
            state_file,
            dry_run,
        }),
        Commands::Checkpoint { command } => match command {
            CheckpointCommand::Show { config, source } => {
                handle_show(&CheckpointArgs { config, source })
            }
            CheckpointCommand::Reset { config, source } => {
                handle_reset(&CheckpointArgs { config, source })
            }
        },
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = execute(cli) {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e.user_message());
        process::exit(e.exit_code());
    }
}
