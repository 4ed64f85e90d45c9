//! mig - command-line interface for MIG partition inspection and export

use anyhow::Result;
use clap::{Parser, Subcommand};

mod backend;
mod output;
mod util;

use backend::Backend;
use mig_engine::MigConfigManager;
use output::OutputFormat;

/// Inspect and export the MIG partitioning of the host's GPUs
#[derive(Debug, Parser)]
#[command(name = "mig")]
#[command(about = "Inspect and export the MIG partitioning of the host's GPUs")]
#[command(version)]
struct Cli {
    /// Driver backend to use
    #[arg(long, value_enum, default_value = "sim", env = "MIG_BACKEND")]
    backend: Backend,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Export the MIG configuration from all GPUs in a compatible format
    Export {
        /// Format for the output
        #[arg(
            short,
            long,
            value_enum,
            default_value = "yaml",
            env = "MIG_OUTPUT_FORMAT"
        )]
        output_format: OutputFormat,

        /// Output the actual placements of MIG devices instead of configs
        #[arg(short, long)]
        placements: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let driver = backend::create_driver(cli.backend)?;
    let manager = MigConfigManager::new(driver);

    match cli.command {
        Commands::Export {
            output_format,
            placements,
        } => {
            let stdout = std::io::stdout();
            if placements {
                let view = manager.get_mig_placements()?;
                output::write_output(&mut stdout.lock(), &view, output_format)?;
            } else {
                let view = manager.export_mig_configs()?;
                output::write_output(&mut stdout.lock(), &view, output_format)?;
            }
        }
    }

    Ok(())
}

/// Logs go to stderr so exported documents stay parseable
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
