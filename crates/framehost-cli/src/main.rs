//! framehost CLI - simulated host for framehost modules.

mod colors;
mod inspect;
mod logging;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "framehost")]
#[command(about = "Frame scheduler and module host")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Attach a host, load modules and drive frames
    Run {
        /// Path to the host config (JSON)
        #[arg(short, long, default_value = framehost_core::config::DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Load a module in addition to the configured ones
        #[arg(short, long)]
        module: Vec<PathBuf>,

        /// Managed runtime library, overriding the config
        #[arg(long)]
        runtime: Option<PathBuf>,

        /// Stop after this many frames (default: run until Ctrl+C)
        #[arg(long)]
        frames: Option<u64>,

        /// Frames per second
        #[arg(long, default_value = "60")]
        fps: f64,
    },

    /// Load a module library and print its hooks
    Inspect {
        /// Path to the module library
        path: PathBuf,
    },

    /// Print the effective configuration as JSON
    Config {
        /// Path to the host config (JSON)
        #[arg(short, long, default_value = framehost_core::config::DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            module,
            runtime,
            frames,
            fps,
        } => {
            let options = run::RunOptions {
                config,
                modules: module,
                runtime,
                frames,
                fps,
                verbose: cli.verbose,
            };
            run::execute(options).await?;
        }

        Commands::Inspect { path } => {
            logging::init_cli(cli.verbose);
            inspect::execute(&path)?;
        }

        Commands::Config { config } => {
            logging::init_cli(cli.verbose);
            let config = framehost_core::HostConfig::load_or_default(&config)?;
            println!("{}", config.to_json_pretty()?);
        }
    }

    Ok(())
}
