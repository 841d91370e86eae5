//! Command-line interface for dirstress
//!
//! # Usage Examples
//!
//! ```bash
//! # Run a scenario against a directory, failing on breached thresholds
//! dirstress run --config search.yaml --summary-output report.json
//!
//! # Override the target and mode of a run file
//! dirstress run --config search.yaml \
//!   --target ldap://10.0.0.5:389 \
//!   --mode password-spray \
//!   --credentials-file users.csv
//!
//! # Dry run against an in-memory directory
//! dirstress run --config search.yaml --dry-run
//!
//! # Print a login storm schedule
//! dirstress preset login-storm --ramp-up 30s --duration 2m --vus 200
//! ```

mod stress;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dirstress::{PresetOpts, RunOpts};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dirstress")]
#[command(about = "A load generator for LDAP directory servers")]
#[command(long_about = None)]
struct Cli {
    /// Log filter, overriding RUST_LOG (e.g. `info`, `stress_engine=debug`)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and exit non-zero when a threshold fails
    Run {
        #[command(flatten)]
        opts: RunOpts,
    },

    /// Check a run file and its credential source
    Validate {
        /// Run file (YAML)
        #[arg(long, env = "DIRSTRESS_CONFIG")]
        config: PathBuf,
    },

    /// Print a ready-made scenario as YAML
    Preset {
        #[command(subcommand)]
        preset: PresetKind,
    },
}

#[derive(Subcommand)]
enum PresetKind {
    /// Bind-only ramp up, hold and ramp down
    LoginStorm {
        #[command(flatten)]
        opts: PresetOpts,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log level '{level}'"))?,
        None => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run { opts } => stress::run_stress(opts).await,
        Commands::Validate { config } => {
            stress::run_validate(&config)?;
            Ok(0)
        }
        Commands::Preset { preset } => match preset {
            PresetKind::LoginStorm { opts } => {
                stress::run_preset(&opts)?;
                Ok(0)
            }
        },
    }
}
