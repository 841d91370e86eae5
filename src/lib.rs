//! dirstress: a load generator for LDAP directory servers.
//!
//! ```bash
//! # Run a scenario file against a directory
//! dirstress run --config login_storm.yaml --target ldap://dc01.corp.local:389
//!
//! # Exercise the whole pipeline without a server
//! dirstress run --config login_storm.yaml --dry-run
//!
//! # Check a scenario file
//! dirstress validate --config login_storm.yaml
//!
//! # Print the standard login storm schedule
//! dirstress preset login-storm --ramp-up 30s --duration 1m --vus 200
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use stress_core::{parse_duration, AttackMode, RunConfig};

#[derive(Parser, Clone, Debug)]
pub struct RunOpts {
    /// Run file (YAML)
    #[arg(long, env = "DIRSTRESS_CONFIG")]
    pub config: PathBuf,

    /// Directory address, overriding the run file
    #[arg(long, env = "DIRSTRESS_TARGET")]
    pub target: Option<String>,

    /// Attack mode, overriding the run file
    #[arg(long)]
    pub mode: Option<AttackMode>,

    /// Bind secret, overriding the run file
    #[arg(long, env = "DIRSTRESS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// CSV of `distinguishedName,secret` rows
    #[arg(long)]
    pub credentials_file: Option<PathBuf>,

    /// Seed for every random choice of the run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write the run report as JSON to this path
    #[arg(long)]
    pub summary_output: Option<PathBuf>,

    /// Run against an in-memory directory instead of the target
    #[arg(long)]
    pub dry_run: bool,
}

impl RunOpts {
    /// Apply command-line overrides on top of a loaded run file.
    pub fn apply(&self, config: &mut RunConfig) {
        if let Some(target) = &self.target {
            config.target = target.clone();
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(password) = &self.password {
            config.password = password.clone();
        }
        if let Some(path) = &self.credentials_file {
            config.credentials_file = Some(path.clone());
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct PresetOpts {
    /// Time to ramp from 0 to the peak
    #[arg(long, value_parser = parse_duration, default_value = "30s")]
    pub ramp_up: Duration,

    /// Time to hold the peak
    #[arg(long, value_parser = parse_duration, default_value = "1m")]
    pub duration: Duration,

    /// Peak number of virtual users
    #[arg(long, default_value = "50")]
    pub vus: u64,
}
