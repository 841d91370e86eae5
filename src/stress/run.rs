//! Run, validate and preset handlers.

use anyhow::Context;
use directory_client::testing::MemoryDirectory;
use directory_ldap::LdapConnector;
use dirstress::{PresetOpts, RunOpts};
use std::path::Path;
use std::time::Duration;
use stress_core::{format_duration, Preset, RunConfig};
use stress_credential_source::{CredentialProvider, CredentialSource};
use stress_engine::{format_table, RunSummary, ScenarioExecutor, StressReport};
use tracing::info;

use super::{mask_secret, mask_target};

/// Latency of every operation against the dry-run directory.
const DRY_RUN_LATENCY: Duration = Duration::from_millis(5);

fn load_config(path: &Path) -> anyhow::Result<RunConfig> {
    RunConfig::from_file(path).with_context(|| format!("Failed to load run file {path:?}"))
}

fn load_credentials(config: &RunConfig) -> CredentialProvider {
    match &config.credentials_file {
        Some(path) => CredentialProvider::from_csv_path(path, config.default_credential()),
        None => CredentialProvider::single(config.default_credential()),
    }
}

/// In-memory directory that knows every credential the run can pick.
fn dry_run_directory(config: &RunConfig, credentials: &CredentialProvider) -> MemoryDirectory {
    let mut directory = MemoryDirectory::new()
        .with_latency(DRY_RUN_LATENCY)
        .with_user(&config.bind_dn, &config.password);
    match credentials.source() {
        CredentialSource::Single(credential) => {
            directory = directory.with_user(&credential.dn, &credential.secret);
        }
        CredentialSource::Pool(pool) => {
            for credential in pool.iter() {
                directory = directory.with_user(&credential.dn, &credential.secret);
            }
        }
    }
    directory
}

/// Execute a run and return the process exit code.
pub async fn run_stress(opts: RunOpts) -> anyhow::Result<i32> {
    let mut config = load_config(&opts.config)?;
    opts.apply(&mut config);
    config
        .validate()
        .context("Run configuration is invalid after command-line overrides")?;

    let credentials = load_credentials(&config);
    info!(
        target = %mask_target(&config.target_url()),
        bind_dn = %config.bind_dn,
        secret = mask_secret(&config.password),
        mode = %config.mode,
        credentials = credentials.len(),
        seed = ?config.seed,
        "Loaded run configuration"
    );

    let summary: RunSummary = if opts.dry_run {
        info!("[DRY-RUN] Running the schedule against an in-memory directory");
        let directory = dry_run_directory(&config, &credentials);
        ScenarioExecutor::new(config.clone(), directory, credentials)
            .run()
            .await
    } else {
        let connector = LdapConnector::new(config.operation_timeout);
        ScenarioExecutor::new(config.clone(), connector, credentials)
            .run()
            .await
    };

    let report = StressReport::new(&config, summary);
    println!("{}", format_table(&report));

    if let Some(path) = &opts.summary_output {
        let json = report.to_json().context("Failed to serialize run report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run report to {path:?}"))?;
        info!("Run report written to {:?}", path);
    }

    Ok(report.exit_code())
}

/// Load and check a run file without touching the directory.
pub fn run_validate(path: &Path) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let credentials = load_credentials(&config);

    println!("Run file {} is valid", path.display());
    println!("  target:     {}", mask_target(&config.target_url()));
    println!("  mode:       {}", config.mode);
    println!(
        "  scenario:   {} ({}, {} stages, up to {} workers over {})",
        config.scenario.name,
        config.scenario.executor,
        config.scenario.stages.len(),
        config.scenario.max_vus(),
        format_duration(config.scenario.total_duration())
    );
    println!(
        "  credentials: {} ({})",
        credentials.len(),
        if credentials.is_pool() { "pool" } else { "single" }
    );
    for spec in config.thresholds.specs() {
        let expressions: Vec<String> = spec.expressions.iter().map(|e| e.to_string()).collect();
        println!("  threshold:  {}: {}", spec.metric, expressions.join(", "));
    }
    Ok(())
}

/// Print the login storm schedule as YAML.
pub fn run_preset(opts: &PresetOpts) -> anyhow::Result<()> {
    let preset = Preset::login_storm(opts.ramp_up, opts.duration, opts.vus);
    preset
        .scenario
        .validate()
        .context("Preset parameters do not form a usable schedule")?;
    let yaml = preset.to_yaml().context("Failed to render preset")?;
    print!("{yaml}");
    Ok(())
}
