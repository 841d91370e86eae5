//! Whole runs against the in-memory directory, on paused time.

use directory_client::testing::MemoryDirectory;
use std::time::Duration;
use stress_core::{
    AttackMode, Credential, RunConfig, ScenarioConfig, Stage, ThinkTime, ThresholdSet,
    ThresholdSpec,
};
use stress_credential_source::CredentialProvider;
use stress_engine::{format_table, RunStatus, ScenarioExecutor, StressReport};

const BASE: &str = "dc=corp,dc=local";
const SVC: &str = "cn=svc_stress,ou=Service,dc=corp,dc=local";
const ALICE: &str = "cn=alice,ou=Staff,dc=corp,dc=local";
const BOB: &str = "cn=bob,ou=Staff,dc=corp,dc=local";

fn directory() -> MemoryDirectory {
    MemoryDirectory::new()
        .with_user(SVC, "svc-secret")
        .with_user(ALICE, "alice-secret")
        .with_user(BOB, "bob-secret")
        .with_latency(Duration::from_millis(50))
}

fn config(mode: AttackMode, scenario: ScenarioConfig) -> RunConfig {
    RunConfig::new(
        "dc01.corp.local",
        BASE,
        Credential::new(SVC, "svc-secret"),
        mode,
        scenario,
    )
    .with_seed(2024)
    .with_think_time(ThinkTime::fixed(Duration::from_millis(200)))
}

async fn run(config: RunConfig, directory: MemoryDirectory, credentials: CredentialProvider) -> StressReport {
    let summary = ScenarioExecutor::new(config.clone(), directory, credentials)
        .run()
        .await;
    StressReport::new(&config, summary)
}

async fn run_single(config: RunConfig, directory: MemoryDirectory) -> StressReport {
    let credentials = CredentialProvider::single(config.default_credential());
    run(config, directory, credentials).await
}

#[tokio::test(start_paused = true)]
async fn test_search_complex_run() {
    let directory = directory();
    let scenario = ScenarioConfig::ramping(5, vec![Stage::new(Duration::from_secs(10), 5)]);
    let report = run_single(config(AttackMode::SearchComplex, scenario), directory.clone()).await;
    let summary = &report.summary;

    // bind + search at 50ms each, then 200ms of think-time: 300ms per iteration
    let expected = 10.0 / 0.3 * 5.0;
    let iterations = summary.iterations as f64;
    assert!(
        (iterations - expected).abs() <= expected * 0.1,
        "{} iterations, expected about {:.0}",
        iterations,
        expected
    );

    assert_eq!(summary.check_stream.len() as u64, summary.iterations);
    assert!(summary
        .check_stream
        .iter()
        .all(|c| c.name == "search success" && c.passed));
    assert_eq!(summary.checks.len(), 1);
    assert_eq!(summary.peak_active, 5);

    // Think-time is not part of the iteration duration
    assert!(summary.iteration_duration.max < 200.0);
    assert!(summary.iteration_duration.min >= 100.0);

    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.passed);
    assert!(directory
        .search_log()
        .iter()
        .all(|r| r.filter.starts_with("(cn=*") && r.base_dn == BASE));
}

#[tokio::test(start_paused = true)]
async fn test_every_connection_closed_once() {
    let directory = directory().with_failing_searches();
    let scenario = ScenarioConfig::ramping(
        0,
        vec![
            Stage::new(Duration::from_secs(2), 8),
            Stage::new(Duration::from_secs(2), 8),
            Stage::new(Duration::from_secs(2), 0),
        ],
    );
    let report = run_single(config(AttackMode::Membership, scenario), directory.clone()).await;

    let stats = directory.stats();
    assert!(stats.opened > 0);
    assert_eq!(stats.opened, stats.closed);
    assert_eq!(stats.close_calls, stats.opened);
    assert_eq!(stats.open_now, 0);
    assert!(stats.peak_open <= 8);

    assert_eq!(report.summary.passed_checks(), 0);
    assert_eq!(report.summary.operation_errors, report.summary.iterations);
    assert_eq!(report.status, RunStatus::Unstable);
}

#[tokio::test(start_paused = true)]
async fn test_password_spray_rejections_pass() {
    let scenario = ScenarioConfig::constant(3, Duration::from_secs(3));
    let report = run_single(config(AttackMode::PasswordSpray, scenario), directory()).await;

    assert!(report.summary.iterations > 0);
    assert_eq!(report.summary.failed_checks(), 0);
    assert!(report.summary.anomalies.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_password_spray_accepted_bind_is_an_anomaly() {
    let directory = directory().accept_any_secret();
    let scenario = ScenarioConfig::constant(2, Duration::from_secs(3));
    let report = run_single(config(AttackMode::PasswordSpray, scenario), directory).await;
    let summary = &report.summary;

    assert!(summary.iterations > 0);
    assert_eq!(summary.passed_checks(), 0);
    assert_eq!(summary.anomalies.len() as u64, summary.iterations);
    assert!(summary.anomalies.iter().all(|a| a.dn == SVC));
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.contains("deliberately wrong secret")));
}

#[tokio::test(start_paused = true)]
async fn test_write_stress_leaves_no_entries() {
    let directory = directory();
    let scenario = ScenarioConfig::constant(4, Duration::from_secs(2));
    let report = run_single(config(AttackMode::WriteStress, scenario), directory.clone()).await;

    let stats = directory.stats();
    assert_eq!(report.summary.failed_checks(), 0);
    assert_eq!(report.summary.write_fallbacks, 0);
    assert_eq!(stats.adds, report.summary.iterations);
    assert_eq!(stats.adds, stats.deletes);
    assert!(directory.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_write_stress_falls_back_to_read() {
    let directory = directory().read_only();
    let scenario = ScenarioConfig::constant(2, Duration::from_secs(2));
    let report = run_single(config(AttackMode::WriteStress, scenario), directory.clone()).await;

    let summary = &report.summary;
    assert!(summary.iterations > 0);
    assert_eq!(summary.failed_checks(), 0);
    assert_eq!(summary.write_fallbacks, summary.iterations);
    assert!(directory.entries().is_empty());
    assert!(directory.search_log().iter().all(|r| r.base_dn == SVC));
    assert!(format_table(&report).contains("Write fallbacks"));
}

#[tokio::test(start_paused = true)]
async fn test_credential_pool_from_csv() {
    let csv = format!(
        "distinguishedName,secret\n\"{ALICE}\",alice-secret\n\"{BOB}\",bob-secret\n\"cn=mallory,{BASE}\",guess\n"
    );
    let config = config(
        AttackMode::LoginStorm,
        ScenarioConfig::constant(4, Duration::from_secs(5)),
    );
    let credentials = CredentialProvider::from_csv_reader(csv.as_bytes(), config.default_credential());
    assert_eq!(credentials.len(), 3);

    let directory = directory();
    let report = run(config, directory.clone(), credentials).await;
    let summary = &report.summary;

    // Mallory is unknown to the directory, the other two bind fine
    assert!(summary.passed_checks() > 0);
    assert!(summary.failed_checks() > 0);
    assert_eq!(summary.auth_errors, summary.failed_checks());
    let stats = directory.stats();
    assert_eq!(stats.binds_rejected, summary.failed_checks());
    assert_eq!(stats.binds_accepted, summary.passed_checks());
}

#[tokio::test(start_paused = true)]
async fn test_thresholds_decide_the_verdict() {
    let thresholds = ThresholdSet::new(vec![
        ThresholdSpec::parse("checks", &["rate>0.99"]).unwrap(),
        ThresholdSpec::parse("iteration_duration", &["p(95)<2000", "avg<1000"]).unwrap(),
    ]);
    let scenario = ScenarioConfig::constant(2, Duration::from_secs(3));

    let healthy = run_single(
        config(AttackMode::SearchComplex, scenario.clone()).with_thresholds(thresholds.clone()),
        directory(),
    )
    .await;
    assert!(healthy.passed);
    assert_eq!(healthy.exit_code(), 0);
    assert_eq!(healthy.thresholds.len(), 3);
    assert!(healthy.thresholds.iter().all(|t| t.passed));

    let failing = run_single(
        config(AttackMode::SearchComplex, scenario).with_thresholds(thresholds),
        directory().with_failing_searches(),
    )
    .await;
    assert!(!failing.passed);
    assert_eq!(failing.exit_code(), 1);
    let checks = failing
        .thresholds
        .iter()
        .find(|t| t.metric == "checks")
        .unwrap();
    assert!(!checks.passed);
    assert_eq!(checks.observed, Some(0.0));
    assert!(format_table(&failing).contains("Verdict: FAILED"));
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_target_fails_run() {
    let scenario = ScenarioConfig::constant(2, Duration::from_secs(2));
    let config = config(AttackMode::SearchComplex, scenario).with_thresholds(ThresholdSet::new(
        vec![ThresholdSpec::parse("ldap_errors", &["rate<0.01"]).unwrap()],
    ));
    let report = run_single(config, MemoryDirectory::new().unreachable()).await;

    assert!(!report.passed);
    assert_eq!(report.summary.total_checks(), 0);
    assert_eq!(report.failure_percent, 100.0);
    assert_eq!(report.top_failures[0].name, "dial error");
}
