//! Run report: status classification, recommendations and rendering.

use crate::metrics::TrendSummary;
use crate::recorder::RunSummary;
use crate::thresholds::{evaluate_thresholds, ThresholdOutcome};
use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use serde::Serialize;
use std::fmt;
use stress_core::{AttackMode, RunConfig};

/// Failure percentage above which a run is unstable.
pub const UNSTABLE_FAILURE_PERCENT: f64 = 5.0;

/// A run whose active window falls short of the schedule by more than this
/// many seconds stopped early.
pub const STOPPED_EARLY_SLACK_SECS: f64 = 5.0;

/// Average latency above which the report recommends investigation.
pub const HIGH_LATENCY_MS: f64 = 2000.0;

/// Completed runs above this many workers with average latency under
/// [`HEALTHY_LATENCY_MS`] are reported as excellent.
pub const EXCELLENT_MIN_VUS: u64 = 500;

pub const HEALTHY_LATENCY_MS: f64 = 1000.0;

const TOP_FAILURES: usize = 5;

/// Overall health of a run, independent of the threshold verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Results stopped arriving well before the schedule ended
    StoppedEarly,
    /// More than 5% of iterations failed
    Unstable,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "COMPLETED"),
            RunStatus::StoppedEarly => write!(f, "STOPPED EARLY"),
            RunStatus::Unstable => write!(f, "UNSTABLE"),
        }
    }
}

/// Occurrences of one failing check (or of dial errors).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureCount {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub scenario: String,
    pub target: String,
    pub mode: AttackMode,
    pub max_vus: u64,
    pub generated_at: DateTime<Utc>,
    pub status: RunStatus,
    /// One-line description of how the run went
    pub status_message: String,
    /// Threshold verdict; the only input to the exit code
    pub passed: bool,
    pub total_iterations: u64,
    pub success_percent: f64,
    pub failure_percent: f64,
    pub latency: TrendSummary,
    pub peak_iterations_per_second: u64,
    pub average_iterations_per_second: f64,
    pub thresholds: Vec<ThresholdOutcome>,
    pub recommendations: Vec<String>,
    pub top_failures: Vec<FailureCount>,
    pub summary: RunSummary,
}

impl StressReport {
    /// Evaluate thresholds and classify the run.
    pub fn new(config: &RunConfig, summary: RunSummary) -> Self {
        let thresholds = evaluate_thresholds(&config.thresholds, &summary);
        let passed = thresholds.iter().all(|t| t.passed);

        let total = summary.attempts;
        let failures = summary.failed_checks() + summary.dial_errors;
        let failure_percent = percent(failures, total);
        let success_percent = if total == 0 {
            0.0
        } else {
            100.0 - failure_percent
        };

        let stopped_early =
            (summary.active_secs() as f64) < summary.scheduled_secs - STOPPED_EARLY_SLACK_SECS;
        let unstable = failure_percent > UNSTABLE_FAILURE_PERCENT;
        let status = if unstable {
            RunStatus::Unstable
        } else if stopped_early {
            RunStatus::StoppedEarly
        } else {
            RunStatus::Completed
        };

        let latency = summary.iteration_duration;
        let max_vus = config.scenario.max_vus();
        let average_iterations_per_second = summary.average_iterations_per_second();
        let status_message = match status {
            RunStatus::Completed
                if max_vus > EXCELLENT_MIN_VUS && latency.avg < HEALTHY_LATENCY_MS =>
            {
                format!(
                    "Excellent performance. Sustained {} workers with healthy latency.",
                    format_count(max_vus)
                )
            }
            RunStatus::Completed => format!(
                "Run completed. Sustained an average of {:.1} iterations/s over {}s.",
                average_iterations_per_second,
                format_count(summary.active_secs())
            ),
            RunStatus::StoppedEarly => format!(
                "Results stopped early ({}s of a {:.0}s schedule).",
                format_count(summary.active_secs()),
                summary.scheduled_secs
            ),
            RunStatus::Unstable => format!(
                "Run unstable: {failure_percent:.2}% of iterations failed."
            ),
        };

        let mut recommendations = Vec::new();
        if stopped_early {
            recommendations.push(format!(
                "Critical: results stopped after {}s of a {:.0}s schedule. The directory may have stopped responding.",
                summary.active_secs(),
                summary.scheduled_secs
            ));
        }
        if unstable {
            recommendations.push(format!(
                "High failure rate ({failure_percent:.2}%). Check the directory logs for authentication rejections."
            ));
        }
        if latency.avg > HIGH_LATENCY_MS {
            recommendations.push(
                "High latency (>2s) detected. Directory response is severely degraded.".to_string(),
            );
        }
        if !summary.anomalies.is_empty() {
            recommendations.push(format!(
                "{} binds succeeded with a deliberately wrong secret. Review password and lockout policy.",
                summary.anomalies.len()
            ));
        }
        if !summary.orphaned_entries.is_empty() {
            recommendations.push(format!(
                "{} throwaway entries were left behind by interrupted writes and need manual removal: {}",
                summary.orphaned_entries.len(),
                summary.orphaned_entries.join("; ")
            ));
        }

        let mut top_failures: Vec<FailureCount> = summary
            .checks
            .iter()
            .filter(|c| c.fails > 0)
            .map(|c| FailureCount {
                name: c.name.to_string(),
                count: c.fails,
            })
            .collect();
        if summary.dial_errors > 0 {
            top_failures.push(FailureCount {
                name: "dial error".to_string(),
                count: summary.dial_errors,
            });
        }
        top_failures.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        top_failures.truncate(TOP_FAILURES);

        Self {
            scenario: config.scenario.name.clone(),
            target: config.target_url(),
            mode: config.mode,
            max_vus,
            generated_at: Utc::now(),
            status,
            status_message,
            passed,
            total_iterations: total,
            success_percent,
            failure_percent,
            latency,
            peak_iterations_per_second: summary.peak_iterations_per_second(),
            average_iterations_per_second,
            thresholds,
            recommendations,
            top_failures,
            summary,
        }
    }

    /// Process exit code: 0 when every threshold held.
    pub fn exit_code(&self) -> i32 {
        if self.passed {
            0
        } else {
            1
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn format_ms(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.3}s", ms / 1000.0)
    } else {
        format!("{ms:.1}ms")
    }
}

/// `1234567` as `1,234,567`.
fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

fn status_cell(status: RunStatus) -> Cell {
    let color = match status {
        RunStatus::Completed => Color::Green,
        RunStatus::StoppedEarly => Color::Red,
        RunStatus::Unstable => Color::Yellow,
    };
    Cell::new(status.to_string()).fg(color)
}

/// Render the report as terminal tables.
pub fn format_table(report: &StressReport) -> String {
    let summary = &report.summary;
    let mut output = String::new();

    let mut run = Table::new();
    run.load_preset(UTF8_FULL);
    run.set_header(vec!["Run", "Value"]);
    run.add_row(vec![Cell::new("Status"), status_cell(report.status)]);
    run.add_row(vec!["Summary", report.status_message.as_str()]);
    run.add_row(vec!["Target", report.target.as_str()]);
    run.add_row(vec![
        Cell::new("Mode / scenario"),
        Cell::new(format!("{} / {}", report.mode, report.scenario)),
    ]);
    run.add_row(vec![
        Cell::new("Iterations"),
        Cell::new(format!(
            "{} ({} interrupted)",
            format_count(report.total_iterations),
            format_count(summary.interrupted)
        )),
    ]);
    run.add_row(vec![
        Cell::new("Success / fail"),
        Cell::new(format!(
            "{:.2}% / {:.2}%",
            report.success_percent, report.failure_percent
        )),
    ]);
    run.add_row(vec![
        Cell::new("Latency avg / p90 / p95 / max"),
        Cell::new(format!(
            "{} / {} / {} / {}",
            format_ms(report.latency.avg),
            format_ms(report.latency.p90),
            format_ms(report.latency.p95),
            format_ms(report.latency.max)
        )),
    ]);
    run.add_row(vec![
        Cell::new("Response time p95"),
        Cell::new(format_ms(summary.response_time.p95)),
    ]);
    run.add_row(vec![
        Cell::new("Throughput peak / avg"),
        Cell::new(format!(
            "{} it/s / {:.1} it/s",
            format_count(report.peak_iterations_per_second),
            report.average_iterations_per_second
        )),
    ]);
    run.add_row(vec![
        Cell::new("Workers peak / max"),
        Cell::new(format!("{} / {}", summary.peak_active, report.max_vus)),
    ]);
    run.add_row(vec![
        Cell::new("Dial / auth / operation errors"),
        Cell::new(format!(
            "{} / {} / {}",
            format_count(summary.dial_errors),
            format_count(summary.auth_errors),
            format_count(summary.operation_errors)
        )),
    ]);
    if report.mode == AttackMode::WriteStress {
        run.add_row(vec![
            Cell::new("Write fallbacks"),
            Cell::new(format_count(summary.write_fallbacks)),
        ]);
    }
    if !summary.anomalies.is_empty() {
        run.add_row(vec![
            Cell::new("Anomalies"),
            Cell::new(format_count(summary.anomalies.len() as u64)).fg(Color::Red),
        ]);
    }
    output.push_str(&run.to_string());
    output.push('\n');

    if !summary.checks.is_empty() {
        let mut checks = Table::new();
        checks.load_preset(UTF8_FULL);
        checks.set_header(vec!["Check", "Passes", "Fails", "Rate"]);
        for check in &summary.checks {
            checks.add_row(vec![
                Cell::new(check.name),
                Cell::new(format_count(check.passes)),
                Cell::new(format_count(check.fails)),
                Cell::new(format!(
                    "{:.2}%",
                    percent(check.passes, check.total())
                )),
            ]);
        }
        output.push_str(&checks.to_string());
        output.push('\n');
    }

    if !report.thresholds.is_empty() {
        let mut thresholds = Table::new();
        thresholds.load_preset(UTF8_FULL);
        thresholds.set_header(vec!["Metric", "Threshold", "Observed", "Result"]);
        for outcome in &report.thresholds {
            let observed = outcome
                .observed
                .map(|v| format!("{v:.3}"))
                .unwrap_or_else(|| "-".to_string());
            let result = if outcome.passed {
                Cell::new("PASS").fg(Color::Green)
            } else {
                Cell::new("FAIL").fg(Color::Red)
            };
            thresholds.add_row(vec![
                Cell::new(&outcome.metric),
                Cell::new(&outcome.expression),
                Cell::new(observed),
                result,
            ]);
        }
        output.push_str(&thresholds.to_string());
        output.push('\n');
    }

    if !report.top_failures.is_empty() {
        output.push_str("\nTop failures:\n");
        for failure in &report.top_failures {
            output.push_str(&format!(
                "  {}: {}\n",
                failure.name,
                format_count(failure.count)
            ));
        }
    }

    output.push_str("\nRecommendations:\n");
    if report.recommendations.is_empty() {
        output.push_str("  No specific issues detected.\n");
    }
    for recommendation in &report.recommendations {
        output.push_str(&format!("  - {recommendation}\n"));
    }

    output.push_str(&format!(
        "\nVerdict: {}\n",
        if report.passed { "PASSED" } else { "FAILED" }
    ));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Trend;
    use crate::recorder::{Anomaly, CheckSummary};
    use std::time::Duration;
    use stress_core::{Credential, ScenarioConfig, ThresholdSet, ThresholdSpec};

    fn config() -> RunConfig {
        RunConfig::new(
            "dc01.corp.local",
            "dc=corp,dc=local",
            Credential::new("cn=svc,dc=corp,dc=local", "pw"),
            AttackMode::SearchComplex,
            ScenarioConfig::constant(10, Duration::from_secs(60)),
        )
        .with_thresholds(ThresholdSet::new(vec![ThresholdSpec::parse(
            "iteration_duration",
            &["p(95)<2000"],
        )
        .unwrap()]))
    }

    fn summary(passes: u64, fails: u64, seconds: usize) -> RunSummary {
        let latencies: Vec<f64> = (0..passes + fails).map(|i| 100.0 + i as f64).collect();
        let trend = Trend::from_values(latencies);
        RunSummary {
            scheduled_secs: 60.0,
            elapsed_secs: 60.0,
            iterations: passes + fails,
            attempts: passes + fails,
            checks: vec![CheckSummary {
                name: "search success",
                passes,
                fails,
            }],
            iterations_per_second: vec![(passes + fails) / seconds as u64; seconds],
            iteration_duration: trend.summary(),
            iteration_trend: trend,
            ..Default::default()
        }
    }

    #[test]
    fn test_completed_run() {
        let report = StressReport::new(&config(), summary(600, 0, 60));
        assert_eq!(report.status, RunStatus::Completed);
        assert!(report.passed);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.success_percent, 100.0);
        assert!(report.recommendations.is_empty());
        assert_eq!(report.target, "ldap://dc01.corp.local:389");
        assert_eq!(report.peak_iterations_per_second, 10);
        assert!(report.status_message.starts_with("Run completed"));
    }

    #[test]
    fn test_leftover_entries_recommendation() {
        let mut summary = summary(600, 0, 60);
        summary.orphaned_entries = vec!["ou=dirstress_abc,dc=corp,dc=local".to_string()];
        let report = StressReport::new(&config(), summary);
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.recommendations.len(), 1);
        assert!(report.recommendations[0].contains("ou=dirstress_abc,dc=corp,dc=local"));
    }

    #[test]
    fn test_excellent_performance_message() {
        let mut config = config();
        config.scenario = ScenarioConfig::constant(600, Duration::from_secs(60));
        let report = StressReport::new(&config, summary(600, 0, 60));
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(
            report.status_message,
            "Excellent performance. Sustained 600 workers with healthy latency."
        );

        let mut slow = summary(600, 0, 60);
        slow.iteration_trend = Trend::from_values(vec![1500.0; 600]);
        slow.iteration_duration = slow.iteration_trend.summary();
        let report = StressReport::new(&config, slow);
        assert!(report.status_message.starts_with("Run completed"));

        let report = StressReport::new(&config, summary(90, 10, 60));
        assert_eq!(report.status, RunStatus::Unstable);
        assert!(report.status_message.starts_with("Run unstable"));
    }

    #[test]
    fn test_unstable_run() {
        let report = StressReport::new(&config(), summary(90, 10, 60));
        assert_eq!(report.status, RunStatus::Unstable);
        assert_eq!(report.failure_percent, 10.0);
        assert!(report.recommendations[0].contains("High failure rate"));
        assert_eq!(
            report.top_failures,
            vec![FailureCount {
                name: "search success".to_string(),
                count: 10
            }]
        );
        // Status does not decide the verdict
        assert!(report.passed);
    }

    #[test]
    fn test_stopped_early() {
        let report = StressReport::new(&config(), summary(300, 0, 30));
        assert_eq!(report.status, RunStatus::StoppedEarly);
        assert!(report.recommendations[0].starts_with("Critical"));

        let report = StressReport::new(&config(), summary(560, 0, 56));
        assert_eq!(report.status, RunStatus::Completed);
    }

    #[test]
    fn test_threshold_failure_sets_exit_code() {
        let mut summary = summary(100, 0, 60);
        summary.iteration_trend = Trend::from_values(vec![2500.0; 100]);
        summary.iteration_duration = summary.iteration_trend.summary();
        let report = StressReport::new(&config(), summary);
        assert!(!report.passed);
        assert_eq!(report.exit_code(), 1);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("High latency")));
    }

    #[test]
    fn test_format_table() {
        let mut summary = summary(90, 10, 60);
        summary.anomalies.push(Anomaly::new(
            "handled failure",
            "cn=bob,dc=corp,dc=local",
            "bind with a deliberately wrong secret succeeded",
        ));
        let report = StressReport::new(&config(), summary);
        let table = format_table(&report);
        assert!(table.contains("UNSTABLE"));
        assert!(table.contains("search success"));
        assert!(table.contains("p(95)<2000"));
        assert!(table.contains("Anomalies"));
        assert!(table.contains("Verdict: PASSED"));
    }

    #[test]
    fn test_json_output() {
        let report = StressReport::new(&config(), summary(10, 0, 60));
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["mode"], "search-complex");
        assert_eq!(json["thresholds"][0]["metric"], "iteration_duration");
        assert_eq!(json["passed"], true);
        assert!(json["status_message"].is_string());
        assert!(json["summary"]["timeline"].is_array());
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1234567), "1,234,567");
    }
}
