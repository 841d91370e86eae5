//! Threshold evaluation over a finished run.

use crate::recorder::RunSummary;
use serde::Serialize;
use stress_core::{Aggregation, ThresholdExpr, ThresholdMetric, ThresholdSet};

/// Result of one threshold expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub expression: String,
    /// Observed value; `None` when the aggregation does not apply to the metric
    pub observed: Option<f64>,
    pub passed: bool,
}

/// Value of `aggregation` over `metric`, or `None` when it does not apply.
pub fn observe(
    summary: &RunSummary,
    metric: ThresholdMetric,
    aggregation: Aggregation,
) -> Option<f64> {
    match (metric, aggregation) {
        (ThresholdMetric::Checks, Aggregation::Rate) => Some(summary.checks_rate()),
        (ThresholdMetric::Errors, Aggregation::Rate) => Some(summary.error_rate()),
        (ThresholdMetric::IterationDuration, Aggregation::Count | Aggregation::Rate) => None,
        (ThresholdMetric::IterationDuration, aggregation) => {
            summary.iteration_trend.aggregate(aggregation)
        }
        (ThresholdMetric::ResponseTime, Aggregation::Count | Aggregation::Rate) => None,
        (ThresholdMetric::ResponseTime, aggregation) => summary.response_trend.aggregate(aggregation),
        (ThresholdMetric::Iterations, Aggregation::Count) => Some(summary.iterations as f64),
        (ThresholdMetric::Iterations, Aggregation::Rate) => Some(summary.iteration_rate()),
        (ThresholdMetric::DialErrors, Aggregation::Count) => Some(summary.dial_errors as f64),
        (ThresholdMetric::DialErrors, Aggregation::Rate) => {
            if summary.elapsed_secs > 0.0 {
                Some(summary.dial_errors as f64 / summary.elapsed_secs)
            } else {
                Some(0.0)
            }
        }
        _ => None,
    }
}

fn evaluate(summary: &RunSummary, metric: ThresholdMetric, expr: &ThresholdExpr) -> ThresholdOutcome {
    let observed = observe(summary, metric, expr.aggregation);
    ThresholdOutcome {
        metric: metric.name().to_string(),
        expression: expr.to_string(),
        observed,
        passed: observed.is_some_and(|value| expr.is_satisfied_by(value)),
    }
}

/// Evaluate every expression of every threshold against `summary`.
pub fn evaluate_thresholds(thresholds: &ThresholdSet, summary: &RunSummary) -> Vec<ThresholdOutcome> {
    thresholds
        .specs()
        .iter()
        .flat_map(|spec| {
            spec.expressions
                .iter()
                .map(move |expr| evaluate(summary, spec.metric, expr))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Trend;
    use crate::recorder::CheckSummary;
    use stress_core::ThresholdSpec;

    fn summary() -> RunSummary {
        RunSummary {
            elapsed_secs: 10.0,
            iterations: 95,
            attempts: 100,
            dial_errors: 5,
            auth_errors: 1,
            checks: vec![CheckSummary {
                name: "search success",
                passes: 90,
                fails: 5,
            }],
            iteration_trend: Trend::from_values((1..=100).map(|v| v as f64 * 10.0).collect()),
            response_trend: Trend::from_values(vec![100.0, 200.0, 300.0]),
            ..Default::default()
        }
    }

    fn set(metric: &str, exprs: &[&str]) -> ThresholdSet {
        ThresholdSet::new(vec![ThresholdSpec::parse(metric, exprs).unwrap()])
    }

    #[test]
    fn test_trend_threshold() {
        let outcomes = evaluate_thresholds(
            &set("iteration_duration", &["p(95)<2000", "avg<400"]),
            &summary(),
        );
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].passed);
        assert_eq!(outcomes[0].observed, Some(960.0));
        assert!(!outcomes[1].passed);
        assert_eq!(outcomes[1].expression, "avg<400");
    }

    #[test]
    fn test_error_rate_threshold() {
        let outcomes = evaluate_thresholds(&set("ldap_result_code", &["rate<0.01"]), &summary());
        assert_eq!(outcomes[0].metric, "ldap_errors");
        assert_eq!(outcomes[0].observed, Some(0.06));
        assert!(!outcomes[0].passed);
    }

    #[test]
    fn test_counter_thresholds() {
        let outcomes = evaluate_thresholds(
            &ThresholdSet::new(vec![
                ThresholdSpec::parse("iterations", &["count>50", "rate>=9.5"]).unwrap(),
                ThresholdSpec::parse("dial_errors", &["count==0"]).unwrap(),
            ]),
            &summary(),
        );
        let passed: Vec<bool> = outcomes.iter().map(|o| o.passed).collect();
        assert_eq!(passed, vec![true, true, false]);
    }

    #[test]
    fn test_checks_rate() {
        let outcomes = evaluate_thresholds(&set("checks", &["rate>0.9"]), &summary());
        assert!(outcomes[0].passed);
    }

    #[test]
    fn test_empty_trend_evaluates_to_zero() {
        let outcomes = evaluate_thresholds(
            &set("ldap_response_time", &["p(95)<2000"]),
            &RunSummary::default(),
        );
        assert_eq!(outcomes[0].observed, Some(0.0));
        assert!(outcomes[0].passed);
    }

    #[test]
    fn test_inapplicable_aggregation_fails() {
        assert_eq!(
            observe(&summary(), ThresholdMetric::Checks, Aggregation::Avg),
            None
        );
        let expr = ThresholdExpr::new(Aggregation::Count, stress_core::Comparison::Gt, 0.0);
        let outcome = evaluate(&summary(), ThresholdMetric::ResponseTime, &expr);
        assert!(!outcome.passed);
    }
}
