//! Threshold expressions evaluated once at the end of a run.
//!
//! A threshold binds a metric name to one or more expressions in the form
//! `<aggregation><operator><bound>`, e.g. `p(95)<2000` or `rate<0.01`.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Shape of the values a metric collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Fraction of true samples
    Rate,
    /// Distribution of millisecond samples
    Trend,
    /// Monotonic count
    Counter,
}

/// Metrics a threshold can be declared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ThresholdMetric {
    /// Pass rate over every recorded check
    Checks,
    /// Wall time of completed iterations, think-time excluded
    IterationDuration,
    /// Bind plus operation latency
    ResponseTime,
    /// Fraction of iterations that hit a dial, auth or operation error
    Errors,
    /// Completed iterations
    Iterations,
    /// Iterations that could not reach the target
    DialErrors,
}

impl ThresholdMetric {
    pub fn name(&self) -> &'static str {
        match self {
            ThresholdMetric::Checks => "checks",
            ThresholdMetric::IterationDuration => "iteration_duration",
            ThresholdMetric::ResponseTime => "ldap_response_time",
            ThresholdMetric::Errors => "ldap_errors",
            ThresholdMetric::Iterations => "iterations",
            ThresholdMetric::DialErrors => "dial_errors",
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            ThresholdMetric::Checks | ThresholdMetric::Errors => MetricKind::Rate,
            ThresholdMetric::IterationDuration | ThresholdMetric::ResponseTime => MetricKind::Trend,
            ThresholdMetric::Iterations | ThresholdMetric::DialErrors => MetricKind::Counter,
        }
    }

    /// Whether the aggregation can be computed for this metric.
    pub fn supports(&self, aggregation: Aggregation) -> bool {
        match self.kind() {
            MetricKind::Rate => matches!(aggregation, Aggregation::Rate),
            MetricKind::Trend => matches!(
                aggregation,
                Aggregation::Avg
                    | Aggregation::Min
                    | Aggregation::Max
                    | Aggregation::Med
                    | Aggregation::Percentile(_)
            ),
            MetricKind::Counter => matches!(aggregation, Aggregation::Count | Aggregation::Rate),
        }
    }
}

impl fmt::Display for ThresholdMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ThresholdMetric {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "checks" => Ok(ThresholdMetric::Checks),
            "iteration_duration" => Ok(ThresholdMetric::IterationDuration),
            "ldap_response_time" => Ok(ThresholdMetric::ResponseTime),
            "ldap_errors" | "ldap_result_code" => Ok(ThresholdMetric::Errors),
            "iterations" => Ok(ThresholdMetric::Iterations),
            "dial_errors" => Ok(ThresholdMetric::DialErrors),
            other => Err(ConfigError::UnknownMetric(other.to_string())),
        }
    }
}

/// Left-hand side of a threshold expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Med,
    /// Percentile in `0..=100`
    Percentile(f64),
    Rate,
    Count,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Med => write!(f, "med"),
            Aggregation::Percentile(p) => write!(f, "p({p})"),
            Aggregation::Rate => write!(f, "rate"),
            Aggregation::Count => write!(f, "count"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
            Comparison::Eq => lhs == rhs,
            Comparison::Ne => lhs != rhs,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        };
        f.write_str(op)
    }
}

/// A single parsed bound, e.g. `p(95)<2000`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub bound: f64,
}

impl ThresholdExpr {
    pub fn new(aggregation: Aggregation, comparison: Comparison, bound: f64) -> Self {
        Self {
            aggregation,
            comparison,
            bound,
        }
    }

    /// Whether an observed aggregate satisfies the bound.
    pub fn is_satisfied_by(&self, observed: f64) -> bool {
        self.comparison.holds(observed, self.bound)
    }
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.aggregation, self.comparison, self.bound)
    }
}

/// Parse a threshold expression such as `p(95)<2000`, `rate<0.01` or `avg <= 300`.
///
/// Returns the reason as a string so callers can attach the metric name.
pub fn parse_threshold_expr(expr: &str) -> Result<ThresholdExpr, String> {
    let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
    let op_start = compact
        .find(&['<', '>', '=', '!'][..])
        .ok_or_else(|| "missing comparison operator".to_string())?;
    let (lhs, rest) = compact.split_at(op_start);

    let (comparison, rhs) = if let Some(rhs) = rest.strip_prefix("<=") {
        (Comparison::Le, rhs)
    } else if let Some(rhs) = rest.strip_prefix(">=") {
        (Comparison::Ge, rhs)
    } else if let Some(rhs) = rest.strip_prefix("==") {
        (Comparison::Eq, rhs)
    } else if let Some(rhs) = rest.strip_prefix("!=") {
        (Comparison::Ne, rhs)
    } else if let Some(rhs) = rest.strip_prefix('<') {
        (Comparison::Lt, rhs)
    } else if let Some(rhs) = rest.strip_prefix('>') {
        (Comparison::Gt, rhs)
    } else {
        return Err(format!("unsupported operator in '{rest}'"));
    };

    let bound: f64 = rhs
        .parse()
        .map_err(|_| format!("bound '{rhs}' is not a number"))?;
    if !bound.is_finite() {
        return Err(format!("bound '{rhs}' is not finite"));
    }

    let aggregation = match lhs {
        "avg" => Aggregation::Avg,
        "min" => Aggregation::Min,
        "max" => Aggregation::Max,
        "med" => Aggregation::Med,
        "rate" => Aggregation::Rate,
        "count" => Aggregation::Count,
        "" => return Err("missing aggregation".to_string()),
        other => {
            let inner = other
                .strip_prefix("p(")
                .and_then(|s| s.strip_suffix(')'))
                .ok_or_else(|| format!("unknown aggregation '{other}'"))?;
            let p: f64 = inner
                .parse()
                .map_err(|_| format!("percentile '{inner}' is not a number"))?;
            if !(0.0..=100.0).contains(&p) {
                return Err(format!("percentile {p} is outside 0..=100"));
            }
            Aggregation::Percentile(p)
        }
    };

    Ok(ThresholdExpr::new(aggregation, comparison, bound))
}

/// All bounds declared for one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSpec {
    pub metric: ThresholdMetric,
    pub expressions: Vec<ThresholdExpr>,
}

impl ThresholdSpec {
    pub fn new(metric: ThresholdMetric, expressions: Vec<ThresholdExpr>) -> Self {
        Self {
            metric,
            expressions,
        }
    }

    /// Parse and validate raw expressions for a metric name.
    pub fn parse<S: AsRef<str>>(metric: &str, expressions: &[S]) -> Result<Self, ConfigError> {
        let parsed_metric: ThresholdMetric = metric.parse()?;
        let mut parsed = Vec::with_capacity(expressions.len());
        for expression in expressions {
            let expression = expression.as_ref();
            let expr = parse_threshold_expr(expression).map_err(|reason| {
                ConfigError::InvalidThreshold {
                    metric: metric.to_string(),
                    expression: expression.to_string(),
                    reason,
                }
            })?;
            if !parsed_metric.supports(expr.aggregation) {
                return Err(ConfigError::InvalidThreshold {
                    metric: metric.to_string(),
                    expression: expression.to_string(),
                    reason: format!(
                        "aggregation '{}' does not apply to this metric",
                        expr.aggregation
                    ),
                });
            }
            parsed.push(expr);
        }
        Ok(Self::new(parsed_metric, parsed))
    }
}

/// Every threshold declared for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Vec<String>>",
    into = "BTreeMap<String, Vec<String>>"
)]
pub struct ThresholdSet {
    specs: Vec<ThresholdSpec>,
}

impl ThresholdSet {
    pub fn new(specs: Vec<ThresholdSpec>) -> Self {
        let mut set = Self::default();
        for spec in specs {
            set.insert(spec);
        }
        set
    }

    pub fn specs(&self) -> &[ThresholdSpec] {
        &self.specs
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Add bounds for a metric, merging with any already declared for it.
    pub fn insert(&mut self, spec: ThresholdSpec) {
        match self.specs.iter_mut().find(|s| s.metric == spec.metric) {
            Some(existing) => existing.expressions.extend(spec.expressions),
            None => {
                self.specs.push(spec);
                self.specs.sort_by_key(|s| s.metric);
            }
        }
    }
}

impl TryFrom<BTreeMap<String, Vec<String>>> for ThresholdSet {
    type Error = ConfigError;

    fn try_from(raw: BTreeMap<String, Vec<String>>) -> Result<Self, Self::Error> {
        let mut set = ThresholdSet::default();
        for (metric, expressions) in &raw {
            set.insert(ThresholdSpec::parse(metric, expressions)?);
        }
        Ok(set)
    }
}

impl From<ThresholdSet> for BTreeMap<String, Vec<String>> {
    fn from(set: ThresholdSet) -> Self {
        set.specs
            .into_iter()
            .map(|spec| {
                (
                    spec.metric.name().to_string(),
                    spec.expressions.iter().map(|e| e.to_string()).collect(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_percentile() {
        let expr = parse_threshold_expr("p(95)<2000").unwrap();
        assert_eq!(expr.aggregation, Aggregation::Percentile(95.0));
        assert_eq!(expr.comparison, Comparison::Lt);
        assert_eq!(expr.bound, 2000.0);
        assert!(expr.is_satisfied_by(1999.0));
        assert!(!expr.is_satisfied_by(2000.0));
    }

    #[test]
    fn test_parse_operators_and_whitespace() {
        assert_eq!(
            parse_threshold_expr("rate <= 0.01").unwrap().comparison,
            Comparison::Le
        );
        assert_eq!(
            parse_threshold_expr("count>=10").unwrap().comparison,
            Comparison::Ge
        );
        assert_eq!(
            parse_threshold_expr("avg!=0").unwrap().comparison,
            Comparison::Ne
        );
        assert_eq!(
            parse_threshold_expr("max==5").unwrap().comparison,
            Comparison::Eq
        );
        assert_eq!(
            parse_threshold_expr("p(99.9)>1").unwrap().aggregation,
            Aggregation::Percentile(99.9)
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_threshold_expr("p(95)").is_err());
        assert!(parse_threshold_expr("<5").is_err());
        assert!(parse_threshold_expr("avg=5").is_err());
        assert!(parse_threshold_expr("avg<abc").is_err());
        assert!(parse_threshold_expr("p(150)<5").is_err());
        assert!(parse_threshold_expr("stddev<5").is_err());
    }

    #[test]
    fn test_display_round_trips() {
        let expr = parse_threshold_expr("p(95) < 2000").unwrap();
        assert_eq!(expr.to_string(), "p(95)<2000");
        assert_eq!(parse_threshold_expr(&expr.to_string()).unwrap(), expr);
    }

    #[test]
    fn test_spec_rejects_mismatched_aggregation() {
        assert!(ThresholdSpec::parse("checks", &["rate>0.99"]).is_ok());
        assert!(ThresholdSpec::parse("checks", &["p(95)<10"]).is_err());
        assert!(ThresholdSpec::parse("iteration_duration", &["rate<0.1"]).is_err());
        assert!(ThresholdSpec::parse("iterations", &["count>100"]).is_ok());
        assert!(ThresholdSpec::parse("bogus", &["count>100"]).is_err());
    }

    #[test]
    fn test_result_code_alias() {
        let spec = ThresholdSpec::parse("ldap_result_code", &["rate<0.01"]).unwrap();
        assert_eq!(spec.metric, ThresholdMetric::Errors);
    }

    #[test]
    fn test_threshold_set_yaml() {
        let yaml = r#"
ldap_response_time: ["p(95)<2000"]
ldap_result_code: ["rate<0.01"]
checks: ["rate>0.9"]
"#;
        let set: ThresholdSet = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(set.specs().len(), 3);

        let bad = "checks: [\"p(95)<1\"]";
        assert!(serde_yaml::from_str::<ThresholdSet>(bad).is_err());
    }

    #[test]
    fn test_insert_merges_same_metric() {
        let mut set = ThresholdSet::default();
        set.insert(ThresholdSpec::parse("ldap_errors", &["rate<0.1"]).unwrap());
        set.insert(ThresholdSpec::parse("ldap_result_code", &["rate<0.2"]).unwrap());
        assert_eq!(set.specs().len(), 1);
        assert_eq!(set.specs()[0].expressions.len(), 2);
    }
}
