//! Execution plans and per-rule results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rule::{JsonMap, Rule, RuleId};

/// Lifecycle status of a plan or of one rule within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Not started.
    Pending,
    /// In progress.
    Running,
    /// Finished, possibly with tolerated non-critical failures.
    Completed,
    /// Failed.
    Failed,
    /// Nothing was executed.
    Skipped,
}

impl ExecutionStatus {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Returns true for completed, failed and skipped.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of an execution plan, `plan_<YYYYmmdd_HHMMSS>_<sequence>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(String);

impl PlanId {
    /// Builds a plan id from a timestamp and a sequence number.
    #[must_use]
    pub fn generate(at: DateTime<Utc>, sequence: u64) -> Self {
        Self(format!("plan_{}_{sequence}", at.format("%Y%m%d_%H%M%S")))
    }

    /// Id reported when analysis found nothing to execute.
    #[must_use]
    pub fn no_execution() -> Self {
        Self("no_execution".to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of running one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Rule id.
    pub rule_id: RuleId,
    /// Rule name.
    pub rule_name: String,
    /// Rule status.
    pub status: ExecutionStatus,
    /// When the rule started.
    pub start_time: DateTime<Utc>,
    /// When the rule finished; always set once the result is recorded.
    pub end_time: Option<DateTime<Utc>>,
    /// Action output.
    pub output: JsonMap,
    /// Failure message.
    pub error_message: Option<String>,
    /// Ordered log lines.
    pub execution_logs: Vec<String>,
}

impl ExecutionResult {
    /// Starts a running result for a rule.
    #[must_use]
    pub fn start(rule: &Rule) -> Self {
        Self {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            status: ExecutionStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            output: JsonMap::new(),
            error_message: None,
            execution_logs: Vec::new(),
        }
    }

    /// Seconds between start and end, `None` until the end is stamped.
    #[must_use]
    pub fn duration(&self) -> Option<f64> {
        self.end_time.map(|end| seconds_between(self.start_time, end))
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.error_message = Some(message.into());
    }
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let delta = end - start;
    delta
        .num_microseconds()
        .map_or_else(|| delta.num_milliseconds() as f64 / 1e3, |us| us as f64 / 1e6)
}

/// An ordered list of rules to run against one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Unique plan id.
    pub plan_id: PlanId,
    /// Scenario that produced the rules.
    pub scenario: String,
    /// Rules in execution order.
    pub rules: Vec<Rule>,
    /// Context handed to every action.
    pub context: JsonMap,
    /// One result per executed rule, in execution order.
    pub results: Vec<ExecutionResult>,
    /// Plan status.
    pub overall_status: ExecutionStatus,
    /// When execution started.
    pub start_time: Option<DateTime<Utc>>,
    /// When execution finished.
    pub end_time: Option<DateTime<Utc>>,
}

impl ExecutionPlan {
    /// Seconds between start and end, once both are stamped.
    #[must_use]
    pub fn execution_time(&self) -> Option<f64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(seconds_between(start, end)),
            _ => None,
        }
    }

    /// Results whose status matches.
    pub fn results_with(&self, status: ExecutionStatus) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(move |r| r.status == status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    #[test]
    fn test_plan_id_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(PlanId::generate(at, 12).as_str(), "plan_20240309_140507_12");
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_value(ExecutionStatus::Skipped).unwrap(), "skipped");
        assert_eq!(ExecutionStatus::Completed.to_string(), "completed");
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }

    #[test]
    fn test_duration_undefined_until_end() {
        let mut result = ExecutionResult::start(&Rule::new("A", "a", "instant_approve"));
        assert!(result.duration().is_none());
        result.end_time = Some(result.start_time + chrono::Duration::milliseconds(1500));
        assert!((result.duration().unwrap() - 1.5).abs() < 1e-9);
    }
}
