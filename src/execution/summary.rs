//! Read-only projections of executed plans.

use serde::{Deserialize, Serialize};

use crate::execution::plan::{ExecutionPlan, ExecutionStatus, PlanId};
use crate::rule::{JsonMap, RuleId};

/// Per-rule line of an [`ExecutionSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    /// Rule id.
    pub rule_id: RuleId,
    /// Rule name.
    pub rule_name: String,
    /// Rule status.
    pub status: ExecutionStatus,
    /// Seconds the rule took.
    pub duration: Option<f64>,
    /// Action output.
    pub output: JsonMap,
    /// Failure message.
    pub error: Option<String>,
}

/// Counts, timings and per-rule detail of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Plan id.
    pub plan_id: PlanId,
    /// Scenario.
    pub scenario: String,
    /// Plan status.
    pub overall_status: ExecutionStatus,
    /// Rules in the plan.
    pub total_rules: usize,
    /// Completed rules.
    pub successful_rules: usize,
    /// Failed rules.
    pub failed_rules: usize,
    /// Seconds the plan took.
    pub execution_time: Option<f64>,
    /// One entry per result.
    pub results: Vec<ResultSummary>,
    /// Note attached to synthetic summaries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExecutionSummary {
    /// Projects a plan. Pure; calling it twice on the same plan gives equal output.
    #[must_use]
    pub fn of(plan: &ExecutionPlan) -> Self {
        Self {
            plan_id: plan.plan_id.clone(),
            scenario: plan.scenario.clone(),
            overall_status: plan.overall_status,
            total_rules: plan.rules.len(),
            successful_rules: plan.results_with(ExecutionStatus::Completed).count(),
            failed_rules: plan.results_with(ExecutionStatus::Failed).count(),
            execution_time: plan.execution_time(),
            results: plan
                .results
                .iter()
                .map(|r| ResultSummary {
                    rule_id: r.rule_id.clone(),
                    rule_name: r.rule_name.clone(),
                    status: r.status,
                    duration: r.duration(),
                    output: r.output.clone(),
                    error: r.error_message.clone(),
                })
                .collect(),
            message: None,
        }
    }

    /// Summary reported when analysis found no rules to execute.
    #[must_use]
    pub fn skipped(scenario: impl Into<String>) -> Self {
        Self {
            plan_id: PlanId::no_execution(),
            scenario: scenario.into(),
            overall_status: ExecutionStatus::Skipped,
            total_rules: 0,
            successful_rules: 0,
            failed_rules: 0,
            execution_time: Some(0.0),
            results: Vec::new(),
            message: Some("No applicable rules found".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_summary() {
        let summary = ExecutionSummary::skipped("nothing matches");
        assert_eq!(summary.plan_id.as_str(), "no_execution");
        assert_eq!(summary.overall_status, ExecutionStatus::Skipped);
        assert_eq!(summary.total_rules, 0);
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["overall_status"], "skipped");
        assert_eq!(value["message"], "No applicable rules found");
    }
}
