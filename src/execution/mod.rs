//! The execution engine: plan construction, sequential per-rule dispatch,
//! status aggregation and bounded history.
//!
//! Rules run strictly in plan order, one at a time. A failing or panicking
//! action fails only its own rule; the plan fails only when a critical rule
//! (priority ≥ 3) fails, otherwise it completes as a partial success.

mod history;
mod plan;
mod summary;

pub use history::ExecutionHistory;
pub use plan::{ExecutionPlan, ExecutionResult, ExecutionStatus, PlanId};
pub use summary::{ExecutionSummary, ResultSummary};

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::action::{output_error, output_succeeded, ActionExecutor, ActionRegistry};
use crate::config::ExecutionConfig;
use crate::error::panic_message;
use crate::rule::{JsonMap, Rule};

/// Runs execution plans and keeps their history.
pub struct ExecutionEngine {
    executor: Arc<dyn ActionExecutor>,
    history: ExecutionHistory,
    sequence: AtomicU64,
}

impl ExecutionEngine {
    /// Creates an engine with the default history capacity.
    #[must_use]
    pub fn new(executor: Arc<dyn ActionExecutor>) -> Self {
        Self::with_config(executor, &ExecutionConfig::default())
    }

    /// Creates an engine from configuration.
    #[must_use]
    pub fn with_config(executor: Arc<dyn ActionExecutor>, config: &ExecutionConfig) -> Self {
        Self {
            executor,
            history: ExecutionHistory::new(config.history_capacity),
            sequence: AtomicU64::new(0),
        }
    }

    /// The action executor rules dispatch to.
    #[must_use]
    pub fn executor(&self) -> &Arc<dyn ActionExecutor> {
        &self.executor
    }

    /// Builds a pending plan with a fresh id. No side effects beyond the id
    /// sequence.
    #[must_use]
    pub fn create_plan(&self, scenario: impl Into<String>, rules: Vec<Rule>, context: JsonMap) -> ExecutionPlan {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        ExecutionPlan {
            plan_id: PlanId::generate(Utc::now(), sequence),
            scenario: scenario.into(),
            rules,
            context,
            results: Vec::new(),
            overall_status: ExecutionStatus::Pending,
            start_time: None,
            end_time: None,
        }
    }

    /// Runs every rule of the plan in order, aggregates the status, appends a
    /// copy to the history and returns the terminal plan.
    #[tracing::instrument(skip_all, fields(plan_id = %plan.plan_id, rules = plan.rules.len()))]
    pub fn execute(&self, mut plan: ExecutionPlan) -> ExecutionPlan {
        info!("Starting execution of plan");
        plan.start_time = Some(Utc::now());
        plan.overall_status = ExecutionStatus::Running;
        plan.results.clear();

        for rule in &plan.rules {
            let result = self.run_rule(rule, &plan.context);
            if result.status == ExecutionStatus::Failed && rule.is_critical() {
                warn!(rule_id = %rule.id, "Critical rule failed, continuing with remaining rules");
            }
            plan.results.push(result);
        }

        plan.overall_status = aggregate_status(&plan);
        plan.end_time = Some(Utc::now());

        let evicted = self.history.push(plan.clone());
        if evicted > 0 {
            debug!(evicted, "execution history at capacity, evicted oldest plans");
        }
        info!(status = %plan.overall_status, "Completed execution of plan");
        plan
    }

    /// Projects a plan into a summary. Pure and idempotent.
    #[must_use]
    pub fn summarize(&self, plan: &ExecutionPlan) -> ExecutionSummary {
        ExecutionSummary::of(plan)
    }

    /// Summaries of executed plans, oldest first.
    #[must_use]
    pub fn history(&self, limit: usize, offset: usize) -> Vec<ExecutionSummary> {
        self.history.page(limit, offset)
    }

    /// Number of plans currently retained.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn run_rule(&self, rule: &Rule, context: &JsonMap) -> ExecutionResult {
        let mut result = ExecutionResult::start(rule);

        if let Err(err) = rule.validate() {
            warn!(rule_id = %rule.id, error = %err, "invalid rule, not dispatched");
            result.fail(format!("Invalid rule: {err}"));
            result.end_time = Some(Utc::now());
            return result;
        }

        let dispatched = panic::catch_unwind(AssertUnwindSafe(|| {
            if !self.executor.validate(&rule.action, &rule.parameters) {
                return None;
            }
            result
                .execution_logs
                .push(format!("Starting execution of rule {}: {}", rule.id, rule.name));
            Some(self.executor.execute(&rule.action, &rule.parameters, context))
        }));

        match dispatched {
            Ok(None) => {
                debug!(rule_id = %rule.id, action = %rule.action, "parameter validation failed");
                result.fail("Parameter validation failed");
            }
            Ok(Some(output)) => {
                if output_succeeded(&output) {
                    let taken = output
                        .get("action_taken")
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown");
                    result.status = ExecutionStatus::Completed;
                    result
                        .execution_logs
                        .push(format!("Rule executed successfully: {taken}"));
                } else {
                    let message = output_error(&output).unwrap_or("Unknown error").to_string();
                    result
                        .execution_logs
                        .push(format!("Rule execution failed: {message}"));
                    result.fail(message);
                }
                result.output = output;
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(rule_id = %rule.id, error = %message, "Error executing rule");
                result
                    .execution_logs
                    .push(format!("Exception during execution: {message}"));
                result.fail(message);
            }
        }

        result.end_time = Some(Utc::now());
        result
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new(Arc::new(ActionRegistry::with_defaults()))
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("history", &self.history)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

/// COMPLETED unless a critical rule failed. Results pair with rules by position.
fn aggregate_status(plan: &ExecutionPlan) -> ExecutionStatus {
    let mut failures = 0_usize;
    let mut critical = false;
    for (result, rule) in plan.results.iter().zip(&plan.rules) {
        if result.status == ExecutionStatus::Failed {
            failures += 1;
            critical |= rule.is_critical();
        }
    }

    if critical {
        ExecutionStatus::Failed
    } else {
        if failures > 0 {
            info!(failures, "Plan completed with non-critical failures");
        }
        ExecutionStatus::Completed
    }
}
