//! Decision types produced by the pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rule::{JsonMap, Rule, RuleId};

/// Unique identifier for a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionId(Uuid);

impl DecisionId {
    /// Creates a new random decision ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DecisionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A rule accepted into a decision, with its reasoning verdicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicableRule {
    /// The full catalog rule.
    #[serde(flatten)]
    pub rule: Rule,
    /// Applicability confidence.
    pub confidence: f32,
    /// Why the rule applies.
    #[serde(default)]
    pub reasoning: String,
    /// Position in the execution sequence.
    pub execution_order: i64,
    /// What running the rule is expected to do.
    #[serde(default)]
    pub expected_outcome: String,
}

/// One step of a decision's execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// 1-based position.
    pub step: usize,
    /// Rule id.
    pub rule_id: RuleId,
    /// Rule name.
    pub rule_name: String,
    /// Action to dispatch.
    pub action: String,
    /// Expected outcome.
    pub expected_outcome: String,
    /// Action parameters.
    pub parameters: JsonMap,
}

/// Audit metadata attached to a decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetadata {
    /// Rules the reasoning provider assessed.
    pub total_rules_considered: usize,
    /// Rules that made it into the decision.
    pub rules_accepted: usize,
    /// Provider's overall assessment.
    pub overall_assessment: String,
    /// Suggested follow-ups.
    pub recommended_actions: Vec<String>,
    /// Whether the caller supplied a context.
    pub context_provided: bool,
    /// Minimum similarity used for retrieval.
    pub retrieval_threshold: f32,
    /// Minimum confidence used for acceptance.
    pub acceptance_threshold: f32,
    /// Failure message for failed analyses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The pipeline's verdict for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Unique decision id.
    pub decision_id: DecisionId,
    /// The analysed scenario.
    pub scenario: String,
    /// Accepted rules in execution order.
    pub applicable_rules: Vec<ApplicableRule>,
    /// One-line outcome summary.
    pub decision_outcome: String,
    /// Mean confidence of the accepted rules, 0.0 when none.
    pub confidence: f32,
    /// Natural-language explanation.
    pub reasoning: String,
    /// One step per accepted rule.
    pub execution_plan: Vec<PlanStep>,
    /// Audit metadata.
    pub metadata: DecisionMetadata,
    /// When the decision was made.
    pub created_at: DateTime<Utc>,
}

impl Decision {
    /// The accepted rules, in execution order, ready for the execution engine.
    #[must_use]
    pub fn rules(&self) -> Vec<Rule> {
        self.applicable_rules.iter().map(|r| r.rule.clone()).collect()
    }

    /// Returns true if the decision has anything to execute.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        !self.applicable_rules.is_empty()
    }

    /// Returns true if the analysis itself failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.metadata.error.is_some()
    }
}

/// Mean confidence, 0.0 for an empty list.
pub(crate) fn mean_confidence(rules: &[ApplicableRule]) -> f32 {
    if rules.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = rules.iter().map(|r| r.confidence).sum::<f32>() / rules.len() as f32;
    mean.clamp(0.0, 1.0)
}

/// Builds the execution plan steps, numbered from 1.
pub(crate) fn plan_steps(rules: &[ApplicableRule]) -> Vec<PlanStep> {
    rules
        .iter()
        .enumerate()
        .map(|(idx, r)| PlanStep {
            step: idx + 1,
            rule_id: r.rule.id.clone(),
            rule_name: r.rule.name.clone(),
            action: r.rule.action.clone(),
            expected_outcome: r.expected_outcome.clone(),
            parameters: r.rule.parameters.clone(),
        })
        .collect()
}
