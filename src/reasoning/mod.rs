//! Reasoning providers: applicability, ordering and explanation.
//!
//! The reasoning backend (usually an LLM) is an external collaborator. The
//! pipeline consumes it only through [`ReasoningProvider`]. Two providers ship
//! with the crate:
//!
//! - [`HeuristicReasoner`]: deterministic, offline; confidence from retrieval
//!   similarity adjusted by [`check_condition`] against the context, order
//!   from priority.
//! - [`PromptedReasoner`]: builds prompts for a [`CompletionBackend`] and
//!   parses the JSON embedded in its free-text answers.

mod condition;
mod heuristic;
mod prompted;

pub use condition::{check_condition, ConditionCheck};
pub use heuristic::HeuristicReasoner;
pub use prompted::{extract_json_object, CompletionBackend, PromptedReasoner};

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::pipeline::ApplicableRule;
use crate::rule::{CandidateRule, JsonMap, Rule, RuleId};

/// Applicability verdict for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleAssessment {
    /// Candidate rule id.
    pub rule_id: RuleId,
    /// Applicability confidence in [0.0, 1.0].
    pub confidence: f32,
    /// Justification.
    #[serde(default)]
    pub reasoning: String,
}

/// Result of analysing a scenario against its candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioAnalysis {
    /// One entry per candidate the provider considers applicable.
    pub assessments: Vec<RuleAssessment>,
    /// Free-text overall assessment.
    #[serde(default)]
    pub overall_assessment: String,
    /// Suggested follow-ups.
    #[serde(default)]
    pub recommended_actions: Vec<String>,
}

impl ScenarioAnalysis {
    /// Neutral analysis used when the provider failed.
    #[must_use]
    pub fn failed() -> Self {
        Self {
            assessments: Vec::new(),
            overall_assessment: "Analysis failed".to_string(),
            recommended_actions: Vec::new(),
        }
    }
}

/// Ordering verdict for one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedRule {
    /// Rule id.
    pub rule_id: RuleId,
    /// Position in the execution sequence, ascending.
    pub execution_order: i64,
    /// Whether the rule's condition holds for the context.
    pub condition_met: bool,
    /// What running the rule is expected to do.
    #[serde(default)]
    pub expected_outcome: String,
}

/// Result of reasoning about execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOrdering {
    /// Per-rule verdicts.
    pub entries: Vec<OrderedRule>,
    /// Conflicts the provider noticed between rules.
    #[serde(default)]
    pub conflicts: Vec<String>,
    /// Free-text execution strategy.
    #[serde(default)]
    pub strategy: String,
}

impl ExecutionOrdering {
    /// Finds the verdict for a rule.
    #[must_use]
    pub fn entry(&self, id: &RuleId) -> Option<&OrderedRule> {
        self.entries.iter().find(|e| &e.rule_id == id)
    }
}

/// Reasoning capability consumed by the decision pipeline.
///
/// Every method may fail; the pipeline degrades the affected stage to a
/// neutral result instead of failing the decision.
pub trait ReasoningProvider: Send + Sync {
    /// Scores each candidate's applicability to the scenario.
    fn analyze(
        &self,
        scenario: &str,
        candidates: &[CandidateRule],
        context: Option<&JsonMap>,
    ) -> Result<ScenarioAnalysis, ProviderError>;

    /// Decides execution order and whether each rule's condition is met.
    fn order(&self, rules: &[Rule], context: &JsonMap) -> Result<ExecutionOrdering, ProviderError>;

    /// Produces a human-readable explanation of the decision.
    fn explain(
        &self,
        rules: &[ApplicableRule],
        outcome: &str,
        context: &JsonMap,
    ) -> Result<String, ProviderError>;
}
