//! Prompt-driven reasoner over a text completion backend.
//!
//! The backend only turns a prompt into text. This module owns the prompt
//! layout and the lenient parsing of the JSON object embedded in the answer:
//! models quote numbers, wrap JSON in prose, or return ids as integers.

use serde_json::Value;
use tracing::debug;

use crate::error::ProviderError;
use crate::pipeline::ApplicableRule;
use crate::reasoning::{
    ExecutionOrdering, OrderedRule, ReasoningProvider, RuleAssessment, ScenarioAnalysis,
};
use crate::rule::{CandidateRule, JsonMap, Rule, RuleId};

/// A text completion service (e.g. a local LLM server).
pub trait CompletionBackend: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str {
        "completion"
    }

    /// Completes `prompt`.
    fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Returns the outermost `{ ... }` span of `text`, if any.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_object(provider: &str, text: &str) -> Result<JsonMap, ProviderError> {
    let json = extract_json_object(text)
        .ok_or_else(|| ProviderError::malformed(provider, "response contains no JSON object"))?;
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ProviderError::malformed(provider, "response JSON is not an object")),
        Err(e) => Err(ProviderError::malformed(provider, e.to_string())),
    }
}

fn lenient_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        _ => false,
    }
}

fn lenient_id(value: Option<&Value>) -> Option<RuleId> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(RuleId::new(s.trim())),
        Value::Number(n) => Some(RuleId::new(n.to_string())),
        _ => None,
    }
}

fn string_field(map: &JsonMap, key: &str) -> String {
    map.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn string_list(map: &JsonMap, key: &str) -> Vec<String> {
    map.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn pretty(context: &JsonMap) -> String {
    serde_json::to_string_pretty(context).unwrap_or_else(|_| "{}".to_string())
}

/// [`ReasoningProvider`] that asks a [`CompletionBackend`].
#[derive(Debug, Clone)]
pub struct PromptedReasoner<B> {
    backend: B,
}

impl<B: CompletionBackend> PromptedReasoner<B> {
    /// Wrap a completion backend.
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Returns the wrapped backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    fn analysis_prompt(scenario: &str, candidates: &[CandidateRule], context: Option<&JsonMap>) -> String {
        let rules = candidates
            .iter()
            .map(|c| {
                format!(
                    "- Rule {}: {}\n  Description: {}\n  Condition: {}\n  Action: {}\n  Domain: {}\n  Priority: {}",
                    c.rule.id, c.rule.name, c.rule.description, c.rule.condition, c.rule.action,
                    c.rule.domain, c.rule.priority
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let context_block = context
            .filter(|c| !c.is_empty())
            .map(|c| format!("\nAdditional context:\n{}\n", pretty(c)))
            .unwrap_or_default();

        format!(
            "You analyse business scenarios against a catalogue of business rules.\n\n\
             Scenario: {scenario}\n\nCandidate rules:\n{rules}\n{context_block}\n\
             Decide which rules apply, how confident you are in each (0.0 to 1.0), and why.\n\
             Answer with a single JSON object:\n\
             {{\"applicable_rules\": [{{\"rule_id\": \"...\", \"confidence\": 0.0, \"reasoning\": \"...\"}}],\n \
             \"overall_assessment\": \"...\", \"recommended_actions\": [\"...\"]}}\n"
        )
    }

    fn ordering_prompt(rules: &[Rule], context: &JsonMap) -> String {
        let listed = rules
            .iter()
            .map(|r| {
                format!(
                    "Rule {}: {}\n  Condition: {}\n  Action: {}\n  Priority: {}",
                    r.id, r.name, r.condition, r.action, r.priority
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "You order business rules for execution.\n\nContext:\n{}\n\nRules:\n{listed}\n\n\
             For each rule, check its condition against the context, then give an execution order \
             that respects priorities and dependencies.\n\
             Answer with a single JSON object:\n\
             {{\"executable_rules\": [{{\"rule_id\": \"...\", \"execution_order\": 1, \"condition_met\": true, \
             \"expected_outcome\": \"...\"}}],\n \"conflicts\": [\"...\"], \"execution_plan\": \"...\"}}\n",
            pretty(context)
        )
    }

    fn explanation_prompt(rules: &[ApplicableRule], outcome: &str, context: &JsonMap) -> String {
        let listed = rules
            .iter()
            .map(|r| format!("- {}: {}", r.rule.name, r.rule.action))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Explain this business rule decision to a business user in a few sentences.\n\n\
             Applied rules:\n{listed}\n\nOutcome: {outcome}\n\nContext:\n{}\n\n\
             Say why the rules applied, what happens next, and which facts mattered.\n\nExplanation:",
            pretty(context)
        )
    }
}

impl<B: CompletionBackend> ReasoningProvider for PromptedReasoner<B> {
    fn analyze(
        &self,
        scenario: &str,
        candidates: &[CandidateRule],
        context: Option<&JsonMap>,
    ) -> Result<ScenarioAnalysis, ProviderError> {
        let provider = self.backend.name();
        let text = self
            .backend
            .complete(&Self::analysis_prompt(scenario, candidates, context))?;
        let map = parse_object(provider, &text)?;

        let assessments = map
            .get("applicable_rules")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .filter_map(|item| {
                        let rule_id = lenient_id(item.get("rule_id"))?;
                        #[allow(clippy::cast_possible_truncation)]
                        let confidence =
                            lenient_f64(item.get("confidence")).unwrap_or(0.0).clamp(0.0, 1.0) as f32;
                        Some(RuleAssessment {
                            rule_id,
                            confidence,
                            reasoning: string_field(item, "reasoning"),
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        debug!(provider, assessments = assessments.len(), "parsed scenario analysis");
        Ok(ScenarioAnalysis {
            assessments,
            overall_assessment: string_field(&map, "overall_assessment"),
            recommended_actions: string_list(&map, "recommended_actions"),
        })
    }

    fn order(&self, rules: &[Rule], context: &JsonMap) -> Result<ExecutionOrdering, ProviderError> {
        let provider = self.backend.name();
        let text = self.backend.complete(&Self::ordering_prompt(rules, context))?;
        let map = parse_object(provider, &text)?;

        let entries = map
            .get("executable_rules")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .filter_map(|item| {
                        #[allow(clippy::cast_possible_truncation)]
                        let execution_order =
                            lenient_f64(item.get("execution_order")).unwrap_or(0.0) as i64;
                        Some(OrderedRule {
                            rule_id: lenient_id(item.get("rule_id"))?,
                            execution_order,
                            condition_met: lenient_bool(item.get("condition_met")),
                            expected_outcome: string_field(item, "expected_outcome"),
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(ExecutionOrdering {
            entries,
            conflicts: string_list(&map, "conflicts"),
            strategy: string_field(&map, "execution_plan"),
        })
    }

    fn explain(
        &self,
        rules: &[ApplicableRule],
        outcome: &str,
        context: &JsonMap,
    ) -> Result<String, ProviderError> {
        let text = self
            .backend
            .complete(&Self::explanation_prompt(rules, outcome, context))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ProviderError::malformed(self.backend.name(), "empty explanation"));
        }
        Ok(text.to_string())
    }
}
