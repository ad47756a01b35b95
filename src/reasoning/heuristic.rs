//! Deterministic offline reasoner.

use crate::error::ProviderError;
use crate::pipeline::ApplicableRule;
use crate::reasoning::{
    check_condition, ConditionCheck, ExecutionOrdering, OrderedRule, ReasoningProvider,
    RuleAssessment, ScenarioAnalysis,
};
use crate::rule::{CandidateRule, JsonMap, Rule};

/// Offline [`ReasoningProvider`].
///
/// Confidence starts from the retrieval similarity. A condition the context
/// satisfies closes half of the gap to 1.0; a condition it contradicts halves
/// the similarity. A condition the context cannot settle leaves the
/// similarity as is.
///
/// Rules are ordered by priority descending (ties keep input order). A rule's
/// condition is met only when [`check_condition`] holds, so an unsettled
/// condition keeps the rule out of the plan.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicReasoner;

fn adjusted_confidence(similarity: f32, check: ConditionCheck, conditional: bool) -> f32 {
    let similarity = similarity.clamp(0.0, 1.0);
    match check {
        ConditionCheck::Holds if conditional => similarity + (1.0 - similarity) * 0.5,
        ConditionCheck::Fails => similarity * 0.5,
        _ => similarity,
    }
}

impl HeuristicReasoner {
    /// Create the reasoner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ReasoningProvider for HeuristicReasoner {
    fn analyze(
        &self,
        _scenario: &str,
        candidates: &[CandidateRule],
        context: Option<&JsonMap>,
    ) -> Result<ScenarioAnalysis, ProviderError> {
        let empty = JsonMap::new();
        let context = context.unwrap_or(&empty);

        let assessments: Vec<RuleAssessment> = candidates
            .iter()
            .map(|c| {
                let rule = &c.rule;
                let check = check_condition(&rule.condition, context, &rule.parameters);
                let conditional = !rule.condition.trim().is_empty();
                let verdict = match check {
                    _ if !conditional => "no condition",
                    ConditionCheck::Holds => "condition holds",
                    ConditionCheck::Fails => "condition fails",
                    ConditionCheck::Unknown => "condition not settled by context",
                };
                RuleAssessment {
                    rule_id: rule.id.clone(),
                    confidence: adjusted_confidence(c.similarity_score, check, conditional),
                    reasoning: format!(
                        "Scenario matches '{}' with similarity {:.2}; {verdict}",
                        rule.name, c.similarity_score
                    ),
                }
            })
            .collect();

        Ok(ScenarioAnalysis {
            overall_assessment: format!(
                "{} candidate rule(s) assessed by similarity and condition",
                assessments.len()
            ),
            recommended_actions: candidates.iter().map(|c| c.rule.action.clone()).collect(),
            assessments,
        })
    }

    fn order(&self, rules: &[Rule], context: &JsonMap) -> Result<ExecutionOrdering, ProviderError> {
        let mut ranked: Vec<&Rule> = rules.iter().collect();
        ranked.sort_by(|a, b| b.priority.cmp(&a.priority));

        let entries = ranked
            .into_iter()
            .zip(1_i64..)
            .map(|(rule, position)| OrderedRule {
                rule_id: rule.id.clone(),
                execution_order: position,
                condition_met: check_condition(&rule.condition, context, &rule.parameters)
                    == ConditionCheck::Holds,
                expected_outcome: format!("{} runs for '{}'", rule.action, rule.name),
            })
            .collect();

        Ok(ExecutionOrdering {
            entries,
            conflicts: Vec::new(),
            strategy: "priority descending".to_string(),
        })
    }

    fn explain(
        &self,
        rules: &[ApplicableRule],
        outcome: &str,
        context: &JsonMap,
    ) -> Result<String, ProviderError> {
        let applied = rules
            .iter()
            .map(|r| format!("{} ({})", r.rule.name, r.rule.action))
            .collect::<Vec<_>>()
            .join("; ");
        let mut text = format!("Applied {} rule(s): {applied}. Outcome: {outcome}.", rules.len());
        if !context.is_empty() {
            let keys = context.keys().cloned().collect::<Vec<_>>().join(", ");
            text.push_str(&format!(" Context considered: {keys}."));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{json, Value};

    fn ctx(value: Value) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_analyze_uses_similarity_without_condition() {
        let candidates = vec![
            CandidateRule::new(Rule::new("A", "a", "instant_approve"), 0.9),
            CandidateRule::new(Rule::new("B", "b", "deny_access"), 1.4),
        ];
        let analysis = HeuristicReasoner.analyze("s", &candidates, None).unwrap();
        assert_eq!(analysis.assessments.len(), 2);
        assert!(approx(analysis.assessments[0].confidence, 0.9));
        assert!(approx(analysis.assessments[1].confidence, 1.0));
    }

    #[test]
    fn test_analyze_adjusts_confidence_by_condition() {
        let rule = |id: &str, condition: &str| {
            Rule::new(id, id, "send_to_manual_review").with_condition(condition)
        };
        let candidates = vec![
            CandidateRule::new(rule("HOLDS", "credit_score >= 650"), 0.6),
            CandidateRule::new(rule("FAILS", "credit_score < 600"), 0.6),
            CandidateRule::new(rule("UNSETTLED", "dispute_amount > 0"), 0.6),
        ];
        let context = ctx(json!({"credit_score": 680}));
        let analysis = HeuristicReasoner
            .analyze("s", &candidates, Some(&context))
            .unwrap();
        assert!(approx(analysis.assessments[0].confidence, 0.8));
        assert!(approx(analysis.assessments[1].confidence, 0.3));
        assert!(approx(analysis.assessments[2].confidence, 0.6));
        assert!(analysis.assessments[2].reasoning.contains("not settled"));
    }

    #[test]
    fn test_weak_match_without_context_is_not_boosted() {
        let candidates = vec![CandidateRule::new(
            Rule::new("CS_001", "VIP customer routing", "route_to_senior_agent")
                .with_condition("customer_tier == VIP"),
            0.5,
        )];
        let analysis = HeuristicReasoner.analyze("s", &candidates, None).unwrap();
        assert!(analysis.assessments[0].confidence < 0.7);
    }

    #[test]
    fn test_order_by_priority_and_condition() {
        let rules = vec![
            Rule::new("LOW", "low", "generate_low_stock_alert").with_priority(1),
            Rule::new("HIGH", "high", "emergency_reorder")
                .with_priority(4)
                .with_condition("current_stock < 10"),
            Rule::new("MID", "mid", "block_reorder").with_priority(2),
        ];
        let ordering = HeuristicReasoner
            .order(&rules, &ctx(json!({"current_stock": 50})))
            .unwrap();
        let ids: Vec<_> = ordering.entries.iter().map(|e| e.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["HIGH", "MID", "LOW"]);
        assert_eq!(ordering.entries[0].execution_order, 1);
        assert!(!ordering.entries[0].condition_met);
        assert!(ordering.entries[2].condition_met);
    }

    #[test]
    fn test_unsettled_condition_is_not_met() {
        let rules = vec![Rule::new("CS_004", "dispute", "route_to_billing_team")
            .with_condition("dispute_amount > 0")];
        let ordering = HeuristicReasoner.order(&rules, &JsonMap::new()).unwrap();
        assert!(!ordering.entries[0].condition_met);

        let ordering = HeuristicReasoner
            .order(&rules, &ctx(json!({"dispute_amount": 40})))
            .unwrap();
        assert!(ordering.entries[0].condition_met);
    }
}
