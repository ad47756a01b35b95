//! The decision pipeline: retrieve → reason → filter → order → decide.
//!
//! [`DecisionPipeline::analyze`] never fails. Each collaborator call is
//! isolated: a retrieval, reasoning or catalog failure degrades that one stage
//! to an empty result and the decision still forms. Anything worse (an empty
//! scenario, a panicking collaborator) becomes a terminal decision whose
//! outcome starts with `"Analysis failed"`.

mod decision;
mod query;

pub use decision::{ApplicableRule, Decision, DecisionId, DecisionMetadata, PlanStep};
pub use query::enhance_query;

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::catalog::RuleCatalog;
use crate::config::PipelineConfig;
use crate::error::{panic_message, RuleflowResult, ValidationError};
use crate::reasoning::{ExecutionOrdering, ReasoningProvider, RuleAssessment, ScenarioAnalysis};
use crate::retrieval::{RetrievalQuery, RuleRetriever};
use crate::rule::{CandidateRule, JsonMap, Rule};

use decision::{mean_confidence, plan_steps};

/// Explanation used when no rule survived filtering.
pub const NO_RULES_EXPLANATION: &str = "No applicable business rules were found for this scenario.";

/// Explanation used when the reasoning provider cannot explain a decision.
pub const EXPLANATION_UNAVAILABLE: &str =
    "Unable to generate an explanation for this decision at this time.";

/// Decides which catalog rules apply to a scenario.
pub struct DecisionPipeline {
    catalog: Arc<dyn RuleCatalog>,
    retriever: Arc<dyn RuleRetriever>,
    reasoner: Arc<dyn ReasoningProvider>,
    config: PipelineConfig,
    history: Mutex<Vec<Decision>>,
}

impl DecisionPipeline {
    /// Creates a pipeline with the default thresholds.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn RuleCatalog>,
        retriever: Arc<dyn RuleRetriever>,
        reasoner: Arc<dyn ReasoningProvider>,
    ) -> Self {
        Self {
            catalog,
            retriever,
            reasoner,
            config: PipelineConfig::default(),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the pipeline configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyses a scenario and returns a decision.
    ///
    /// Every call appends the decision to the audit history, failed ones
    /// included.
    #[tracing::instrument(skip_all, fields(scenario_len = scenario.len()))]
    pub fn analyze(
        &self,
        scenario: &str,
        context: Option<&JsonMap>,
        domain_hint: Option<&str>,
        category_hint: Option<&str>,
    ) -> Decision {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run(scenario, context, domain_hint, category_hint)
        }));

        let decision = match outcome {
            Ok(Ok(decision)) => decision,
            Ok(Err(err)) => {
                error!(error = %err, "Error in scenario analysis");
                self.error_decision(scenario, &err.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(error = %message, "Scenario analysis panicked");
                self.error_decision(scenario, &message)
            }
        };

        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(decision.clone());
        decision
    }

    /// Returns every decision made so far, oldest first.
    #[must_use]
    pub fn decision_history(&self) -> Vec<Decision> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn run(
        &self,
        scenario: &str,
        context: Option<&JsonMap>,
        domain_hint: Option<&str>,
        category_hint: Option<&str>,
    ) -> RuleflowResult<Decision> {
        if scenario.trim().is_empty() {
            return Err(ValidationError::EmptyScenario.into());
        }
        info!("Analyzing scenario");

        let candidates = self.retrieve(scenario, domain_hint, category_hint);
        if candidates.is_empty() {
            info!("No relevant rules found for scenario");
            return Ok(self.no_rules_decision(scenario, context));
        }

        let analysis = match self.reasoner.analyze(scenario, &candidates, context) {
            Ok(analysis) => analysis,
            Err(err) => {
                error!(error = %err, "Error analyzing scenario with reasoning provider");
                ScenarioAnalysis::failed()
            }
        };

        let accepted = self.accept(&analysis, &candidates);
        if accepted.is_empty() {
            warn!(
                threshold = self.config.acceptance_threshold,
                "No rules met the confidence threshold"
            );
        }

        let empty = JsonMap::new();
        let ctx = context.unwrap_or(&empty);
        let rules = self.order(accepted, ctx);

        let explanation = self.explain(&rules, ctx);
        info!(rules = rules.len(), "Decision made");
        Ok(self.assemble(scenario, context, &analysis, rules, explanation))
    }

    fn retrieve(
        &self,
        scenario: &str,
        domain_hint: Option<&str>,
        category_hint: Option<&str>,
    ) -> Vec<CandidateRule> {
        let query = RetrievalQuery::new(
            enhance_query(scenario, domain_hint, category_hint),
            self.config.retrieval_top_k,
        )
        .with_domain(domain_hint.map(str::to_string))
        .with_category(category_hint.map(str::to_string))
        .with_min_score(self.config.retrieval_threshold());

        match self.retriever.search(&query) {
            Ok(candidates) => {
                debug!(candidates = candidates.len(), "retrieved candidate rules");
                candidates
            }
            Err(err) => {
                error!(error = %err, "Error querying relevant rules");
                Vec::new()
            }
        }
    }

    /// Applies the strict threshold and resolves survivors through the catalog.
    ///
    /// Survivors keep retrieval order; assessed ids that were never retrieved
    /// follow in assessment order.
    fn accept(
        &self,
        analysis: &ScenarioAnalysis,
        candidates: &[CandidateRule],
    ) -> Vec<(Rule, RuleAssessment)> {
        let mut passing: Vec<&RuleAssessment> = analysis
            .assessments
            .iter()
            .filter(|a| a.confidence >= self.config.acceptance_threshold)
            .collect();
        passing.sort_by_key(|a| {
            candidates
                .iter()
                .position(|c| c.rule.id == a.rule_id)
                .unwrap_or(usize::MAX)
        });

        let mut accepted: Vec<(Rule, RuleAssessment)> = Vec::with_capacity(passing.len());
        for assessment in passing {
            if accepted
                .iter()
                .any(|(rule, _)| rule.id == assessment.rule_id)
            {
                continue;
            }
            match self.catalog.get(&assessment.rule_id) {
                Ok(Some(rule)) => accepted.push((rule, assessment.clone())),
                Ok(None) => {
                    debug!(rule_id = %assessment.rule_id, "accepted rule not in catalog, dropping");
                }
                Err(err) => {
                    warn!(rule_id = %assessment.rule_id, error = %err, "catalog lookup failed, dropping rule");
                }
            }
        }
        accepted
    }

    fn order(&self, accepted: Vec<(Rule, RuleAssessment)>, context: &JsonMap) -> Vec<ApplicableRule> {
        if accepted.is_empty() {
            return Vec::new();
        }

        let rules: Vec<Rule> = accepted.iter().map(|(rule, _)| rule.clone()).collect();
        let ordering = match self.reasoner.order(&rules, context) {
            Ok(ordering) => ordering,
            Err(err) => {
                error!(error = %err, "Error reasoning about execution order");
                ExecutionOrdering::default()
            }
        };

        let mut ordered: Vec<ApplicableRule> = accepted
            .into_iter()
            .filter_map(|(rule, assessment)| {
                let Some(entry) = ordering.entry(&rule.id) else {
                    debug!(rule_id = %rule.id, "no ordering verdict, dropping");
                    return None;
                };
                if !entry.condition_met {
                    debug!(rule_id = %rule.id, "condition not met, dropping");
                    return None;
                }
                Some(ApplicableRule {
                    confidence: assessment.confidence,
                    reasoning: assessment.reasoning,
                    execution_order: entry.execution_order,
                    expected_outcome: entry.expected_outcome.clone(),
                    rule,
                })
            })
            .collect();
        ordered.sort_by_key(|r| r.execution_order);

        if !ordering.conflicts.is_empty() {
            warn!(conflicts = ?ordering.conflicts, "Reasoning provider reported rule conflicts");
        }
        ordered
    }

    fn explain(&self, rules: &[ApplicableRule], context: &JsonMap) -> String {
        if rules.is_empty() {
            return NO_RULES_EXPLANATION.to_string();
        }
        let outcome = rules
            .iter()
            .map(|r| r.rule.action.as_str())
            .collect::<Vec<_>>()
            .join(" and ");
        match self.reasoner.explain(rules, &outcome, context) {
            Ok(text) => text,
            Err(err) => {
                error!(error = %err, "Error generating explanation");
                EXPLANATION_UNAVAILABLE.to_string()
            }
        }
    }

    fn assemble(
        &self,
        scenario: &str,
        context: Option<&JsonMap>,
        analysis: &ScenarioAnalysis,
        rules: Vec<ApplicableRule>,
        explanation: String,
    ) -> Decision {
        let decision_outcome = if rules.is_empty() {
            "No rules to execute".to_string()
        } else {
            let actions = rules
                .iter()
                .map(|r| r.rule.action.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            format!("Execute {} rule(s): {actions}", rules.len())
        };

        Decision {
            decision_id: DecisionId::new(),
            scenario: scenario.to_string(),
            confidence: mean_confidence(&rules),
            execution_plan: plan_steps(&rules),
            metadata: DecisionMetadata {
                total_rules_considered: analysis.assessments.len(),
                rules_accepted: rules.len(),
                overall_assessment: analysis.overall_assessment.clone(),
                recommended_actions: analysis.recommended_actions.clone(),
                context_provided: context.is_some(),
                ..self.base_metadata()
            },
            applicable_rules: rules,
            decision_outcome,
            reasoning: explanation,
            created_at: Utc::now(),
        }
    }

    fn no_rules_decision(&self, scenario: &str, context: Option<&JsonMap>) -> Decision {
        Decision {
            decision_id: DecisionId::new(),
            scenario: scenario.to_string(),
            applicable_rules: Vec::new(),
            decision_outcome: "No applicable business rules found".to_string(),
            confidence: 0.0,
            reasoning: "Retrieval found no business rules relevant to this scenario. The scenario \
                        may be outside current rule coverage, or its description needs to be \
                        more specific."
                .to_string(),
            execution_plan: Vec::new(),
            metadata: DecisionMetadata {
                overall_assessment: "No rules found".to_string(),
                recommended_actions: vec![
                    "Review scenario description".to_string(),
                    "Check rule coverage".to_string(),
                    "Consider adding new rules".to_string(),
                ],
                context_provided: context.is_some(),
                ..self.base_metadata()
            },
            created_at: Utc::now(),
        }
    }

    fn error_decision(&self, scenario: &str, message: &str) -> Decision {
        Decision {
            decision_id: DecisionId::new(),
            scenario: scenario.to_string(),
            applicable_rules: Vec::new(),
            decision_outcome: format!("Analysis failed: {message}"),
            confidence: 0.0,
            reasoning: format!("An error occurred during analysis: {message}"),
            execution_plan: Vec::new(),
            metadata: DecisionMetadata {
                overall_assessment: "Error occurred".to_string(),
                recommended_actions: vec![
                    "Check system logs".to_string(),
                    "Verify system components".to_string(),
                ],
                error: Some(message.to_string()),
                ..self.base_metadata()
            },
            created_at: Utc::now(),
        }
    }

    fn base_metadata(&self) -> DecisionMetadata {
        DecisionMetadata {
            retrieval_threshold: self.config.retrieval_threshold(),
            acceptance_threshold: self.config.acceptance_threshold,
            ..DecisionMetadata::default()
        }
    }
}

impl std::fmt::Debug for DecisionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::catalog::InMemoryRuleCatalog;
    use crate::error::ProviderError;
    use crate::reasoning::{HeuristicReasoner, OrderedRule};

    struct FixedRetriever(Vec<CandidateRule>);

    impl RuleRetriever for FixedRetriever {
        fn search(&self, query: &RetrievalQuery) -> Result<Vec<CandidateRule>, ProviderError> {
            Ok(self
                .0
                .iter()
                .filter(|c| query.min_score.map_or(true, |m| c.similarity_score >= m))
                .take(query.top_k)
                .cloned()
                .collect())
        }
    }

    struct FailingRetriever;

    impl RuleRetriever for FailingRetriever {
        fn search(&self, _query: &RetrievalQuery) -> Result<Vec<CandidateRule>, ProviderError> {
            Err(ProviderError::Unavailable {
                provider: "vector".to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    /// Confidence per id; orders by reverse input, every condition met.
    struct Scripted {
        confidences: Vec<(&'static str, f32)>,
        fail_order: bool,
        fail_explain: bool,
    }

    impl ReasoningProvider for Scripted {
        fn analyze(
            &self,
            _scenario: &str,
            _candidates: &[CandidateRule],
            _context: Option<&JsonMap>,
        ) -> Result<ScenarioAnalysis, ProviderError> {
            Ok(ScenarioAnalysis {
                assessments: self
                    .confidences
                    .iter()
                    .map(|(id, c)| RuleAssessment {
                        rule_id: (*id).into(),
                        confidence: *c,
                        reasoning: format!("{id} fits"),
                    })
                    .collect(),
                overall_assessment: "scripted".to_string(),
                recommended_actions: vec!["proceed".to_string()],
            })
        }

        fn order(&self, rules: &[Rule], _context: &JsonMap) -> Result<ExecutionOrdering, ProviderError> {
            if self.fail_order {
                return Err(ProviderError::failed("scripted", "order"));
            }
            Ok(ExecutionOrdering {
                entries: rules
                    .iter()
                    .rev()
                    .zip(1..)
                    .map(|(r, i)| OrderedRule {
                        rule_id: r.id.clone(),
                        execution_order: i,
                        condition_met: true,
                        expected_outcome: format!("{} done", r.action),
                    })
                    .collect(),
                ..ExecutionOrdering::default()
            })
        }

        fn explain(
            &self,
            _rules: &[ApplicableRule],
            outcome: &str,
            _context: &JsonMap,
        ) -> Result<String, ProviderError> {
            if self.fail_explain {
                return Err(ProviderError::failed("scripted", "explain"));
            }
            Ok(format!("because {outcome}"))
        }
    }

    struct Panicking;

    impl ReasoningProvider for Panicking {
        fn analyze(
            &self,
            _scenario: &str,
            _candidates: &[CandidateRule],
            _context: Option<&JsonMap>,
        ) -> Result<ScenarioAnalysis, ProviderError> {
            panic!("reasoner crashed");
        }

        fn order(&self, _rules: &[Rule], _context: &JsonMap) -> Result<ExecutionOrdering, ProviderError> {
            Ok(ExecutionOrdering::default())
        }

        fn explain(
            &self,
            _rules: &[ApplicableRule],
            _outcome: &str,
            _context: &JsonMap,
        ) -> Result<String, ProviderError> {
            Ok(String::new())
        }
    }

    fn rules() -> Vec<Rule> {
        vec![
            Rule::new("LOAN_001", "Basic review", "approve_basic_review").with_priority(2),
            Rule::new("LOAN_002", "Manual review", "require_manual_review").with_priority(3),
        ]
    }

    fn pipeline(reasoner: Arc<dyn ReasoningProvider>) -> DecisionPipeline {
        let catalog = Arc::new(InMemoryRuleCatalog::from_rules(rules()).unwrap());
        let candidates = rules()
            .into_iter()
            .chain(std::iter::once(Rule::new("GHOST", "ghost", "deny_access")))
            .map(|r| CandidateRule::new(r, 0.9))
            .collect();
        DecisionPipeline::new(catalog, Arc::new(FixedRetriever(candidates)), reasoner)
    }

    fn scripted(confidences: Vec<(&'static str, f32)>) -> Arc<Scripted> {
        Arc::new(Scripted {
            confidences,
            fail_order: false,
            fail_explain: false,
        })
    }

    #[test]
    fn test_strict_threshold_filters() {
        let p = pipeline(scripted(vec![("LOAN_001", 0.9), ("LOAN_002", 0.6)]));
        let decision = p.analyze("loan request", None, None, None);
        assert_eq!(decision.applicable_rules.len(), 1);
        assert_eq!(decision.applicable_rules[0].rule.id.as_str(), "LOAN_001");
        assert!((decision.confidence - 0.9).abs() < 1e-6);
        assert_eq!(decision.decision_outcome, "Execute 1 rule(s): approve_basic_review");
        assert_eq!(decision.reasoning, "because approve_basic_review");
        assert_eq!(decision.metadata.total_rules_considered, 2);
        assert_eq!(decision.metadata.rules_accepted, 1);
    }

    #[test]
    fn test_order_follows_execution_order() {
        let p = pipeline(scripted(vec![("LOAN_001", 0.8), ("LOAN_002", 0.9)]));
        let decision = p.analyze("loan request", Some(&JsonMap::new()), None, None);
        let ids: Vec<_> = decision.applicable_rules.iter().map(|r| r.rule.id.as_str()).collect();
        assert_eq!(ids, vec!["LOAN_002", "LOAN_001"]);
        assert_eq!(decision.execution_plan[0].step, 1);
        assert_eq!(decision.execution_plan[1].rule_id.as_str(), "LOAN_001");
        assert!((decision.confidence - 0.85).abs() < 1e-6);
        assert!(decision.metadata.context_provided);
        assert_eq!(
            decision.reasoning,
            "because require_manual_review and approve_basic_review"
        );
    }

    #[test]
    fn test_missing_catalog_rule_is_dropped() {
        let p = pipeline(scripted(vec![("GHOST", 0.99), ("LOAN_001", 0.9)]));
        let decision = p.analyze("loan request", None, None, None);
        assert_eq!(decision.applicable_rules.len(), 1);
        assert!(!decision.is_failure());
    }

    #[test]
    fn test_no_candidates_decision() {
        let catalog = Arc::new(InMemoryRuleCatalog::new());
        let p = DecisionPipeline::new(
            catalog,
            Arc::new(FixedRetriever(Vec::new())),
            Arc::new(HeuristicReasoner::new()),
        );
        let decision = p.analyze("anything", None, None, None);
        assert!(decision.applicable_rules.is_empty());
        assert!(decision.confidence.abs() < f32::EPSILON);
        assert_eq!(decision.decision_outcome, "No applicable business rules found");
        assert_eq!(decision.metadata.recommended_actions.len(), 3);
    }

    #[test]
    fn test_retrieval_failure_degrades_to_no_rules() {
        let catalog = Arc::new(InMemoryRuleCatalog::new());
        let p = DecisionPipeline::new(catalog, Arc::new(FailingRetriever), scripted(vec![]));
        let decision = p.analyze("anything", None, None, None);
        assert_eq!(decision.decision_outcome, "No applicable business rules found");
        assert!(!decision.is_failure());
    }

    #[test]
    fn test_ordering_failure_empties_rules() {
        let p = pipeline(Arc::new(Scripted {
            confidences: vec![("LOAN_001", 0.9)],
            fail_order: true,
            fail_explain: false,
        }));
        let decision = p.analyze("loan request", None, None, None);
        assert!(decision.applicable_rules.is_empty());
        assert_eq!(decision.decision_outcome, "No rules to execute");
        assert_eq!(decision.reasoning, NO_RULES_EXPLANATION);
    }

    #[test]
    fn test_explain_failure_uses_fallback() {
        let p = pipeline(Arc::new(Scripted {
            confidences: vec![("LOAN_001", 0.9)],
            fail_order: false,
            fail_explain: true,
        }));
        let decision = p.analyze("loan request", None, None, None);
        assert_eq!(decision.applicable_rules.len(), 1);
        assert_eq!(decision.reasoning, EXPLANATION_UNAVAILABLE);
    }

    #[test]
    fn test_empty_scenario_fails_analysis() {
        let p = pipeline(scripted(vec![]));
        let decision = p.analyze("   ", Some(&json!({}).as_object().cloned().unwrap()), None, None);
        assert!(decision.decision_outcome.starts_with("Analysis failed"));
        assert!(decision.is_failure());
        assert_eq!(decision.metadata.recommended_actions, vec!["Check system logs", "Verify system components"]);
    }

    #[test]
    fn test_panicking_reasoner_fails_analysis() {
        let p = pipeline(Arc::new(Panicking));
        let decision = p.analyze("loan request", None, None, None);
        assert!(decision.decision_outcome.starts_with("Analysis failed"));
        assert!(decision.decision_outcome.contains("reasoner crashed"));
        assert!(decision.confidence.abs() < f32::EPSILON);
    }

    #[test]
    fn test_history_records_every_decision() {
        let p = pipeline(scripted(vec![("LOAN_001", 0.9)]));
        p.analyze("loan request", None, None, None);
        p.analyze("", None, None, None);
        let history = p.decision_history();
        assert_eq!(history.len(), 2);
        assert!(history[1].is_failure());
    }
}
