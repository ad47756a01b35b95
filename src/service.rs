//! Host-facing facade over the pipeline, the engine and the catalog.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::action::{ActionExecutor, ActionRegistry};
use crate::catalog::RuleCatalog;
use crate::chat::{self, ChatMessage, ChatReply};
use crate::config::ServiceConfig;
use crate::error::RuleflowResult;
use crate::execution::{ExecutionEngine, ExecutionSummary};
use crate::pipeline::{Decision, DecisionPipeline};
use crate::reasoning::{CompletionBackend, HeuristicReasoner, ReasoningProvider};
use crate::retrieval::{KeywordRetriever, RuleRetriever};
use crate::rule::{JsonMap, Rule, RuleId};

/// Default page size for [`RuleService::list_rules`].
pub const DEFAULT_RULE_PAGE: usize = 50;

/// Default page size for [`RuleService::execution_history`].
pub const DEFAULT_HISTORY_PAGE: usize = 20;

/// Result of [`RuleService::analyze_and_execute`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisExecution {
    /// Scenario.
    pub scenario: String,
    /// The decision.
    pub analysis: Decision,
    /// The execution of the decision's rules, or a skipped summary.
    pub execution: ExecutionSummary,
}

/// One page of catalog rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulePage {
    /// Rules on this page.
    pub rules: Vec<Rule>,
    /// Rules matching the filters, across all pages.
    pub total_count: usize,
    /// Every domain in the catalog.
    pub domains: BTreeSet<String>,
    /// Every category in the catalog.
    pub categories: BTreeSet<String>,
}

/// Service status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Rules in the catalog.
    pub total_rules: usize,
    /// Catalog domains.
    pub domains: BTreeSet<String>,
    /// Catalog categories.
    pub categories: BTreeSet<String>,
    /// Actions the executor can run.
    pub supported_actions: Vec<String>,
    /// Strict acceptance threshold.
    pub acceptance_threshold: f32,
    /// Relaxed retrieval threshold.
    pub retrieval_threshold: f32,
    /// Decisions made so far.
    pub decisions_made: usize,
    /// Executed plans currently retained.
    pub executions_retained: usize,
    /// When the service was created.
    pub started_at: DateTime<Utc>,
}

/// Everything a host needs: analysis, execution, catalog browsing and audit.
pub struct RuleService {
    catalog: Arc<dyn RuleCatalog>,
    pipeline: DecisionPipeline,
    engine: ExecutionEngine,
    started_at: DateTime<Utc>,
}

impl RuleService {
    /// Wires a service from its collaborators.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn RuleCatalog>,
        retriever: Arc<dyn RuleRetriever>,
        reasoner: Arc<dyn ReasoningProvider>,
        executor: Arc<dyn ActionExecutor>,
        config: &ServiceConfig,
    ) -> Self {
        let pipeline = DecisionPipeline::new(Arc::clone(&catalog), retriever, reasoner)
            .with_config(config.pipeline.clone());
        let engine = ExecutionEngine::with_config(executor, &config.execution);
        info!(
            threshold = config.pipeline.acceptance_threshold,
            history_capacity = config.execution.history_capacity,
            "rule service ready"
        );
        Self {
            catalog,
            pipeline,
            engine,
            started_at: Utc::now(),
        }
    }

    /// Wires a self-contained service: keyword retrieval, heuristic reasoning
    /// and the built-in actions.
    #[must_use]
    pub fn offline(catalog: Arc<dyn RuleCatalog>, config: &ServiceConfig) -> Self {
        let retriever = Arc::new(KeywordRetriever::new(Arc::clone(&catalog)));
        Self::new(
            catalog,
            retriever,
            Arc::new(HeuristicReasoner::new()),
            Arc::new(ActionRegistry::with_defaults()),
            config,
        )
    }

    /// Analyses a scenario. Never fails; see [`DecisionPipeline::analyze`].
    pub fn analyze(
        &self,
        scenario: &str,
        context: Option<&JsonMap>,
        domain_hint: Option<&str>,
        category_hint: Option<&str>,
    ) -> Decision {
        self.pipeline.analyze(scenario, context, domain_hint, category_hint)
    }

    /// Plans and executes rules, returning the summary. Rules failing
    /// [`Rule::validate`] are reported as failed and never dispatched.
    pub fn execute(&self, scenario: &str, rules: Vec<Rule>, context: JsonMap) -> ExecutionSummary {
        let plan = self.engine.create_plan(scenario, rules, context);
        let plan = self.engine.execute(plan);
        self.engine.summarize(&plan)
    }

    /// Analyses a scenario and executes the decision's rules, if any.
    pub fn analyze_and_execute(
        &self,
        scenario: &str,
        context: Option<&JsonMap>,
        domain_hint: Option<&str>,
        category_hint: Option<&str>,
    ) -> AnalysisExecution {
        let analysis = self.analyze(scenario, context, domain_hint, category_hint);
        let execution = if analysis.is_actionable() {
            self.execute(scenario, analysis.rules(), context.cloned().unwrap_or_default())
        } else {
            ExecutionSummary::skipped(scenario)
        };
        AnalysisExecution {
            scenario: scenario.to_string(),
            analysis,
            execution,
        }
    }

    /// Lists catalog rules, optionally filtered, one page at a time.
    ///
    /// # Errors
    ///
    /// Fails if the catalog cannot be read.
    pub fn list_rules(
        &self,
        domain: Option<&str>,
        category: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> RuleflowResult<RulePage> {
        let matching: Vec<Rule> = self
            .catalog
            .all()?
            .into_iter()
            .filter(|r| domain.map_or(true, |d| r.domain == d))
            .filter(|r| category.map_or(true, |c| r.category == c))
            .collect();
        let total_count = matching.len();
        Ok(RulePage {
            rules: matching.into_iter().skip(offset).take(limit).collect(),
            total_count,
            domains: self.catalog.domains()?,
            categories: self.catalog.categories()?,
        })
    }

    /// Looks up one rule.
    ///
    /// # Errors
    ///
    /// Fails if the catalog cannot be read.
    pub fn rule(&self, id: &str) -> RuleflowResult<Option<Rule>> {
        Ok(self.catalog.get(&RuleId::from(id))?)
    }

    /// Summaries of executed plans, oldest first.
    #[must_use]
    pub fn execution_history(&self, limit: usize, offset: usize) -> Vec<ExecutionSummary> {
        self.engine.history(limit, offset)
    }

    /// Every decision made so far, oldest first.
    #[must_use]
    pub fn decision_history(&self) -> Vec<Decision> {
        self.pipeline.decision_history()
    }

    /// Status snapshot.
    ///
    /// # Errors
    ///
    /// Fails if the catalog cannot be read.
    pub fn system_info(&self) -> RuleflowResult<SystemInfo> {
        let config = self.pipeline.config();
        Ok(SystemInfo {
            total_rules: self.catalog.len()?,
            domains: self.catalog.domains()?,
            categories: self.catalog.categories()?,
            supported_actions: self.engine.executor().supported_actions(),
            acceptance_threshold: config.acceptance_threshold,
            retrieval_threshold: config.retrieval_threshold(),
            decisions_made: self.pipeline.decision_history().len(),
            executions_retained: self.engine.history_len(),
            started_at: self.started_at,
        })
    }
}

impl RuleService {
    /// Converses about the rule base through `backend`. The prompt carries a
    /// summary of the catalog so answers can refer to its domains.
    ///
    /// # Errors
    ///
    /// Fails when the catalog cannot be read or the backend fails.
    pub fn chat<B: CompletionBackend + ?Sized>(
        &self,
        backend: &B,
        message: &str,
        context: Option<JsonMap>,
        history: &[ChatMessage],
    ) -> RuleflowResult<ChatReply> {
        let domains = self.catalog.domains()?;
        let summary = format!(
            "The rule base holds {} rule(s) across domains: {}.",
            self.catalog.len()?,
            domains.into_iter().collect::<Vec<_>>().join(", ")
        );
        Ok(chat::chat(backend, &summary, message, context, history)?)
    }
}

impl std::fmt::Debug for RuleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleService")
            .field("pipeline", &self.pipeline)
            .field("engine", &self.engine)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::catalog::InMemoryRuleCatalog;
    use crate::execution::ExecutionStatus;

    fn service() -> RuleService {
        let rules = vec![
            Rule::new("LOAN_001", "Basic credit review", "approve_basic_review")
                .with_scope("finance", "loan_approval")
                .with_description("Loan with fair credit score")
                .with_condition("credit_score >= 650 and loan_amount <= 10000")
                .with_priority(2),
            Rule::new("INV_001", "Low stock alert", "generate_low_stock_alert")
                .with_scope("inventory", "stock_management")
                .with_condition("current_stock < 10"),
            Rule::new("INV_002", "Overstock block", "block_reorder")
                .with_scope("inventory", "stock_management"),
        ];
        let catalog = Arc::new(InMemoryRuleCatalog::from_rules(rules).unwrap());
        RuleService::offline(catalog, &ServiceConfig::default())
    }

    #[test]
    fn test_list_rules_filters_and_paginates() {
        let service = service();
        let page = service.list_rules(Some("inventory"), None, 1, 1).unwrap();
        assert_eq!(page.total_count, 2);
        assert_eq!(page.rules.len(), 1);
        assert_eq!(page.rules[0].id.as_str(), "INV_002");
        assert_eq!(page.domains.len(), 2);
        assert!(service.list_rules(None, Some("nope"), 10, 0).unwrap().rules.is_empty());
    }

    #[test]
    fn test_rule_lookup() {
        let service = service();
        assert!(service.rule("LOAN_001").unwrap().is_some());
        assert!(service.rule("LOAN_404").unwrap().is_none());
    }

    #[test]
    fn test_analyze_and_execute_skips_without_rules() {
        let service = service();
        let outcome = service.analyze_and_execute("weather forecast for tomorrow", None, None, None);
        assert!(outcome.analysis.applicable_rules.is_empty());
        assert_eq!(outcome.execution.overall_status, ExecutionStatus::Skipped);
        assert_eq!(outcome.execution.total_rules, 0);
        assert!(service.execution_history(10, 0).is_empty());
    }

    #[test]
    fn test_execute_records_history() {
        let service = service();
        let rule = service.rule("LOAN_001").unwrap().unwrap();
        let summary = service.execute("loan", vec![rule], json!({}).as_object().cloned().unwrap());
        assert_eq!(summary.overall_status, ExecutionStatus::Completed);
        assert_eq!(service.execution_history(DEFAULT_HISTORY_PAGE, 0).len(), 1);
    }

    #[test]
    fn test_execute_rejects_invalid_rules() {
        let service = service();
        let rule = service.rule("LOAN_001").unwrap().unwrap().with_priority(0);
        let context = json!({"credit_score": 700, "loan_amount": 1000}).as_object().cloned().unwrap();
        let summary = service.execute("loan", vec![rule], context);
        assert_eq!(summary.successful_rules, 0);
        assert_eq!(summary.failed_rules, 1);
        assert!(summary.results[0].output.is_empty());
        assert!(summary.results[0]
            .error
            .as_deref()
            .is_some_and(|m| m.starts_with("Invalid rule:")));
    }

    #[test]
    fn test_system_info() {
        let service = service();
        service.analyze("low stock", None, None, None);
        let info = service.system_info().unwrap();
        assert_eq!(info.total_rules, 3);
        assert_eq!(info.supported_actions.len(), 18);
        assert_eq!(info.decisions_made, 1);
        assert!(info.retrieval_threshold < info.acceptance_threshold);
    }
}
