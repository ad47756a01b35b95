//! # ruleflow - Agentic Business-Rule Decisions
//!
//! ruleflow decides, for a free-text business scenario, which pre-authored
//! business rules apply, then executes their actions and keeps an audit trail.
//!
//! ## Core Concepts
//!
//! - **Rule**: a condition paired with a named action and a priority
//! - **DecisionPipeline**: retrieve candidates, reason about them, keep the
//!   confident ones, order them
//! - **Decision**: the ordered, confidence-scored rules plus an explanation
//! - **ExecutionEngine**: runs a decision's rules in order and aggregates status
//! - **ActionRegistry**: the name-keyed table of action handlers
//!
//! Retrieval and reasoning are external capabilities behind [`RuleRetriever`]
//! and [`ReasoningProvider`]. The crate ships offline implementations of both
//! ([`KeywordRetriever`], [`HeuristicReasoner`]) so it runs end to end without
//! any service.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ruleflow::{InMemoryRuleCatalog, Rule, RuleService, ServiceConfig};
//!
//! let catalog = InMemoryRuleCatalog::from_rules(vec![
//!     Rule::new("LOAN_001", "Basic credit review", "approve_basic_review")
//!         .with_scope("finance", "loan_approval")
//!         .with_condition("credit_score >= 650"),
//! ])?;
//! let service = RuleService::offline(Arc::new(catalog), &ServiceConfig::default());
//!
//! let context = serde_json::json!({"credit_score": 680}).as_object().cloned().unwrap_or_default();
//! let outcome = service.analyze_and_execute("Loan with fair credit score", Some(&context), Some("finance"), None);
//! println!("{}", outcome.analysis.decision_outcome);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod config;
pub mod error;
pub mod rule;

// Collaborator boundaries
pub mod catalog;
pub mod reasoning;
pub mod retrieval;

// Decision and execution
pub mod action;
pub mod execution;
pub mod pipeline;

// Host surface
pub mod chat;
pub mod runtime;
pub mod service;

pub use action::{ActionExecutor, ActionRegistry};
pub use catalog::{load_rule_dir, InMemoryRuleCatalog, RuleCatalog};
pub use chat::{ChatMessage, ChatReply};
pub use config::{
    ExecutionConfig, PipelineConfig, RuntimeConfig, ServiceConfig, DEFAULT_CONFIDENCE_THRESHOLD,
    RETRIEVAL_THRESHOLD_FACTOR,
};
pub use error::{
    ActionError, CatalogError, ConfigError, DispatchError, ProviderError, RuleflowError,
    RuleflowResult, ValidationError,
};
pub use execution::{
    ExecutionEngine, ExecutionPlan, ExecutionResult, ExecutionStatus, ExecutionSummary, PlanId,
};
pub use pipeline::{ApplicableRule, Decision, DecisionId, DecisionPipeline, PlanStep};
pub use reasoning::{CompletionBackend, HeuristicReasoner, PromptedReasoner, ReasoningProvider};
pub use retrieval::{KeywordRetriever, RetrievalQuery, RuleRetriever};
pub use rule::{CandidateRule, JsonMap, Rule, RuleId};
pub use runtime::{Lane, ServiceRequest, ServiceResponse, ServiceRuntime};
pub use service::{AnalysisExecution, RuleService};
