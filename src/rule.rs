//! Business rule types.
//!
//! A rule pairs a free-text condition with a named action. Rules are owned by a
//! [`RuleCatalog`](crate::catalog::RuleCatalog), created at load time, and never
//! mutated afterwards; reloading replaces the whole set.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// JSON object used for rule parameters, metadata, contexts and action outputs.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Priority at or above which a rule is critical.
///
/// A failed critical rule fails the whole execution plan.
pub const CRITICAL_PRIORITY: u32 = 3;

/// Stable identifier of a rule (e.g. `LOAN_001`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    /// Creates a rule id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuleId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RuleId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A pre-authored business rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique rule id.
    pub id: RuleId,
    /// Human-readable name.
    pub name: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// Business domain (finance, inventory, ...).
    #[serde(default)]
    pub domain: String,
    /// Category within the domain.
    #[serde(default)]
    pub category: String,
    /// Free-text condition under which the rule applies.
    #[serde(default)]
    pub condition: String,
    /// Name of the action to dispatch.
    pub action: String,
    /// Priority, higher is more critical. Always at least 1.
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Parameters handed to the action.
    #[serde(default)]
    pub parameters: JsonMap,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: JsonMap,
}

const fn default_priority() -> u32 {
    1
}

impl Rule {
    /// Creates a rule with priority 1 and empty descriptive fields.
    #[must_use]
    pub fn new(id: impl Into<RuleId>, name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            domain: String::new(),
            category: String::new(),
            condition: String::new(),
            action: action.into(),
            priority: default_priority(),
            parameters: JsonMap::new(),
            metadata: JsonMap::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets domain and category.
    #[must_use]
    pub fn with_scope(mut self, domain: impl Into<String>, category: impl Into<String>) -> Self {
        self.domain = domain.into();
        self.category = category.into();
        self
    }

    /// Sets the condition text.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Adds one action parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Adds one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns true if a failure of this rule fails its whole plan.
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        self.priority >= CRITICAL_PRIORITY
    }

    /// Checks the structural invariants of a rule.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` for an empty id, an empty action, or a zero priority.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyRuleId);
        }
        if self.action.trim().is_empty() {
            return Err(ValidationError::EmptyAction {
                rule_id: self.id.clone(),
            });
        }
        if self.priority == 0 {
            return Err(ValidationError::InvalidPriority {
                rule_id: self.id.clone(),
                priority: self.priority,
            });
        }
        Ok(())
    }

    /// Renders the rule as a single line of text for indexing and retrieval.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut parts = vec![
            format!("Domain: {}", self.domain),
            format!("Category: {}", self.category),
            format!("Rule: {}", self.name),
            format!("Description: {}", self.description),
            format!("Condition: {}", self.condition),
            format!("Action: {}", self.action),
            format!("Priority: {}", self.priority),
        ];

        if !self.parameters.is_empty() {
            let params = self
                .parameters
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("Parameters: {params}"));
        }

        parts.join(" | ")
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) -> {}", self.id, self.name, self.action)
    }
}

/// A rule returned by retrieval, before reasoning and confidence filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRule {
    /// The retrieved rule.
    pub rule: Rule,
    /// Retrieval similarity score.
    pub similarity_score: f32,
    /// Applicability confidence, once reasoned about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Justification text.
    #[serde(default)]
    pub reasoning: String,
}

impl CandidateRule {
    /// Creates an unscored candidate.
    #[must_use]
    pub fn new(rule: Rule, similarity_score: f32) -> Self {
        Self {
            rule,
            similarity_score,
            confidence: None,
            reasoning: String::new(),
        }
    }
}
