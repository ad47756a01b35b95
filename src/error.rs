//! Error types for ruleflow.
//!
//! All errors are strongly typed using thiserror, one enum per concern.
//! The public pipeline and execution operations never surface these to
//! their callers directly; they degrade the affected stage instead and
//! record the message in the returned decision or execution result.

use std::path::PathBuf;

use thiserror::Error;

use crate::rule::RuleId;

/// Validation errors that occur during input validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Scenario cannot be empty")]
    EmptyScenario,

    #[error("Rule id cannot be empty")]
    EmptyRuleId,

    #[error("Rule '{rule_id}' has no action")]
    EmptyAction {
        rule_id: RuleId,
    },

    #[error("Rule '{rule_id}' has priority {priority}; priority must be a positive integer")]
    InvalidPriority {
        rule_id: RuleId,
        priority: u32,
    },

    #[error("Confidence threshold {value} is out of range [0.0, 1.0]")]
    ThresholdOutOfRange {
        value: f32,
    },

    #[error("Field '{field}' must be at least {min}")]
    TooSmall {
        field: String,
        min: usize,
    },
}

/// Errors raised by a rule catalog or while loading rule files.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Duplicate rule id: {0}")]
    DuplicateRule(RuleId),

    #[error("Invalid rule: {0}")]
    InvalidRule(#[from] ValidationError),

    #[error("Failed to read rule source {path}: {message}")]
    Io {
        path: PathBuf,
        message: String,
    },

    #[error("Failed to parse rule file {path}: {message}")]
    Parse {
        path: PathBuf,
        message: String,
    },

    #[error("Catalog backend error: {0}")]
    Backend(String),
}

/// Errors reported by external retrieval or reasoning collaborators.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider '{provider}' is unavailable: {message}")]
    Unavailable {
        provider: String,
        message: String,
    },

    #[error("Provider '{provider}' returned a malformed response: {message}")]
    MalformedResponse {
        provider: String,
        message: String,
    },

    #[error("Provider '{provider}' failed: {message}")]
    Failed {
        provider: String,
        message: String,
    },
}

impl ProviderError {
    /// Creates a generic provider failure.
    #[must_use]
    pub fn failed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a malformed-response failure.
    #[must_use]
    pub fn malformed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by an action handler while building its result.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Field '{field}' must be {expected}")]
    InvalidInput {
        field: String,
        expected: String,
    },

    #[error("{0}")]
    Handler(String),
}

/// Errors from the worker-pool offload runtime.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Queue for lane '{lane}' is full (capacity {capacity})")]
    QueueFull {
        lane: String,
        capacity: usize,
    },

    #[error("Lane '{lane}' is disconnected")]
    Disconnected {
        lane: String,
    },

    #[error("Request timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Io {
        path: PathBuf,
        message: String,
    },

    #[error("Failed to parse config: {message}")]
    Parse {
        message: String,
    },

    #[error("Environment variable {name} has invalid value '{value}'")]
    InvalidEnv {
        name: String,
        value: String,
    },

    #[error("Invalid config: {0}")]
    Invalid(#[from] ValidationError),
}

/// Top-level error type for ruleflow.
#[derive(Debug, Error)]
pub enum RuleflowError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl RuleflowError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a provider error.
    #[must_use]
    pub const fn is_provider(&self) -> bool {
        matches!(self, Self::Provider(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => matches!(e, ProviderError::Unavailable { .. }),
            Self::Dispatch(e) => matches!(
                e,
                DispatchError::QueueFull { .. } | DispatchError::Timeout { .. }
            ),
            _ => false,
        }
    }
}

/// Result type alias for ruleflow operations.
pub type RuleflowResult<T> = Result<T, RuleflowError>;

/// Extracts the message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
