use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::action::{handlers, ActionExecutor};
use crate::error::ActionError;
use crate::rule::JsonMap;

/// Builds an action's output from `(parameters, context)`.
pub type ActionHandler = Arc<dyn Fn(&JsonMap, &JsonMap) -> Result<JsonMap, ActionError> + Send + Sync>;

/// Checks an action's parameters.
pub type ParameterValidator = Arc<dyn Fn(&JsonMap) -> Result<(), ActionError> + Send + Sync>;

/// Name-keyed table of action handlers.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: BTreeMap<String, ActionHandler>,
    validators: BTreeMap<String, ParameterValidator>,
}

impl ActionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in actions and their validators.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        handlers::register_defaults(&mut registry);
        registry
    }

    /// Registers (or replaces) the handler for an action.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&JsonMap, &JsonMap) -> Result<JsonMap, ActionError> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    /// Registers (or replaces) the parameter validator for an action.
    pub fn register_validator<F>(&mut self, name: impl Into<String>, validator: F) -> &mut Self
    where
        F: Fn(&JsonMap) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.validators.insert(name.into(), Arc::new(validator));
        self
    }

    /// Returns true if the action has a handler.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered action names, sorted.
    #[must_use]
    pub fn supported_actions(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    fn unsupported(&self, action: &str) -> JsonMap {
        let mut output = JsonMap::new();
        output.insert("success".to_string(), Value::Bool(false));
        output.insert(
            "error".to_string(),
            Value::String(format!("Unsupported action: {action}")),
        );
        output.insert("supported_actions".to_string(), json!(self.supported_actions()));
        output
    }
}

impl ActionExecutor for ActionRegistry {
    fn validate(&self, action: &str, parameters: &JsonMap) -> bool {
        let Some(validator) = self.validators.get(action) else {
            return true;
        };
        match validator(parameters) {
            Ok(()) => true,
            Err(err) => {
                debug!(action, error = %err, "parameter validation failed");
                false
            }
        }
    }

    fn execute(&self, action: &str, parameters: &JsonMap, context: &JsonMap) -> JsonMap {
        let Some(handler) = self.handlers.get(action) else {
            return self.unsupported(action);
        };
        match handler(parameters, context) {
            Ok(output) => output,
            Err(err) => {
                let mut output = JsonMap::new();
                output.insert("success".to_string(), Value::Bool(false));
                output.insert(
                    "error".to_string(),
                    Value::String(format!("Error executing {action}: {err}")),
                );
                output
            }
        }
    }

    fn supported_actions(&self) -> Vec<String> {
        Self::supported_actions(self)
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.handlers.keys().collect::<Vec<_>>())
            .field("validators", &self.validators.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::action::{output_error, output_succeeded};

    fn map(value: Value) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_defaults_cover_all_domains() {
        let registry = ActionRegistry::with_defaults();
        assert_eq!(registry.supported_actions().len(), 18);
        for action in [
            "approve_basic_review",
            "emergency_reorder",
            "enforce_encryption",
            "route_to_billing_specialist",
        ] {
            assert!(registry.contains(action), "{action} missing");
        }
    }

    #[test]
    fn test_unsupported_action_for_every_unknown_name() {
        let registry = ActionRegistry::with_defaults();
        for name in ["launch_rocket", "", "APPROVE_BASIC_REVIEW", "approve_basic_review "] {
            let output = registry.execute(name, &JsonMap::new(), &JsonMap::new());
            assert!(!output_succeeded(&output));
            assert_eq!(output_error(&output), Some(format!("Unsupported action: {name}").as_str()));
            assert_eq!(output["supported_actions"].as_array().unwrap().len(), 18);
            assert!(registry.validate(name, &JsonMap::new()));
        }
    }

    #[test]
    fn test_handler_error_is_wrapped() {
        let mut registry = ActionRegistry::new();
        registry.register("flaky", |_, _| Err(ActionError::Handler("downstream timeout".into())));
        let output = registry.execute("flaky", &JsonMap::new(), &JsonMap::new());
        assert!(!output_succeeded(&output));
        assert_eq!(output_error(&output), Some("Error executing flaky: downstream timeout"));
    }

    #[test]
    fn test_register_replaces_handler() {
        let mut registry = ActionRegistry::with_defaults();
        registry.register("instant_approve", |_, _| Ok(map(json!({"success": true, "action_taken": "custom"}))));
        let output = registry.execute("instant_approve", &JsonMap::new(), &JsonMap::new());
        assert_eq!(output["action_taken"], "custom");
        assert_eq!(registry.supported_actions().len(), 18);
    }

    #[test]
    fn test_validators() {
        let registry = ActionRegistry::with_defaults();
        assert!(registry.validate("increase_reorder_quantity", &JsonMap::new()));
        assert!(registry.validate("increase_reorder_quantity", &map(json!({"seasonal_multiplier": 2}))));
        assert!(!registry.validate("increase_reorder_quantity", &map(json!({"seasonal_multiplier": -1}))));
        assert!(!registry.validate("increase_reorder_quantity", &map(json!({"seasonal_multiplier": "2x"}))));
        assert!(registry.validate("deny_access", &map(json!({"authorized_roles": ["cfo"]}))));
        assert!(!registry.validate("deny_access", &map(json!({"authorized_roles": "cfo"}))));
        assert!(!registry.validate("enforce_encryption", &map(json!({"required_encryption_standard": 256}))));
        assert!(registry.validate("approve_basic_review", &map(json!({"anything": null}))));
    }
}
