//! Actions: the named side effects a rule triggers.
//!
//! The execution engine only sees [`ActionExecutor`]. [`ActionRegistry`] is
//! the default executor, a name-keyed table of handler closures preloaded with
//! the built-in finance, inventory, compliance and customer-service actions.
//! Production deployments swap individual handlers for real integrations with
//! [`ActionRegistry::register`].

mod handlers;
mod registry;

pub use registry::{ActionHandler, ActionRegistry, ParameterValidator};

use serde_json::Value;

use crate::rule::JsonMap;

/// Dispatches rule actions.
pub trait ActionExecutor: Send + Sync {
    /// Checks a rule's parameters before its action runs.
    ///
    /// Returns true for actions the executor does not know, so that the
    /// unsupported-action error is reported by [`execute`](Self::execute).
    fn validate(&self, action: &str, parameters: &JsonMap) -> bool;

    /// Runs an action.
    ///
    /// The output always carries a boolean `success`. Successful outputs carry
    /// `action_taken`; failed ones carry `error`.
    fn execute(&self, action: &str, parameters: &JsonMap, context: &JsonMap) -> JsonMap;

    /// Names of the actions this executor can run, if it can list them.
    fn supported_actions(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Reads the `success` flag of an action output. Missing or non-boolean is false.
#[must_use]
pub fn output_succeeded(output: &JsonMap) -> bool {
    output.get("success").and_then(Value::as_bool).unwrap_or(false)
}

/// Reads the `error` message of an action output.
#[must_use]
pub fn output_error(output: &JsonMap) -> Option<&str> {
    output.get("error").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_output_flags() {
        let ok = json!({"success": true}).as_object().cloned().unwrap();
        let bad = json!({"success": "yes", "error": "nope"}).as_object().cloned().unwrap();
        assert!(output_succeeded(&ok));
        assert!(!output_succeeded(&bad));
        assert!(!output_succeeded(&JsonMap::new()));
        assert_eq!(output_error(&bad), Some("nope"));
        assert_eq!(output_error(&ok), None);
    }
}
