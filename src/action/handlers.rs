//! Built-in action handlers.
//!
//! Each handler is a deterministic result builder: it echoes context values
//! back and stamps the output with an RFC 3339 `timestamp`. None of them
//! perform I/O.

use chrono::Utc;
use serde_json::{json, Value};

use crate::action::ActionRegistry;
use crate::error::ActionError;
use crate::rule::JsonMap;

type HandlerResult = Result<JsonMap, ActionError>;

/// Installs every built-in action and validator.
pub(crate) fn register_defaults(registry: &mut ActionRegistry) {
    registry
        // finance
        .register("approve_basic_review", approve_basic_review)
        .register("require_manual_review", require_manual_review)
        .register("instant_approve", instant_approve)
        .register("require_collateral", require_collateral)
        .register("deny_access", deny_access)
        // inventory
        .register("generate_low_stock_alert", generate_low_stock_alert)
        .register("emergency_reorder", emergency_reorder)
        .register("block_reorder", block_reorder)
        .register("increase_reorder_quantity", increase_reorder_quantity)
        .register("mark_for_clearance", mark_for_clearance)
        // compliance
        .register("schedule_data_deletion", schedule_data_deletion)
        .register("request_consent_renewal", request_consent_renewal)
        .register("execute_data_deletion", execute_data_deletion)
        .register("enforce_encryption", enforce_encryption)
        // customer service
        .register("route_to_senior_agent", route_to_senior_agent)
        .register("escalate_to_technical_team", escalate_to_technical_team)
        .register("route_to_global_team", route_to_global_team)
        .register("route_to_billing_specialist", route_to_billing_specialist);

    registry
        .register_validator("increase_reorder_quantity", |p| {
            optional_field(p, "seasonal_multiplier", "a positive number", |v| {
                v.as_f64().is_some_and(|m| m > 0.0)
            })
        })
        .register_validator("deny_access", |p| {
            optional_field(p, "authorized_roles", "an array of strings", |v| {
                v.as_array().is_some_and(|roles| roles.iter().all(Value::is_string))
            })
        })
        .register_validator("enforce_encryption", |p| {
            optional_field(p, "required_encryption_standard", "a string", Value::is_string)
        });
}

fn optional_field(
    parameters: &JsonMap,
    field: &str,
    expected: &str,
    check: impl Fn(&Value) -> bool,
) -> Result<(), ActionError> {
    match parameters.get(field) {
        Some(value) if !check(value) => Err(ActionError::InvalidInput {
            field: field.to_string(),
            expected: expected.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Successful output: `success`, `action_taken`, the given fields, `timestamp`.
fn taken(action_taken: &str, fields: Value) -> HandlerResult {
    let mut output = JsonMap::new();
    output.insert("success".to_string(), Value::Bool(true));
    output.insert("action_taken".to_string(), Value::String(action_taken.to_string()));
    if let Value::Object(extra) = fields {
        output.extend(extra);
    }
    output.insert("timestamp".to_string(), Value::String(Utc::now().to_rfc3339()));
    Ok(output)
}

fn ctx_or(context: &JsonMap, key: &str, default: Value) -> Value {
    context.get(key).cloned().unwrap_or(default)
}

fn number(value: &Value, field: &str) -> Result<f64, ActionError> {
    value.as_f64().ok_or_else(|| ActionError::InvalidInput {
        field: field.to_string(),
        expected: "a number".to_string(),
    })
}

/// Multiplies a JSON number, keeping integers integral.
fn scale(value: &Value, factor: i64, field: &str) -> Result<Value, ActionError> {
    if let Some(n) = value.as_i64() {
        return Ok(json!(n.saturating_mul(factor)));
    }
    #[allow(clippy::cast_precision_loss)]
    let scaled = number(value, field)? * factor as f64;
    Ok(json!(scaled))
}

// finance

fn approve_basic_review(_parameters: &JsonMap, _context: &JsonMap) -> HandlerResult {
    taken(
        "loan_approved_for_basic_review",
        json!({
            "next_steps": ["Basic underwriting review", "Document verification"],
            "approval_level": "basic",
        }),
    )
}

fn require_manual_review(parameters: &JsonMap, _context: &JsonMap) -> HandlerResult {
    taken(
        "manual_review_required",
        json!({
            "assigned_to": "senior_underwriter",
            "priority": "high",
            "review_criteria": parameters,
        }),
    )
}

fn instant_approve(_parameters: &JsonMap, context: &JsonMap) -> HandlerResult {
    taken(
        "instant_approval",
        json!({
            "approval_amount": ctx_or(context, "loan_amount", json!(0)),
            "approval_rate": ctx_or(context, "interest_rate", json!("TBD")),
        }),
    )
}

fn require_collateral(_parameters: &JsonMap, _context: &JsonMap) -> HandlerResult {
    taken(
        "collateral_required",
        json!({
            "collateral_percentage": 80,
            "acceptable_collateral_types": ["real_estate", "securities", "cash_deposit"],
        }),
    )
}

fn deny_access(parameters: &JsonMap, _context: &JsonMap) -> HandlerResult {
    taken(
        "access_denied",
        json!({
            "reason": "Insufficient privileges for financial data access",
            "required_roles": parameters.get("authorized_roles").cloned().unwrap_or_else(|| json!([])),
        }),
    )
}

// inventory

fn generate_low_stock_alert(_parameters: &JsonMap, context: &JsonMap) -> HandlerResult {
    taken(
        "low_stock_alert_generated",
        json!({
            "alert_sent_to": ["inventory_manager", "procurement_team"],
            "current_stock": ctx_or(context, "current_stock", json!(0)),
            "minimum_stock": ctx_or(context, "minimum_stock_level", json!(0)),
        }),
    )
}

fn emergency_reorder(_parameters: &JsonMap, context: &JsonMap) -> HandlerResult {
    let minimum = ctx_or(context, "minimum_stock_level", json!(100));
    let reorder_quantity = scale(&minimum, 2, "minimum_stock_level")?;
    taken(
        "emergency_reorder_initiated",
        json!({
            "reorder_quantity": reorder_quantity,
            "supplier": "primary_supplier",
            "expected_delivery": "24-48 hours",
        }),
    )
}

fn block_reorder(_parameters: &JsonMap, context: &JsonMap) -> HandlerResult {
    taken(
        "reorder_blocked",
        json!({
            "reason": "Current stock exceeds maximum threshold",
            "current_stock": ctx_or(context, "current_stock", json!(0)),
            "maximum_stock": ctx_or(context, "maximum_stock_level", json!(0)),
        }),
    )
}

fn increase_reorder_quantity(parameters: &JsonMap, context: &JsonMap) -> HandlerResult {
    let base = ctx_or(context, "normal_reorder_quantity", json!(100));
    let multiplier = parameters
        .get("seasonal_multiplier")
        .cloned()
        .unwrap_or_else(|| json!(1.5));
    let product = number(&base, "normal_reorder_quantity")? * number(&multiplier, "seasonal_multiplier")?;
    #[allow(clippy::cast_possible_truncation)]
    let new_quantity = product.trunc() as i64;
    taken(
        "reorder_quantity_increased",
        json!({
            "original_quantity": base,
            "new_quantity": new_quantity,
            "multiplier": multiplier,
            "reason": "Seasonal demand adjustment",
        }),
    )
}

fn mark_for_clearance(_parameters: &JsonMap, context: &JsonMap) -> HandlerResult {
    taken(
        "marked_for_clearance",
        json!({
            "clearance_discount": "50%",
            "expiry_date": ctx_or(context, "expiry_date", Value::Null),
            "notification_sent": "sales_team",
        }),
    )
}

// compliance

fn schedule_data_deletion(_parameters: &JsonMap, context: &JsonMap) -> HandlerResult {
    taken(
        "data_deletion_scheduled",
        json!({
            "scheduled_date": "30 days from now",
            "data_categories": ctx_or(context, "data_type", json!("personal")),
            "compliance_regulation": "GDPR",
        }),
    )
}

fn request_consent_renewal(_parameters: &JsonMap, context: &JsonMap) -> HandlerResult {
    taken(
        "consent_renewal_requested",
        json!({
            "notification_sent": ctx_or(context, "user_email", json!("user")),
            "consent_type": "data_processing",
            "deadline": "30 days",
        }),
    )
}

fn execute_data_deletion(_parameters: &JsonMap, _context: &JsonMap) -> HandlerResult {
    taken(
        "data_deleted",
        json!({
            "deletion_scope": "all_personal_data",
            "verification_required": true,
            "compliance_log_updated": true,
        }),
    )
}

fn enforce_encryption(parameters: &JsonMap, _context: &JsonMap) -> HandlerResult {
    taken(
        "encryption_enforced",
        json!({
            "encryption_standard": parameters
                .get("required_encryption_standard")
                .cloned()
                .unwrap_or_else(|| json!("AES256")),
            "data_encrypted": true,
            "compliance_status": "PCI-DSS compliant",
        }),
    )
}

// customer service

fn route_to_senior_agent(_parameters: &JsonMap, context: &JsonMap) -> HandlerResult {
    taken(
        "routed_to_senior_agent",
        json!({
            "agent_type": "senior_support",
            "priority": "high",
            "customer_tier": ctx_or(context, "customer_tier", json!("VIP")),
        }),
    )
}

fn escalate_to_technical_team(_parameters: &JsonMap, context: &JsonMap) -> HandlerResult {
    taken(
        "escalated_to_technical_team",
        json!({
            "team": "technical_support",
            "complexity_score": ctx_or(context, "complexity_score", json!(8)),
            "issue_category": "technical",
        }),
    )
}

fn route_to_global_team(_parameters: &JsonMap, _context: &JsonMap) -> HandlerResult {
    taken(
        "routed_to_global_team",
        json!({
            "team_location": "asia_pacific",
            "reason": "after_hours_support",
            "local_time": Utc::now().to_rfc3339(),
        }),
    )
}

fn route_to_billing_specialist(_parameters: &JsonMap, context: &JsonMap) -> HandlerResult {
    let amount = ctx_or(context, "dispute_amount", json!(0));
    let priority = if number(&amount, "dispute_amount")? > 1000.0 {
        "high"
    } else {
        "normal"
    };
    taken(
        "routed_to_billing_specialist",
        json!({
            "specialist_team": "billing_disputes",
            "dispute_amount": amount,
            "priority": priority,
        }),
    )
}
