//! Checking free-text rule conditions against a context.
//!
//! A condition is a disjunction (`or`) of conjunctions (`and`) of clauses of
//! the form `field <op> operand`:
//!
//! - `>=`, `<=`, `>`, `<` compare numbers;
//! - `==`, `!=`, `is`, `is not` compare numbers, booleans or strings
//!   (strings case-insensitively);
//! - `in`, `not in` test membership in an array.
//!
//! The left side is always a context field. The operand is a number, `true` or
//! `false`, a quoted string, a context field, a rule parameter, or a single
//! bare word taken literally. An identifier containing `_` that names neither a
//! context field nor a parameter is a missing field, not a literal.
//!
//! Anything that cannot be evaluated (a missing field, a type mismatch, prose
//! such as "customer is a VIP") leaves the clause [`ConditionCheck::Unknown`].

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::rule::JsonMap;

/// Result of checking a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionCheck {
    /// The context satisfies the condition.
    Holds,
    /// The context contradicts the condition.
    Fails,
    /// The context cannot settle the condition.
    Unknown,
}

impl ConditionCheck {
    fn from_bool(holds: bool) -> Self {
        if holds {
            Self::Holds
        } else {
            Self::Fails
        }
    }

    fn negate(self) -> Self {
        match self {
            Self::Holds => Self::Fails,
            Self::Fails => Self::Holds,
            Self::Unknown => Self::Unknown,
        }
    }
}

static CLAUSE_RE: OnceLock<Regex> = OnceLock::new();
static OR_RE: OnceLock<Regex> = OnceLock::new();
static AND_RE: OnceLock<Regex> = OnceLock::new();

fn clause_re() -> &'static Regex {
    CLAUSE_RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*([a-z_][a-z0-9_]*)\s*(>=|<=|==|!=|>|<|\bnot\s+in\b|\bin\b|\bis\s+not\b|\bis\b)\s*(.+?)\s*$",
        )
        .expect("clause pattern is valid")
    })
}

fn or_re() -> &'static Regex {
    OR_RE.get_or_init(|| Regex::new(r"(?i)\s+or\s+").expect("or pattern is valid"))
}

fn and_re() -> &'static Regex {
    AND_RE.get_or_init(|| Regex::new(r"(?i)\s+and\s+").expect("and pattern is valid"))
}

/// Checks `condition` against `context`, resolving operands through the
/// rule's `parameters` when the context lacks them.
///
/// An empty condition holds. Otherwise the condition holds if any disjunct
/// holds, fails if every disjunct fails, and is unknown in between.
#[must_use]
pub fn check_condition(condition: &str, context: &JsonMap, parameters: &JsonMap) -> ConditionCheck {
    if condition.trim().is_empty() {
        return ConditionCheck::Holds;
    }

    let mut unknown = false;
    for disjunct in or_re().split(condition) {
        let mut verdict = ConditionCheck::Holds;
        for clause in and_re().split(disjunct) {
            match check_clause(clause, context, parameters) {
                ConditionCheck::Fails => {
                    verdict = ConditionCheck::Fails;
                    break;
                }
                ConditionCheck::Unknown => verdict = ConditionCheck::Unknown,
                ConditionCheck::Holds => {}
            }
        }
        match verdict {
            ConditionCheck::Holds => return ConditionCheck::Holds,
            ConditionCheck::Unknown => unknown = true,
            ConditionCheck::Fails => {}
        }
    }

    if unknown {
        ConditionCheck::Unknown
    } else {
        ConditionCheck::Fails
    }
}

fn check_clause(clause: &str, context: &JsonMap, parameters: &JsonMap) -> ConditionCheck {
    let Some(caps) = clause_re().captures(clause) else {
        return ConditionCheck::Unknown;
    };
    let Some(actual) = context.get(&caps[1]) else {
        return ConditionCheck::Unknown;
    };
    let Some(expected) = operand(&caps[3], context, parameters) else {
        return ConditionCheck::Unknown;
    };

    let op = caps[2].split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    match op.as_str() {
        ">=" | "<=" | ">" | "<" => {
            let (Some(a), Some(b)) = (number(actual), number(&expected)) else {
                return ConditionCheck::Unknown;
            };
            ConditionCheck::from_bool(match op.as_str() {
                ">=" => a >= b,
                "<=" => a <= b,
                ">" => a > b,
                _ => a < b,
            })
        }
        "==" | "is" => ConditionCheck::from_bool(values_equal(actual, &expected)),
        "!=" | "is not" => ConditionCheck::from_bool(!values_equal(actual, &expected)),
        "in" | "not in" => {
            let Value::Array(items) = &expected else {
                return ConditionCheck::Unknown;
            };
            let found = ConditionCheck::from_bool(items.iter().any(|item| values_equal(actual, item)));
            if op == "in" {
                found
            } else {
                found.negate()
            }
        }
        _ => ConditionCheck::Unknown,
    }
}

fn operand(text: &str, context: &JsonMap, parameters: &JsonMap) -> Option<Value> {
    let text = text.trim();
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return Some(Value::String(text[1..text.len() - 1].to_string()));
        }
    }
    if let Ok(n) = text.parse::<f64>() {
        return serde_json::Number::from_f64(n).map(Value::Number);
    }
    if text.eq_ignore_ascii_case("true") {
        return Some(Value::Bool(true));
    }
    if text.eq_ignore_ascii_case("false") {
        return Some(Value::Bool(false));
    }
    if let Some(value) = context.get(text).or_else(|| parameters.get(text)) {
        return Some(value.clone());
    }
    if text.contains('_') || text.contains(char::is_whitespace) {
        return None;
    }
    Some(Value::String(text.to_string()))
}

/// Numbers only; booleans and numeric strings do not count.
fn number(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
            _ => false,
        },
        (Value::String(x), Value::String(y)) => x.eq_ignore_ascii_case(y),
        _ => a == b,
    }
}
