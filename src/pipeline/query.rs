//! Enhanced retrieval query construction.

/// Topic tags appended when any of their keywords occurs in the scenario.
const TOPIC_TAGS: &[(&[&str], &str)] = &[
    (
        &["loan", "credit", "finance", "money", "payment"],
        "financial business rules",
    ),
    (
        &["inventory", "stock", "product", "warehouse"],
        "inventory management rules",
    ),
    (
        &["customer", "support", "service", "ticket"],
        "customer service rules",
    ),
    (
        &["data", "privacy", "compliance", "gdpr", "regulation"],
        "compliance regulatory rules",
    ),
];

/// Builds the retrieval query for a scenario.
///
/// The scenario comes first, then `domain:<hint>` and `category:<hint>` when
/// given, then one tag per matching topic. Keywords match as case-insensitive
/// substrings, so "stocks" matches "stock".
#[must_use]
pub fn enhance_query(scenario: &str, domain_hint: Option<&str>, category_hint: Option<&str>) -> String {
    let mut parts = vec![scenario.to_string()];

    if let Some(domain) = domain_hint.filter(|d| !d.trim().is_empty()) {
        parts.push(format!("domain:{domain}"));
    }
    if let Some(category) = category_hint.filter(|c| !c.trim().is_empty()) {
        parts.push(format!("category:{category}"));
    }

    let lowered = scenario.to_lowercase();
    for (keywords, tag) in TOPIC_TAGS {
        if keywords.iter().any(|k| lowered.contains(k)) {
            parts.push((*tag).to_string());
        }
    }

    parts.join(" ")
}
