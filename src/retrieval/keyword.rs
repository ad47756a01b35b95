//! Keyword-overlap retriever.
//!
//! Scores each rule by the fraction of distinct query terms found in its
//! descriptive fields. The score is absolute: a request sharing one word out
//! of four with the best rule scores 0.25, however poor the rest of the
//! catalog is, so `min_score` rejects weak matches outright.
//!
//! Terms are lowercased alphabetic words with stop words dropped and a plural
//! `s` stripped. Bare numbers are dropped; they belong to the context, not to
//! the wording of a rule.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::debug;

use crate::catalog::RuleCatalog;
use crate::error::ProviderError;
use crate::retrieval::{RetrievalQuery, RuleRetriever};
use crate::rule::{CandidateRule, Rule};

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "category", "domain", "for", "from", "has",
    "in", "is", "it", "me", "of", "on", "or", "rules", "that", "the", "to", "wants", "with",
];

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| Regex::new(r"[a-z0-9]+").expect("token pattern is valid"))
}

fn stem(term: &str) -> &str {
    if term.len() > 3 && term.ends_with('s') && !term.ends_with("ss") {
        &term[..term.len() - 1]
    } else {
        term
    }
}

/// Lowercased, stemmed terms, without stop words or bare numbers.
pub(crate) fn tokenize(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    token_re()
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|t| t.len() > 1 && !STOP_WORDS.contains(t))
        .filter(|t| !t.bytes().all(|b| b.is_ascii_digit()))
        .map(|t| stem(t).to_string())
        .collect()
}

fn rule_terms(rule: &Rule) -> HashSet<String> {
    let text = [
        rule.name.as_str(),
        rule.description.as_str(),
        rule.domain.as_str(),
        rule.category.as_str(),
        rule.condition.as_str(),
        rule.action.as_str(),
    ]
    .join(" ");
    tokenize(&text)
}

/// Offline retriever over a rule catalog.
#[derive(Clone)]
pub struct KeywordRetriever {
    catalog: Arc<dyn RuleCatalog>,
}

impl KeywordRetriever {
    /// Create a retriever reading from `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<dyn RuleCatalog>) -> Self {
        Self { catalog }
    }
}

impl RuleRetriever for KeywordRetriever {
    fn search(&self, query: &RetrievalQuery) -> Result<Vec<CandidateRule>, ProviderError> {
        let rules = self
            .catalog
            .all()
            .map_err(|e| ProviderError::failed("keyword", e.to_string()))?;
        let query_terms = tokenize(&query.text);
        if query_terms.is_empty() || query.top_k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, Rule)> = rules
            .into_iter()
            .filter(|r| query.domain_filter.as_ref().map_or(true, |d| &r.domain == d))
            .filter(|r| query.category_filter.as_ref().map_or(true, |c| &r.category == c))
            .filter_map(|r| {
                let hits = rule_terms(&r).intersection(&query_terms).count();
                (hits > 0).then_some((hits, r))
            })
            .collect();

        // Stable: equal scores and priorities keep catalog order.
        scored.sort_by(|(a_hits, a), (b_hits, b)| {
            b_hits.cmp(a_hits).then_with(|| b.priority.cmp(&a.priority))
        });

        #[allow(clippy::cast_precision_loss)]
        let candidates: Vec<CandidateRule> = scored
            .into_iter()
            .map(|(hits, rule)| CandidateRule::new(rule, hits as f32 / query_terms.len() as f32))
            .filter(|c| query.min_score.map_or(true, |min| c.similarity_score >= min))
            .take(query.top_k)
            .collect();

        debug!(
            query_terms = query_terms.len(),
            candidates = candidates.len(),
            "keyword retrieval finished"
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::catalog::InMemoryRuleCatalog;

    fn retriever() -> KeywordRetriever {
        let rules = vec![
            Rule::new("LOAN_001", "Basic credit review", "approve_basic_review")
                .with_scope("finance", "loan_approval")
                .with_description("Loan applicants with fair credit score")
                .with_condition("credit_score >= 650 and loan_amount <= 10000")
                .with_priority(2),
            Rule::new("LOAN_002", "Collateral for large loans", "require_collateral")
                .with_scope("finance", "loan_approval")
                .with_description("Large loan amounts need collateral")
                .with_condition("loan_amount > 50000")
                .with_priority(3),
            Rule::new("INV_001", "Low stock alert", "generate_low_stock_alert")
                .with_scope("inventory", "stock_management")
                .with_description("Alert when product stock is low")
                .with_condition("current_stock < minimum_stock_level"),
        ];
        KeywordRetriever::new(Arc::new(InMemoryRuleCatalog::from_rules(rules).unwrap()))
    }

    #[test]
    fn test_tokenize_splits_identifiers_and_drops_stop_words() {
        let terms = tokenize("The customer wants a loan_amount of $5000 for two Loans");
        assert!(terms.contains("customer"));
        assert!(terms.contains("loan"));
        assert!(terms.contains("amount"));
        assert!(terms.contains("two"));
        assert!(!terms.contains("5000"));
        assert!(!terms.contains("loans"));
        assert!(!terms.contains("the"));
        assert!(!terms.contains("a"));
        assert!(tokenize("business class").contains("business"));
    }

    #[test]
    fn test_full_overlap_scores_one() {
        let results = retriever()
            .search(&RetrievalQuery::new("loan with fair credit score review", 10))
            .unwrap();
        assert_eq!(results[0].rule.id.as_str(), "LOAN_001");
        assert!((results[0].similarity_score - 1.0).abs() < f32::EPSILON);
        assert!(results.iter().all(|c| c.rule.domain == "finance"));
    }

    #[test]
    fn test_filters_and_min_score() {
        let r = retriever();
        let only_inventory = r
            .search(&RetrievalQuery::new("loan stock", 10).with_domain(Some("inventory".into())))
            .unwrap();
        assert_eq!(only_inventory.len(), 1);
        assert_eq!(only_inventory[0].rule.id.as_str(), "INV_001");

        let strict = r
            .search(&RetrievalQuery::new("loan credit score review", 10).with_min_score(0.99))
            .unwrap();
        assert_eq!(strict.len(), 1);
    }

    #[test]
    fn test_top_k_and_no_match() {
        let r = retriever();
        assert_eq!(r.search(&RetrievalQuery::new("loan", 1)).unwrap().len(), 1);
        assert!(r.search(&RetrievalQuery::new("weather forecast", 5)).unwrap().is_empty());
        assert!(r.search(&RetrievalQuery::new("the a of", 5)).unwrap().is_empty());
    }

    #[test]
    fn test_score_is_fraction_of_query_terms() {
        let r = retriever();
        let results = r
            .search(&RetrievalQuery::new("Customer asked about stock weather", 10))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule.id.as_str(), "INV_001");
        assert!((results[0].similarity_score - 0.2).abs() < 1e-6);

        let weak = r
            .search(&RetrievalQuery::new("Customer asked about stock weather", 10).with_min_score(0.56))
            .unwrap();
        assert!(weak.is_empty());
    }

    #[test]
    fn test_ties_prefer_higher_priority() {
        let results = retriever().search(&RetrievalQuery::new("loan", 10)).unwrap();
        assert_eq!(results[0].rule.id.as_str(), "LOAN_002");
        assert_eq!(results[1].rule.id.as_str(), "LOAN_001");
    }
}
