//! Rule retrieval: scenario text to ranked candidate rules.
//!
//! Retrieval is an external capability (typically a vector search over rule
//! embeddings). [`KeywordRetriever`] is an offline reference implementation
//! over any [`RuleCatalog`](crate::catalog::RuleCatalog).

mod keyword;

pub use keyword::KeywordRetriever;

use crate::error::ProviderError;
use crate::rule::CandidateRule;

/// A retrieval request.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalQuery {
    /// Query text (the enhanced scenario).
    pub text: String,
    /// Maximum number of candidates to return.
    pub top_k: usize,
    /// Only return rules in this domain.
    pub domain_filter: Option<String>,
    /// Only return rules in this category.
    pub category_filter: Option<String>,
    /// Drop candidates scoring below this.
    pub min_score: Option<f32>,
}

impl RetrievalQuery {
    /// Creates an unfiltered query.
    #[must_use]
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            top_k,
            domain_filter: None,
            category_filter: None,
            min_score: None,
        }
    }

    /// Restricts results to a domain.
    #[must_use]
    pub fn with_domain(mut self, domain: Option<String>) -> Self {
        self.domain_filter = domain;
        self
    }

    /// Restricts results to a category.
    #[must_use]
    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category_filter = category;
        self
    }

    /// Sets the minimum similarity score.
    #[must_use]
    pub const fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

/// Finds rules relevant to a query.
pub trait RuleRetriever: Send + Sync {
    /// Returns candidates ordered by descending relevance, at most `top_k`,
    /// honouring the filters and `min_score`.
    fn search(&self, query: &RetrievalQuery) -> Result<Vec<CandidateRule>, ProviderError>;
}
