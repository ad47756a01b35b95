//! Abstract catalog trait.

use std::collections::BTreeSet;

use crate::error::CatalogError;
use crate::rule::{Rule, RuleId};

/// Read access to the authoritative rule set.
///
/// Implementations must be safe for concurrent readers; a reload replaces the
/// whole set at once so readers never observe a partially loaded catalog.
pub trait RuleCatalog: Send + Sync {
    /// Get a rule by id. Absent ids return `Ok(None)`.
    fn get(&self, id: &RuleId) -> Result<Option<Rule>, CatalogError>;

    /// All rules in load order.
    fn all(&self) -> Result<Vec<Rule>, CatalogError>;

    /// Distinct domains across all rules.
    fn domains(&self) -> Result<BTreeSet<String>, CatalogError>;

    /// Distinct categories across all rules.
    fn categories(&self) -> Result<BTreeSet<String>, CatalogError>;

    /// Rules belonging to a domain, in load order.
    fn by_domain(&self, domain: &str) -> Result<Vec<Rule>, CatalogError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|rule| rule.domain == domain)
            .collect())
    }

    /// Rules belonging to a category, in load order.
    fn by_category(&self, category: &str) -> Result<Vec<Rule>, CatalogError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|rule| rule.category == category)
            .collect())
    }

    /// Number of rules in the catalog.
    fn len(&self) -> Result<usize, CatalogError> {
        Ok(self.all()?.len())
    }

    /// Returns true if the catalog holds no rules.
    fn is_empty(&self) -> Result<bool, CatalogError> {
        Ok(self.len()? == 0)
    }
}
