//! In-memory catalog backend.
//!
//! Thread-safe reference implementation of [`RuleCatalog`]. Intended for
//! embedded usage, tests, and as the backing store of the keyword retriever.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use tracing::info;

use crate::catalog::traits::RuleCatalog;
use crate::error::CatalogError;
use crate::rule::{Rule, RuleId};

fn lock_err(context: &'static str) -> CatalogError {
    CatalogError::Backend(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct CatalogState {
    rules: Vec<Rule>,
    by_id: HashMap<RuleId, usize>,
    fingerprint: String,
}

impl CatalogState {
    fn build(rules: Vec<Rule>) -> Result<Self, CatalogError> {
        let mut by_id = HashMap::with_capacity(rules.len());
        for (idx, rule) in rules.iter().enumerate() {
            rule.validate()?;
            if by_id.insert(rule.id.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateRule(rule.id.clone()));
            }
        }
        let fingerprint = fingerprint(&rules)?;
        Ok(Self {
            rules,
            by_id,
            fingerprint,
        })
    }
}

/// Stable content hash of a rule set, in load order.
fn fingerprint(rules: &[Rule]) -> Result<String, CatalogError> {
    let bytes = serde_json::to_vec(rules)
        .map_err(|e| CatalogError::Backend(format!("fingerprint serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// In-memory rule catalog.
#[derive(Debug)]
pub struct InMemoryRuleCatalog {
    state: RwLock<CatalogState>,
}

impl Default for InMemoryRuleCatalog {
    fn default() -> Self {
        // Same bytes serde_json produces for an empty rule list.
        Self {
            state: RwLock::new(CatalogState {
                rules: Vec::new(),
                by_id: HashMap::new(),
                fingerprint: blake3::hash(b"[]").to_hex().to_string(),
            }),
        }
    }
}

impl InMemoryRuleCatalog {
    /// Create a new empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog holding `rules`.
    ///
    /// # Errors
    ///
    /// Fails on an invalid rule or a duplicate id.
    pub fn from_rules(rules: Vec<Rule>) -> Result<Self, CatalogError> {
        Ok(Self {
            state: RwLock::new(CatalogState::build(rules)?),
        })
    }

    /// Atomically replace the whole rule set.
    ///
    /// On error the previous rule set stays in place.
    ///
    /// # Errors
    ///
    /// Fails on an invalid rule or a duplicate id.
    pub fn replace_all(&self, rules: Vec<Rule>) -> Result<(), CatalogError> {
        let next = CatalogState::build(rules)?;
        let mut state = self.state.write().map_err(|_| lock_err("catalog.replace_all"))?;
        info!(
            rules = next.rules.len(),
            fingerprint = %next.fingerprint,
            "rule catalog replaced"
        );
        *state = next;
        Ok(())
    }

    /// Content hash of the current rule set; changes on every effective reload.
    ///
    /// # Errors
    ///
    /// Fails only if the lock is poisoned.
    pub fn fingerprint(&self) -> Result<String, CatalogError> {
        let state = self.state.read().map_err(|_| lock_err("catalog.fingerprint"))?;
        Ok(state.fingerprint.clone())
    }
}

impl RuleCatalog for InMemoryRuleCatalog {
    fn get(&self, id: &RuleId) -> Result<Option<Rule>, CatalogError> {
        let state = self.state.read().map_err(|_| lock_err("catalog.get"))?;
        Ok(state.by_id.get(id).map(|&idx| state.rules[idx].clone()))
    }

    fn all(&self) -> Result<Vec<Rule>, CatalogError> {
        let state = self.state.read().map_err(|_| lock_err("catalog.all"))?;
        Ok(state.rules.clone())
    }

    fn domains(&self) -> Result<BTreeSet<String>, CatalogError> {
        let state = self.state.read().map_err(|_| lock_err("catalog.domains"))?;
        Ok(state.rules.iter().map(|r| r.domain.clone()).collect())
    }

    fn categories(&self) -> Result<BTreeSet<String>, CatalogError> {
        let state = self.state.read().map_err(|_| lock_err("catalog.categories"))?;
        Ok(state.rules.iter().map(|r| r.category.clone()).collect())
    }

    fn len(&self) -> Result<usize, CatalogError> {
        let state = self.state.read().map_err(|_| lock_err("catalog.len"))?;
        Ok(state.rules.len())
    }
}
