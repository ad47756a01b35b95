//! YAML rule-file loading.
//!
//! A rule file declares a domain and category once and lists the rules that
//! belong to them:
//!
//! ```yaml
//! domain: finance
//! category: loan_approval
//! rules:
//!   - id: LOAN_001
//!     name: Basic credit review
//!     description: Loans for customers with fair credit go to basic review
//!     condition: credit_score >= 650 and loan_amount <= 10000
//!     action: approve_basic_review
//!     priority: 2
//!     parameters:
//!       min_credit_score: 650
//! ```
//!
//! Malformed entries are skipped with a warning rather than failing the file,
//! and unreadable files are skipped rather than failing the directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::error::CatalogError;
use crate::rule::{JsonMap, Rule, RuleId};

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default = "unknown_domain")]
    domain: String,
    #[serde(default = "general_category")]
    category: String,
    #[serde(default)]
    rules: Vec<serde_yaml::Value>,
}

fn unknown_domain() -> String {
    "unknown".to_string()
}

fn general_category() -> String {
    "general".to_string()
}

#[derive(Debug, Deserialize)]
struct RuleEntry {
    id: String,
    name: String,
    description: String,
    condition: String,
    action: String,
    #[serde(default = "default_priority")]
    priority: u32,
    #[serde(default)]
    parameters: JsonMap,
    #[serde(default)]
    metadata: JsonMap,
}

const fn default_priority() -> u32 {
    1
}

/// Parse one rule file. `path` is only used in diagnostics.
///
/// # Errors
///
/// Returns `CatalogError::Parse` if the document itself is not a rule file.
/// Individual malformed or invalid entries are skipped.
pub fn parse_rule_file(path: &Path, contents: &str) -> Result<Vec<Rule>, CatalogError> {
    let file: RuleFile = serde_yaml::from_str(contents).map_err(|e| CatalogError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut rules = Vec::with_capacity(file.rules.len());
    for (idx, raw) in file.rules.into_iter().enumerate() {
        let entry: RuleEntry = match serde_yaml::from_value(raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), entry = idx, error = %e, "skipping malformed rule entry");
                continue;
            }
        };

        let rule = Rule {
            id: RuleId::new(entry.id),
            name: entry.name,
            description: entry.description,
            domain: file.domain.clone(),
            category: file.category.clone(),
            condition: entry.condition,
            action: entry.action,
            priority: entry.priority,
            parameters: entry.parameters,
            metadata: entry.metadata,
        };

        if let Err(e) = rule.validate() {
            warn!(path = %path.display(), entry = idx, error = %e, "skipping invalid rule");
            continue;
        }
        rules.push(rule);
    }

    Ok(rules)
}

/// Load every `*.yaml` / `*.yml` file in `dir`, in file-name order.
///
/// # Errors
///
/// Returns `CatalogError::Io` if the directory cannot be listed.
pub fn load_rule_dir(dir: &Path) -> Result<Vec<Rule>, CatalogError> {
    let entries = fs::read_dir(dir).map_err(|e| CatalogError::Io {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
        })
        .collect();
    files.sort();

    let mut rules = Vec::new();
    for path in files {
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read rule file");
                continue;
            }
        };
        match parse_rule_file(&path, &contents) {
            Ok(mut loaded) => {
                info!(path = %path.display(), rules = loaded.len(), "loaded rule file");
                rules.append(&mut loaded);
            }
            Err(e) => error!(error = %e, "failed to load rule file"),
        }
    }

    info!(rules = rules.len(), dir = %dir.display(), "loaded business rules");
    Ok(rules)
}
