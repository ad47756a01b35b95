//! Rule catalog: the authoritative set of business rules.
//!
//! The catalog is an external collaborator of the decision pipeline. The trait
//! defines the lookup contract; [`InMemoryRuleCatalog`] is the reference backend,
//! fed either programmatically or from YAML rule files via [`loader`].

pub mod loader;
mod memory;
mod traits;

pub use loader::{load_rule_dir, parse_rule_file};
pub use memory::InMemoryRuleCatalog;
pub use traits::RuleCatalog;
