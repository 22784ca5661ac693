use serde::{Deserialize, Serialize};

use super::component::FormulaComponent;

/// Cloud account a stack's hosts are launched into.
///
/// Its components are applied by global orchestration, once per account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudAccount {
    pub slug: String,
    pub title: String,
    pub provider: String,
    pub region: String,
    pub formula_components: Vec<FormulaComponent>,
}

impl CloudAccount {
    pub fn new(slug: impl Into<String>, provider: impl Into<String>) -> Self {
        let slug = slug.into();
        Self {
            title: slug.clone(),
            slug,
            provider: provider.into(),
            region: String::new(),
            formula_components: Vec::new(),
        }
    }

    /// Compound salt target matching every minion launched in this account
    pub fn salt_target(&self) -> String {
        format!("G@cloud_account:{}", self.slug)
    }
}
