//! # Environments
//!
//! An environment groups hosts that were launched outside stackd. Its hosts are
//! discovered through a grain query rather than stored rows, but it is
//! orchestrated with the same activity and component model as a stack.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::component::FormulaComponent;
use super::entity::EntityKey;
use crate::state_machine::Activity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Unique name, also the value of the `env` grain on member minions
    pub name: String,
    pub description: String,
    pub activity: Activity,
    pub properties: serde_json::Value,
    pub formula_components: Vec<FormulaComponent>,
    pub created_at: DateTime<Utc>,
}

impl Environment {
    /// Environments start idle: there is nothing to launch
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            activity: Activity::Idle,
            properties: serde_json::json!({}),
            formula_components: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::Environment(self.name.clone())
    }
}
