use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Stack,
    Environment,
}

/// Identity of an orchestrated entity: a stack by id, an environment by name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityKey {
    Stack(i64),
    Environment(String),
}

impl EntityKey {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Stack(_) => EntityKind::Stack,
            Self::Environment(_) => EntityKind::Environment,
        }
    }

    pub fn stack_id(&self) -> Option<i64> {
        match self {
            Self::Stack(id) => Some(*id),
            Self::Environment(_) => None,
        }
    }

    /// Compound salt target matching every minion of this entity
    pub fn salt_target(&self) -> String {
        match self {
            Self::Stack(id) => format!("G@stack_id:{id}"),
            Self::Environment(name) => format!("G@env:{name}"),
        }
    }

    /// Prefix used for every cache key derived from this entity
    pub fn cache_prefix(&self) -> String {
        match self {
            Self::Stack(id) => format!("stack:{id}"),
            Self::Environment(name) => format!("environment:{name}"),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stack(id) => write!(f, "stack {id}"),
            Self::Environment(name) => write!(f, "environment {name}"),
        }
    }
}
