use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::entity::EntityKey;

/// Output of an ad-hoc command run against an entity's hosts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub entity: EntityKey,
    pub command: String,
    pub host_target: String,
    /// Per-host stdout, keyed by minion id
    pub output: BTreeMap<String, String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
