//! # Formula Components and Component Metadata
//!
//! A formula component is a unit of salt configuration (`sls_path`) with an
//! `order` used for dependency sequencing. Component metadata is an
//! append-only history of per-host status/health; the current view of a
//! `(sls_path, host)` pair is always its most recent record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::entity::EntityKey;
use super::health::{ComponentStatus, Health};

/// Kinds of records that can own formula components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Blueprint,
    BlueprintHostDefinition,
    CloudAccount,
    Environment,
    Stack,
}

/// Tagged owner reference: one component list, many possible owner types
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: OwnerKind,
    pub id: String,
}

impl OwnerRef {
    pub fn new(kind: OwnerKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn cloud_account(slug: impl Into<String>) -> Self {
        Self::new(OwnerKind::CloudAccount, slug)
    }

    pub fn environment(name: impl Into<String>) -> Self {
        Self::new(OwnerKind::Environment, name)
    }

    pub fn stack(id: i64) -> Self {
        Self::new(OwnerKind::Stack, id.to_string())
    }
}

impl From<&EntityKey> for OwnerRef {
    fn from(key: &EntityKey) -> Self {
        match key {
            EntityKey::Stack(id) => OwnerRef::stack(*id),
            EntityKey::Environment(name) => OwnerRef::environment(name.clone()),
        }
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaComponent {
    /// Dotted salt state path, e.g. `cdh5.hadoop.namenode`
    pub sls_path: String,
    pub order: u32,
    pub title: String,
    pub owner: Option<OwnerRef>,
}

impl FormulaComponent {
    pub fn new(sls_path: impl Into<String>, order: u32) -> Self {
        let sls_path = sls_path.into();
        Self {
            title: sls_path.clone(),
            sls_path,
            order,
            owner: None,
        }
    }

    pub fn owned_by(mut self, owner: OwnerRef) -> Self {
        self.owner = Some(owner);
        self
    }
}

/// One append-only status record for a component on a host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentMetadata {
    /// Monotonic sequence assigned by the store; breaks timestamp ties
    pub id: i64,
    pub entity: EntityKey,
    pub sls_path: String,
    pub host: String,
    pub status: ComponentStatus,
    pub health: Health,
    pub created_at: DateTime<Utc>,
}

impl ComponentMetadata {
    /// Build the record that follows `previous` after moving to `status`.
    ///
    /// Statuses without an implied health carry the previous health forward.
    pub fn next(
        previous: Option<&ComponentMetadata>,
        entity: &EntityKey,
        sls_path: &str,
        host: &str,
        status: ComponentStatus,
    ) -> Self {
        Self {
            id: 0,
            entity: entity.clone(),
            sls_path: sls_path.to_string(),
            host: host.to_string(),
            status,
            health: status.next_health(previous.map(|m| m.health)),
            created_at: Utc::now(),
        }
    }

    fn recency(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.id)
    }
}

/// Current record per `(sls_path, host)`: the most recent by timestamp
pub fn current_metadata(
    records: &[ComponentMetadata],
) -> HashMap<(String, String), &ComponentMetadata> {
    let mut current: HashMap<(String, String), &ComponentMetadata> = HashMap::new();
    for record in records {
        let key = (record.sls_path.clone(), record.host.clone());
        match current.get(&key) {
            Some(existing) if existing.recency() >= record.recency() => {}
            _ => {
                current.insert(key, record);
            }
        }
    }
    current
}

/// View object over the metadata of one `sls_path` within an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityComponent {
    pub sls_path: String,
    pub order: u32,
    /// Current record per host
    pub hosts: BTreeMap<String, ComponentMetadata>,
}

impl EntityComponent {
    pub fn health(&self) -> Health {
        Health::aggregate(self.hosts.values().map(|m| m.health))
    }

    pub fn status(&self) -> ComponentStatus {
        ComponentStatus::aggregate(self.hosts.values().map(|m| m.status))
    }

    /// Build one view per component from the entity's metadata history
    pub fn from_history(
        components: &[FormulaComponent],
        records: &[ComponentMetadata],
    ) -> Vec<EntityComponent> {
        let current = current_metadata(records);
        let mut views: BTreeMap<String, EntityComponent> = BTreeMap::new();

        for component in components {
            views
                .entry(component.sls_path.clone())
                .or_insert_with(|| EntityComponent {
                    sls_path: component.sls_path.clone(),
                    order: component.order,
                    hosts: BTreeMap::new(),
                });
        }

        for ((sls_path, host), record) in current {
            if let Some(view) = views.get_mut(&sls_path) {
                view.hosts.insert(host, record.clone());
            }
        }

        let mut views: Vec<_> = views.into_values().collect();
        views.sort_by(|a, b| a.order.cmp(&b.order).then(a.sls_path.cmp(&b.sls_path)));
        views
    }
}
