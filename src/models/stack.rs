//! # Stacks and Hosts
//!
//! A stack is a running instantiation of a blueprint. It exclusively owns its
//! hosts; host rows are only removed as part of stack-driven termination.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::component::FormulaComponent;
use super::entity::EntityKey;
use super::health::Health;
use crate::state_machine::Activity;

/// Provider-reported machine states the core cares about
pub mod host_states {
    pub const PENDING: &str = "pending";
    pub const RUNNING: &str = "running";
    pub const STOPPING: &str = "stopping";
    pub const STOPPED: &str = "stopped";
    pub const SHUTTING_DOWN: &str = "shutting-down";
    pub const TERMINATED: &str = "terminated";
    /// Local marker for a host the provider no longer reports
    pub const ABSENT: &str = "absent";

    /// States after which an instance can never come back
    pub const TERMINAL: &[&str] = &[SHUTTING_DOWN, TERMINATED, ABSENT];

    pub fn is_terminal(state: &str) -> bool {
        TERMINAL.contains(&state)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub namespace: String,
    pub activity: Activity,
    pub created_by: Option<String>,
    /// Pillar data written to the stack's pillar file
    pub properties: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Stack {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        let title = title.into();
        let slug = slugify(&title);
        Self {
            id,
            namespace: slug.clone(),
            slug,
            title,
            activity: Activity::default(),
            created_by: None,
            properties: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::Stack(self.id)
    }
}

/// Security group attached to a host
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecurityGroupRef {
    pub name: String,
    pub group_id: String,
    /// Created for this stack and deleted with it
    pub managed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub device: String,
    pub mount_point: String,
    pub size_gb: u32,
    pub volume_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: i64,
    pub stack_id: i64,
    pub hostname: String,
    /// Slug of the cloud account this host is launched into
    pub cloud_account: String,
    pub instance_size: String,
    pub image: String,
    pub availability_zone: Option<String>,
    pub subnet_id: Option<String>,
    /// Empty until the provider has created the instance
    pub instance_id: String,
    pub state: String,
    pub activity: Activity,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub private_dns: Option<String>,
    pub public_dns: Option<String>,
    pub fqdn: Option<String>,
    pub security_groups: Vec<SecurityGroupRef>,
    pub volumes: Vec<Volume>,
    pub formula_components: Vec<FormulaComponent>,
}

impl Host {
    pub fn new(id: i64, stack_id: i64, hostname: impl Into<String>, cloud_account: impl Into<String>) -> Self {
        Self {
            id,
            stack_id,
            hostname: hostname.into(),
            cloud_account: cloud_account.into(),
            instance_size: String::new(),
            image: String::new(),
            availability_zone: None,
            subnet_id: None,
            instance_id: String::new(),
            state: host_states::PENDING.to_string(),
            activity: Activity::Queued,
            private_ip: None,
            public_ip: None,
            private_dns: None,
            public_dns: None,
            fqdn: None,
            security_groups: Vec::new(),
            volumes: Vec::new(),
            formula_components: Vec::new(),
        }
    }

    pub fn with_components(mut self, components: Vec<FormulaComponent>) -> Self {
        self.formula_components = components;
        self
    }

    pub fn has_instance(&self) -> bool {
        !self.instance_id.is_empty()
    }

    pub fn is_gone(&self) -> bool {
        host_states::is_terminal(&self.state)
    }

    /// Forget the provider instance after it disappeared or terminated
    pub fn mark_absent(&mut self) {
        self.instance_id.clear();
        self.state = host_states::ABSENT.to_string();
        self.private_ip = None;
        self.public_ip = None;
        self.private_dns = None;
        self.public_dns = None;
    }

    /// Host health from the current health of each component on it
    pub fn health<'a, I>(&self, component_health: I) -> Health
    where
        I: IntoIterator<Item = &'a Health>,
    {
        if self.is_gone() {
            return Health::Unhealthy;
        }
        Health::aggregate(component_health.into_iter().copied())
    }
}

/// Hosts grouped by cloud account slug, in a stable order
pub fn group_by_account(hosts: &[Host]) -> BTreeMap<String, Vec<Host>> {
    let mut groups: BTreeMap<String, Vec<Host>> = BTreeMap::new();
    for host in hosts {
        groups
            .entry(host.cloud_account.clone())
            .or_default()
            .push(host.clone());
    }
    groups
}

/// Distinct components across all hosts, keyed by sls path
pub fn stack_components(hosts: &[Host]) -> Vec<FormulaComponent> {
    let mut seen = BTreeSet::new();
    let mut components = Vec::new();
    for host in hosts {
        for component in &host.formula_components {
            if seen.insert(component.sls_path.clone()) {
                components.push(component.clone());
            }
        }
    }
    components
}

/// Lowercase, dash-separated identifier derived from a title
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash && !slug.is_empty() {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
