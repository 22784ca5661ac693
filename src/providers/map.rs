//! Cloud provisioning map: the per-host launch specification handed to a
//! driver and written to `stack.map` before every launch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{Host, Stack, Volume};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningSpec {
    pub hostname: String,
    pub instance_size: String,
    pub image: String,
    pub availability_zone: Option<String>,
    pub subnet_id: Option<String>,
    pub security_groups: Vec<String>,
    pub volumes: Vec<Volume>,
    /// Grains set on the minion so compound targets can find it
    pub grains: BTreeMap<String, serde_json::Value>,
}

/// Hosts of one cloud account, keyed by hostname
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProvisioningMap {
    pub stack_id: i64,
    pub namespace: String,
    pub cloud_account: String,
    pub hosts: BTreeMap<String, ProvisioningSpec>,
}

impl ProvisioningMap {
    /// Build the map from current host data; hosts of other accounts are ignored
    pub fn for_account(stack: &Stack, cloud_account: &str, hosts: &[Host]) -> Self {
        let hosts = hosts
            .iter()
            .filter(|host| host.cloud_account == cloud_account)
            .map(|host| (host.hostname.clone(), Self::spec_for(stack, host)))
            .collect();

        Self {
            stack_id: stack.id,
            namespace: stack.namespace.clone(),
            cloud_account: cloud_account.to_string(),
            hosts,
        }
    }

    fn spec_for(stack: &Stack, host: &Host) -> ProvisioningSpec {
        let roles: Vec<String> = host
            .formula_components
            .iter()
            .map(|component| component.sls_path.clone())
            .collect();

        let mut grains = BTreeMap::new();
        grains.insert("stack_id".to_string(), serde_json::json!(stack.id));
        grains.insert("namespace".to_string(), serde_json::json!(stack.namespace));
        grains.insert("cloud_account".to_string(), serde_json::json!(host.cloud_account));
        grains.insert("roles".to_string(), serde_json::json!(roles));

        ProvisioningSpec {
            hostname: host.hostname.clone(),
            instance_size: host.instance_size.clone(),
            image: host.image.clone(),
            availability_zone: host.availability_zone.clone(),
            subnet_id: host.subnet_id.clone(),
            security_groups: host.security_groups.iter().map(|g| g.name.clone()).collect(),
            volumes: host.volumes.clone(),
            grains,
        }
    }

    /// Restrict the map to the named hosts
    pub fn only(&self, hostnames: &[String]) -> Self {
        Self {
            hosts: self
                .hosts
                .iter()
                .filter(|(name, _)| hostnames.contains(name))
                .map(|(name, spec)| (name.clone(), spec.clone()))
                .collect(),
            ..self.clone()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
