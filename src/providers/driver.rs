use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::actions::HostAction;
use super::errors::{DriverError, DriverResult};
use super::map::ProvisioningMap;
use crate::models::{Host, SecurityGroupRef, Stack};
use crate::resilience::{poll_until, PollError, PollSettings, PollStatus};

/// Per-host outcome of a launch or destroy request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HostLaunchResult {
    Ok { instance_id: String },
    Error { message: String },
}

impl HostLaunchResult {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Live instance data as reported by the provider
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub instance_id: String,
    pub state: String,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub private_dns: Option<String>,
    pub public_dns: Option<String>,
    /// Device name -> provider volume id
    pub volumes: BTreeMap<String, String>,
}

/// Capability interface for one cloud account
#[async_trait]
pub trait CloudDriver: Send + Sync + std::fmt::Debug {
    /// Provider type, e.g. `ec2`
    fn provider_name(&self) -> &str;

    fn supported_actions(&self) -> &[HostAction];

    fn supports(&self, action: HostAction) -> bool {
        self.supported_actions().contains(&action)
    }

    async fn launch_map(
        &self,
        map: &ProvisioningMap,
        parallel: bool,
    ) -> DriverResult<BTreeMap<String, HostLaunchResult>>;

    async fn destroy_map(
        &self,
        map: &ProvisioningMap,
        targets: &[String],
    ) -> DriverResult<BTreeMap<String, HostLaunchResult>>;

    /// Instances the provider still knows about among `hosts`
    async fn query_instances(&self, hosts: &[Host]) -> DriverResult<Vec<InstanceInfo>>;

    async fn tag_resources(&self, stack: &Stack, hosts: &[Host]) -> DriverResult<()>;

    async fn register_dns(&self, hosts: &[Host]) -> DriverResult<()>;

    async fn unregister_dns(&self, hosts: &[Host]) -> DriverResult<()>;

    async fn get_security_groups(&self, names: &[String]) -> DriverResult<Vec<SecurityGroupRef>>;

    async fn create_security_group(&self, name: &str, description: &str) -> DriverResult<SecurityGroupRef>;

    /// Fails with [`DriverError::GroupNotFound`] when the group is already gone
    async fn delete_security_group(&self, group_id: &str) -> DriverResult<()>;

    /// Instance ids still referencing a security group
    async fn get_instances_for_group(&self, group_id: &str) -> DriverResult<Vec<String>>;

    /// Mark the hosts' volumes for deletion on instance termination
    async fn register_volumes_for_delete(&self, hosts: &[Host]) -> DriverResult<()>;

    /// Run one of the per-host action hooks
    async fn execute_action(&self, action: HostAction, hosts: &[Host]) -> DriverResult<()>;

    /// Poll until every instance of `hosts` reports `state`.
    ///
    /// Instances the provider no longer reports count as settled when waiting
    /// for termination.
    async fn wait_for_state(
        &self,
        hosts: &[Host],
        state: &str,
        settings: PollSettings,
    ) -> DriverResult<Vec<InstanceInfo>> {
        let expected: Vec<String> = hosts
            .iter()
            .filter(|host| host.has_instance())
            .map(|host| host.instance_id.clone())
            .collect();
        let gone_counts = crate::models::host_states::is_terminal(state);
        let name = format!("instances to reach '{state}'");
        let expected = &expected;

        poll_until(&name, settings, move |_| async move {
            match self.query_instances(hosts).await {
                Ok(instances) => {
                    let settled = expected.iter().all(|id| {
                        match instances.iter().find(|i| &i.instance_id == id) {
                            Some(instance) => instance.state == state,
                            None => gone_counts,
                        }
                    });
                    if settled {
                        PollStatus::Ready(instances)
                    } else {
                        PollStatus::Pending
                    }
                }
                Err(err) => PollStatus::Failed(err),
            }
        })
        .await
        .map_err(|err| match err {
            PollError::Timeout { name, .. } => DriverError::Timeout(name),
            PollError::MaxFailures { name, last_error, .. } => {
                DriverError::MaxFailures(format!("{name}: {last_error}"))
            }
        })
    }
}
