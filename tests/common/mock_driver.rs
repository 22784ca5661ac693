//! In-process cloud driver that keeps instances in memory and records every
//! call it receives.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

use stackd_core::models::{host_states, Host, SecurityGroupRef, Stack};
use stackd_core::providers::{
    CloudDriver, DriverError, DriverResult, HostAction, HostLaunchResult, InstanceInfo,
    ProvisioningMap,
};

#[derive(Debug, Default)]
struct DriverState {
    /// hostname -> instance
    instances: BTreeMap<String, InstanceInfo>,
    groups: BTreeMap<String, SecurityGroupRef>,
    /// hostname -> launches left to fail
    launch_failures: BTreeMap<String, u32>,
    calls: Vec<String>,
    next_instance: u32,
}

#[derive(Debug)]
pub struct MockDriver {
    actions: Vec<HostAction>,
    state: Mutex<DriverState>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    pub fn new() -> Self {
        Self::with_actions(HostAction::ALL.to_vec())
    }

    pub fn with_actions(actions: Vec<HostAction>) -> Self {
        Self {
            actions,
            state: Mutex::new(DriverState::default()),
        }
    }

    /// Make the next `times` launches of `hostname` fail
    pub fn fail_launch(&self, hostname: &str, times: u32) {
        self.state
            .lock()
            .launch_failures
            .insert(hostname.to_string(), times);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| c.as_str() == name).count()
    }

    pub fn instance_state(&self, hostname: &str) -> Option<String> {
        self.state
            .lock()
            .instances
            .get(hostname)
            .map(|instance| instance.state.clone())
    }

    pub fn group_names(&self) -> Vec<String> {
        self.state.lock().groups.keys().cloned().collect()
    }

    /// Pretend an instance was created outside the driver
    pub fn seed_instance(&self, hostname: &str, instance_id: &str, state: &str) {
        self.state.lock().instances.insert(
            hostname.to_string(),
            InstanceInfo {
                instance_id: instance_id.to_string(),
                state: state.to_string(),
                ..Default::default()
            },
        );
    }

    fn record(&self, call: &str) {
        self.state.lock().calls.push(call.to_string());
    }

    fn set_state(&self, hosts: &[Host], state: &str) {
        let mut guard = self.state.lock();
        for host in hosts {
            if let Some(instance) = guard.instances.get_mut(&host.hostname) {
                instance.state = state.to_string();
            }
        }
    }
}

#[async_trait]
impl CloudDriver for MockDriver {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn supported_actions(&self) -> &[HostAction] {
        &self.actions
    }

    async fn launch_map(
        &self,
        map: &ProvisioningMap,
        _parallel: bool,
    ) -> DriverResult<BTreeMap<String, HostLaunchResult>> {
        self.record("launch_map");
        let mut guard = self.state.lock();
        let mut results = BTreeMap::new();
        for hostname in map.hosts.keys() {
            if let Some(left) = guard.launch_failures.get_mut(hostname) {
                if *left > 0 {
                    *left -= 1;
                    results.insert(
                        hostname.clone(),
                        HostLaunchResult::Error {
                            message: "InsufficientInstanceCapacity".to_string(),
                        },
                    );
                    continue;
                }
            }
            guard.next_instance += 1;
            let next_instance = guard.next_instance;
            let instance_id = format!("i-{:04}", next_instance);
            guard.instances.insert(
                hostname.clone(),
                InstanceInfo {
                    instance_id: instance_id.clone(),
                    state: host_states::RUNNING.to_string(),
                    private_ip: Some(format!("10.0.0.{}", next_instance)),
                    private_dns: Some(format!("{hostname}.internal")),
                    ..Default::default()
                },
            );
            results.insert(hostname.clone(), HostLaunchResult::Ok { instance_id });
        }
        Ok(results)
    }

    async fn destroy_map(
        &self,
        _map: &ProvisioningMap,
        targets: &[String],
    ) -> DriverResult<BTreeMap<String, HostLaunchResult>> {
        self.record("destroy_map");
        let mut guard = self.state.lock();
        let mut results = BTreeMap::new();
        for hostname in targets {
            if let Some(instance) = guard.instances.get_mut(hostname) {
                instance.state = host_states::TERMINATED.to_string();
                results.insert(
                    hostname.clone(),
                    HostLaunchResult::Ok {
                        instance_id: instance.instance_id.clone(),
                    },
                );
            }
        }
        Ok(results)
    }

    async fn query_instances(&self, hosts: &[Host]) -> DriverResult<Vec<InstanceInfo>> {
        let guard = self.state.lock();
        Ok(hosts
            .iter()
            .filter_map(|host| {
                guard
                    .instances
                    .get(&host.hostname)
                    .filter(|instance| instance.instance_id == host.instance_id)
                    .cloned()
            })
            .collect())
    }

    async fn tag_resources(&self, _stack: &Stack, _hosts: &[Host]) -> DriverResult<()> {
        self.record("tag_resources");
        Ok(())
    }

    async fn register_dns(&self, _hosts: &[Host]) -> DriverResult<()> {
        self.record("register_dns");
        Ok(())
    }

    async fn unregister_dns(&self, _hosts: &[Host]) -> DriverResult<()> {
        self.record("unregister_dns");
        Ok(())
    }

    async fn get_security_groups(&self, names: &[String]) -> DriverResult<Vec<SecurityGroupRef>> {
        let guard = self.state.lock();
        Ok(names
            .iter()
            .filter_map(|name| guard.groups.get(name).cloned())
            .collect())
    }

    async fn create_security_group(&self, name: &str, _description: &str) -> DriverResult<SecurityGroupRef> {
        self.record("create_security_group");
        let mut guard = self.state.lock();
        if guard.groups.contains_key(name) {
            return Err(DriverError::GroupExists(name.to_string()));
        }
        let group = SecurityGroupRef {
            name: name.to_string(),
            group_id: format!("sg-{name}"),
            managed: true,
        };
        guard.groups.insert(name.to_string(), group.clone());
        Ok(group)
    }

    async fn delete_security_group(&self, group_id: &str) -> DriverResult<()> {
        self.record("delete_security_group");
        let mut guard = self.state.lock();
        let name = guard
            .groups
            .iter()
            .find(|(_, group)| group.group_id == group_id)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| DriverError::GroupNotFound(group_id.to_string()))?;
        guard.groups.remove(&name);
        Ok(())
    }

    async fn get_instances_for_group(&self, _group_id: &str) -> DriverResult<Vec<String>> {
        let guard = self.state.lock();
        Ok(guard
            .instances
            .values()
            .filter(|instance| !host_states::is_terminal(&instance.state))
            .map(|instance| instance.instance_id.clone())
            .collect())
    }

    async fn register_volumes_for_delete(&self, _hosts: &[Host]) -> DriverResult<()> {
        self.record("register_volumes_for_delete");
        Ok(())
    }

    async fn execute_action(&self, action: HostAction, hosts: &[Host]) -> DriverResult<()> {
        self.record(&format!("action:{action}"));
        match action {
            HostAction::Stop => self.set_state(hosts, host_states::STOPPED),
            HostAction::Start => self.set_state(hosts, host_states::RUNNING),
            HostAction::Terminate => self.set_state(hosts, host_states::TERMINATED),
            _ => {}
        }
        Ok(())
    }
}
