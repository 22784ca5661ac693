//! Test context assembly: in-memory store, mock driver and salt, fast polling
//! and a throwaway state directory.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use stackd_core::config::{ConfigManager, StackdConfig};
use stackd_core::models::{CloudAccount, Environment, FormulaComponent, Host, Stack};
use stackd_core::orchestration::StackCoordinator;
use stackd_core::providers::DriverRegistry;
use stackd_core::state_machine::Activity;
use stackd_core::store::InMemoryStore;
use stackd_core::system_context::SystemContext;

use super::mock_driver::MockDriver;
use super::mock_salt::MockSalt;

pub const ACCOUNT: &str = "aws-test";

/// Configuration with millisecond polling so waits settle quickly
pub fn test_config(state_root: &Path) -> StackdConfig {
    let mut config = StackdConfig::default();
    config.environment = "test".to_string();
    config.orchestration.default_max_attempts = 3;
    config.orchestration.stack_root = state_root.join("stacks");
    config.orchestration.environment_root = state_root.join("environments");
    config.polling.state_wait_interval_ms = 1;
    config.polling.state_wait_timeout_seconds = 5;
    config.polling.state_wait_max_failures = 3;
    config.polling.termination_wait_timeout_seconds = 5;
    config.polling.ping_interval_ms = 1;
    config.polling.ping_max_failures = 3;
    config
}

pub fn standard_components() -> Vec<FormulaComponent> {
    vec![
        FormulaComponent::new("common", 0),
        FormulaComponent::new("web", 1),
    ]
}

pub struct TestHarness {
    pub context: Arc<SystemContext>,
    pub coordinator: StackCoordinator,
    pub store: Arc<InMemoryStore>,
    pub driver: Arc<MockDriver>,
    pub salt: Arc<MockSalt>,
    pub state_dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_driver(MockDriver::new())
    }

    pub fn with_driver(driver: MockDriver) -> Self {
        Self::build(driver, |_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut StackdConfig)) -> Self {
        Self::build(MockDriver::new(), adjust)
    }

    fn build(driver: MockDriver, adjust: impl FnOnce(&mut StackdConfig)) -> Self {
        let state_dir = TempDir::new().expect("temp dir");
        let mut config = test_config(state_dir.path());
        adjust(&mut config);
        let config_manager = ConfigManager::from_config(config).expect("valid test config");

        let store = Arc::new(InMemoryStore::new());
        store.insert_cloud_account(CloudAccount::new(ACCOUNT, "mock"));

        let driver = Arc::new(driver);
        let drivers = Arc::new(DriverRegistry::new());
        drivers
            .register(ACCOUNT, driver.clone())
            .expect("driver registration");

        let salt = Arc::new(MockSalt::new());
        let context = Arc::new(SystemContext::from_config(
            config_manager,
            store.clone(),
            drivers,
            salt.clone(),
        ));
        let coordinator = StackCoordinator::new(context.clone());

        Self {
            context,
            coordinator,
            store,
            driver,
            salt,
            state_dir,
        }
    }

    /// Idle stack whose hosts have no instances yet
    pub fn seed_stack(&self, stack_id: i64, hostnames: &[&str]) -> Stack {
        let mut stack = Stack::new(stack_id, format!("Test Stack {stack_id}"));
        stack.activity = Activity::Idle;
        self.store.insert_stack(stack.clone());
        self.store.insert_hosts(hostnames.iter().enumerate().map(|(index, hostname)| {
            Host::new(stack_id * 100 + index as i64 + 1, stack_id, *hostname, ACCOUNT)
                .with_components(standard_components())
        }));
        stack
    }

    /// Idle stack whose hosts are already running
    pub async fn seed_running_stack(&self, stack_id: i64, hostnames: &[&str]) -> Stack {
        use stackd_core::models::host_states;
        use stackd_core::store::StackStore;

        let stack = self.seed_stack(stack_id, hostnames);
        let hosts = self.store.list_hosts(stack_id).await.expect("hosts");
        for (index, mut host) in hosts.into_iter().enumerate() {
            let instance_id = format!("i-seed-{stack_id}-{index}");
            self.driver
                .seed_instance(&host.hostname, &instance_id, host_states::RUNNING);
            host.instance_id = instance_id;
            host.state = host_states::RUNNING.to_string();
            host.activity = Activity::Idle;
            self.store.update_host(&host).await.expect("update host");
        }
        stack
    }

    /// Idle environment with two minions known to salt
    pub fn seed_environment(&self, name: &str) -> Environment {
        let mut environment = Environment::new(name);
        environment.formula_components = standard_components();
        self.store.insert_environment(environment.clone());
        self.salt.add_minion("env-a", &["common", "web"]);
        self.salt.add_minion("env-b", &["common"]);
        environment
    }
}
