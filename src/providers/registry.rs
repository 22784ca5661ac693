use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::actions::HostAction;
use super::driver::CloudDriver;
use super::errors::{DriverError, DriverResult};

/// Cloud account slug -> driver
#[derive(Debug, Default)]
pub struct DriverRegistry {
    drivers: RwLock<HashMap<String, Arc<dyn CloudDriver>>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the driver for an account.
    ///
    /// Every driver must be able to terminate what it launches.
    pub fn register(&self, account: impl Into<String>, driver: Arc<dyn CloudDriver>) -> DriverResult<()> {
        let account = account.into();
        if !driver.supports(HostAction::Terminate) {
            return Err(DriverError::UnsupportedAction {
                provider: driver.provider_name().to_string(),
                action: HostAction::Terminate.to_string(),
            });
        }
        info!(account = %account, provider = driver.provider_name(), "🔌 Cloud driver registered");
        self.drivers.write().insert(account, driver);
        Ok(())
    }

    pub fn get(&self, account: &str) -> DriverResult<Arc<dyn CloudDriver>> {
        self.drivers
            .read()
            .get(account)
            .cloned()
            .ok_or_else(|| DriverError::UnknownAccount(account.to_string()))
    }

    /// Fail unless the account's driver supports `action`
    pub fn require(&self, account: &str, action: HostAction) -> DriverResult<Arc<dyn CloudDriver>> {
        let driver = self.get(account)?;
        if driver.supports(action) {
            Ok(driver)
        } else {
            Err(DriverError::UnsupportedAction {
                provider: driver.provider_name().to_string(),
                action: action.to_string(),
            })
        }
    }

    pub fn accounts(&self) -> Vec<String> {
        let mut accounts: Vec<String> = self.drivers.read().keys().cloned().collect();
        accounts.sort();
        accounts
    }
}
