//! Pre-dispatch guards. A guard that fails rejects the intent before any
//! activity is written or any task is submitted.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::errors::{business_rule_violation, dependencies_not_met, GuardResult};
use crate::models::{EntityComponent, EntityKey, FormulaComponent, Health};
use crate::orchestration::dependency_graph::{nearest_lower_dependencies, order_waves};
use crate::providers::{DriverRegistry, HostAction};
use crate::salt::Target;
use crate::store::StackStore;

#[async_trait]
pub trait StateGuard<T: ?Sized + Sync> {
    async fn check(&self, entity: &T, store: &dyn StackStore) -> GuardResult<()>;

    /// Description of this guard for logging
    fn description(&self) -> &'static str;
}

/// Every cloud account of the stack must support a host action
pub struct DriverSupportsGuard {
    pub action: HostAction,
    pub registry: Arc<DriverRegistry>,
}

#[async_trait]
impl StateGuard<EntityKey> for DriverSupportsGuard {
    async fn check(&self, entity: &EntityKey, store: &dyn StackStore) -> GuardResult<()> {
        let Some(stack_id) = entity.stack_id() else {
            return Ok(());
        };
        let accounts: BTreeSet<String> = store
            .list_hosts(stack_id)
            .await?
            .into_iter()
            .map(|host| host.cloud_account)
            .collect();

        for account in accounts {
            self.registry
                .require(&account, self.action)
                .map_err(|e| business_rule_violation(e.to_string()))?;
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Cloud drivers must support the requested host action"
    }
}

/// Components at the nearest lower order must be healthy on the targeted
/// hosts before a single component is re-applied.
///
/// When none of the targeted hosts carry a dependency, its health across all
/// hosts of the entity is used instead.
pub struct DependenciesHealthyGuard {
    pub sls_path: String,
    pub target: Option<Target>,
    pub components: Vec<FormulaComponent>,
}

#[async_trait]
impl StateGuard<EntityKey> for DependenciesHealthyGuard {
    async fn check(&self, entity: &EntityKey, store: &dyn StackStore) -> GuardResult<()> {
        let waves = order_waves(&self.components);
        let Some(order) = waves
            .iter()
            .find(|(_, wave)| wave.contains(&self.sls_path))
            .map(|(order, _)| *order)
        else {
            return Err(business_rule_violation(format!(
                "{} is not a component of {entity}",
                self.sls_path
            )));
        };

        let dependencies = nearest_lower_dependencies(&waves, order);
        if dependencies.is_empty() {
            return Ok(());
        }

        let history = store.component_history(entity).await?;
        let views = EntityComponent::from_history(&self.components, &history);

        let mut unhealthy = Vec::new();
        for dependency in &dependencies {
            let health = views
                .iter()
                .find(|view| &view.sls_path == dependency)
                .map(|view| {
                    let targeted: Vec<Health> = view
                        .hosts
                        .iter()
                        .filter(|(host, _)| self.target.as_ref().map_or(true, |t| t.matches(host)))
                        .map(|(_, record)| record.health)
                        .collect();
                    if targeted.is_empty() {
                        view.health()
                    } else {
                        Health::aggregate(targeted)
                    }
                })
                .unwrap_or(Health::Unknown);

            if health != Health::Healthy {
                unhealthy.push(format!("{dependency} ({health})"));
            }
        }

        if unhealthy.is_empty() {
            Ok(())
        } else {
            Err(dependencies_not_met(format!(
                "{} requires healthy {}",
                self.sls_path,
                unhealthy.join(", ")
            )))
        }
    }

    fn description(&self) -> &'static str {
        "Lower-order dependencies must be healthy"
    }
}
