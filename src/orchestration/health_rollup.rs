//! # Health Rollups
//!
//! Host, stack, environment and component health derived from the current
//! component metadata. Results are cached under entity-derived keys; every
//! task that appends metadata or mutates hosts calls [`HealthRollup::invalidate`]
//! for its entity once the mutation is stored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{get_json, keys, set_json, CacheService};
use crate::models::stack::stack_components;
use crate::models::{
    current_metadata, ComponentStatus, EntityComponent, EntityKey, FormulaComponent, Health,
    OwnerRef,
};
use crate::store::{StackStore, StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub sls_path: String,
    pub order: u32,
    pub health: Health,
    pub status: ComponentStatus,
}

impl From<&EntityComponent> for ComponentHealth {
    fn from(view: &EntityComponent) -> Self {
        Self {
            sls_path: view.sls_path.clone(),
            order: view.order,
            health: view.health(),
            status: view.status(),
        }
    }
}

/// Health snapshot of a stack or environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityHealth {
    pub entity: EntityKey,
    pub health: Health,
    /// Per-host health; empty for environments
    pub hosts: BTreeMap<String, Health>,
    pub components: Vec<ComponentHealth>,
}

#[derive(Clone)]
pub struct HealthRollup {
    store: Arc<dyn StackStore>,
    cache: Arc<dyn CacheService>,
    ttl: Duration,
}

impl std::fmt::Debug for HealthRollup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthRollup")
            .field("cache", &self.cache.provider_name())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl HealthRollup {
    pub fn new(store: Arc<dyn StackStore>, cache: Arc<dyn CacheService>, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    /// Stack health aggregates its hosts; environment health aggregates its
    /// components
    pub async fn entity_health(&self, entity: &EntityKey) -> StoreResult<EntityHealth> {
        let key = keys::health_key(entity);
        if let Some(cached) = self.cached::<EntityHealth>(&key).await {
            return Ok(cached);
        }

        let snapshot = match entity {
            EntityKey::Stack(stack_id) => self.compute_stack(*stack_id).await?,
            EntityKey::Environment(name) => self.compute_environment(name).await?,
        };
        self.store_cached(&key, &snapshot).await;
        Ok(snapshot)
    }

    /// Health of one host of a stack
    pub async fn host_health(&self, stack_id: i64, hostname: &str) -> StoreResult<Health> {
        let key = keys::host_key(stack_id, hostname);
        if let Some(cached) = self.cached::<Health>(&key).await {
            return Ok(cached);
        }

        let entity = EntityKey::Stack(stack_id);
        let host = self
            .store
            .list_hosts(stack_id)
            .await?
            .into_iter()
            .find(|host| host.hostname == hostname)
            .ok_or_else(|| StoreError::NotFound(format!("host {hostname} of {entity}")))?;
        let history = self.store.component_history(&entity).await?;
        let current = current_metadata(&history);
        let component_health: Vec<Health> = host
            .formula_components
            .iter()
            .map(|component| {
                current
                    .get(&(component.sls_path.clone(), host.hostname.clone()))
                    .map_or(Health::Unknown, |record| record.health)
            })
            .collect();

        let health = host.health(&component_health);
        self.store_cached(&key, &health).await;
        Ok(health)
    }

    /// Rollup view of one component within an entity
    pub async fn component(
        &self,
        entity: &EntityKey,
        sls_path: &str,
    ) -> StoreResult<Option<EntityComponent>> {
        let key = keys::component_key(entity, sls_path);
        if let Some(cached) = self.cached::<EntityComponent>(&key).await {
            return Ok(Some(cached));
        }

        let components = self.components(entity).await?;
        let history = self.store.component_history(entity).await?;
        let view = EntityComponent::from_history(&components, &history)
            .into_iter()
            .find(|view| view.sls_path == sls_path);
        if let Some(view) = &view {
            self.store_cached(&key, view).await;
        }
        Ok(view)
    }

    /// Drop every cached value derived from `entity`
    pub async fn invalidate(&self, entity: &EntityKey) {
        match self.cache.invalidate_prefix(&keys::entity_prefix(entity)).await {
            Ok(removed) => debug!(entity = %entity, removed, "Cache invalidated"),
            Err(err) => warn!(entity = %entity, error = %err, "Cache invalidation failed"),
        }
    }

    /// A stack without its own component list uses the union of its hosts'
    async fn components(&self, entity: &EntityKey) -> StoreResult<Vec<FormulaComponent>> {
        let owned = self.store.components_for(&OwnerRef::from(entity)).await?;
        match entity {
            EntityKey::Stack(stack_id) if owned.is_empty() => {
                let hosts = self.store.list_hosts(*stack_id).await?;
                Ok(stack_components(&hosts))
            }
            _ => Ok(owned),
        }
    }

    async fn compute_stack(&self, stack_id: i64) -> StoreResult<EntityHealth> {
        let entity = EntityKey::Stack(stack_id);
        if self.store.get_stack(stack_id).await?.is_none() {
            return Err(StoreError::NotFound(entity.to_string()));
        }
        let hosts = self.store.list_hosts(stack_id).await?;
        let components = self.components(&entity).await?;
        let history = self.store.component_history(&entity).await?;
        let current = current_metadata(&history);

        let host_health: BTreeMap<String, Health> = hosts
            .iter()
            .map(|host| {
                let component_health: Vec<Health> = host
                    .formula_components
                    .iter()
                    .map(|component| {
                        current
                            .get(&(component.sls_path.clone(), host.hostname.clone()))
                            .map_or(Health::Unknown, |record| record.health)
                    })
                    .collect();
                (host.hostname.clone(), host.health(&component_health))
            })
            .collect();

        let views = EntityComponent::from_history(&components, &history);
        Ok(EntityHealth {
            health: Health::aggregate(host_health.values().copied()),
            hosts: host_health,
            components: views.iter().map(ComponentHealth::from).collect(),
            entity,
        })
    }

    async fn compute_environment(&self, name: &str) -> StoreResult<EntityHealth> {
        let entity = EntityKey::Environment(name.to_string());
        let environment = self
            .store
            .get_environment(name)
            .await?
            .ok_or_else(|| StoreError::NotFound(entity.to_string()))?;
        let history = self.store.component_history(&entity).await?;
        let views = EntityComponent::from_history(&environment.formula_components, &history);
        let components: Vec<ComponentHealth> = views.iter().map(ComponentHealth::from).collect();

        Ok(EntityHealth {
            health: Health::aggregate(components.iter().map(|c| c.health)),
            hosts: BTreeMap::new(),
            components,
            entity,
        })
    }

    /// Cache failures degrade to a miss
    async fn cached<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match get_json::<T>(self.cache.as_ref(), key).await {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "Cache read failed");
                None
            }
        }
    }

    async fn store_cached<T: Serialize + Sync>(&self, key: &str, value: &T) {
        if let Err(err) = set_json(self.cache.as_ref(), key, value, self.ttl).await {
            warn!(key, error = %err, "Cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MokaCacheService;
    use crate::models::{host_states, ComponentMetadata, Environment, FormulaComponent, Host, Stack};
    use crate::store::InMemoryStore;

    fn rollup(store: Arc<InMemoryStore>) -> HealthRollup {
        HealthRollup::new(
            store,
            Arc::new(MokaCacheService::new(100)),
            Duration::from_secs(60),
        )
    }

    async fn record(store: &InMemoryStore, entity: &EntityKey, sls: &str, host: &str, status: ComponentStatus) {
        store
            .append_component_metadata(vec![ComponentMetadata::next(None, entity, sls, host, status)])
            .await
            .unwrap();
    }

    fn seeded() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.insert_stack(Stack::new(1, "s"));
        let mut web = Host::new(1, 1, "web-1", "aws")
            .with_components(vec![FormulaComponent::new("web", 1)]);
        web.state = host_states::RUNNING.to_string();
        let mut db = Host::new(2, 1, "db-1", "aws")
            .with_components(vec![FormulaComponent::new("db", 0)]);
        db.state = host_states::RUNNING.to_string();
        store.insert_hosts(vec![web, db]);
        store
    }

    #[tokio::test]
    async fn test_stack_health_is_worst_host() {
        let store = seeded();
        let entity = EntityKey::Stack(1);
        record(&store, &entity, "web", "web-1", ComponentStatus::Succeeded).await;
        record(&store, &entity, "db", "db-1", ComponentStatus::Running).await;

        let snapshot = rollup(store).entity_health(&entity).await.unwrap();
        assert_eq!(snapshot.hosts["web-1"], Health::Healthy);
        assert_eq!(snapshot.hosts["db-1"], Health::Unstable);
        assert_eq!(snapshot.health, Health::Unstable);
    }

    #[tokio::test]
    async fn test_cached_until_invalidated() {
        let store = seeded();
        let entity = EntityKey::Stack(1);
        record(&store, &entity, "web", "web-1", ComponentStatus::Succeeded).await;
        record(&store, &entity, "db", "db-1", ComponentStatus::Succeeded).await;
        let health = rollup(store.clone());

        assert_eq!(health.entity_health(&entity).await.unwrap().health, Health::Healthy);
        record(&store, &entity, "db", "db-1", ComponentStatus::Failed).await;
        assert_eq!(health.entity_health(&entity).await.unwrap().health, Health::Healthy);

        health.invalidate(&entity).await;
        assert_eq!(health.entity_health(&entity).await.unwrap().health, Health::Unhealthy);
    }

    #[tokio::test]
    async fn test_absent_host_is_unhealthy() {
        let store = seeded();
        let entity = EntityKey::Stack(1);
        record(&store, &entity, "web", "web-1", ComponentStatus::Succeeded).await;
        let mut hosts = store.list_hosts(1).await.unwrap();
        hosts[1].mark_absent();
        store.update_host(&hosts[1]).await.unwrap();

        assert_eq!(
            rollup(store).host_health(1, "web-1").await.unwrap(),
            Health::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_environment_health_from_components() {
        let store = Arc::new(InMemoryStore::new());
        let mut env = Environment::new("qa");
        env.formula_components = vec![FormulaComponent::new("nginx", 0)];
        store.insert_environment(env);
        let entity = EntityKey::Environment("qa".into());

        let health = rollup(store.clone());
        assert_eq!(health.entity_health(&entity).await.unwrap().health, Health::Unknown);

        record(&store, &entity, "nginx", "legacy-1", ComponentStatus::Succeeded).await;
        health.invalidate(&entity).await;
        let snapshot = health.entity_health(&entity).await.unwrap();
        assert_eq!(snapshot.health, Health::Healthy);
        assert_eq!(snapshot.components[0].status, ComponentStatus::Succeeded);
    }
}
