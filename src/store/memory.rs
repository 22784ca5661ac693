use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use super::{ActivitySwap, StackStore, StoreError, StoreResult};
use crate::models::{
    CloudAccount, CommandResult, ComponentMetadata, EntityKey, Environment, FormulaComponent,
    HistoryEntry, Host, OwnerRef, Stack,
};
use crate::state_machine::Activity;

#[derive(Debug, Default)]
struct Tables {
    stacks: BTreeMap<i64, Stack>,
    environments: BTreeMap<String, Environment>,
    hosts: BTreeMap<i64, Host>,
    cloud_accounts: BTreeMap<String, CloudAccount>,
    components: HashMap<OwnerRef, Vec<FormulaComponent>>,
    metadata: Vec<ComponentMetadata>,
    history: Vec<HistoryEntry>,
    command_results: Vec<CommandResult>,
}

/// Store backed by process memory.
///
/// One lock guards every table, so compare-and-set is trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    metadata_seq: AtomicI64,
}

fn not_found(entity: &EntityKey) -> StoreError {
    StoreError::NotFound(entity.to_string())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_stack(&self, stack: Stack) {
        self.tables.write().stacks.insert(stack.id, stack);
    }

    pub fn insert_hosts(&self, hosts: impl IntoIterator<Item = Host>) {
        let mut tables = self.tables.write();
        for host in hosts {
            tables.hosts.insert(host.id, host);
        }
    }

    pub fn insert_environment(&self, environment: Environment) {
        let mut tables = self.tables.write();
        tables.components.insert(
            OwnerRef::environment(environment.name.clone()),
            environment.formula_components.clone(),
        );
        tables
            .environments
            .insert(environment.name.clone(), environment);
    }

    pub fn insert_cloud_account(&self, account: CloudAccount) {
        let mut tables = self.tables.write();
        tables.components.insert(
            OwnerRef::cloud_account(account.slug.clone()),
            account.formula_components.clone(),
        );
        tables.cloud_accounts.insert(account.slug.clone(), account);
    }

    pub fn set_components(&self, owner: OwnerRef, components: Vec<FormulaComponent>) {
        self.tables.write().components.insert(owner, components);
    }

    fn read_activity(tables: &Tables, entity: &EntityKey) -> StoreResult<Activity> {
        match entity {
            EntityKey::Stack(id) => tables.stacks.get(id).map(|s| s.activity),
            EntityKey::Environment(name) => tables.environments.get(name).map(|e| e.activity),
        }
        .ok_or_else(|| not_found(entity))
    }

    fn write_activity(tables: &mut Tables, entity: &EntityKey, activity: Activity) -> StoreResult<()> {
        let slot = match entity {
            EntityKey::Stack(id) => tables.stacks.get_mut(id).map(|s| &mut s.activity),
            EntityKey::Environment(name) => {
                tables.environments.get_mut(name).map(|e| &mut e.activity)
            }
        };
        let slot = slot.ok_or_else(|| not_found(entity))?;
        *slot = activity;
        Ok(())
    }
}

#[async_trait]
impl StackStore for InMemoryStore {
    async fn get_stack(&self, stack_id: i64) -> StoreResult<Option<Stack>> {
        Ok(self.tables.read().stacks.get(&stack_id).cloned())
    }

    async fn get_environment(&self, name: &str) -> StoreResult<Option<Environment>> {
        Ok(self.tables.read().environments.get(name).cloned())
    }

    async fn activity(&self, entity: &EntityKey) -> StoreResult<Activity> {
        Self::read_activity(&self.tables.read(), entity)
    }

    async fn compare_and_set_activity(
        &self,
        entity: &EntityKey,
        allowed: &[Activity],
        new: Activity,
    ) -> StoreResult<ActivitySwap> {
        let mut tables = self.tables.write();
        let current = Self::read_activity(&tables, entity)?;
        if !allowed.contains(&current) {
            return Ok(ActivitySwap::Rejected { current });
        }
        Self::write_activity(&mut tables, entity, new)?;
        Ok(ActivitySwap::Swapped { previous: current })
    }

    async fn set_activity(&self, entity: &EntityKey, activity: Activity) -> StoreResult<()> {
        Self::write_activity(&mut self.tables.write(), entity, activity)
    }

    async fn list_hosts(&self, stack_id: i64) -> StoreResult<Vec<Host>> {
        let mut hosts: Vec<Host> = self
            .tables
            .read()
            .hosts
            .values()
            .filter(|host| host.stack_id == stack_id)
            .cloned()
            .collect();
        hosts.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(hosts)
    }

    async fn update_host(&self, host: &Host) -> StoreResult<()> {
        let mut tables = self.tables.write();
        match tables.hosts.get_mut(&host.id) {
            Some(existing) if existing.stack_id == host.stack_id => {
                *existing = host.clone();
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("host {}", host.id))),
        }
    }

    async fn set_host_activity(
        &self,
        stack_id: i64,
        host_ids: &[i64],
        activity: Activity,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write();
        for host in tables.hosts.values_mut() {
            if host.stack_id == stack_id && host_ids.contains(&host.id) {
                host.activity = activity;
            }
        }
        Ok(())
    }

    async fn delete_hosts(&self, stack_id: i64, host_ids: &[i64]) -> StoreResult<u64> {
        let mut tables = self.tables.write();
        let before = tables.hosts.len();
        tables
            .hosts
            .retain(|id, host| !(host.stack_id == stack_id && host_ids.contains(id)));
        Ok((before - tables.hosts.len()) as u64)
    }

    async fn delete_stack(&self, stack_id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let remaining = tables
            .hosts
            .values()
            .filter(|host| host.stack_id == stack_id)
            .count();
        if remaining > 0 {
            return Err(StoreError::Conflict(format!(
                "stack {stack_id} still has {remaining} hosts"
            )));
        }
        tables
            .stacks
            .remove(&stack_id)
            .map(|_| ())
            .ok_or_else(|| not_found(&EntityKey::Stack(stack_id)))
    }

    async fn get_cloud_account(&self, slug: &str) -> StoreResult<Option<CloudAccount>> {
        Ok(self.tables.read().cloud_accounts.get(slug).cloned())
    }

    async fn components_for(&self, owner: &OwnerRef) -> StoreResult<Vec<FormulaComponent>> {
        Ok(self
            .tables
            .read()
            .components
            .get(owner)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_component_metadata(
        &self,
        records: Vec<ComponentMetadata>,
    ) -> StoreResult<Vec<ComponentMetadata>> {
        let mut tables = self.tables.write();
        let stored: Vec<ComponentMetadata> = records
            .into_iter()
            .map(|mut record| {
                record.id = self.metadata_seq.fetch_add(1, Ordering::SeqCst) + 1;
                record
            })
            .collect();
        tables.metadata.extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn component_history(&self, entity: &EntityKey) -> StoreResult<Vec<ComponentMetadata>> {
        Ok(self
            .tables
            .read()
            .metadata
            .iter()
            .filter(|record| &record.entity == entity)
            .cloned()
            .collect())
    }

    async fn append_history(&self, entry: HistoryEntry) -> StoreResult<()> {
        self.tables.write().history.push(entry);
        Ok(())
    }

    async fn history(&self, entity: &EntityKey) -> StoreResult<Vec<HistoryEntry>> {
        Ok(self
            .tables
            .read()
            .history
            .iter()
            .filter(|entry| &entry.entity == entity)
            .cloned()
            .collect())
    }

    async fn save_command_result(&self, result: CommandResult) -> StoreResult<()> {
        self.tables.write().command_results.push(result);
        Ok(())
    }

    async fn command_results(&self, entity: &EntityKey) -> StoreResult<Vec<CommandResult>> {
        Ok(self
            .tables
            .read()
            .command_results
            .iter()
            .filter(|result| &result.entity == entity)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ComponentStatus;

    fn store_with_stack(activity: Activity) -> InMemoryStore {
        let store = InMemoryStore::new();
        let mut stack = Stack::new(1, "web");
        stack.activity = activity;
        store.insert_stack(stack);
        store
    }

    #[tokio::test]
    async fn test_compare_and_set_activity() {
        let store = store_with_stack(Activity::Idle);
        let key = EntityKey::Stack(1);

        let swap = store
            .compare_and_set_activity(&key, &[Activity::Idle], Activity::Queued)
            .await
            .unwrap();
        assert_eq!(swap, ActivitySwap::Swapped { previous: Activity::Idle });

        let swap = store
            .compare_and_set_activity(&key, &[Activity::Idle], Activity::Queued)
            .await
            .unwrap();
        assert_eq!(swap, ActivitySwap::Rejected { current: Activity::Queued });
    }

    #[tokio::test]
    async fn test_delete_stack_refuses_with_hosts() {
        let store = store_with_stack(Activity::Terminating);
        store.insert_hosts([Host::new(10, 1, "a", "acct")]);

        assert!(matches!(store.delete_stack(1).await, Err(StoreError::Conflict(_))));
        assert_eq!(store.delete_hosts(1, &[10]).await.unwrap(), 1);
        store.delete_stack(1).await.unwrap();
        assert!(store.get_stack(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_metadata_ids_increase() {
        let store = store_with_stack(Activity::Idle);
        let key = EntityKey::Stack(1);
        let records = vec![
            ComponentMetadata::next(None, &key, "web", "h1", ComponentStatus::Running),
            ComponentMetadata::next(None, &key, "web", "h2", ComponentStatus::Running),
        ];
        let stored = store.append_component_metadata(records).await.unwrap();
        assert!(stored[0].id < stored[1].id);
        assert_eq!(store.component_history(&key).await.unwrap().len(), 2);
    }
}
