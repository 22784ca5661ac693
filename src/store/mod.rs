//! # Entity Store
//!
//! Persistence boundary for stacks, environments, hosts, component metadata,
//! history and command results. The entity `activity` column is the only
//! concurrency token in the system, so every store must implement
//! [`StackStore::compare_and_set_activity`] as one atomic read-modify-write.
//!
//! - [`InMemoryStore`]: `parking_lot` guarded maps, for embedding and tests
//! - `PgStackStore` (feature `postgres`): sqlx against PostgreSQL

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    CloudAccount, CommandResult, ComponentMetadata, EntityKey, Environment, FormulaComponent,
    HistoryEntry, Host, OwnerRef, Stack,
};
use crate::state_machine::Activity;

pub use memory::InMemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStackStore;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of an atomic activity swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySwap {
    /// Activity was in the allowed set and now holds the new value
    Swapped { previous: Activity },
    /// Activity was outside the allowed set and is unchanged
    Rejected { current: Activity },
}

#[async_trait]
pub trait StackStore: Send + Sync + std::fmt::Debug {
    async fn get_stack(&self, stack_id: i64) -> StoreResult<Option<Stack>>;

    async fn get_environment(&self, name: &str) -> StoreResult<Option<Environment>>;

    /// Current activity of a stack or environment
    async fn activity(&self, entity: &EntityKey) -> StoreResult<Activity>;

    /// Set `new` only if the current activity is one of `allowed`
    async fn compare_and_set_activity(
        &self,
        entity: &EntityKey,
        allowed: &[Activity],
        new: Activity,
    ) -> StoreResult<ActivitySwap>;

    async fn set_activity(&self, entity: &EntityKey, activity: Activity) -> StoreResult<()>;

    /// Hosts of a stack ordered by hostname
    async fn list_hosts(&self, stack_id: i64) -> StoreResult<Vec<Host>>;

    async fn update_host(&self, host: &Host) -> StoreResult<()>;

    async fn set_host_activity(
        &self,
        stack_id: i64,
        host_ids: &[i64],
        activity: Activity,
    ) -> StoreResult<()>;

    /// Returns the number of rows removed
    async fn delete_hosts(&self, stack_id: i64, host_ids: &[i64]) -> StoreResult<u64>;

    /// Removes the stack row; refuses while hosts remain
    async fn delete_stack(&self, stack_id: i64) -> StoreResult<()>;

    async fn get_cloud_account(&self, slug: &str) -> StoreResult<Option<CloudAccount>>;

    async fn components_for(&self, owner: &OwnerRef) -> StoreResult<Vec<FormulaComponent>>;

    /// Append records; the store assigns monotonically increasing ids
    async fn append_component_metadata(
        &self,
        records: Vec<ComponentMetadata>,
    ) -> StoreResult<Vec<ComponentMetadata>>;

    async fn component_history(&self, entity: &EntityKey) -> StoreResult<Vec<ComponentMetadata>>;

    async fn append_history(&self, entry: HistoryEntry) -> StoreResult<()>;

    async fn history(&self, entity: &EntityKey) -> StoreResult<Vec<HistoryEntry>>;

    async fn save_command_result(&self, result: CommandResult) -> StoreResult<()>;

    async fn command_results(&self, entity: &EntityKey) -> StoreResult<Vec<CommandResult>>;
}
