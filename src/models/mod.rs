//! # Models
//!
//! Stacks, environments, hosts, formula components and their append-only
//! status history. Persistence lives behind [`crate::store::StackStore`].

pub mod cloud_account;
pub mod command;
pub mod component;
pub mod entity;
pub mod environment;
pub mod health;
pub mod history;
pub mod stack;

pub use cloud_account::CloudAccount;
pub use command::CommandResult;
pub use component::{
    current_metadata, ComponentMetadata, EntityComponent, FormulaComponent, OwnerKind, OwnerRef,
};
pub use entity::{EntityKey, EntityKind};
pub use environment::Environment;
pub use health::{ComponentStatus, Health, InvalidValueError};
pub use history::{HistoryEntry, HistoryLevel};
pub use stack::{host_states, Host, SecurityGroupRef, Stack, Volume};
