#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Stackd Core
//!
//! Lifecycle orchestration core for cloud stacks and salt-managed
//! environments.
//!
//! ## Overview
//!
//! A stack is a set of cloud hosts launched from a blueprint and configured
//! by salt. Callers express intents against a stack or environment (launch,
//! terminate, pause, resume, provision, orchestrate, ...). The core decides
//! synchronously whether an intent is legal from the entity's current
//! activity, and if so turns it into an ordered chain of idempotent tasks
//! that runs in the background.
//!
//! ## Key Features
//!
//! - **Activity state machine**: the activity column is the single
//!   concurrency token, swapped atomically on acceptance
//! - **Task chains**: sequential, halt on first failure, retry wrapper per
//!   task, activity always settled when a chain ends
//! - **Salt orchestration graphs**: nearest-lower-order dependency stages
//! - **Result classification**: requisite cascades are cancelled, not failed
//! - **Health rollups**: cached, explicitly invalidated host/stack/component
//!   health
//!
//! ## Module Organization
//!
//! - [`models`] - Stacks, hosts, environments, components and their metadata
//! - [`state_machine`] - Activities, intents, legality table and guards
//! - [`orchestration`] - Coordinator, composer, executor and task library
//! - [`providers`] - Cloud driver seam and registry
//! - [`salt`] - Salt client seam and on-disk state files
//! - [`store`] - Persistence seam with in-memory and PostgreSQL stores
//! - [`cache`] - Injected TTL cache
//! - [`resilience`] - Retry wrapper and bounded polling
//! - [`config`] - YAML configuration with environment overrides
//! - [`events`] - Lifecycle event broadcasting
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stackd_core::models::EntityKey;
//! use stackd_core::orchestration::{IntentRequest, StackCoordinator};
//! use stackd_core::providers::DriverRegistry;
//! use stackd_core::salt::SaltClient;
//! use stackd_core::state_machine::Action;
//! use stackd_core::store::InMemoryStore;
//! use stackd_core::system_context::SystemContext;
//!
//! # async fn example(salt: Arc<dyn SaltClient>) -> stackd_core::Result<()> {
//! let context = SystemContext::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(DriverRegistry::new()),
//!     salt,
//! )?;
//! let coordinator = StackCoordinator::new(Arc::new(context));
//!
//! let receipt = coordinator
//!     .request(IntentRequest::new(EntityKey::Stack(1), Action::Launch))
//!     .await?;
//! println!("dispatched {:?}", receipt.tasks);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod providers;
pub mod resilience;
pub mod salt;
pub mod state_machine;
pub mod store;
pub mod system_context;

pub use config::{ConfigManager, StackdConfig};
pub use constants::{events as system_events, salt_functions, system};
pub use error::{Result, StackdError};
pub use models::{EntityKey, EntityKind};
pub use orchestration::{IntentRequest, StackCoordinator};
pub use state_machine::{Action, Activity};
pub use system_context::SystemContext;
