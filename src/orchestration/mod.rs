//! # Orchestration Engine
//!
//! Turns accepted intents into sequential task chains and carries them out.
//!
//! ## Core Components
//!
//! - **StackCoordinator**: legality, guards and the atomic activity swap in
//!   front of every intent
//! - **WorkflowComposer**: pure `(entity, intent, options) -> chain` mapping
//! - **TaskChainExecutor**: runs a chain on the tokio runtime, halting on the
//!   first failed link
//! - **Task library**: the idempotent infrastructure and salt tasks chains are
//!   built from, each wrapped in the retry and activity-reset envelope
//! - **Dependency graph**: nearest-lower-order salt orchestrate stages
//! - **Result processor**: succeeded/failed/cancelled classification of salt
//!   returns
//! - **HealthRollup**: cached host, stack, environment and component health

pub mod coordinator;
pub mod dependency_graph;
pub mod errors;
pub mod executor;
pub mod health_rollup;
pub mod result_processor;
pub mod tasks;
pub mod workflow;

pub use coordinator::{
    CoordinatorError, CoordinatorResult, DispatchReceipt, IntentRequest, StackCoordinator,
};
pub use dependency_graph::{GraphScope, OrchestrationGraph, OrchestrationStage};
pub use errors::{TaskError, TaskResult};
pub use executor::{ActiveChain, ChainFailure, ChainHandle, ChainOutcome, ExecutorError, TaskChainExecutor};
pub use health_rollup::{ComponentHealth, EntityHealth, HealthRollup};
pub use result_processor::{classify_orchestrate, classify_run, OrchestrateOutcome, RunOutcome};
pub use tasks::{run_task, TaskKind, TaskSpec};
pub use workflow::{ComponentTarget, CompositionError, IntentOptions, Workflow, WorkflowComposer};
