//! # Task Chain Executor
//!
//! Runs a composed [`Workflow`] as one sequential chain on the tokio runtime:
//! link N+1 starts only after link N succeeded, and the first failure halts
//! the chain. Each link runs inside the task envelope, so the entity's
//! activity is settled whichever way the chain ends.
//!
//! The activity column is the only exclusion token: a chain is submitted only
//! after the coordinator won the activity swap, so the executor never
//! rejects one. Running chains are tracked for observation only. The final
//! link settles activity before its chain leaves the registry, so a newer
//! chain for the same entity may briefly overlap the entry of the old one.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use super::tasks::run_task;
use super::workflow::Workflow;
use crate::constants::events;
use crate::logging::log_stack_operation;
use crate::models::EntityKey;
use crate::state_machine::Action;
use crate::system_context::SystemContext;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Chain {chain_id} aborted: {reason}")]
    Aborted { chain_id: Uuid, reason: String },
}

/// Registry entry for a running chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveChain {
    pub chain_id: Uuid,
    pub action: Action,
    pub started_at: DateTime<Utc>,
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainFailure {
    pub task: String,
    pub error: String,
    pub retryable: bool,
}

/// How a chain ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainOutcome {
    pub chain_id: Uuid,
    pub entity: EntityKey,
    pub action: Action,
    /// Links that completed, in order
    pub completed: Vec<String>,
    pub failure: Option<ChainFailure>,
}

impl ChainOutcome {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Handle to a submitted chain
#[derive(Debug)]
pub struct ChainHandle {
    pub chain_id: Uuid,
    pub entity: EntityKey,
    pub action: Action,
    pub started_at: DateTime<Utc>,
    join: JoinHandle<ChainOutcome>,
}

impl ChainHandle {
    /// Wait for the chain to finish
    pub async fn wait(self) -> Result<ChainOutcome, ExecutorError> {
        self.join.await.map_err(|err| ExecutorError::Aborted {
            chain_id: self.chain_id,
            reason: err.to_string(),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

#[derive(Debug, Clone)]
pub struct TaskChainExecutor {
    context: Arc<SystemContext>,
    active: Arc<DashMap<EntityKey, ActiveChain>>,
}

impl TaskChainExecutor {
    pub fn new(context: Arc<SystemContext>) -> Self {
        Self {
            context,
            active: Arc::new(DashMap::new()),
        }
    }

    /// Spawn `workflow` for `entity`. The caller must already own the
    /// entity's activity.
    pub fn submit(&self, entity: EntityKey, workflow: Workflow) -> ChainHandle {
        let chain_id = Uuid::new_v4();
        let started_at = Utc::now();
        let action = workflow.action;

        // replaces the entry of a chain that settled activity but has not unregistered yet
        self.active.insert(
            entity.clone(),
            ActiveChain {
                chain_id,
                action,
                started_at,
                tasks: workflow.links().map(|spec| spec.name().to_string()).collect(),
            },
        );

        info!(
            chain_id = %chain_id,
            entity = %entity,
            action = %action,
            links = workflow.len(),
            "🚀 Submitting task chain"
        );

        let context = self.context.clone();
        let active = self.active.clone();
        let chain_entity = entity.clone();
        let join = tokio::spawn(async move {
            let outcome = run_chain(&context, chain_id, &chain_entity, &workflow).await;
            active.remove_if(&chain_entity, |_, chain| chain.chain_id == chain_id);
            outcome
        });

        ChainHandle {
            chain_id,
            entity,
            action,
            started_at,
            join,
        }
    }

    pub fn is_active(&self, entity: &EntityKey) -> bool {
        self.active.contains_key(entity)
    }

    pub fn active_chain(&self, entity: &EntityKey) -> Option<ActiveChain> {
        self.active.get(entity).map(|chain| chain.value().clone())
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

async fn run_chain(
    ctx: &SystemContext,
    chain_id: Uuid,
    entity: &EntityKey,
    workflow: &Workflow,
) -> ChainOutcome {
    let links: Vec<_> = workflow.links().collect();
    let mut completed = Vec::with_capacity(links.len());
    let mut failure = None;

    for (index, spec) in links.iter().enumerate() {
        let is_final = index + 1 == links.len();
        match run_task(ctx, entity, spec, is_final).await {
            Ok(()) => completed.push(spec.name().to_string()),
            Err(err) => {
                failure = Some(ChainFailure {
                    task: spec.name().to_string(),
                    error: err.to_string(),
                    retryable: err.is_retryable(),
                });
                break;
            }
        }
    }

    match &failure {
        None => {
            log_stack_operation(workflow.action.as_str(), entity, None, "completed", None);
        }
        Some(failed) => {
            error!(
                chain_id = %chain_id,
                entity = %entity,
                action = %workflow.action,
                task = %failed.task,
                error = %failed.error,
                "❌ Task chain halted"
            );
            log_stack_operation(
                workflow.action.as_str(),
                entity,
                None,
                "failed",
                Some(&failed.error),
            );
            let _ = ctx
                .event_publisher
                .publish_for(
                    events::WORKFLOW_FAILED,
                    entity,
                    serde_json::json!({
                        "chain_id": chain_id,
                        "action": workflow.action,
                        "task": failed.task,
                        "error": failed.error,
                    }),
                )
                .await;
        }
    }

    ChainOutcome {
        chain_id,
        entity: entity.clone(),
        action: workflow.action,
        completed,
        failure,
    }
}
