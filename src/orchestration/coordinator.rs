//! # Stack Coordinator
//!
//! Synchronous front door for intents. A request is either rejected on the
//! spot, with the entity's activity untouched, or accepted: the activity is
//! swapped to the intent's starting activity and the composed chain is
//! handed to the executor, which carries it out in the background.
//!
//! ## Acceptance order
//!
//! 1. legality of the intent from the current activity,
//! 2. composition of the task chain from the intent options,
//! 3. intent-specific guards (driver capabilities, dependency health,
//!    host ownership),
//! 4. atomic activity swap, which is what makes concurrent requests safe,
//! 5. submission of the chain.
//!
//! Steps 1 to 3 only read. A request that loses the race in step 4 is
//! rejected like any other illegal intent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::errors::TaskError;
use super::executor::{ChainHandle, ChainOutcome, ExecutorError, TaskChainExecutor};
use super::health_rollup::EntityHealth;
use super::tasks::{entity_components, record_history};
use super::workflow::{CompositionError, IntentOptions, WorkflowComposer};
use crate::constants::events;
use crate::logging::log_stack_operation;
use crate::models::{EntityKey, HistoryLevel};
use crate::providers::HostAction;
use crate::state_machine::errors::business_rule_violation;
use crate::state_machine::guards::{DependenciesHealthyGuard, DriverSupportsGuard};
use crate::state_machine::{available_actions, Action, Activity, GuardError, StateGuard, StateMachineError};
use crate::store::StoreError;
use crate::system_context::SystemContext;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Intent rejected: {0}")]
    Rejected(#[from] StateMachineError),

    #[error("Invalid intent: {0}")]
    Composition(#[from] CompositionError),

    #[error("Dispatch failed: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),
}

impl From<GuardError> for CoordinatorError {
    fn from(err: GuardError) -> Self {
        Self::Rejected(StateMachineError::GuardFailed(err))
    }
}

impl CoordinatorError {
    /// Whether the caller can fix the request, as opposed to an
    /// infrastructure failure
    pub fn is_user_error(&self) -> bool {
        match self {
            Self::Rejected(StateMachineError::Store(StoreError::NotFound(_))) => true,
            Self::Rejected(StateMachineError::Store(_)) => false,
            Self::Rejected(StateMachineError::GuardFailed(GuardError::Store(_))) => false,
            Self::Rejected(_) | Self::Composition(_) => true,
            Self::Executor(_) | Self::Store(_) => false,
            Self::Task(err) => err.is_expected() && !err.is_retryable(),
        }
    }
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// An intent with its optional arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRequest {
    pub entity: EntityKey,
    pub action: Action,
    #[serde(default)]
    pub options: IntentOptions,
}

impl IntentRequest {
    pub fn new(entity: EntityKey, action: Action) -> Self {
        Self {
            entity,
            action,
            options: IntentOptions::default(),
        }
    }

    pub fn with_options(mut self, options: IntentOptions) -> Self {
        self.options = options;
        self
    }
}

/// Accepted intent
#[derive(Debug)]
pub struct DispatchReceipt {
    pub chain_id: Uuid,
    pub entity: EntityKey,
    pub action: Action,
    /// Activity the entity was in when the intent was accepted
    pub previous_activity: Activity,
    /// Every link of the chain, `finish` included
    pub tasks: Vec<String>,
    pub handle: ChainHandle,
}

impl DispatchReceipt {
    /// Wait for the background chain to end
    pub async fn wait(self) -> Result<ChainOutcome, ExecutorError> {
        self.handle.wait().await
    }
}

#[derive(Debug, Clone)]
pub struct StackCoordinator {
    context: Arc<SystemContext>,
    composer: WorkflowComposer,
    executor: TaskChainExecutor,
}

impl StackCoordinator {
    pub fn new(context: Arc<SystemContext>) -> Self {
        let composer = WorkflowComposer::new(context.config().orchestration.clone());
        let executor = TaskChainExecutor::new(context.clone());
        Self {
            context,
            composer,
            executor,
        }
    }

    pub fn executor(&self) -> &TaskChainExecutor {
        &self.executor
    }

    pub fn context(&self) -> &Arc<SystemContext> {
        &self.context
    }

    /// Accept or reject an intent. Accepted intents run in the background.
    pub async fn request(&self, request: IntentRequest) -> CoordinatorResult<DispatchReceipt> {
        let IntentRequest {
            entity,
            action,
            options,
        } = request;
        let ctx = &self.context;

        if let Err(err) = ctx.state_machine.ensure_legal(&entity, action).await {
            warn!(entity = %entity, action = %action, error = %err, "🚫 Intent rejected");
            log_stack_operation(action.as_str(), &entity, None, "rejected", Some(&err.to_string()));
            return Err(err.into());
        }
        let workflow = self.composer.compose(&entity, action, &options)?;
        self.check_guards(&entity, action, &options).await?;

        let previous_activity = ctx.state_machine.begin(&entity, action).await?;
        let tasks: Vec<String> = workflow.links().map(|spec| spec.name().to_string()).collect();
        // recorded before the chain exists so it precedes every task entry
        record_history(ctx, &entity, HistoryLevel::Info, &format!("Accepted {action}")).await;
        let handle = self.executor.submit(entity.clone(), workflow);

        info!(
            chain_id = %handle.chain_id,
            entity = %entity,
            action = %action,
            from = %previous_activity,
            "📨 Intent dispatched"
        );
        log_stack_operation(
            action.as_str(),
            &entity,
            Some(action.starting_activity().as_str()),
            "dispatched",
            None,
        );
        let _ = ctx
            .event_publisher
            .publish_for(
                events::WORKFLOW_DISPATCHED,
                &entity,
                serde_json::json!({
                    "chain_id": handle.chain_id,
                    "action": action,
                    "tasks": tasks,
                }),
            )
            .await;

        Ok(DispatchReceipt {
            chain_id: handle.chain_id,
            entity,
            action,
            previous_activity,
            tasks,
            handle,
        })
    }

    /// Intents currently legal for the entity
    pub async fn available_actions(&self, entity: &EntityKey) -> CoordinatorResult<Vec<Action>> {
        let activity = self.context.state_machine.current_activity(entity).await?;
        Ok(available_actions(entity.kind(), activity))
    }

    pub async fn health(&self, entity: &EntityKey) -> CoordinatorResult<EntityHealth> {
        Ok(self.context.health.entity_health(entity).await?)
    }

    async fn check_guards(
        &self,
        entity: &EntityKey,
        action: Action,
        options: &IntentOptions,
    ) -> CoordinatorResult<()> {
        let store = self.context.store.as_ref();
        let mut guards: Vec<Box<dyn StateGuard<EntityKey> + Send + Sync>> = Vec::new();

        match action {
            Action::Pause | Action::Resume => {
                let host_action = if action == Action::Pause {
                    HostAction::Stop
                } else {
                    HostAction::Start
                };
                guards.push(Box::new(DriverSupportsGuard {
                    action: host_action,
                    registry: self.context.drivers.clone(),
                }));
            }
            Action::SingleSls => {
                let components = entity_components(&self.context, entity).await?;
                for target in &options.components {
                    guards.push(Box::new(DependenciesHealthyGuard {
                        sls_path: target.sls_path.clone(),
                        target: target.host_target.clone(),
                        components: components.clone(),
                    }));
                }
            }
            Action::DestroyHosts => self.check_host_ownership(entity, &options.host_ids).await?,
            _ => {}
        }

        for guard in &guards {
            debug!(entity = %entity, action = %action, guard = guard.description(), "Checking guard");
            guard.check(entity, store).await?;
        }
        Ok(())
    }

    /// Every requested host must belong to the stack
    async fn check_host_ownership(&self, entity: &EntityKey, host_ids: &[i64]) -> CoordinatorResult<()> {
        let Some(stack_id) = entity.stack_id() else {
            return Ok(());
        };
        let owned: BTreeSet<i64> = self
            .context
            .store
            .list_hosts(stack_id)
            .await?
            .iter()
            .map(|host| host.id)
            .collect();
        let foreign: Vec<String> = host_ids
            .iter()
            .filter(|id| !owned.contains(*id))
            .map(i64::to_string)
            .collect();
        if foreign.is_empty() {
            Ok(())
        } else {
            Err(business_rule_violation(format!(
                "host(s) {} do not belong to {entity}",
                foreign.join(", ")
            ))
            .into())
        }
    }
}
