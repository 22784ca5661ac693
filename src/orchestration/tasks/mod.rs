//! # Task Library
//!
//! Named, idempotent units of work that workflow chains are built from.
//!
//! Every task runs inside the same envelope ([`run_task`]):
//!
//! 1. the entity's activity is narrowed to the task's phase,
//! 2. the task body runs under [`auto_retry`] with its attempt budget,
//! 3. on success an intermediate task leaves the entity `queued` for the next
//!    link, while the final link owns the entity's resting activity,
//! 4. on failure the entity is reset to `idle`, the failure is written to its
//!    history log, and the error is returned so the chain halts.

pub mod configuration;
pub mod infrastructure;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use super::errors::{TaskError, TaskResult};
use crate::constants::{events, system::UNHANDLED_EXCEPTION_MESSAGE};
use crate::logging::log_task_operation;
use crate::models::{
    current_metadata, stack::stack_components, ComponentMetadata, ComponentStatus, EntityKey,
    Environment, FormulaComponent, HistoryEntry, HistoryLevel, Host, OwnerRef, Stack,
};
use crate::providers::HostAction;
use crate::resilience::auto_retry;
use crate::salt::{EntityFiles, Target};
use crate::state_machine::{Activity, StateMachineError};
use crate::store::StoreError;
use crate::system_context::SystemContext;

/// One link of a workflow chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskKind {
    LaunchHosts {
        parallel: bool,
    },
    /// Refresh host rows from the provider; `None` covers every host
    UpdateMetadata {
        host_ids: Option<Vec<i64>>,
        remove_absent: bool,
    },
    TagInfrastructure,
    RegisterDns,
    UnregisterDns {
        host_ids: Option<Vec<i64>>,
    },
    RegisterVolumeDelete {
        host_ids: Option<Vec<i64>>,
    },
    Ping,
    SyncAll,
    Highstate,
    PropagateSsh,
    GlobalOrchestrate,
    Orchestrate,
    SingleSls {
        sls_path: String,
        target: Option<Target>,
    },
    RunCommand {
        command: String,
        target: Target,
    },
    /// Run a driver action hook and wait for the state it settles in
    HostAction {
        action: HostAction,
    },
    DestroyHosts {
        host_ids: Option<Vec<i64>>,
        delete_rows: bool,
    },
    DestroyStack,
    Finish {
        activity: Activity,
    },
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LaunchHosts { .. } => "launch_hosts",
            Self::UpdateMetadata { .. } => "update_metadata",
            Self::TagInfrastructure => "tag_infrastructure",
            Self::RegisterDns => "register_dns",
            Self::UnregisterDns { .. } => "unregister_dns",
            Self::RegisterVolumeDelete { .. } => "register_volume_delete",
            Self::Ping => "ping",
            Self::SyncAll => "sync_all",
            Self::Highstate => "highstate",
            Self::PropagateSsh => "propagate_ssh",
            Self::GlobalOrchestrate => "global_orchestrate",
            Self::Orchestrate => "orchestrate",
            Self::SingleSls { .. } => "single_sls",
            Self::RunCommand { .. } => "run_command",
            Self::HostAction { .. } => "host_action",
            Self::DestroyHosts { .. } => "destroy_hosts",
            Self::DestroyStack => "destroy_stack",
            Self::Finish { .. } => "finish",
        }
    }

    /// Activity shown while the task runs. `finish` sets its own.
    pub fn default_phase(&self) -> Option<Activity> {
        let phase = match self {
            Self::LaunchHosts { .. }
            | Self::UpdateMetadata { .. }
            | Self::TagInfrastructure
            | Self::RegisterDns => Activity::Launching,
            Self::Ping
            | Self::SyncAll
            | Self::Highstate
            | Self::PropagateSsh
            | Self::GlobalOrchestrate => Activity::Provisioning,
            Self::Orchestrate | Self::SingleSls { .. } => Activity::Orchestrating,
            Self::UnregisterDns { .. }
            | Self::RegisterVolumeDelete { .. }
            | Self::DestroyHosts { .. }
            | Self::DestroyStack => Activity::Terminating,
            Self::RunCommand { .. } => Activity::Executing,
            Self::HostAction { action } => match action {
                HostAction::Stop => Activity::Pausing,
                HostAction::Start => Activity::Resuming,
                HostAction::Terminate => Activity::Terminating,
                HostAction::Provision | HostAction::PropagateSsh => Activity::Provisioning,
                HostAction::Orchestrate => Activity::Orchestrating,
                HostAction::Custom => Activity::Executing,
            },
            Self::Finish { .. } => return None,
        };
        Some(phase)
    }
}

/// A task plus how the chain runs it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub kind: TaskKind,
    pub phase: Option<Activity>,
    pub max_attempts: u32,
}

impl TaskSpec {
    pub fn new(kind: TaskKind, max_attempts: u32) -> Self {
        Self {
            phase: kind.default_phase(),
            kind,
            max_attempts,
        }
    }

    /// Run once, without retries
    pub fn once(kind: TaskKind) -> Self {
        Self::new(kind, 1)
    }

    pub fn in_phase(mut self, phase: Activity) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// Run one task inside the error-handling envelope
pub async fn run_task(
    ctx: &SystemContext,
    entity: &EntityKey,
    spec: &TaskSpec,
    is_final: bool,
) -> TaskResult<()> {
    let name = spec.name();
    log_task_operation(name, entity, None, "started", None);
    let _ = ctx
        .event_publisher
        .publish_for(events::TASK_STARTED, entity, serde_json::json!({ "task": name }))
        .await;

    let result = auto_retry(name, spec.max_attempts, TaskError::is_retryable, move |attempt| async move {
        if let Some(phase) = spec.phase {
            enter_phase(ctx, entity, phase).await?;
        }
        log_task_operation(name, entity, Some(attempt), "attempting", None);
        execute(ctx, entity, &spec.kind).await
    })
    .await;

    let result = match result {
        Ok(()) if !is_final => ctx
            .state_machine
            .transition(entity, Activity::Queued)
            .await
            .map_err(|err| not_found_or(entity, err)),
        other => other,
    };

    match result {
        Ok(()) => {
            log_task_operation(name, entity, None, "completed", None);
            let _ = ctx
                .event_publisher
                .publish_for(events::TASK_COMPLETED, entity, serde_json::json!({ "task": name }))
                .await;
            Ok(())
        }
        Err(err) => {
            fail_task(ctx, entity, name, &err).await;
            let _ = ctx
                .event_publisher
                .publish_for(
                    events::TASK_FAILED,
                    entity,
                    serde_json::json!({ "task": name, "error": err.to_string() }),
                )
                .await;
            Err(err)
        }
    }
}

async fn execute(ctx: &SystemContext, entity: &EntityKey, kind: &TaskKind) -> TaskResult<()> {
    match kind {
        TaskKind::LaunchHosts { parallel } => {
            infrastructure::launch_hosts(ctx, require_stack(entity)?, *parallel).await
        }
        TaskKind::UpdateMetadata {
            host_ids,
            remove_absent,
        } => {
            infrastructure::update_metadata(
                ctx,
                require_stack(entity)?,
                host_ids.as_deref(),
                *remove_absent,
            )
            .await
        }
        TaskKind::TagInfrastructure => {
            infrastructure::tag_infrastructure(ctx, require_stack(entity)?).await
        }
        TaskKind::RegisterDns => infrastructure::register_dns(ctx, require_stack(entity)?).await,
        TaskKind::UnregisterDns { host_ids } => {
            infrastructure::unregister_dns(ctx, require_stack(entity)?, host_ids.as_deref()).await
        }
        TaskKind::RegisterVolumeDelete { host_ids } => {
            infrastructure::register_volume_delete(ctx, require_stack(entity)?, host_ids.as_deref())
                .await
        }
        TaskKind::Ping => configuration::ping(ctx, entity).await,
        TaskKind::SyncAll => configuration::sync_all(ctx, entity).await,
        TaskKind::Highstate => configuration::highstate(ctx, entity).await,
        TaskKind::PropagateSsh => configuration::propagate_ssh(ctx, entity).await,
        TaskKind::GlobalOrchestrate => configuration::global_orchestrate(ctx, entity).await,
        TaskKind::Orchestrate => configuration::orchestrate(ctx, entity).await,
        TaskKind::SingleSls { sls_path, target } => {
            configuration::single_sls(ctx, entity, sls_path, target.as_ref()).await
        }
        TaskKind::RunCommand { command, target } => {
            configuration::run_command(ctx, entity, command, target).await
        }
        TaskKind::HostAction { action } => {
            infrastructure::host_action(ctx, require_stack(entity)?, *action).await
        }
        TaskKind::DestroyHosts {
            host_ids,
            delete_rows,
        } => {
            infrastructure::destroy_hosts(ctx, require_stack(entity)?, host_ids.as_deref(), *delete_rows)
                .await
        }
        TaskKind::DestroyStack => infrastructure::destroy_stack(ctx, require_stack(entity)?).await,
        TaskKind::Finish { activity } => finish(ctx, entity, *activity).await,
    }
}

/// Narrow the entity (and a stack's hosts) to the task's phase
async fn enter_phase(ctx: &SystemContext, entity: &EntityKey, phase: Activity) -> TaskResult<()> {
    ctx.state_machine
        .transition(entity, phase)
        .await
        .map_err(|err| not_found_or(entity, err))?;
    if let EntityKey::Stack(stack_id) = entity {
        set_all_host_activity(ctx, *stack_id, phase).await?;
    }
    Ok(())
}

async fn set_all_host_activity(ctx: &SystemContext, stack_id: i64, activity: Activity) -> TaskResult<()> {
    let host_ids: Vec<i64> = ctx
        .store
        .list_hosts(stack_id)
        .await?
        .iter()
        .map(|host| host.id)
        .collect();
    if !host_ids.is_empty() {
        ctx.store
            .set_host_activity(stack_id, &host_ids, activity)
            .await?;
    }
    Ok(())
}

/// A missing entity is fatal for the task rather than a store failure
fn not_found_or(entity: &EntityKey, err: StateMachineError) -> TaskError {
    match err {
        StateMachineError::Store(StoreError::NotFound(_)) => TaskError::EntityNotFound(entity.clone()),
        other => TaskError::from(other),
    }
}

/// Reset to idle and leave a history entry; never masks the original error
async fn fail_task(ctx: &SystemContext, entity: &EntityKey, task: &str, err: &TaskError) {
    let message = if err.is_expected() {
        warn!(entity = %entity, task, error = %err, "❌ Task failed");
        err.to_string()
    } else {
        error!(entity = %entity, task, error = ?err, "💥 Task failed with unexpected error");
        UNHANDLED_EXCEPTION_MESSAGE.to_string()
    };

    // hosts first: the entity activity releases the entity to the next intent
    if let EntityKey::Stack(stack_id) = entity {
        if let Err(reset_err) = set_all_host_activity(ctx, *stack_id, Activity::Idle).await {
            warn!(entity = %entity, error = %reset_err, "Could not reset host activity");
        }
    }
    record_history(ctx, entity, HistoryLevel::Error, &message).await;
    if let Err(reset_err) = ctx.state_machine.transition(entity, Activity::Idle).await {
        warn!(entity = %entity, task, error = %reset_err, "Could not reset activity after failure");
    }
    log_task_operation(task, entity, None, "failed", Some(&message));
}

/// Settle the entity in its resting activity and announce completion
async fn finish(ctx: &SystemContext, entity: &EntityKey, activity: Activity) -> TaskResult<()> {
    // hosts and history before the entity activity, which releases the entity
    if let EntityKey::Stack(stack_id) = entity {
        set_all_host_activity(ctx, *stack_id, activity).await?;
    }
    ctx.health.invalidate(entity).await;
    record_history(ctx, entity, HistoryLevel::Info, &format!("Finished, now {activity}")).await;

    ctx.state_machine
        .transition(entity, activity)
        .await
        .map_err(|err| not_found_or(entity, err))?;
    info!(entity = %entity, activity = %activity, "🏁 Workflow finished");
    let _ = ctx
        .event_publisher
        .publish_for(
            events::WORKFLOW_COMPLETED,
            entity,
            serde_json::json!({ "activity": activity }),
        )
        .await;
    Ok(())
}

// Shared helpers

pub(crate) fn require_stack(entity: &EntityKey) -> TaskResult<i64> {
    entity.stack_id().ok_or_else(|| {
        TaskError::Validation(format!("{entity} has no provider-managed hosts"))
    })
}

pub(crate) async fn load_stack(ctx: &SystemContext, stack_id: i64) -> TaskResult<Stack> {
    ctx.store
        .get_stack(stack_id)
        .await?
        .ok_or(TaskError::EntityNotFound(EntityKey::Stack(stack_id)))
}

pub(crate) async fn load_environment(ctx: &SystemContext, name: &str) -> TaskResult<Environment> {
    ctx.store
        .get_environment(name)
        .await?
        .ok_or_else(|| TaskError::EntityNotFound(EntityKey::Environment(name.to_string())))
}

/// Hosts of a stack, optionally restricted to `host_ids`
pub(crate) async fn selected_hosts(
    ctx: &SystemContext,
    stack_id: i64,
    host_ids: Option<&[i64]>,
) -> TaskResult<Vec<Host>> {
    let hosts = ctx.store.list_hosts(stack_id).await?;
    Ok(match host_ids {
        Some(ids) => hosts.into_iter().filter(|host| ids.contains(&host.id)).collect(),
        None => hosts,
    })
}

/// Append a bounded history message; failing to log never fails the task
pub(crate) async fn record_history(
    ctx: &SystemContext,
    entity: &EntityKey,
    level: HistoryLevel,
    message: &str,
) {
    let entry = HistoryEntry::new(entity, level, message, ctx.config().history.max_message_length);
    if let Err(err) = ctx.store.append_history(entry).await {
        warn!(entity = %entity, error = %err, "Could not append history entry");
    }
}

/// Components applied to an entity's hosts
pub async fn entity_components(
    ctx: &SystemContext,
    entity: &EntityKey,
) -> TaskResult<Vec<FormulaComponent>> {
    match entity {
        EntityKey::Stack(stack_id) => {
            let owned = ctx.store.components_for(&OwnerRef::stack(*stack_id)).await?;
            if !owned.is_empty() {
                return Ok(owned);
            }
            let hosts = ctx.store.list_hosts(*stack_id).await?;
            Ok(stack_components(&hosts))
        }
        EntityKey::Environment(name) => Ok(load_environment(ctx, name).await?.formula_components),
    }
}

/// Minion id -> sls paths it carries.
///
/// Stack minions come from live host rows; environment minions are discovered
/// through their `roles` grain.
pub(crate) async fn host_roles(
    ctx: &SystemContext,
    entity: &EntityKey,
) -> TaskResult<BTreeMap<String, Vec<String>>> {
    match entity {
        EntityKey::Stack(stack_id) => Ok(ctx
            .store
            .list_hosts(*stack_id)
            .await?
            .into_iter()
            .filter(|host| host.has_instance() && !host.is_gone())
            .map(|host| {
                let roles: Vec<String> = host
                    .formula_components
                    .iter()
                    .map(|component| component.sls_path.clone())
                    .collect();
                (host.hostname, roles)
            })
            .collect()),
        EntityKey::Environment(_) => {
            let grains = ctx
                .salt
                .grains(&Target::Compound(entity.salt_target()), "roles")
                .await?;
            Ok(grains
                .into_iter()
                .map(|(minion, value)| {
                    let roles: Vec<String> = value
                        .as_array()
                        .map(|roles| {
                            roles
                                .iter()
                                .filter_map(|role| role.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();
                    (minion, roles)
                })
                .collect())
        }
    }
}

/// Append one status record per `(sls_path, host)` pair, carrying health
/// forward from each pair's current record, then invalidate cached rollups
pub(crate) async fn record_component_status(
    ctx: &SystemContext,
    entity: &EntityKey,
    updates: &[(String, String, ComponentStatus)],
) -> TaskResult<()> {
    if updates.is_empty() {
        return Ok(());
    }
    let history = ctx.store.component_history(entity).await?;
    let current = current_metadata(&history);
    let records = updates
        .iter()
        .map(|(sls_path, host, status)| {
            let previous = current.get(&(sls_path.clone(), host.clone())).copied();
            ComponentMetadata::next(previous, entity, sls_path, host, *status)
        })
        .collect();
    ctx.store.append_component_metadata(records).await?;
    ctx.health.invalidate(entity).await;
    Ok(())
}

/// On-disk state location for an entity
pub(crate) async fn entity_files(ctx: &SystemContext, entity: &EntityKey) -> TaskResult<EntityFiles> {
    let orchestration = &ctx.config().orchestration;
    Ok(match entity {
        EntityKey::Stack(stack_id) => {
            EntityFiles::for_stack(&orchestration.stack_root, &load_stack(ctx, *stack_id).await?)
        }
        EntityKey::Environment(name) => EntityFiles::for_environment(
            &orchestration.environment_root,
            &load_environment(ctx, name).await?,
        ),
    })
}

/// Regenerate pillar data right before a run reads it
pub(crate) async fn write_pillar(ctx: &SystemContext, entity: &EntityKey) -> TaskResult<EntityFiles> {
    let files = entity_files(ctx, entity).await?;
    let properties = match entity {
        EntityKey::Stack(stack_id) => load_stack(ctx, *stack_id).await?.properties,
        EntityKey::Environment(name) => load_environment(ctx, name).await?.properties,
    };
    files.write_yaml(&files.pillar_path(), &properties).await?;
    Ok(files)
}

/// Salt target covering the entity's live minions
pub(crate) async fn minion_target(ctx: &SystemContext, entity: &EntityKey) -> TaskResult<Option<Target>> {
    match entity {
        EntityKey::Stack(stack_id) => {
            let hostnames: Vec<String> = ctx
                .store
                .list_hosts(*stack_id)
                .await?
                .into_iter()
                .filter(|host| host.has_instance() && !host.is_gone())
                .map(|host| host.hostname)
                .collect();
            Ok((!hostnames.is_empty()).then_some(Target::List(hostnames)))
        }
        EntityKey::Environment(_) => Ok(Some(Target::Compound(entity.salt_target()))),
    }
}
