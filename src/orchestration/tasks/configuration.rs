//! Salt-facing tasks. These work for stacks and environments alike.
//!
//! Each one regenerates the on-disk state it reads right before the run,
//! classifies the result, writes failure detail to the entity's error log,
//! and fails with a retryable [`TaskError::StateFailures`] when anything
//! really failed.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, warn};

use super::{
    entity_components, entity_files, host_roles, load_stack, minion_target, record_component_status,
    record_history, write_pillar,
};
use crate::constants::salt_functions::{CMD_RUN, HIGHSTATE, STATE_SLS, SYNC_ALL, TEST_PING, USERS_SLS};
use crate::models::{CommandResult, ComponentStatus, EntityKey, HistoryLevel, OwnerRef};
use crate::orchestration::dependency_graph::{GraphScope, OrchestrationGraph};
use crate::orchestration::errors::{TaskError, TaskResult};
use crate::orchestration::result_processor::{
    classify_orchestrate, classify_run, write_error_log, RunOutcome,
};
use crate::resilience::{poll_until, PollError, PollSettings, PollStatus};
use crate::salt::{HostReturn, Target};
use crate::system_context::SystemContext;

/// Minions that missed a ping round
#[derive(Debug)]
struct Unanswered(Vec<String>);

impl fmt::Display for Unanswered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no answer from {}", self.0.join(", "))
    }
}

/// Wait until every live minion answers `test.ping`.
///
/// Each unanswered round counts as a failure; the task gives up after the
/// configured number of rounds.
pub async fn ping(ctx: &SystemContext, entity: &EntityKey) -> TaskResult<()> {
    let Some(target) = minion_target(ctx, entity).await? else {
        debug!(entity = %entity, "No live minions to ping");
        return Ok(());
    };
    let expected: Vec<String> = match &target {
        Target::List(hosts) => hosts.clone(),
        _ => Vec::new(),
    };
    let settings = PollSettings::reachability(&ctx.config().polling);
    let target = &target;
    let expected = &expected;

    let outcome = poll_until("minions to answer ping", settings, move |round| async move {
        match ctx.salt.run(target, TEST_PING, &[]).await {
            Ok(result) => {
                let outcome = classify_run(&result);
                let missing: Vec<String> = expected
                    .iter()
                    .filter(|host| !outcome.succeeded_hosts.contains(*host))
                    .cloned()
                    .chain(outcome.failed_hosts.iter().cloned())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                if missing.is_empty() && outcome.num_hosts > 0 {
                    PollStatus::Ready(outcome)
                } else {
                    debug!(entity = %entity, round, missing = ?missing, "Minions not answering yet");
                    PollStatus::Failed(Unanswered(missing))
                }
            }
            Err(err) => {
                warn!(entity = %entity, round, error = %err, "Ping round failed");
                PollStatus::Failed(Unanswered(expected.clone()))
            }
        }
    })
    .await
    .map_err(|err| match err {
        PollError::MaxFailures { last_error, .. } => TaskError::HostsUnreachable {
            hosts: last_error.0,
        },
        PollError::Timeout { .. } => TaskError::HostsUnreachable {
            hosts: expected.clone(),
        },
    })?;

    info!(entity = %entity, hosts = outcome.num_hosts, "📡 All minions reachable");
    Ok(())
}

/// Classify a host run, log its errors, and fail on real failures
async fn settle_run(
    ctx: &SystemContext,
    entity: &EntityKey,
    phase: &str,
    log_kind: &str,
    outcome: &RunOutcome,
) -> TaskResult<()> {
    let files = entity_files(ctx, entity).await?;
    write_error_log(&files, log_kind, &outcome.render_errors()).await?;
    if outcome.failed {
        return Err(TaskError::state_failures(
            phase,
            outcome.failed_hosts.iter().cloned(),
        ));
    }
    if !outcome.cancelled_hosts.is_empty() {
        warn!(
            entity = %entity,
            phase,
            cancelled = ?outcome.cancelled_hosts,
            "Some hosts were skipped by failed requisites"
        );
    }
    Ok(())
}

pub async fn sync_all(ctx: &SystemContext, entity: &EntityKey) -> TaskResult<()> {
    write_pillar(ctx, entity).await?;
    let Some(target) = minion_target(ctx, entity).await? else {
        return Ok(());
    };
    let result = ctx.salt.run(&target, SYNC_ALL, &[]).await?;
    let outcome = classify_run(&result);
    settle_run(ctx, entity, "Module sync", "sync_all", &outcome).await
}

/// Apply the full state tree and record each component's outcome per host
pub async fn highstate(ctx: &SystemContext, entity: &EntityKey) -> TaskResult<()> {
    write_pillar(ctx, entity).await?;
    let Some(target) = minion_target(ctx, entity).await? else {
        return Ok(());
    };
    let roles = host_roles(ctx, entity).await?;
    record_component_status(ctx, entity, &pairs(&roles, ComponentStatus::Running)).await?;

    let result = ctx.salt.run(&target, HIGHSTATE, &[]).await?;
    let outcome = classify_run(&result);

    let updates: Vec<(String, String, ComponentStatus)> = roles
        .iter()
        .flat_map(|(host, sls_paths)| {
            let status = outcome.status_for(host);
            sls_paths
                .iter()
                .map(move |sls| (sls.clone(), host.clone(), status))
        })
        .collect();
    record_component_status(ctx, entity, &updates).await?;

    settle_run(ctx, entity, "Highstate", "highstate", &outcome).await?;
    record_history(
        ctx,
        entity,
        HistoryLevel::Info,
        &format!("Highstate applied to {} host(s)", outcome.num_hosts),
    )
    .await;
    Ok(())
}

/// Push user accounts and SSH keys without a full highstate
pub async fn propagate_ssh(ctx: &SystemContext, entity: &EntityKey) -> TaskResult<()> {
    write_pillar(ctx, entity).await?;
    let Some(target) = minion_target(ctx, entity).await? else {
        return Ok(());
    };
    let result = ctx
        .salt
        .run(&target, STATE_SLS, &[USERS_SLS.to_string()])
        .await?;
    let outcome = classify_run(&result);
    settle_run(ctx, entity, "SSH key propagation", "propagate_ssh", &outcome).await?;
    record_history(ctx, entity, HistoryLevel::Info, "SSH keys propagated").await;
    Ok(())
}

/// Run each cloud account's own components once, scoped to that account
pub async fn global_orchestrate(ctx: &SystemContext, entity: &EntityKey) -> TaskResult<()> {
    let EntityKey::Stack(stack_id) = entity else {
        return Ok(());
    };
    load_stack(ctx, *stack_id).await?;
    let accounts: BTreeSet<String> = ctx
        .store
        .list_hosts(*stack_id)
        .await?
        .into_iter()
        .map(|host| host.cloud_account)
        .collect();
    let files = write_pillar(ctx, entity).await?;
    let pillar_env = &ctx.config().orchestration.pillar_env;
    let mut failed = Vec::new();

    for slug in accounts {
        let mut components = ctx
            .store
            .components_for(&OwnerRef::cloud_account(slug.clone()))
            .await?;
        if components.is_empty() {
            match ctx.store.get_cloud_account(&slug).await? {
                Some(account) => components = account.formula_components,
                None => {
                    warn!(entity = %entity, account = %slug, "Cloud account not found, skipping");
                    continue;
                }
            }
        }

        let graph = OrchestrationGraph::build(GraphScope::CloudAccount(slug.clone()), &components);
        if graph.is_empty() {
            continue;
        }
        let path = files.global_orchestrate_path(&slug);
        files.write_yaml(&path, &graph.to_yaml()).await?;

        info!(entity = %entity, account = %slug, stages = graph.stages.len(), "🌐 Global orchestration");
        let result = ctx.salt.orchestrate(&path, pillar_env).await?;
        let outcome = classify_orchestrate(&result);
        write_error_log(&files, &format!("global_orchestrate-{slug}"), &outcome.render_errors())
            .await?;
        failed.extend(outcome.failed_sls.iter().map(|sls| format!("{slug}/{sls}")));
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(TaskError::state_failures("Global orchestration", failed))
    }
}

/// Run the entity's component graph wave by wave
pub async fn orchestrate(ctx: &SystemContext, entity: &EntityKey) -> TaskResult<()> {
    let components = entity_components(ctx, entity).await?;
    let graph = OrchestrationGraph::build(GraphScope::Entity(entity.clone()), &components);
    if graph.is_empty() {
        record_history(ctx, entity, HistoryLevel::Info, "Nothing to orchestrate").await;
        return Ok(());
    }

    let files = write_pillar(ctx, entity).await?;
    let path = files.orchestrate_path();
    files.write_yaml(&path, &graph.to_yaml()).await?;

    let roles = host_roles(ctx, entity).await?;
    let carried: Vec<(String, String)> = roles
        .iter()
        .flat_map(|(host, sls_paths)| {
            sls_paths
                .iter()
                .filter(|sls| graph.stage(sls).is_some())
                .map(move |sls| (sls.clone(), host.clone()))
                .collect::<Vec<_>>()
        })
        .collect();
    let running: Vec<_> = carried
        .iter()
        .map(|(sls, host)| (sls.clone(), host.clone(), ComponentStatus::Running))
        .collect();
    record_component_status(ctx, entity, &running).await?;

    info!(entity = %entity, stages = graph.stages.len(), "🎼 Orchestrating");
    let result = ctx
        .salt
        .orchestrate(&path, &ctx.config().orchestration.pillar_env)
        .await?;
    let outcome = classify_orchestrate(&result);

    let updates: Vec<_> = carried
        .iter()
        .map(|(sls, host)| (sls.clone(), host.clone(), outcome.status_for(sls, host)))
        .collect();
    record_component_status(ctx, entity, &updates).await?;
    write_error_log(&files, "orchestrate", &outcome.render_errors()).await?;

    if outcome.failed {
        return Err(TaskError::state_failures(
            "Orchestration",
            outcome.failed_sls.iter().cloned(),
        ));
    }
    record_history(
        ctx,
        entity,
        HistoryLevel::Info,
        &format!("Orchestrated {} component(s)", outcome.succeeded_sls.len()),
    )
    .await;
    Ok(())
}

/// Re-apply one component on the hosts that carry it, optionally narrowed by
/// a host target
pub async fn single_sls(
    ctx: &SystemContext,
    entity: &EntityKey,
    sls_path: &str,
    host_target: Option<&Target>,
) -> TaskResult<()> {
    write_pillar(ctx, entity).await?;
    let roles = host_roles(ctx, entity).await?;
    let hosts: Vec<String> = roles
        .iter()
        .filter(|(host, sls_paths)| {
            sls_paths.iter().any(|sls| sls == sls_path)
                && host_target.map_or(true, |target| target.matches(host))
        })
        .map(|(host, _)| host.clone())
        .collect();
    if hosts.is_empty() {
        return Err(TaskError::Validation(format!(
            "no live host of {entity} carries {sls_path}"
        )));
    }

    let running: Vec<_> = hosts
        .iter()
        .map(|host| (sls_path.to_string(), host.clone(), ComponentStatus::Running))
        .collect();
    record_component_status(ctx, entity, &running).await?;

    let result = ctx
        .salt
        .run(&Target::List(hosts.clone()), STATE_SLS, &[sls_path.to_string()])
        .await?;
    let outcome = classify_run(&result);
    let updates: Vec<_> = hosts
        .iter()
        .map(|host| (sls_path.to_string(), host.clone(), outcome.status_for(host)))
        .collect();
    record_component_status(ctx, entity, &updates).await?;

    settle_run(ctx, entity, sls_path, &format!("sls-{sls_path}"), &outcome).await?;
    record_history(
        ctx,
        entity,
        HistoryLevel::Info,
        &format!("Applied {sls_path} to {} host(s)", outcome.num_hosts),
    )
    .await;
    Ok(())
}

/// Run a shell command and store each minion's output
pub async fn run_command(
    ctx: &SystemContext,
    entity: &EntityKey,
    command: &str,
    host_target: &Target,
) -> TaskResult<()> {
    let started_at = Utc::now();
    let result = ctx
        .salt
        .run(host_target, CMD_RUN, &[command.to_string()])
        .await?;

    let output: BTreeMap<String, String> = result
        .returns
        .into_iter()
        .map(|(host, host_return)| {
            let text = match host_return {
                HostReturn::Value(serde_json::Value::String(text)) => text,
                HostReturn::Value(other) => other.to_string(),
                HostReturn::Errors(errors) => errors.join("\n"),
                HostReturn::States(states) => {
                    serde_json::to_string(&states).unwrap_or_default()
                }
            };
            (host, text)
        })
        .collect();

    let hosts = output.len();
    ctx.store
        .save_command_result(CommandResult {
            entity: entity.clone(),
            command: command.to_string(),
            host_target: host_target.to_string(),
            output,
            started_at,
            finished_at: Utc::now(),
        })
        .await?;
    record_history(
        ctx,
        entity,
        HistoryLevel::Info,
        &format!("Ran '{command}' on {hosts} host(s)"),
    )
    .await;
    Ok(())
}

fn pairs(
    roles: &BTreeMap<String, Vec<String>>,
    status: ComponentStatus,
) -> Vec<(String, String, ComponentStatus)> {
    roles
        .iter()
        .flat_map(|(host, sls_paths)| {
            sls_paths
                .iter()
                .map(move |sls| (sls.clone(), host.clone(), status))
        })
        .collect()
}
