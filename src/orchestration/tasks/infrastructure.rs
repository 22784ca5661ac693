//! Provider-facing tasks: launching, refreshing, tagging, DNS, host actions
//! and teardown. These only apply to stacks, whose hosts stackd launched.
//!
//! Work that spans cloud accounts fans out per account in a stable order and
//! stops at the first driver error; accounts after it are not touched.

use futures::future::try_join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{load_stack, record_history, selected_hosts};
use crate::models::stack::group_by_account;
use crate::models::{host_states, EntityKey, HistoryLevel, Host, SecurityGroupRef, Stack};
use crate::orchestration::errors::{TaskError, TaskResult};
use crate::orchestration::result_processor::write_error_log;
use crate::providers::{
    CloudDriver, DriverError, HostAction, HostLaunchResult, InstanceInfo, ProvisioningMap,
};
use crate::resilience::{poll_until, PollError, PollSettings, PollStatus};
use crate::salt::EntityFiles;
use crate::system_context::SystemContext;

/// Create instances for every host that has none, then wait for them to run.
///
/// Any per-host launch error terminates just the errored hosts and fails the
/// task with a retryable error, so the retry only relaunches what is missing.
pub async fn launch_hosts(ctx: &SystemContext, stack_id: i64, parallel: bool) -> TaskResult<()> {
    let stack = load_stack(ctx, stack_id).await?;
    let entity = stack.key();
    let hosts = ctx.store.list_hosts(stack_id).await?;
    let pending: Vec<Host> = hosts
        .iter()
        .filter(|host| !host.has_instance() || host.is_gone())
        .cloned()
        .collect();

    if pending.is_empty() {
        info!(stack_id, "All hosts already have instances");
        return Ok(());
    }

    let files = EntityFiles::for_stack(&ctx.config().orchestration.stack_root, &stack);
    let mut launched = Vec::new();
    let mut failed: BTreeMap<String, String> = BTreeMap::new();
    let mut maps = Vec::new();

    for (account, mut group) in group_by_account(&pending) {
        let driver = ctx.drivers.get(&account)?;
        ensure_security_groups(ctx, driver.as_ref(), &stack, &mut group).await?;

        let map = ProvisioningMap::for_account(&stack, &account, &group);
        maps.push(map.clone());
        files.write_yaml(&files.map_path(), &maps).await?;

        info!(stack_id, account = %account, hosts = group.len(), parallel, "🚀 Launching hosts");
        let results = driver.launch_map(&map, parallel).await?;

        let mut errored = Vec::new();
        for mut host in group {
            match results.get(&host.hostname) {
                Some(HostLaunchResult::Ok { instance_id }) => {
                    host.instance_id = instance_id.clone();
                    host.state = host_states::PENDING.to_string();
                    ctx.store.update_host(&host).await?;
                    launched.push(host);
                }
                Some(HostLaunchResult::Error { message }) => {
                    failed.insert(host.hostname.clone(), message.clone());
                    errored.push(host.hostname.clone());
                }
                None => {
                    failed.insert(host.hostname.clone(), "no launch result returned".to_string());
                    errored.push(host.hostname.clone());
                }
            }
        }

        if !errored.is_empty() {
            warn!(stack_id, account = %account, hosts = ?errored, "Terminating hosts that failed to launch");
            if let Err(err) = driver.destroy_map(&map.only(&errored), &errored).await {
                warn!(stack_id, error = %err, "Could not terminate failed hosts");
            }
        }
    }

    if !failed.is_empty() {
        let text: String = failed
            .iter()
            .map(|(host, message)| format!("{host}: {message}\n"))
            .collect();
        write_error_log(&files, "launch", &text).await?;
        ctx.health.invalidate(&entity).await;
        return Err(TaskError::LaunchFailure {
            failed_hosts: failed.keys().cloned().collect(),
            message: text,
        });
    }

    // per-account waits run concurrently
    let settings = PollSettings::state_wait(&ctx.config().polling);
    let waits = group_by_account(&launched)
        .into_iter()
        .map(|(account, group)| async move {
            let driver = ctx.drivers.get(&account)?;
            let instances = driver
                .wait_for_state(&group, host_states::RUNNING, settings)
                .await?;
            Ok::<_, DriverError>((group, instances))
        });
    for (group, instances) in try_join_all(waits).await? {
        for mut host in group {
            if let Some(info) = instances.iter().find(|i| i.instance_id == host.instance_id) {
                apply_instance_info(&mut host, info);
                ctx.store.update_host(&host).await?;
            }
        }
    }

    ctx.health.invalidate(&entity).await;
    record_history(
        ctx,
        &entity,
        HistoryLevel::Info,
        &format!("Launched {} host(s)", launched.len()),
    )
    .await;
    Ok(())
}

/// Look up or create the stack-managed security groups the hosts reference
async fn ensure_security_groups(
    ctx: &SystemContext,
    driver: &dyn CloudDriver,
    stack: &Stack,
    hosts: &mut [Host],
) -> TaskResult<()> {
    let missing: BTreeSet<String> = hosts
        .iter()
        .flat_map(|host| host.security_groups.iter())
        .filter(|group| group.managed && group.group_id.is_empty())
        .map(|group| group.name.clone())
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let names: Vec<String> = missing.iter().cloned().collect();
    let mut known: BTreeMap<String, SecurityGroupRef> = driver
        .get_security_groups(&names)
        .await?
        .into_iter()
        .map(|group| (group.name.clone(), group))
        .collect();

    for name in &missing {
        if known.contains_key(name) {
            continue;
        }
        let description = format!("stackd managed group for {}", stack.title);
        let group = match driver.create_security_group(name, &description).await {
            Ok(group) => group,
            // created concurrently or by an earlier attempt
            Err(DriverError::GroupExists(_)) => driver
                .get_security_groups(std::slice::from_ref(name))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| DriverError::GroupNotFound(name.clone()))?,
            Err(err) => return Err(err.into()),
        };
        debug!(stack_id = stack.id, group = %name, group_id = %group.group_id, "Security group ready");
        known.insert(name.clone(), group);
    }

    for host in hosts.iter_mut() {
        let mut changed = false;
        for group in host.security_groups.iter_mut() {
            if group.managed && group.group_id.is_empty() {
                if let Some(found) = known.get(&group.name) {
                    group.group_id = found.group_id.clone();
                    changed = true;
                }
            }
        }
        if changed {
            ctx.store.update_host(host).await?;
        }
    }
    Ok(())
}

fn apply_instance_info(host: &mut Host, info: &InstanceInfo) {
    host.state = info.state.clone();
    host.private_ip = info.private_ip.clone();
    host.public_ip = info.public_ip.clone();
    host.private_dns = info.private_dns.clone();
    host.public_dns = info.public_dns.clone();
    for volume in host.volumes.iter_mut() {
        if let Some(volume_id) = info.volumes.get(&volume.device) {
            volume.volume_id = Some(volume_id.clone());
        }
    }
}

/// Refresh host rows from the provider.
///
/// Hosts the provider no longer reports, or reports in a terminal state, are
/// marked absent; with `remove_absent` their rows are deleted as well.
pub async fn update_metadata(
    ctx: &SystemContext,
    stack_id: i64,
    host_ids: Option<&[i64]>,
    remove_absent: bool,
) -> TaskResult<()> {
    let entity = load_stack(ctx, stack_id).await?.key();
    let hosts = selected_hosts(ctx, stack_id, host_ids).await?;
    let mut absent = Vec::new();

    for (account, group) in group_by_account(&hosts) {
        let driver = ctx.drivers.get(&account)?;
        let with_instance: Vec<Host> = group.iter().filter(|h| h.has_instance()).cloned().collect();
        let instances = if with_instance.is_empty() {
            Vec::new()
        } else {
            driver.query_instances(&with_instance).await?
        };

        for mut host in group {
            let live = instances
                .iter()
                .find(|info| host.has_instance() && info.instance_id == host.instance_id)
                .filter(|info| !host_states::is_terminal(&info.state));
            match live {
                Some(info) => apply_instance_info(&mut host, info),
                None => {
                    host.mark_absent();
                    absent.push(host.id);
                }
            }
            ctx.store.update_host(&host).await?;
        }
    }

    if remove_absent && !absent.is_empty() {
        let removed = ctx.store.delete_hosts(stack_id, &absent).await?;
        info!(stack_id, removed, "Removed absent hosts");
    }
    ctx.health.invalidate(&entity).await;
    debug!(stack_id, hosts = hosts.len(), absent = absent.len(), "Host metadata refreshed");
    Ok(())
}

/// Hosts with live instances, grouped by account, each with its driver
fn live_groups(
    ctx: &SystemContext,
    hosts: &[Host],
) -> TaskResult<Vec<(String, Arc<dyn CloudDriver>, Vec<Host>)>> {
    let live: Vec<Host> = hosts
        .iter()
        .filter(|host| host.has_instance() && !host.is_gone())
        .cloned()
        .collect();
    group_by_account(&live)
        .into_iter()
        .map(|(account, group)| -> TaskResult<(String, Arc<dyn CloudDriver>, Vec<Host>)> {
            let driver = ctx.drivers.get(&account)?;
            Ok((account, driver, group))
        })
        .collect()
}

pub async fn tag_infrastructure(ctx: &SystemContext, stack_id: i64) -> TaskResult<()> {
    let stack = load_stack(ctx, stack_id).await?;
    let hosts = ctx.store.list_hosts(stack_id).await?;
    for (account, driver, group) in live_groups(ctx, &hosts)? {
        debug!(stack_id, account = %account, hosts = group.len(), "Tagging resources");
        driver.tag_resources(&stack, &group).await?;
    }
    Ok(())
}

pub async fn register_dns(ctx: &SystemContext, stack_id: i64) -> TaskResult<()> {
    load_stack(ctx, stack_id).await?;
    let hosts = ctx.store.list_hosts(stack_id).await?;
    for (account, driver, group) in live_groups(ctx, &hosts)? {
        debug!(stack_id, account = %account, hosts = group.len(), "Registering DNS");
        driver.register_dns(&group).await?;
    }
    Ok(())
}

pub async fn unregister_dns(ctx: &SystemContext, stack_id: i64, host_ids: Option<&[i64]>) -> TaskResult<()> {
    load_stack(ctx, stack_id).await?;
    let hosts = selected_hosts(ctx, stack_id, host_ids).await?;
    for (account, driver, group) in live_groups(ctx, &hosts)? {
        debug!(stack_id, account = %account, hosts = group.len(), "Unregistering DNS");
        driver.unregister_dns(&group).await?;
    }
    Ok(())
}

pub async fn register_volume_delete(
    ctx: &SystemContext,
    stack_id: i64,
    host_ids: Option<&[i64]>,
) -> TaskResult<()> {
    load_stack(ctx, stack_id).await?;
    let hosts = selected_hosts(ctx, stack_id, host_ids).await?;
    for (account, driver, group) in live_groups(ctx, &hosts)? {
        debug!(stack_id, account = %account, hosts = group.len(), "Registering volumes for delete");
        driver.register_volumes_for_delete(&group).await?;
    }
    Ok(())
}

/// Run a driver action hook on every live host and wait for the state it
/// settles in
pub async fn host_action(ctx: &SystemContext, stack_id: i64, action: HostAction) -> TaskResult<()> {
    let entity = load_stack(ctx, stack_id).await?.key();
    let hosts = ctx.store.list_hosts(stack_id).await?;
    let settings = PollSettings::state_wait(&ctx.config().polling);

    for (account, _, group) in live_groups(ctx, &hosts)? {
        let driver = ctx.drivers.require(&account, action)?;
        info!(stack_id, account = %account, action = %action, hosts = group.len(), "⚙️ Running host action");
        driver.execute_action(action, &group).await?;

        if let Some(state) = action.settled_state() {
            let instances = driver.wait_for_state(&group, state, settings).await?;
            for mut host in group {
                if let Some(info) = instances.iter().find(|i| i.instance_id == host.instance_id) {
                    apply_instance_info(&mut host, info);
                } else {
                    host.state = state.to_string();
                }
                ctx.store.update_host(&host).await?;
            }
        }
    }

    ctx.health.invalidate(&entity).await;
    record_history(ctx, &entity, HistoryLevel::Info, &format!("Host action '{action}' completed")).await;
    Ok(())
}

/// Terminate instances, wait for the provider to confirm, then remove the
/// stack-managed security groups no remaining host references.
///
/// With `delete_rows` the host rows go too; otherwise they stay as
/// terminated records that a later launch can reuse.
pub async fn destroy_hosts(
    ctx: &SystemContext,
    stack_id: i64,
    host_ids: Option<&[i64]>,
    delete_rows: bool,
) -> TaskResult<()> {
    let stack = load_stack(ctx, stack_id).await?;
    let entity = stack.key();
    let all_hosts = ctx.store.list_hosts(stack_id).await?;
    let targets = selected_hosts(ctx, stack_id, host_ids).await?;
    let target_ids: BTreeSet<i64> = targets.iter().map(|host| host.id).collect();
    let settings = PollSettings::termination_wait(&ctx.config().polling);

    let still_referenced: BTreeSet<String> = all_hosts
        .iter()
        .filter(|host| !target_ids.contains(&host.id))
        .flat_map(|host| host.security_groups.iter().map(|group| group.group_id.clone()))
        .collect();

    for (account, group) in group_by_account(&targets) {
        let driver = ctx.drivers.require(&account, HostAction::Terminate)?;
        let live: Vec<Host> = group
            .iter()
            .filter(|host| host.has_instance() && !host.is_gone())
            .cloned()
            .collect();

        if !live.is_empty() {
            let map = ProvisioningMap::for_account(&stack, &account, &live);
            let names: Vec<String> = live.iter().map(|host| host.hostname.clone()).collect();
            info!(stack_id, account = %account, hosts = names.len(), "💣 Destroying hosts");
            let results = driver.destroy_map(&map, &names).await?;
            let errors: Vec<String> = results
                .iter()
                .filter_map(|(host, result)| match result {
                    HostLaunchResult::Error { message } => Some(format!("{host}: {message}")),
                    HostLaunchResult::Ok { .. } => None,
                })
                .collect();
            if !errors.is_empty() {
                return Err(DriverError::Provider(errors.join("; ")).into());
            }
            driver
                .wait_for_state(&live, host_states::TERMINATED, settings)
                .await?;
        }

        let managed: BTreeSet<String> = group
            .iter()
            .flat_map(|host| host.security_groups.iter())
            .filter(|g| g.managed && !g.group_id.is_empty())
            .map(|g| g.group_id.clone())
            .filter(|group_id| !still_referenced.contains(group_id))
            .collect();
        for group_id in managed {
            delete_managed_group(driver.as_ref(), &group_id, settings).await?;
        }
    }

    let ids: Vec<i64> = target_ids.into_iter().collect();
    if delete_rows {
        let removed = ctx.store.delete_hosts(stack_id, &ids).await?;
        info!(stack_id, removed, "Host rows deleted");
    } else {
        for mut host in targets.iter().cloned() {
            host.mark_absent();
            host.state = host_states::TERMINATED.to_string();
            ctx.store.update_host(&host).await?;
        }
    }

    ctx.health.invalidate(&entity).await;
    record_history(
        ctx,
        &entity,
        HistoryLevel::Info,
        &format!("Destroyed {} host(s)", ids.len()),
    )
    .await;
    Ok(())
}

/// Wait until no instance references the group, then delete it.
/// A group that is already gone counts as deleted.
async fn delete_managed_group(
    driver: &dyn CloudDriver,
    group_id: &str,
    settings: PollSettings,
) -> TaskResult<()> {
    let name = format!("security group {group_id} to be released");
    poll_until(&name, settings, move |_| async move {
        match driver.get_instances_for_group(group_id).await {
            Ok(instances) if instances.is_empty() => PollStatus::Ready(()),
            Ok(_) => PollStatus::Pending,
            Err(DriverError::GroupNotFound(_)) => PollStatus::Ready(()),
            Err(err) => PollStatus::Failed(err),
        }
    })
    .await
    .map_err(|err| match err {
        PollError::Timeout { name, .. } => DriverError::Timeout(name),
        PollError::MaxFailures { name, last_error, .. } => {
            DriverError::MaxFailures(format!("{name}: {last_error}"))
        }
    })?;

    match driver.delete_security_group(group_id).await {
        Ok(()) => {
            debug!(group_id, "Security group deleted");
            Ok(())
        }
        Err(DriverError::GroupNotFound(_)) => {
            debug!(group_id, "Security group already gone");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Delete the stack row and its on-disk state. Refuses while hosts remain.
pub async fn destroy_stack(ctx: &SystemContext, stack_id: i64) -> TaskResult<()> {
    let stack = load_stack(ctx, stack_id).await?;
    let entity = EntityKey::Stack(stack_id);
    let remaining = ctx.store.list_hosts(stack_id).await?.len();
    if remaining > 0 {
        return Err(TaskError::HasHostsAttached {
            stack_id,
            count: remaining,
        });
    }

    let files = EntityFiles::for_stack(&ctx.config().orchestration.stack_root, &stack);
    match tokio::fs::remove_dir_all(files.root()).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }

    ctx.store.delete_stack(stack_id).await?;
    ctx.health.invalidate(&entity).await;
    info!(stack_id, title = %stack.title, "🗑️ Stack deleted");
    let _ = ctx
        .event_publisher
        .publish_for(
            crate::constants::events::WORKFLOW_COMPLETED,
            &entity,
            serde_json::json!({ "deleted": true }),
        )
        .await;
    Ok(())
}
