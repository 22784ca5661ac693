//! Individual tasks run through the task envelope, outside of any chain.

mod common;

use common::{TestHarness, ACCOUNT};
use stackd_core::models::{
    CloudAccount, ComponentMetadata, ComponentStatus, EntityKey, FormulaComponent, Health,
    HistoryLevel,
};
use stackd_core::orchestration::{run_task, TaskError, TaskKind, TaskSpec};
use stackd_core::salt::Target;
use stackd_core::state_machine::Activity;
use stackd_core::store::StackStore;

#[tokio::test]
async fn test_destroy_stack_refuses_while_hosts_attached() {
    let harness = TestHarness::new();
    harness.seed_running_stack(1, &["web-1", "web-2"]).await;
    let entity = EntityKey::Stack(1);

    let err = run_task(
        &harness.context,
        &entity,
        &TaskSpec::once(TaskKind::DestroyStack),
        true,
    )
    .await
    .unwrap_err();

    assert_eq!(
        err,
        TaskError::HasHostsAttached {
            stack_id: 1,
            count: 2
        }
    );
    assert!(!err.is_retryable());
    assert!(harness.store.get_stack(1).await.unwrap().is_some());
    assert_eq!(harness.store.activity(&entity).await.unwrap(), Activity::Idle);

    let history = harness.store.history(&entity).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.level, HistoryLevel::Error);
    assert_eq!(last.message, "Stack 1 still has 2 host(s) attached");
}

#[tokio::test]
async fn test_missing_entity_fails_without_retry() {
    let harness = TestHarness::new();
    let err = run_task(
        &harness.context,
        &EntityKey::Stack(404),
        &TaskSpec::new(TaskKind::TagInfrastructure, 3),
        false,
    )
    .await
    .unwrap_err();
    assert_eq!(err, TaskError::EntityNotFound(EntityKey::Stack(404)));
}

#[tokio::test]
async fn test_intermediate_task_leaves_entity_queued() {
    let harness = TestHarness::new();
    harness.seed_running_stack(2, &["web-1"]).await;
    let entity = EntityKey::Stack(2);

    run_task(&harness.context, &entity, &TaskSpec::new(TaskKind::RegisterDns, 3), false)
        .await
        .unwrap();

    assert_eq!(harness.store.activity(&entity).await.unwrap(), Activity::Queued);
    assert_eq!(harness.driver.call_count("register_dns"), 1);
}

#[tokio::test]
async fn test_metadata_round_trip_tracks_latest_record() {
    let harness = TestHarness::new();
    harness.seed_running_stack(3, &["web-1"]).await;
    let entity = EntityKey::Stack(3);

    let mut previous: Option<ComponentMetadata> = None;
    for status in [
        ComponentStatus::Running,
        ComponentStatus::Succeeded,
        ComponentStatus::Failed,
    ] {
        let record = ComponentMetadata::next(previous.as_ref(), &entity, "common", "web-1", status);
        let stored = harness
            .store
            .append_component_metadata(vec![record])
            .await
            .unwrap();
        previous = stored.into_iter().next();
    }

    let history = harness.store.component_history(&entity).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.windows(2).all(|pair| pair[0].id < pair[1].id));

    // earlier records stay in history with the health they were written with
    let recorded: Vec<(ComponentStatus, Health)> = history
        .iter()
        .map(|record| (record.status, record.health))
        .collect();
    assert_eq!(
        recorded,
        vec![
            (ComponentStatus::Running, Health::Unstable),
            (ComponentStatus::Succeeded, Health::Healthy),
            (ComponentStatus::Failed, Health::Unhealthy),
        ]
    );

    let common = harness
        .context
        .health
        .component(&entity, "common")
        .await
        .unwrap()
        .expect("component view");
    assert_eq!(common.status(), ComponentStatus::Failed);
    assert_eq!(common.health(), Health::Unhealthy);
}

#[tokio::test]
async fn test_cascaded_stage_is_cancelled_not_failed() {
    let harness = TestHarness::new();
    harness.seed_running_stack(4, &["web-1"]).await;
    harness.salt.cascade_sls("web");
    let entity = EntityKey::Stack(4);

    run_task(&harness.context, &entity, &TaskSpec::new(TaskKind::Orchestrate, 1), true)
        .await
        .expect("cascades alone do not fail orchestration");

    let web = harness
        .context
        .health
        .component(&entity, "web")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(web.status(), ComponentStatus::Cancelled);
    // cancelled keeps the health of the running record before it
    assert_eq!(web.health(), Health::Unstable);

    let common = harness
        .context
        .health
        .component(&entity, "common")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(common.status(), ComponentStatus::Succeeded);
}

#[tokio::test]
async fn test_highstate_failure_writes_error_log() {
    let harness = TestHarness::new();
    let stack = harness.seed_running_stack(5, &["web-1", "web-2"]).await;
    harness.salt.fail_host("web-2");
    let entity = EntityKey::Stack(5);

    let err = run_task(&harness.context, &entity, &TaskSpec::new(TaskKind::Highstate, 2), false)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TaskError::StateFailures {
            phase: "Highstate".to_string(),
            failed: vec!["web-2".to_string()],
        }
    );
    // retried once, then gave up
    assert_eq!(harness.salt.functions(), vec!["state.highstate"; 2]);

    let logs = harness
        .state_dir
        .path()
        .join("stacks")
        .join(format!("{}-{}", stack.id, stack.slug))
        .join("logs");
    let entries: Vec<_> = std::fs::read_dir(&logs)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(entries.iter().any(|name| name.starts_with("highstate")));

    let health = harness.context.health.entity_health(&entity).await.unwrap();
    assert_eq!(health.hosts["web-1"], Health::Healthy);
    assert_eq!(health.hosts["web-2"], Health::Unhealthy);
    assert_eq!(health.health, Health::Unhealthy);
}

#[tokio::test]
async fn test_global_orchestrate_runs_account_components() {
    let harness = TestHarness::new();
    let mut account = CloudAccount::new(ACCOUNT, "mock");
    account.formula_components = vec![
        FormulaComponent::new("monitoring.agent", 0),
        FormulaComponent::new("monitoring.dashboards", 1),
    ];
    harness.store.insert_cloud_account(account);
    harness.seed_running_stack(6, &["web-1"]).await;
    let entity = EntityKey::Stack(6);

    run_task(&harness.context, &entity, &TaskSpec::new(TaskKind::GlobalOrchestrate, 1), false)
        .await
        .unwrap();

    let orchestrations = harness.salt.orchestrations();
    assert_eq!(orchestrations.len(), 1);
    let document = std::fs::read_to_string(&orchestrations[0]).unwrap();
    assert!(document.contains("G@cloud_account:aws-test and G@roles:monitoring.agent"));
    assert!(document.contains("monitoring.dashboards"));
}

#[tokio::test]
async fn test_global_orchestrate_is_noop_for_environments() {
    let harness = TestHarness::new();
    harness.seed_environment("qa");
    let entity = EntityKey::Environment("qa".to_string());

    run_task(&harness.context, &entity, &TaskSpec::new(TaskKind::GlobalOrchestrate, 1), false)
        .await
        .unwrap();
    assert!(harness.salt.orchestrations().is_empty());
}

#[tokio::test]
async fn test_single_sls_without_matching_host_is_invalid() {
    let harness = TestHarness::new();
    harness.seed_running_stack(7, &["web-1"]).await;
    let entity = EntityKey::Stack(7);

    let spec = TaskSpec::new(
        TaskKind::SingleSls {
            sls_path: "web".to_string(),
            target: Some(Target::Glob("db-*".to_string())),
        },
        3,
    );
    let err = run_task(&harness.context, &entity, &spec, true).await.unwrap_err();
    assert!(matches!(err, TaskError::Validation(_)));
    assert!(harness.salt.calls().is_empty());
}

#[tokio::test]
async fn test_environment_hosts_come_from_roles_grain() {
    let harness = TestHarness::new();
    harness.seed_environment("staging");
    let entity = EntityKey::Environment("staging".to_string());

    let spec = TaskSpec::new(
        TaskKind::SingleSls {
            sls_path: "web".to_string(),
            target: None,
        },
        1,
    );
    run_task(&harness.context, &entity, &spec, true).await.unwrap();

    // only env-a carries `web`
    let calls = harness.salt.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].target, Target::List(vec!["env-a".to_string()]));
    assert_eq!(calls[0].args, vec!["web".to_string()]);
}

#[tokio::test]
async fn test_metadata_refresh_drops_cached_health() {
    use stackd_core::models::host_states;

    let harness = TestHarness::new();
    harness.seed_running_stack(8, &["web-1", "web-2"]).await;
    let entity = EntityKey::Stack(8);

    let before = harness.context.health.entity_health(&entity).await.unwrap();
    assert_eq!(before.hosts["web-2"], Health::Unknown);

    // terminated behind stackd's back
    harness
        .driver
        .seed_instance("web-2", "i-seed-8-1", host_states::TERMINATED);
    let still_cached = harness.context.health.entity_health(&entity).await.unwrap();
    assert_eq!(still_cached.hosts["web-2"], Health::Unknown);

    let spec = TaskSpec::new(
        TaskKind::UpdateMetadata {
            host_ids: None,
            remove_absent: false,
        },
        1,
    );
    run_task(&harness.context, &entity, &spec, false).await.unwrap();

    let after = harness.context.health.entity_health(&entity).await.unwrap();
    assert_eq!(after.hosts["web-1"], Health::Unknown);
    assert_eq!(after.hosts["web-2"], Health::Unhealthy);
    assert_eq!(after.health, Health::Unhealthy);
}
