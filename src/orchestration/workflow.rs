//! # Workflow Composer
//!
//! Pure mapping from `(entity, intent, options)` to the ordered task chain
//! that carries the intent out. Nothing here touches the store; legality and
//! guards are checked by the coordinator before a composed workflow is
//! submitted.
//!
//! Every workflow is a list of tasks plus, for all intents except
//! `destroy-stack`, a closing `finish` link that settles the entity in its
//! resting activity.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tasks::{TaskKind, TaskSpec};
use crate::config::OrchestrationConfig;
use crate::models::{EntityKey, EntityKind};
use crate::providers::HostAction;
use crate::salt::Target;
use crate::state_machine::{Action, Activity};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompositionError {
    #[error("Action '{action}' does not apply to {kind:?} entities")]
    NotApplicable { action: Action, kind: EntityKind },

    #[error("Action '{action}' requires {argument}")]
    MissingArgument {
        action: Action,
        argument: &'static str,
    },
}

/// One component to re-apply, optionally narrowed to some hosts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentTarget {
    pub sls_path: String,
    #[serde(default)]
    pub host_target: Option<Target>,
}

impl ComponentTarget {
    pub fn new(sls_path: impl Into<String>) -> Self {
        Self {
            sls_path: sls_path.into(),
            host_target: None,
        }
    }

    pub fn on(mut self, host_target: Target) -> Self {
        self.host_target = Some(host_target);
        self
    }
}

/// Optional structured arguments of an intent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentOptions {
    /// Attempt ceiling for retryable tasks; configuration default otherwise
    pub max_attempts: Option<u32>,
    /// Run stack orchestration as part of LAUNCH
    pub provision: Option<bool>,
    /// Launch hosts in parallel
    pub parallel: Option<bool>,
    /// SINGLE_SLS targets
    pub components: Vec<ComponentTarget>,
    /// DESTROY_HOSTS subset
    pub host_ids: Vec<i64>,
    /// CUSTOM shell command
    pub command: Option<String>,
    /// CUSTOM host target; the whole entity when absent
    pub host_target: Option<Target>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub action: Action,
    pub tasks: Vec<TaskSpec>,
    pub finish: Option<TaskSpec>,
}

impl Workflow {
    /// Names of the work tasks, without the closing `finish`
    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(TaskSpec::name).collect()
    }

    /// Every link of the chain in execution order
    pub fn links(&self) -> impl Iterator<Item = &TaskSpec> {
        self.tasks.iter().chain(self.finish.iter())
    }

    pub fn len(&self) -> usize {
        self.tasks.len() + usize::from(self.finish.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowComposer {
    config: OrchestrationConfig,
}

impl WorkflowComposer {
    pub fn new(config: OrchestrationConfig) -> Self {
        Self { config }
    }

    pub fn compose(
        &self,
        entity: &EntityKey,
        action: Action,
        options: &IntentOptions,
    ) -> Result<Workflow, CompositionError> {
        if !action.applies_to(entity.kind()) {
            return Err(CompositionError::NotApplicable {
                action,
                kind: entity.kind(),
            });
        }

        let attempts = options
            .max_attempts
            .unwrap_or(self.config.default_max_attempts)
            .max(1);
        let task = |kind: TaskKind| TaskSpec::new(kind, attempts);
        let finish = |activity: Activity| Some(TaskSpec::once(TaskKind::Finish { activity }));
        let is_stack = matches!(entity, EntityKey::Stack(_));

        let (tasks, finish) = match action {
            Action::Launch => {
                let parallel = options.parallel.unwrap_or(self.config.parallel_launch);
                let provision = options.provision.unwrap_or(self.config.provision_on_launch);
                let mut tasks = vec![
                    task(TaskKind::LaunchHosts { parallel }),
                    task(TaskKind::UpdateMetadata {
                        host_ids: None,
                        remove_absent: true,
                    }),
                    task(TaskKind::TagInfrastructure),
                    task(TaskKind::RegisterDns),
                    task(TaskKind::Ping),
                    task(TaskKind::SyncAll),
                    task(TaskKind::Highstate),
                    task(TaskKind::GlobalOrchestrate),
                ];
                if provision {
                    tasks.push(task(TaskKind::Orchestrate));
                }
                (tasks, finish(Activity::Idle))
            }
            Action::Terminate => (
                teardown(&task, None, false),
                finish(Activity::Terminated),
            ),
            Action::DestroyStack => {
                let mut tasks = teardown(&task, None, true);
                tasks.push(TaskSpec::once(TaskKind::DestroyStack));
                (tasks, None)
            }
            Action::DestroyHosts => {
                if options.host_ids.is_empty() {
                    return Err(CompositionError::MissingArgument {
                        action,
                        argument: "host ids",
                    });
                }
                (
                    teardown(&task, Some(options.host_ids.clone()), true),
                    finish(Activity::Idle),
                )
            }
            Action::Provision | Action::Orchestrate => {
                let mut tasks = vec![task(TaskKind::SyncAll)];
                if action == Action::Provision {
                    tasks.push(task(TaskKind::Highstate));
                }
                if is_stack {
                    tasks.push(task(TaskKind::GlobalOrchestrate));
                }
                tasks.push(task(TaskKind::Orchestrate));
                (tasks, finish(Activity::Idle))
            }
            Action::Pause => (
                vec![
                    task(TaskKind::UnregisterDns { host_ids: None }).in_phase(Activity::Pausing),
                    task(TaskKind::HostAction {
                        action: HostAction::Stop,
                    }),
                ],
                finish(Activity::Paused),
            ),
            Action::Resume => (
                vec![
                    task(TaskKind::HostAction {
                        action: HostAction::Start,
                    }),
                    task(TaskKind::UpdateMetadata {
                        host_ids: None,
                        remove_absent: false,
                    })
                    .in_phase(Activity::Resuming),
                    task(TaskKind::RegisterDns).in_phase(Activity::Resuming),
                    task(TaskKind::Ping),
                    task(TaskKind::SyncAll),
                    task(TaskKind::Highstate),
                    task(TaskKind::Orchestrate),
                ],
                finish(Activity::Idle),
            ),
            Action::PropagateSsh => (vec![task(TaskKind::PropagateSsh)], finish(Activity::Idle)),
            Action::SingleSls => {
                if options.components.is_empty() {
                    return Err(CompositionError::MissingArgument {
                        action,
                        argument: "at least one component",
                    });
                }
                let tasks = options
                    .components
                    .iter()
                    .map(|component| {
                        task(TaskKind::SingleSls {
                            sls_path: component.sls_path.clone(),
                            target: component.host_target.clone(),
                        })
                    })
                    .collect();
                (tasks, finish(Activity::Idle))
            }
            Action::Custom => {
                let command = options
                    .command
                    .as_deref()
                    .map(str::trim)
                    .filter(|command| !command.is_empty())
                    .ok_or(CompositionError::MissingArgument {
                        action,
                        argument: "a command",
                    })?;
                let target = options
                    .host_target
                    .clone()
                    .unwrap_or_else(|| Target::Compound(entity.salt_target()));
                (
                    vec![TaskSpec::once(TaskKind::RunCommand {
                        command: command.to_string(),
                        target,
                    })],
                    finish(Activity::Idle),
                )
            }
        };

        Ok(Workflow {
            action,
            tasks,
            finish,
        })
    }
}

/// Refresh, release volumes and DNS, then destroy the selected hosts. Every
/// step runs while the entity shows `terminating`.
fn teardown(
    task: &impl Fn(TaskKind) -> TaskSpec,
    host_ids: Option<Vec<i64>>,
    delete_rows: bool,
) -> Vec<TaskSpec> {
    vec![
        task(TaskKind::UpdateMetadata {
            host_ids: host_ids.clone(),
            remove_absent: false,
        })
        .in_phase(Activity::Terminating),
        task(TaskKind::RegisterVolumeDelete {
            host_ids: host_ids.clone(),
        }),
        task(TaskKind::UnregisterDns {
            host_ids: host_ids.clone(),
        }),
        task(TaskKind::DestroyHosts {
            host_ids,
            delete_rows,
        }),
    ]
}
