use serde::{Deserialize, Serialize};
use std::fmt;

use super::states::Activity;
use crate::models::EntityKind;

/// Intents a caller may request against a stack or environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Launch,
    Terminate,
    Pause,
    Resume,
    Provision,
    Orchestrate,
    PropagateSsh,
    SingleSls,
    Custom,
    DestroyHosts,
    DestroyStack,
}

impl Action {
    pub const ALL: [Action; 11] = [
        Action::Launch,
        Action::Terminate,
        Action::Pause,
        Action::Resume,
        Action::Provision,
        Action::Orchestrate,
        Action::PropagateSsh,
        Action::SingleSls,
        Action::Custom,
        Action::DestroyHosts,
        Action::DestroyStack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Launch => "launch",
            Self::Terminate => "terminate",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Provision => "provision",
            Self::Orchestrate => "orchestrate",
            Self::PropagateSsh => "propagate-ssh",
            Self::SingleSls => "single-sls",
            Self::Custom => "custom",
            Self::DestroyHosts => "destroy-hosts",
            Self::DestroyStack => "destroy-stack",
        }
    }

    /// Activities from which this intent may be requested
    pub fn legal_sources(&self) -> &'static [Activity] {
        match self {
            Self::Launch => &[Activity::Idle, Activity::Terminated, Activity::Dead],
            Self::Terminate => &[Activity::Idle, Activity::Paused],
            Self::Resume => &[Activity::Paused],
            Self::DestroyStack => &[
                Activity::Idle,
                Activity::Paused,
                Activity::Terminated,
                Activity::Dead,
            ],
            Self::Pause
            | Self::Provision
            | Self::Orchestrate
            | Self::PropagateSsh
            | Self::SingleSls
            | Self::Custom
            | Self::DestroyHosts => &[Activity::Idle],
        }
    }

    /// Activity written synchronously when the intent is accepted
    pub fn starting_activity(&self) -> Activity {
        match self {
            Self::Terminate | Self::DestroyStack => Activity::Terminating,
            Self::Pause => Activity::Pausing,
            Self::Resume => Activity::Resuming,
            Self::Custom => Activity::Executing,
            _ => Activity::Queued,
        }
    }

    /// Environments group externally launched hosts, so only the salt-driven
    /// intents apply to them
    pub fn applies_to(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Stack => true,
            EntityKind::Environment => matches!(
                self,
                Self::Provision
                    | Self::Orchestrate
                    | Self::PropagateSsh
                    | Self::SingleSls
                    | Self::Custom
            ),
        }
    }

    pub fn is_legal_from(&self, activity: Activity) -> bool {
        self.legal_sources().contains(&activity)
    }
}

/// Intents that may be requested for an entity of `kind` in `activity`
pub fn available_actions(kind: EntityKind, activity: Activity) -> Vec<Action> {
    Action::ALL
        .iter()
        .copied()
        .filter(|a| a.applies_to(kind) && a.is_legal_from(activity))
        .collect()
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('_', "-");
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == normalized)
            .ok_or_else(|| format!("Invalid action: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_allows_the_full_set() {
        let actions = available_actions(EntityKind::Stack, Activity::Idle);
        for action in [
            Action::Launch,
            Action::Terminate,
            Action::Pause,
            Action::PropagateSsh,
            Action::Provision,
            Action::Orchestrate,
            Action::SingleSls,
        ] {
            assert!(actions.contains(&action), "{action} should be legal from idle");
        }
        assert!(!actions.contains(&Action::Resume));
    }

    // destroy-stack is legal from every resting activity
    #[test]
    fn test_paused_allows_resume_terminate_and_teardown() {
        let actions = available_actions(EntityKind::Stack, Activity::Paused);
        assert_eq!(
            actions,
            vec![Action::Terminate, Action::Resume, Action::DestroyStack]
        );
    }

    #[test]
    fn test_terminated_and_dead_allow_launch_and_teardown() {
        for activity in [Activity::Terminated, Activity::Dead] {
            let actions = available_actions(EntityKind::Stack, activity);
            assert_eq!(actions, vec![Action::Launch, Action::DestroyStack]);
        }
    }

    #[test]
    fn test_busy_activities_allow_nothing() {
        for activity in [
            Activity::Queued,
            Activity::Launching,
            Activity::Provisioning,
            Activity::Orchestrating,
            Activity::Terminating,
            Activity::Executing,
        ] {
            assert!(available_actions(EntityKind::Stack, activity).is_empty());
        }
    }

    #[test]
    fn test_environment_actions() {
        let actions = available_actions(EntityKind::Environment, Activity::Idle);
        assert!(!actions.contains(&Action::Launch));
        assert!(actions.contains(&Action::Orchestrate));
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("propagate_ssh".parse::<Action>().unwrap(), Action::PropagateSsh);
        assert_eq!("single-sls".parse::<Action>().unwrap(), Action::SingleSls);
        assert!("explode".parse::<Action>().is_err());
    }
}
