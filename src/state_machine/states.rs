use serde::{Deserialize, Serialize};
use std::fmt;

/// Workflow phase of a stack or environment.
///
/// Exactly one value at a time. Only the activity state machine and the task
/// envelope mutate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Unknown,
    Queued,
    Launching,
    Provisioning,
    Orchestrating,
    Idle,
    Pausing,
    Paused,
    Resuming,
    Terminating,
    Terminated,
    Executing,
    Dead,
}

impl Activity {
    pub const ALL: [Activity; 13] = [
        Activity::Unknown,
        Activity::Queued,
        Activity::Launching,
        Activity::Provisioning,
        Activity::Orchestrating,
        Activity::Idle,
        Activity::Pausing,
        Activity::Paused,
        Activity::Resuming,
        Activity::Terminating,
        Activity::Terminated,
        Activity::Executing,
        Activity::Dead,
    ];

    /// Stable activities have no automatic outgoing transition
    pub fn is_stable(&self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Paused | Self::Terminated | Self::Dead
        )
    }

    /// A workflow chain is (or may be) running
    pub fn is_busy(&self) -> bool {
        !self.is_stable() && !matches!(self, Self::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Queued => "queued",
            Self::Launching => "launching",
            Self::Provisioning => "provisioning",
            Self::Orchestrating => "orchestrating",
            Self::Idle => "idle",
            Self::Pausing => "pausing",
            Self::Paused => "paused",
            Self::Resuming => "resuming",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
            Self::Executing => "executing",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Activity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Activity::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("Invalid activity: {s}"))
    }
}

/// New stacks start queued
impl Default for Activity {
    fn default() -> Self {
        Self::Queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_activities() {
        let stable: Vec<_> = Activity::ALL.iter().filter(|a| a.is_stable()).collect();
        assert_eq!(
            stable,
            vec![
                &Activity::Idle,
                &Activity::Paused,
                &Activity::Terminated,
                &Activity::Dead
            ]
        );
        assert!(Activity::Launching.is_busy());
        assert!(!Activity::Unknown.is_busy());
    }

    #[test]
    fn test_activity_string_conversion() {
        for activity in Activity::ALL {
            assert_eq!(activity.to_string().parse::<Activity>().unwrap(), activity);
        }
        assert!("sleeping".parse::<Activity>().is_err());
        assert_eq!(
            serde_json::to_string(&Activity::Orchestrating).unwrap(),
            "\"orchestrating\""
        );
    }
}
