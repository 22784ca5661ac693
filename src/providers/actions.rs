use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of per-host action hooks a driver may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostAction {
    Start,
    Stop,
    Terminate,
    Provision,
    Orchestrate,
    PropagateSsh,
    Custom,
}

impl HostAction {
    pub const ALL: [HostAction; 7] = [
        HostAction::Start,
        HostAction::Stop,
        HostAction::Terminate,
        HostAction::Provision,
        HostAction::Orchestrate,
        HostAction::PropagateSsh,
        HostAction::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Terminate => "terminate",
            Self::Provision => "provision",
            Self::Orchestrate => "orchestrate",
            Self::PropagateSsh => "propagate_ssh",
            Self::Custom => "custom",
        }
    }

    /// Machine state the provider reports once the action has settled
    pub fn settled_state(&self) -> Option<&'static str> {
        use crate::models::host_states;
        match self {
            Self::Start => Some(host_states::RUNNING),
            Self::Stop => Some(host_states::STOPPED),
            Self::Terminate => Some(host_states::TERMINATED),
            _ => None,
        }
    }
}

impl fmt::Display for HostAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| format!("Unknown host action: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_and_unknown() {
        assert_eq!("stop".parse::<HostAction>(), Ok(HostAction::Stop));
        assert_eq!("propagate-ssh".parse::<HostAction>(), Ok(HostAction::PropagateSsh));
        assert!("reboot".parse::<HostAction>().is_err());
    }
}
