//! # Orchestration Errors
//!
//! Task-level failures raised by the task library and consumed by the task
//! envelope, the retry wrapper and the coordinator.
//!
//! - **Retryable** failures (launch errors, failed state runs, provider
//!   hiccups, unreachable hosts) are re-attempted by [`crate::resilience::auto_retry`].
//! - **Expected** failures carry a message meant for the entity's history log.
//!   Anything else is recorded as an unhandled exception.

use thiserror::Error;

use crate::models::EntityKey;
use crate::providers::DriverError;
use crate::salt::SaltError;
use crate::state_machine::{GuardError, StateMachineError};
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    #[error("{0} not found")]
    EntityNotFound(EntityKey),

    /// One or more hosts failed to launch; the errored hosts were terminated
    #[error("Failed to launch hosts: {}", failed_hosts.join(", "))]
    LaunchFailure {
        failed_hosts: Vec<String>,
        message: String,
    },

    /// A configuration run left real (non-cascading) failures behind
    #[error("{phase} failed on: {}", failed.join(", "))]
    StateFailures { phase: String, failed: Vec<String> },

    #[error("Hosts did not become reachable: {}", hosts.join(", "))]
    HostsUnreachable { hosts: Vec<String> },

    #[error("Cloud provider error: {0}")]
    Provider(#[from] DriverError),

    #[error("Salt error: {0}")]
    Salt(String),

    #[error("Stack {stack_id} still has {count} host(s) attached")]
    HasHostsAttached { stack_id: i64, count: usize },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    #[error("I/O error: {0}")]
    Io(String),
}

impl TaskError {
    /// Whether another attempt of the same task could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LaunchFailure { .. }
            | Self::StateFailures { .. }
            | Self::HostsUnreachable { .. } => true,
            Self::Provider(err) => err.is_retryable(),
            Self::Salt(_) => true,
            Self::EntityNotFound(_)
            | Self::HasHostsAttached { .. }
            | Self::Validation(_)
            | Self::Store(_)
            | Self::StateMachine(_)
            | Self::Io(_) => false,
        }
    }

    /// Domain failures whose message is fit for the entity's history log
    pub fn is_expected(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::StateMachine(_) | Self::Io(_))
    }

    pub fn state_failures(phase: impl Into<String>, failed: impl IntoIterator<Item = String>) -> Self {
        Self::StateFailures {
            phase: phase.into(),
            failed: failed.into_iter().collect(),
        }
    }
}

impl From<SaltError> for TaskError {
    fn from(err: SaltError) -> Self {
        Self::Salt(err.to_string())
    }
}

impl From<GuardError> for TaskError {
    fn from(err: GuardError) -> Self {
        Self::StateMachine(StateMachineError::GuardFailed(err))
    }
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<crate::error::StackdError> for TaskError {
    fn from(err: crate::error::StackdError) -> Self {
        Self::Io(err.to_string())
    }
}

pub type TaskResult<T> = Result<T, TaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(TaskError::LaunchFailure {
            failed_hosts: vec!["web-1".into()],
            message: "quota".into()
        }
        .is_retryable());
        assert!(TaskError::state_failures("highstate", vec!["web-1".to_string()]).is_retryable());
        assert!(TaskError::Provider(DriverError::Timeout("running".into())).is_retryable());
        assert!(!TaskError::Provider(DriverError::GroupExists("sg".into())).is_retryable());
        assert!(!TaskError::HasHostsAttached { stack_id: 1, count: 2 }.is_retryable());
        assert!(!TaskError::EntityNotFound(EntityKey::Stack(9)).is_retryable());
    }

    #[test]
    fn test_expected_classification() {
        assert!(TaskError::HasHostsAttached { stack_id: 1, count: 2 }.is_expected());
        assert!(!TaskError::Store(StoreError::Backend("pool closed".into())).is_expected());
        assert!(!TaskError::Io("disk full".into()).is_expected());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            TaskError::HasHostsAttached { stack_id: 4, count: 2 }.to_string(),
            "Stack 4 still has 2 host(s) attached"
        );
        assert_eq!(
            TaskError::state_failures("Orchestration", vec!["db".to_string(), "web".to_string()])
                .to_string(),
            "Orchestration failed on: db, web"
        );
    }
}
