//! Error types for the stackd orchestration core.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StackdError {
    #[error("Store error: {0}")]
    StoreError(String),
    #[error("State transition error: {0}")]
    StateTransitionError(String),
    #[error("Orchestration error: {0}")]
    OrchestrationError(String),
    #[error("Event error: {0}")]
    EventError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Salt error: {0}")]
    SaltError(String),
    #[error("Cache error: {0}")]
    CacheError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StackdError {
    /// Errors that were rejected synchronously, before anything was dispatched
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_) | Self::StateTransitionError(_) | Self::NotFound(_)
        )
    }
}

impl From<serde_json::Error> for StackdError {
    fn from(error: serde_json::Error) -> Self {
        StackdError::ValidationError(format!("JSON serialization error: {error}"))
    }
}

impl From<serde_yaml::Error> for StackdError {
    fn from(error: serde_yaml::Error) -> Self {
        StackdError::ValidationError(format!("YAML serialization error: {error}"))
    }
}

impl From<std::io::Error> for StackdError {
    fn from(error: std::io::Error) -> Self {
        StackdError::Internal(format!("I/O error: {error}"))
    }
}

impl From<crate::config::ConfigurationError> for StackdError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        StackdError::ConfigurationError(error.to_string())
    }
}

impl From<crate::store::StoreError> for StackdError {
    fn from(error: crate::store::StoreError) -> Self {
        match error {
            crate::store::StoreError::NotFound(what) => StackdError::NotFound(what),
            other => StackdError::StoreError(other.to_string()),
        }
    }
}

impl From<crate::state_machine::StateMachineError> for StackdError {
    fn from(error: crate::state_machine::StateMachineError) -> Self {
        StackdError::StateTransitionError(error.to_string())
    }
}

impl From<crate::providers::DriverError> for StackdError {
    fn from(error: crate::providers::DriverError) -> Self {
        StackdError::ProviderError(error.to_string())
    }
}

impl From<crate::salt::SaltError> for StackdError {
    fn from(error: crate::salt::SaltError) -> Self {
        StackdError::SaltError(error.to_string())
    }
}

impl From<crate::cache::CacheError> for StackdError {
    fn from(error: crate::cache::CacheError) -> Self {
        StackdError::CacheError(error.to_string())
    }
}

impl From<crate::orchestration::TaskError> for StackdError {
    fn from(error: crate::orchestration::TaskError) -> Self {
        use crate::orchestration::TaskError;
        match error {
            TaskError::EntityNotFound(entity) => StackdError::NotFound(entity.to_string()),
            TaskError::Validation(message) => StackdError::ValidationError(message),
            TaskError::Store(err) => err.into(),
            TaskError::StateMachine(err) => err.into(),
            TaskError::Provider(err) => err.into(),
            other => StackdError::OrchestrationError(other.to_string()),
        }
    }
}

impl From<crate::orchestration::CoordinatorError> for StackdError {
    fn from(error: crate::orchestration::CoordinatorError) -> Self {
        use crate::orchestration::CoordinatorError;
        match error {
            CoordinatorError::Rejected(err) => err.into(),
            CoordinatorError::Composition(err) => StackdError::ValidationError(err.to_string()),
            CoordinatorError::Store(err) => err.into(),
            CoordinatorError::Task(err) => err.into(),
            CoordinatorError::Executor(err) => StackdError::OrchestrationError(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StackdError>;
