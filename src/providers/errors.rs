use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("Security group not found: {0}")]
    GroupNotFound(String),

    #[error("Security group already exists: {0}")]
    GroupExists(String),

    #[error("Failed to delete security group: {0}")]
    DeleteGroupFailed(String),

    #[error("Security group rule not found: {0}")]
    RuleNotFound(String),

    #[error("Security group rule already exists: {0}")]
    RuleExists(String),

    #[error("Too many failed provider queries: {0}")]
    MaxFailures(String),

    #[error("Timed out waiting on provider: {0}")]
    Timeout(String),

    #[error("Unsupported action '{action}' for provider {provider}")]
    UnsupportedAction { provider: String, action: String },

    #[error("No driver registered for cloud account '{0}'")]
    UnknownAccount(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

impl DriverError {
    /// Waiting and API failures are worth another attempt; structural ones are not
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::MaxFailures(_) | Self::Timeout(_) | Self::Provider(_) | Self::DeleteGroupFailed(_)
        )
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(DriverError::Timeout("running".into()).is_retryable());
        assert!(DriverError::MaxFailures("ping".into()).is_retryable());
        assert!(!DriverError::GroupExists("sg".into()).is_retryable());
        assert!(!DriverError::UnknownAccount("aws".into()).is_retryable());
    }
}
