//! # Health and Component Status
//!
//! Two independent severity-ordered enumerations and their aggregation rules.
//!
//! - [`Health`]: `unhealthy > unstable > unknown > healthy`
//! - [`ComponentStatus`]: `failed > cancelled > running > unknown > queued > succeeded`
//!
//! Aggregating an empty collection yields `unknown` for both: absence of data
//! is never treated as healthy.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Raised when a raw value is outside its enumeration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind} value: {value}")]
pub struct InvalidValueError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Unstable,
    Unhealthy,
    Unknown,
}

impl Health {
    pub const ALL: [Health; 4] = [
        Health::Healthy,
        Health::Unstable,
        Health::Unhealthy,
        Health::Unknown,
    ];

    /// Severity rank, higher is worse
    pub fn severity(self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Unknown => 1,
            Self::Unstable => 2,
            Self::Unhealthy => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unstable => "unstable",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        }
    }

    /// Most severe value present, `unknown` when empty
    pub fn aggregate<I>(values: I) -> Health
    where
        I: IntoIterator<Item = Health>,
    {
        values
            .into_iter()
            .max_by_key(|h| h.severity())
            .unwrap_or(Health::Unknown)
    }

    /// Aggregate raw values, failing on the first one outside the enumeration
    pub fn aggregate_raw<S: AsRef<str>>(values: &[S]) -> Result<Health, InvalidValueError> {
        let parsed = values
            .iter()
            .map(|v| v.as_ref().parse::<Health>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::aggregate(parsed))
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Health {
    type Err = InvalidValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(Self::Healthy),
            "unstable" => Ok(Self::Unstable),
            "unhealthy" => Ok(Self::Unhealthy),
            "unknown" => Ok(Self::Unknown),
            _ => Err(InvalidValueError {
                kind: "health",
                value: s.to_string(),
            }),
        }
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Status of a single component run on a single host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Unknown,
}

impl ComponentStatus {
    pub const ALL: [ComponentStatus; 6] = [
        ComponentStatus::Queued,
        ComponentStatus::Running,
        ComponentStatus::Succeeded,
        ComponentStatus::Failed,
        ComponentStatus::Cancelled,
        ComponentStatus::Unknown,
    ];

    /// Severity rank, higher is worse
    pub fn severity(self) -> u8 {
        match self {
            Self::Succeeded => 0,
            Self::Queued => 1,
            Self::Unknown => 2,
            Self::Running => 3,
            Self::Cancelled => 4,
            Self::Failed => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// Health implied by this status.
    ///
    /// `None` means the status carries no health information and the previous
    /// health value must be kept.
    pub fn implied_health(self) -> Option<Health> {
        match self {
            Self::Queued | Self::Cancelled => None,
            Self::Running => Some(Health::Unstable),
            Self::Succeeded => Some(Health::Healthy),
            Self::Failed => Some(Health::Unhealthy),
            Self::Unknown => Some(Health::Unknown),
        }
    }

    /// Health after moving to this status from a record with `previous` health
    pub fn next_health(self, previous: Option<Health>) -> Health {
        self.implied_health()
            .or(previous)
            .unwrap_or(Health::Unknown)
    }

    /// Most severe value present, `unknown` when empty
    pub fn aggregate<I>(values: I) -> ComponentStatus
    where
        I: IntoIterator<Item = ComponentStatus>,
    {
        values
            .into_iter()
            .max_by_key(|s| s.severity())
            .unwrap_or(ComponentStatus::Unknown)
    }

    /// Aggregate raw values, failing on the first one outside the enumeration
    pub fn aggregate_raw<S: AsRef<str>>(
        values: &[S],
    ) -> Result<ComponentStatus, InvalidValueError> {
        let parsed = values
            .iter()
            .map(|v| v.as_ref().parse::<ComponentStatus>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::aggregate(parsed))
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ComponentStatus {
    type Err = InvalidValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "unknown" => Ok(Self::Unknown),
            _ => Err(InvalidValueError {
                kind: "component status",
                value: s.to_string(),
            }),
        }
    }
}

impl Default for ComponentStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_aggregate_picks_most_severe() {
        assert_eq!(
            Health::aggregate([Health::Healthy, Health::Unknown, Health::Unstable]),
            Health::Unstable
        );
        assert_eq!(
            Health::aggregate([Health::Healthy, Health::Unhealthy, Health::Unstable]),
            Health::Unhealthy
        );
        assert_eq!(
            Health::aggregate([Health::Healthy, Health::Healthy]),
            Health::Healthy
        );
        assert_eq!(
            Health::aggregate([Health::Healthy, Health::Unknown]),
            Health::Unknown
        );
    }

    #[test]
    fn test_empty_aggregates_are_unknown() {
        assert_eq!(Health::aggregate(Vec::new()), Health::Unknown);
        assert_eq!(ComponentStatus::aggregate(Vec::new()), ComponentStatus::Unknown);
    }

    #[test]
    fn test_status_aggregate_order() {
        use ComponentStatus::*;
        assert_eq!(ComponentStatus::aggregate([Succeeded, Queued]), Queued);
        assert_eq!(ComponentStatus::aggregate([Queued, Unknown]), Unknown);
        assert_eq!(ComponentStatus::aggregate([Unknown, Running]), Running);
        assert_eq!(ComponentStatus::aggregate([Running, Cancelled]), Cancelled);
        assert_eq!(ComponentStatus::aggregate([Cancelled, Failed, Succeeded]), Failed);
    }

    #[test]
    fn test_raw_aggregate_rejects_invalid_values() {
        let err = Health::aggregate_raw(&["healthy", "sick"]).unwrap_err();
        assert_eq!(err.value, "sick");

        assert!(ComponentStatus::aggregate_raw(&["running", "exploded"]).is_err());
        assert_eq!(
            ComponentStatus::aggregate_raw(&["running", "failed"]).unwrap(),
            ComponentStatus::Failed
        );
    }

    #[test]
    fn test_status_health_mapping_carries_previous() {
        use ComponentStatus::*;
        assert_eq!(Queued.next_health(Some(Health::Healthy)), Health::Healthy);
        assert_eq!(Cancelled.next_health(Some(Health::Unhealthy)), Health::Unhealthy);
        assert_eq!(Cancelled.next_health(None), Health::Unknown);
        assert_eq!(Running.next_health(Some(Health::Healthy)), Health::Unstable);
        assert_eq!(Succeeded.next_health(None), Health::Healthy);
        assert_eq!(Failed.next_health(Some(Health::Healthy)), Health::Unhealthy);
        assert_eq!(Unknown.next_health(Some(Health::Healthy)), Health::Unknown);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&ComponentStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
        let h: Health = serde_json::from_str("\"unstable\"").unwrap();
        assert_eq!(h, Health::Unstable);
    }
}
