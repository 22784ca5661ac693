use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::EntityKey;
use crate::constants::system::TRUNCATION_SUFFIX;

/// Severity of a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryLevel {
    Info,
    Warning,
    Error,
}

impl HistoryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for HistoryLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(format!("Invalid history level: {other}")),
        }
    }
}

/// Human-readable, append-only log line attached to an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub entity: EntityKey,
    pub level: HistoryLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(entity: &EntityKey, level: HistoryLevel, message: &str, max_len: usize) -> Self {
        Self {
            entity: entity.clone(),
            level,
            message: bounded_message(message, max_len),
            created_at: Utc::now(),
        }
    }
}

/// Truncate `message` to at most `max_len` characters, marking the cut
pub fn bounded_message(message: &str, max_len: usize) -> String {
    if message.chars().count() <= max_len {
        return message.to_string();
    }
    let keep = max_len.saturating_sub(TRUNCATION_SUFFIX.chars().count());
    let mut bounded: String = message.chars().take(keep).collect();
    bounded.push_str(TRUNCATION_SUFFIX);
    bounded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_messages_untouched() {
        assert_eq!(bounded_message("launched 3 hosts", 64), "launched 3 hosts");
    }

    #[test]
    fn test_long_messages_truncated_to_bound() {
        let long = "x".repeat(500);
        let bounded = bounded_message(&long, 100);
        assert_eq!(bounded.chars().count(), 100);
        assert!(bounded.ends_with(TRUNCATION_SUFFIX));
    }
}
