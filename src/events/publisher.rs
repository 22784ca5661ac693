use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::models::EntityKey;

/// Broadcast publisher for workflow lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone, Serialize)]
pub struct PublishedEvent {
    pub name: String,
    pub entity: Option<EntityKey>,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event with the given name and context
    pub async fn publish(
        &self,
        event_name: impl Into<String>,
        context: Value,
    ) -> Result<(), PublishError> {
        self.send(PublishedEvent {
            name: event_name.into(),
            entity: None,
            context,
            published_at: chrono::Utc::now(),
        })
    }

    /// Publish an event about a specific stack or environment
    pub async fn publish_for(
        &self,
        event_name: impl Into<String>,
        entity: &EntityKey,
        context: impl Serialize,
    ) -> Result<(), PublishError> {
        self.send(PublishedEvent {
            name: event_name.into(),
            entity: Some(entity.clone()),
            context: serde_json::to_value(context)?,
            published_at: chrono::Utc::now(),
        })
    }

    fn send(&self, event: PublishedEvent) -> Result<(), PublishError> {
        // send() only fails when there are no receivers, which is fine here
        match self.sender.send(event) {
            Ok(_) | Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Error types for event publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Event channel is closed")]
    ChannelClosed,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}
