use std::sync::Arc;
use tracing::{debug, info};

use super::errors::{StateMachineError, StateMachineResult};
use super::events::Action;
use super::states::Activity;
use crate::constants::events;
use crate::events::EventPublisher;
use crate::models::EntityKey;
use crate::store::{ActivitySwap, StackStore};

/// Activity transitions for stacks and environments.
///
/// The activity column is the only mutual-exclusion token: an intent is
/// accepted by atomically swapping a legal source activity for the intent's
/// starting activity, so two concurrent requests can never both pass.
#[derive(Clone)]
pub struct ActivityStateMachine {
    store: Arc<dyn StackStore>,
    event_publisher: EventPublisher,
}

impl ActivityStateMachine {
    pub fn new(store: Arc<dyn StackStore>, event_publisher: EventPublisher) -> Self {
        Self {
            store,
            event_publisher,
        }
    }

    pub async fn current_activity(&self, entity: &EntityKey) -> StateMachineResult<Activity> {
        Ok(self.store.activity(entity).await?)
    }

    /// Legality of `action` from `activity`, without touching the store
    pub fn check_legal(
        entity: &EntityKey,
        action: Action,
        activity: Activity,
    ) -> StateMachineResult<()> {
        if !action.applies_to(entity.kind()) {
            return Err(StateMachineError::NotApplicable {
                action,
                kind: entity.kind(),
            });
        }
        if !action.is_legal_from(activity) {
            return Err(StateMachineError::IllegalAction {
                entity: entity.to_string(),
                action,
                activity,
            });
        }
        Ok(())
    }

    /// Read the current activity and fail if `action` is not legal from it
    pub async fn ensure_legal(&self, entity: &EntityKey, action: Action) -> StateMachineResult<Activity> {
        let activity = self.current_activity(entity).await?;
        Self::check_legal(entity, action, activity)?;
        Ok(activity)
    }

    /// Accept an intent: swap a legal source activity for the intent's
    /// starting activity in one atomic step. Returns the previous activity.
    pub async fn begin(&self, entity: &EntityKey, action: Action) -> StateMachineResult<Activity> {
        if !action.applies_to(entity.kind()) {
            return Err(StateMachineError::NotApplicable {
                action,
                kind: entity.kind(),
            });
        }

        let starting = action.starting_activity();
        match self
            .store
            .compare_and_set_activity(entity, action.legal_sources(), starting)
            .await?
        {
            ActivitySwap::Swapped { previous } => {
                info!(
                    entity = %entity,
                    action = %action,
                    from = %previous,
                    to = %starting,
                    "🚦 Intent accepted"
                );
                self.publish_change(entity, previous, starting).await;
                Ok(previous)
            }
            ActivitySwap::Rejected { current } => Err(StateMachineError::IllegalAction {
                entity: entity.to_string(),
                action,
                activity: current,
            }),
        }
    }

    /// Move to `activity` unconditionally (task progress and settling)
    pub async fn transition(&self, entity: &EntityKey, activity: Activity) -> StateMachineResult<()> {
        let previous = self.current_activity(entity).await?;
        if previous == activity {
            return Ok(());
        }
        self.store.set_activity(entity, activity).await?;
        debug!(entity = %entity, from = %previous, to = %activity, "Activity changed");
        self.publish_change(entity, previous, activity).await;
        Ok(())
    }

    async fn publish_change(&self, entity: &EntityKey, from: Activity, to: Activity) {
        let _ = self
            .event_publisher
            .publish_for(
                events::ACTIVITY_CHANGED,
                entity,
                serde_json::json!({ "from": from, "to": to }),
            )
            .await;
    }
}

impl std::fmt::Debug for ActivityStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityStateMachine")
            .field("store", &self.store)
            .finish()
    }
}
