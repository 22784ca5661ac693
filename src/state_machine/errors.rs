use thiserror::Error;

use super::events::Action;
use super::states::Activity;
use crate::models::EntityKind;
use crate::store::StoreError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    /// Requested intent is not legal from the entity's current activity
    #[error("{entity} may not perform action '{action}' while in state '{activity}'")]
    IllegalAction {
        entity: String,
        action: Action,
        activity: Activity,
    },

    #[error("Action '{action}' does not apply to {kind:?} entities")]
    NotApplicable { action: Action, kind: EntityKind },

    #[error("Guard condition failed: {0}")]
    GuardFailed(#[from] GuardError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardError {
    #[error("Dependencies not satisfied: {reason}")]
    DependenciesNotMet { reason: String },

    #[error("Business rule violation: {rule}")]
    BusinessRuleViolation { rule: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
pub type GuardResult<T> = Result<T, GuardError>;

pub fn dependencies_not_met(reason: impl Into<String>) -> GuardError {
    GuardError::DependenciesNotMet {
        reason: reason.into(),
    }
}

pub fn business_rule_violation(rule: impl Into<String>) -> GuardError {
    GuardError::BusinessRuleViolation { rule: rule.into() }
}
