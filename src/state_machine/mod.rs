//! # Entity Activity State Machine
//!
//! Which intents are legal from which activity, the activity each accepted
//! intent starts in, and the atomic swap that makes acceptance exclusive.

pub mod activity_state_machine;
pub mod errors;
pub mod events;
pub mod guards;
pub mod states;

pub use activity_state_machine::ActivityStateMachine;
pub use errors::{GuardError, StateMachineError, StateMachineResult};
pub use events::{available_actions, Action};
pub use guards::StateGuard;
pub use states::Activity;
