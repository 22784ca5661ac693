//! # System Constants
//!
//! Event names, salt function names and fixed markers shared across the
//! orchestration core.

// Re-export state types for convenience
pub use crate::models::health::{ComponentStatus, Health};
pub use crate::state_machine::{Action, Activity};

/// Lifecycle events published through [`crate::events::EventPublisher`]
pub mod events {
    pub const WORKFLOW_DISPATCHED: &str = "stack.workflow_dispatched";
    pub const WORKFLOW_COMPLETED: &str = "stack.workflow_completed";
    pub const WORKFLOW_FAILED: &str = "stack.workflow_failed";
    pub const TASK_STARTED: &str = "stack.task_started";
    pub const TASK_COMPLETED: &str = "stack.task_completed";
    pub const TASK_FAILED: &str = "stack.task_failed";
    pub const ACTIVITY_CHANGED: &str = "stack.activity_changed";
}

/// Salt execution module functions used by the task library
pub mod salt_functions {
    pub const TEST_PING: &str = "test.ping";
    pub const SYNC_ALL: &str = "saltutil.sync_all";
    pub const HIGHSTATE: &str = "state.highstate";
    pub const STATE_SLS: &str = "state.sls";
    pub const CMD_RUN: &str = "cmd.run";
    /// State that creates users and pushes their SSH keys
    pub const USERS_SLS: &str = "core.stackd_users";
}

pub mod system {
    /// Salt comment prefix for a state skipped because an upstream requisite failed
    pub const REQUISITE_FAILED_MARKER: &str = "One or more requisite failed";

    /// Appended to history messages that exceeded the configured bound
    pub const TRUNCATION_SUFFIX: &str = " ...[truncated]";

    /// Message recorded when a task fails with an error it does not classify
    pub const UNHANDLED_EXCEPTION_MESSAGE: &str = "Unhandled exception";
}
