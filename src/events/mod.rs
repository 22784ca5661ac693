//! # Lifecycle Events
//!
//! In-process broadcast of workflow and task lifecycle events. Subscribers are
//! optional; publishing never fails because nobody is listening.

pub mod publisher;

pub use publisher::{EventPublisher, PublishError, PublishedEvent};
