//! # Configuration-Management Execution
//!
//! The [`SaltClient`] trait is the boundary to the salt master. It returns raw
//! per-host and per-stage results; classifying them into succeeded, failed
//! and cancelled sets is the job of
//! [`crate::orchestration::result_processor`].

pub mod client;
pub mod files;

pub use client::{
    HostReturn, OrchestrateRunResult, SaltClient, SaltError, SaltRunResult, StageResult,
    StateResult, Target,
};
pub use files::EntityFiles;
