//! # Resilience Module
//!
//! The two retry shapes every long-running operation relies on:
//!
//! - **[`auto_retry`]**: immediate, bounded re-invocation of a whole task when
//!   it fails with a retryable error. No backoff.
//! - **[`poll_until`]**: a bounded loop that re-queries external state on a
//!   fixed interval until it reports ready, a timeout elapses, or too many
//!   probes fail.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stackd_core::resilience::auto_retry;
//!
//! # async fn example() -> Result<(), String> {
//! let value = auto_retry("launch_hosts", 3, |_e: &String| true, |attempt| async move {
//!     if attempt < 2 { Err(format!("attempt {attempt} failed")) } else { Ok(attempt) }
//! })
//! .await?;
//! assert_eq!(value, 2);
//! # Ok(())
//! # }
//! ```

pub mod polling;
pub mod retry;

pub use polling::{poll_until, PollError, PollSettings, PollStatus};
pub use retry::auto_retry;
