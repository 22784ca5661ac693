//! # Run Result Classification
//!
//! Reduces raw salt returns to compact succeeded/failed/cancelled sets for
//! status rollups, and renders the detailed error text that goes to the
//! entity's append-only error log.
//!
//! A state failure whose comment carries the requisite-failed marker is a
//! cascade of some upstream failure. A host (or stage) whose only failures
//! are cascades is **cancelled**, not failed, so one root failure is counted
//! once. A run is `failed` iff anything outside the cancelled set failed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::constants::system::REQUISITE_FAILED_MARKER;
use crate::error::Result;
use crate::models::ComponentStatus;
use crate::salt::{EntityFiles, HostReturn, OrchestrateRunResult, SaltRunResult};

/// Compact outcome of a host-targeted run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunOutcome {
    pub failed: bool,
    pub succeeded_hosts: BTreeSet<String>,
    pub failed_hosts: BTreeSet<String>,
    pub cancelled_hosts: BTreeSet<String>,
    pub num_hosts: usize,
    /// Failure text per host, for the error log
    pub errors: BTreeMap<String, Vec<String>>,
}

impl RunOutcome {
    /// Component status implied for every component applied on `host`
    pub fn status_for(&self, host: &str) -> ComponentStatus {
        if self.failed_hosts.contains(host) {
            ComponentStatus::Failed
        } else if self.cancelled_hosts.contains(host) {
            ComponentStatus::Cancelled
        } else if self.succeeded_hosts.contains(host) {
            ComponentStatus::Succeeded
        } else {
            ComponentStatus::Unknown
        }
    }

    pub fn render_errors(&self) -> String {
        render(&self.errors)
    }
}

/// Compact outcome of an orchestrate run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrchestrateOutcome {
    pub failed: bool,
    pub succeeded_sls: BTreeSet<String>,
    pub failed_sls: BTreeSet<String>,
    pub cancelled_sls: BTreeSet<String>,
    /// Per-minion classification within each stage that reported minions
    pub host_status: BTreeMap<(String, String), ComponentStatus>,
    /// Failure text per stage, for the error log
    pub errors: BTreeMap<String, Vec<String>>,
}

impl OrchestrateOutcome {
    /// Status of `sls_path` on `host`; stages that never reported per-minion
    /// results apply their stage-level outcome to every host
    pub fn status_for(&self, sls_path: &str, host: &str) -> ComponentStatus {
        if let Some(status) = self
            .host_status
            .get(&(sls_path.to_string(), host.to_string()))
        {
            return *status;
        }
        if self.failed_sls.contains(sls_path) {
            ComponentStatus::Failed
        } else if self.cancelled_sls.contains(sls_path) {
            ComponentStatus::Cancelled
        } else if self.succeeded_sls.contains(sls_path) {
            ComponentStatus::Succeeded
        } else {
            ComponentStatus::Unknown
        }
    }

    pub fn render_errors(&self) -> String {
        render(&self.errors)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostClass {
    Succeeded,
    Failed,
    Cancelled,
}

fn is_cascade(comment: &str) -> bool {
    comment.contains(REQUISITE_FAILED_MARKER)
}

/// Classify one minion's return, collecting failure text
fn classify_host(host_return: &HostReturn) -> (HostClass, Vec<String>) {
    match host_return {
        HostReturn::States(states) => {
            let failures: Vec<_> = states
                .iter()
                .filter(|(_, state)| !state.result)
                .collect();
            if failures.is_empty() {
                return (HostClass::Succeeded, Vec::new());
            }
            let messages = failures
                .iter()
                .map(|(id, state)| format!("{id}: {}", state.comment))
                .collect();
            if failures.iter().all(|(_, state)| is_cascade(&state.comment)) {
                (HostClass::Cancelled, messages)
            } else {
                (HostClass::Failed, messages)
            }
        }
        HostReturn::Errors(errors) => (HostClass::Failed, errors.clone()),
        HostReturn::Value(serde_json::Value::Bool(false)) => {
            (HostClass::Failed, vec!["returned false".to_string()])
        }
        HostReturn::Value(_) => (HostClass::Succeeded, Vec::new()),
    }
}

/// Classify a host-targeted run (`state.highstate`, `state.sls`, `test.ping`, ...).
///
/// Matched minions that never answered count as failed.
pub fn classify_run(result: &SaltRunResult) -> RunOutcome {
    let mut outcome = RunOutcome::default();

    for (host, host_return) in &result.returns {
        let (class, messages) = classify_host(host_return);
        match class {
            HostClass::Succeeded => {
                outcome.succeeded_hosts.insert(host.clone());
            }
            HostClass::Failed => {
                outcome.failed_hosts.insert(host.clone());
            }
            HostClass::Cancelled => {
                outcome.cancelled_hosts.insert(host.clone());
            }
        }
        if !messages.is_empty() {
            outcome.errors.insert(host.clone(), messages);
        }
    }

    for host in &result.expected {
        if !result.returns.contains_key(host) {
            outcome.failed_hosts.insert(host.clone());
            outcome
                .errors
                .insert(host.clone(), vec!["Minion did not return".to_string()]);
        }
    }

    outcome.num_hosts =
        outcome.succeeded_hosts.len() + outcome.failed_hosts.len() + outcome.cancelled_hosts.len();
    outcome.failed = !outcome.failed_hosts.is_empty();
    debug!(
        num_hosts = outcome.num_hosts,
        failed = outcome.failed_hosts.len(),
        cancelled = outcome.cancelled_hosts.len(),
        "Classified salt run"
    );
    outcome
}

/// Classify an orchestrate run stage by stage
pub fn classify_orchestrate(result: &OrchestrateRunResult) -> OrchestrateOutcome {
    let mut outcome = OrchestrateOutcome::default();

    for (sls_path, stage) in &result.stages {
        let mut messages = Vec::new();
        let mut any_real_failure = false;
        let mut any_cascade = false;
        for (host, host_return) in &stage.hosts {
            let (class, host_messages) = classify_host(host_return);
            let status = match class {
                HostClass::Succeeded => ComponentStatus::Succeeded,
                HostClass::Failed => {
                    any_real_failure = true;
                    ComponentStatus::Failed
                }
                HostClass::Cancelled => {
                    any_cascade = true;
                    ComponentStatus::Cancelled
                }
            };
            outcome
                .host_status
                .insert((sls_path.clone(), host.clone()), status);
            messages.extend(host_messages.into_iter().map(|m| format!("{host}: {m}")));
        }

        if stage.result {
            outcome.succeeded_sls.insert(sls_path.clone());
        } else if !any_real_failure && (any_cascade || is_cascade(&stage.comment)) {
            outcome.cancelled_sls.insert(sls_path.clone());
        } else {
            outcome.failed_sls.insert(sls_path.clone());
        }

        if !stage.result && !stage.comment.is_empty() {
            messages.insert(0, stage.comment.clone());
        }
        if !messages.is_empty() {
            outcome.errors.insert(sls_path.clone(), messages);
        }
    }

    outcome.failed = !outcome.failed_sls.is_empty();
    debug!(
        succeeded = outcome.succeeded_sls.len(),
        failed = outcome.failed_sls.len(),
        cancelled = outcome.cancelled_sls.len(),
        "Classified orchestrate run"
    );
    outcome
}

fn render(errors: &BTreeMap<String, Vec<String>>) -> String {
    let mut text = String::new();
    for (key, messages) in errors {
        text.push_str(&format!("== {key} ==\n"));
        for message in messages {
            text.push_str(message);
            text.push('\n');
        }
    }
    text
}

/// Write rendered error text to a fresh `<kind>.<timestamp>.err` log.
///
/// Returns the log path, or `None` when there was nothing to write.
pub async fn write_error_log(files: &EntityFiles, kind: &str, text: &str) -> Result<Option<PathBuf>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let path = files.new_error_log(kind);
    files.append_error_log(&path, text).await?;
    warn!(log = %path.display(), kind, "📝 Run errors written to log");
    Ok(Some(path))
}
