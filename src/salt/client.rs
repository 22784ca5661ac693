use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SaltError {
    #[error("Salt master unavailable: {0}")]
    Unavailable(String),

    #[error("Salt call failed: {0}")]
    CallFailed(String),

    #[error("Unexpected salt response: {0}")]
    InvalidResponse(String),
}

/// Minion selection for a salt call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tgt_type", content = "tgt", rename_all = "snake_case")]
pub enum Target {
    List(Vec<String>),
    Compound(String),
    Glob(String),
}

impl Target {
    /// Whether a minion id is selected. Compound expressions cannot be
    /// evaluated locally and select everything.
    pub fn matches(&self, host: &str) -> bool {
        match self {
            Self::List(hosts) => hosts.iter().any(|h| h == host),
            Self::Glob(pattern) => glob_matches(pattern, host),
            Self::Compound(_) => true,
        }
    }
}

/// Shell-style matching with `*` and `?`
fn glob_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    backtrack = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List(hosts) => write!(f, "{}", hosts.join(",")),
            Self::Compound(expr) | Self::Glob(expr) => f.write_str(expr),
        }
    }
}

/// Outcome of a single state application on a minion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateResult {
    pub result: bool,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub name: String,
}

/// What one minion returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostReturn {
    /// State runs: state id -> result
    States(BTreeMap<String, StateResult>),
    /// Rendering or compile errors come back as a list of messages
    Errors(Vec<String>),
    /// Execution modules (`test.ping`, `cmd.run`, ...)
    Value(serde_json::Value),
}

/// Raw result of a host-targeted run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SaltRunResult {
    /// Minion id -> return; minions that never answered are absent
    pub returns: BTreeMap<String, HostReturn>,
    /// Minions the target expression matched
    pub expected: Vec<String>,
}

/// One stage of an orchestrate run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub result: bool,
    #[serde(default)]
    pub comment: String,
    /// Per-minion returns of the stage's state run
    #[serde(default)]
    pub hosts: BTreeMap<String, HostReturn>,
}

/// Raw result of an orchestrate run: stage (sls path) -> outcome
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrchestrateRunResult {
    pub stages: BTreeMap<String, StageResult>,
}

#[async_trait]
pub trait SaltClient: Send + Sync + fmt::Debug {
    async fn run(
        &self,
        target: &Target,
        function: &str,
        args: &[String],
    ) -> Result<SaltRunResult, SaltError>;

    async fn orchestrate(
        &self,
        stage_file: &Path,
        pillar_env: &str,
    ) -> Result<OrchestrateRunResult, SaltError>;

    /// Grain value per matching minion
    async fn grains(
        &self,
        target: &Target,
        grain: &str,
    ) -> Result<BTreeMap<String, serde_json::Value>, SaltError>;
}
