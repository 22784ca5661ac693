//! Salt client double. Every targeted minion succeeds unless told otherwise;
//! orchestrate runs read the generated stage file to learn their stages.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use stackd_core::constants::system::REQUISITE_FAILED_MARKER;
use stackd_core::salt::{
    HostReturn, OrchestrateRunResult, SaltClient, SaltError, SaltRunResult, StageResult,
    StateResult, Target,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SaltCall {
    pub target: Target,
    pub function: String,
    pub args: Vec<String>,
}

#[derive(Debug, Default)]
struct SaltState {
    calls: Vec<SaltCall>,
    orchestrations: Vec<PathBuf>,
    /// Minions answering compound targets, with their `roles` grain
    minions: BTreeMap<String, Vec<String>>,
    failing_hosts: BTreeSet<String>,
    silent_hosts: BTreeSet<String>,
    failing_sls: BTreeSet<String>,
    /// Stages skipped because an upstream stage failed
    cascaded_sls: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct MockSalt {
    state: Mutex<SaltState>,
}

impl MockSalt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_minion(&self, minion: &str, roles: &[&str]) {
        self.state.lock().minions.insert(
            minion.to_string(),
            roles.iter().map(|role| role.to_string()).collect(),
        );
    }

    /// State runs on `host` report a real failure
    pub fn fail_host(&self, host: &str) {
        self.state.lock().failing_hosts.insert(host.to_string());
    }

    /// `host` never answers
    pub fn silence_host(&self, host: &str) {
        self.state.lock().silent_hosts.insert(host.to_string());
    }

    pub fn fail_sls(&self, sls: &str) {
        self.state.lock().failing_sls.insert(sls.to_string());
    }

    pub fn cascade_sls(&self, sls: &str) {
        self.state.lock().cascaded_sls.insert(sls.to_string());
    }

    pub fn calls(&self) -> Vec<SaltCall> {
        self.state.lock().calls.clone()
    }

    pub fn functions(&self) -> Vec<String> {
        self.state.lock().calls.iter().map(|c| c.function.clone()).collect()
    }

    pub fn orchestrations(&self) -> Vec<PathBuf> {
        self.state.lock().orchestrations.clone()
    }

    fn targeted(state: &SaltState, target: &Target) -> Vec<String> {
        match target {
            Target::List(hosts) => hosts.clone(),
            Target::Glob(_) | Target::Compound(_) => state
                .minions
                .keys()
                .filter(|minion| target.matches(minion))
                .cloned()
                .collect(),
        }
    }
}

fn states(result: bool, comment: &str) -> HostReturn {
    let mut states = BTreeMap::new();
    states.insert(
        "stackd_|-state_|-state_|-run".to_string(),
        StateResult {
            result,
            comment: comment.to_string(),
            name: "state".to_string(),
        },
    );
    HostReturn::States(states)
}

#[async_trait]
impl SaltClient for MockSalt {
    async fn run(
        &self,
        target: &Target,
        function: &str,
        args: &[String],
    ) -> Result<SaltRunResult, SaltError> {
        let mut guard = self.state.lock();
        guard.calls.push(SaltCall {
            target: target.clone(),
            function: function.to_string(),
            args: args.to_vec(),
        });

        let expected = Self::targeted(&guard, target);
        let returns = expected
            .iter()
            .filter(|host| !guard.silent_hosts.contains(*host))
            .map(|host| {
                let failing = guard.failing_hosts.contains(host);
                let value = match function {
                    "test.ping" => HostReturn::Value(serde_json::json!(true)),
                    "cmd.run" => HostReturn::Value(serde_json::json!(format!(
                        "{} on {host}",
                        args.join(" ")
                    ))),
                    _ if failing => states(false, "Pkg install failed"),
                    _ => states(true, "Applied"),
                };
                (host.clone(), value)
            })
            .collect();

        Ok(SaltRunResult { returns, expected })
    }

    async fn orchestrate(
        &self,
        stage_file: &Path,
        _pillar_env: &str,
    ) -> Result<OrchestrateRunResult, SaltError> {
        let text = std::fs::read_to_string(stage_file)
            .map_err(|e| SaltError::CallFailed(format!("{}: {e}", stage_file.display())))?;
        let document: serde_yaml::Mapping = serde_yaml::from_str(&text)
            .map_err(|e| SaltError::InvalidResponse(e.to_string()))?;

        let mut guard = self.state.lock();
        guard.orchestrations.push(stage_file.to_path_buf());

        let stages = document
            .keys()
            .filter_map(|key| key.as_str().map(str::to_string))
            .map(|sls| {
                let stage = if guard.failing_sls.contains(&sls) {
                    StageResult {
                        result: false,
                        comment: "Run failed on minions".to_string(),
                        hosts: BTreeMap::new(),
                    }
                } else if guard.cascaded_sls.contains(&sls) {
                    StageResult {
                        result: false,
                        comment: REQUISITE_FAILED_MARKER.to_string(),
                        hosts: BTreeMap::new(),
                    }
                } else {
                    StageResult {
                        result: true,
                        comment: String::new(),
                        hosts: BTreeMap::new(),
                    }
                };
                (sls, stage)
            })
            .collect();

        Ok(OrchestrateRunResult { stages })
    }

    async fn grains(
        &self,
        target: &Target,
        grain: &str,
    ) -> Result<BTreeMap<String, serde_json::Value>, SaltError> {
        let guard = self.state.lock();
        Ok(Self::targeted(&guard, target)
            .into_iter()
            .map(|minion| {
                let value = match grain {
                    "roles" => serde_json::json!(guard.minions.get(&minion).cloned().unwrap_or_default()),
                    _ => serde_json::Value::Null,
                };
                (minion, value)
            })
            .collect())
    }
}
