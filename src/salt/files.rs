//! On-disk salt state for an entity.
//!
//! ```text
//! <stack_root>/<id>-<slug>/
//!   stack.map                         provisioning map
//!   stack.pillar                      pillar from stack properties
//!   orchestrate.sls                   stack-scoped stage graph
//!   global_orchestrate-<account>.sls  account-scoped stage graph
//!   logs/<kind>.<timestamp>.err       append-only error logs
//! ```
//!
//! Files are regenerated right before every run that reads them.

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::{Result, StackdError};
use crate::models::{Environment, Stack};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFiles {
    root: PathBuf,
}

impl EntityFiles {
    pub fn for_stack(stack_root: &Path, stack: &Stack) -> Self {
        Self {
            root: stack_root.join(format!("{}-{}", stack.id, stack.slug)),
        }
    }

    pub fn for_environment(environment_root: &Path, environment: &Environment) -> Self {
        Self {
            root: environment_root.join(&environment.name),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn map_path(&self) -> PathBuf {
        self.root.join("stack.map")
    }

    pub fn pillar_path(&self) -> PathBuf {
        self.root.join("stack.pillar")
    }

    pub fn orchestrate_path(&self) -> PathBuf {
        self.root.join("orchestrate.sls")
    }

    pub fn global_orchestrate_path(&self, account: &str) -> PathBuf {
        self.root.join(format!("global_orchestrate-{account}.sls"))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Serialize `value` as YAML into `path`, replacing previous content
    pub async fn write_yaml<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let yaml = serde_yaml::to_string(value)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, yaml).await?;
        Ok(())
    }

    /// Start a new error log for one run of `kind` (e.g. `orchestrate`)
    pub fn new_error_log(&self, kind: &str) -> PathBuf {
        self.logs_dir().join(format!(
            "{kind}.{}.err",
            Utc::now().format("%Y%m%dT%H%M%S%.3f")
        ))
    }

    /// Append text to an error log, creating it if needed
    pub async fn append_error_log(&self, log_path: &Path, text: &str) -> Result<()> {
        let logs_dir = self.logs_dir();
        if !log_path.starts_with(&logs_dir) {
            return Err(StackdError::SaltError(format!(
                "Error log {} is outside {}",
                log_path.display(),
                logs_dir.display()
            )));
        }
        tokio::fs::create_dir_all(&logs_dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        if !text.ends_with('\n') {
            file.write_all(b"\n").await?;
        }
        file.flush().await?;
        Ok(())
    }
}
