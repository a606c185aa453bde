//! Post-provisioning bootstrap collaborators.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::ProvisionError;
use crate::request::CreationRequest;

/// A reachable instance handed to bootstrap.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapTarget {
    /// The creation request.
    pub request: CreationRequest,
    pub subid: String,
    /// Assigned public address.
    pub ssh_host: String,
    pub ssh_username: Option<String>,
    /// Explicit or provider-assigned password.
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

/// Options shared by every bootstrap call of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapOptions {
    /// Upper bound for the whole bootstrap step.
    pub hard_timeout: Option<Duration>,
}

/// Bootstrap collaborator. Its result is merged into the creation response.
#[async_trait]
pub trait Bootstrapper: Send + Sync {
    async fn bootstrap(
        &self,
        target: &BootstrapTarget,
        options: &BootstrapOptions,
    ) -> Result<Map<String, Value>, ProvisionError>;
}

/// Skips bootstrap entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBootstrapper;

#[async_trait]
impl Bootstrapper for NoopBootstrapper {
    async fn bootstrap(
        &self,
        target: &BootstrapTarget,
        _options: &BootstrapOptions,
    ) -> Result<Map<String, Value>, ProvisionError> {
        info!(name = %target.request.name, "Bootstrap skipped");
        Ok(Map::from_iter([("deployed".to_string(), Value::Bool(false))]))
    }
}

/// Runs a local shell command with the target exported as
/// `PROVISION_NAME`, `PROVISION_HOST`, `PROVISION_USER`,
/// `PROVISION_PASSWORD` and `PROVISION_SUBID`.
#[derive(Debug, Clone)]
pub struct CommandBootstrapper {
    command: String,
}

impl CommandBootstrapper {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Bootstrapper for CommandBootstrapper {
    async fn bootstrap(
        &self,
        target: &BootstrapTarget,
        options: &BootstrapOptions,
    ) -> Result<Map<String, Value>, ProvisionError> {
        info!(name = %target.request.name, host = %target.ssh_host, "Running bootstrap command");

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.command)
            .env("PROVISION_NAME", &target.request.name)
            .env("PROVISION_HOST", &target.ssh_host)
            .env("PROVISION_SUBID", &target.subid)
            .env("PROVISION_USER", target.ssh_username.as_deref().unwrap_or("root"))
            .env("PROVISION_PASSWORD", target.password.as_deref().unwrap_or_default())
            .kill_on_drop(true);

        let run = command.output();
        let output = match options.hard_timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                ProvisionError::Bootstrap(format!(
                    "bootstrap command exceeded hard timeout of {}s",
                    limit.as_secs()
                ))
            })?,
            None => run.await,
        }
        .map_err(|e| ProvisionError::Bootstrap(format!("failed to spawn bootstrap command: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            warn!(name = %target.request.name, status = %output.status, stderr = %stderr, "Bootstrap command failed");
            return Err(ProvisionError::Bootstrap(format!(
                "bootstrap command exited with {}: {stderr}",
                output.status
            )));
        }

        let mut result = Map::new();
        result.insert("deployed".into(), Value::Bool(true));
        result.insert("exit_code".into(), json!(output.status.code()));
        result.insert("stdout".into(), Value::String(stdout));
        Ok(result)
    }
}
