//! YAML configuration: provider credentials and named creation profiles.
//!
//! ```yaml
//! provider:
//!   api_key: OUCHEZAEKAISEIQUAIFIE0EEC6THOHKEI7AX
//!   wait_timeout_secs: 600
//!   query_selection: [id, public_ips, state]
//! profiles:
//!   amsterdam-small:
//!     image: CentOS 8 x64
//!     size: 1024 MB RAM,25 GB SSD,1.00 TB BW
//!     location: Amsterdam
//!     enable_private_network: true
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::ProvisionError;
use crate::gateway::{DEFAULT_MANAGEMENT_HOST, REDACTED};
use crate::orchestrator::{ProvisionSettings, DEFAULT_WAIT_TIMEOUT};
use crate::request::CreationRequest;

/// Environment variable overriding `provider.api_key`.
pub const ENV_API_KEY: &str = "VULTR_API_KEY";

/// Environment variable overriding `provider.management_host`.
pub const ENV_MANAGEMENT_HOST: &str = "VULTR_MANAGEMENT_HOST";

/// Provider section.
#[derive(Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_management_host")]
    pub management_host: String,

    /// Per-stage readiness budget.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,

    /// Upper bound for bootstrap.
    #[serde(default)]
    pub hard_timeout_secs: Option<u64>,

    /// Webhook receiving lifecycle events.
    #[serde(default)]
    pub event_webhook_url: Option<String>,

    /// Shell command run as the bootstrap step.
    #[serde(default)]
    pub bootstrap_command: Option<String>,

    /// Fields kept by `list-select` when none are given on the command line.
    #[serde(default)]
    pub query_selection: Vec<String>,
}

fn default_management_host() -> String {
    DEFAULT_MANAGEMENT_HOST.to_string()
}

const fn default_wait_timeout_secs() -> u64 {
    DEFAULT_WAIT_TIMEOUT.as_secs()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            management_host: default_management_host(),
            wait_timeout_secs: default_wait_timeout_secs(),
            hard_timeout_secs: None,
            event_webhook_url: None,
            bootstrap_command: None,
            query_selection: Vec::new(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &REDACTED)
            .field("management_host", &self.management_host)
            .field("wait_timeout_secs", &self.wait_timeout_secs)
            .field("hard_timeout_secs", &self.hard_timeout_secs)
            .field("event_webhook_url", &self.event_webhook_url.as_ref().map(|_| REDACTED))
            .field("bootstrap_command", &self.bootstrap_command)
            .field("query_selection", &self.query_selection)
            .finish()
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvisionConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Named creation profiles. The instance name comes from the command line.
    #[serde(default)]
    pub profiles: BTreeMap<String, CreationRequest>,
}

impl ProvisionConfig {
    /// Parse configuration from YAML text.
    ///
    /// # Errors
    /// Returns [`ProvisionError::Config`] for invalid YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ProvisionError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ProvisionError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns [`ProvisionError::Config`] if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, ProvisionError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            ProvisionError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        let config = Self::from_yaml_str(&contents)?;
        debug!(path = %path.display(), profiles = config.profiles.len(), "Loaded configuration");
        Ok(config)
    }

    /// Apply environment overrides. `lookup` is usually `std::env::var(..).ok()`.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.trim().is_empty()) {
            self.provider.api_key = key;
        }
        if let Some(host) = lookup(ENV_MANAGEMENT_HOST).filter(|v| !v.trim().is_empty()) {
            self.provider.management_host = host;
        }
        self
    }

    /// Check settings required for any provider call.
    ///
    /// # Errors
    /// Returns [`ProvisionError::Config`] if the API key is missing.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        if self.provider.api_key.trim().is_empty() {
            return Err(ProvisionError::Config(format!(
                "provider.api_key is required (or set {ENV_API_KEY})"
            )));
        }
        Ok(())
    }

    /// Build the creation request for `profile`, named `name`.
    ///
    /// # Errors
    /// Returns [`ProvisionError::Config`] for an unknown profile.
    pub fn request(&self, profile: &str, name: &str) -> Result<CreationRequest, ProvisionError> {
        let mut request = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| ProvisionError::Config(format!("unknown profile '{profile}'")))?;
        request.name = name.to_string();
        Ok(request)
    }

    /// Run-wide provisioning settings.
    #[must_use]
    pub fn settings(&self) -> ProvisionSettings {
        ProvisionSettings {
            wait_timeout: Duration::from_secs(self.provider.wait_timeout_secs),
            hard_timeout: self.provider.hard_timeout_secs.map(Duration::from_secs),
        }
    }
}
