//! Error types for provisioning operations.

use thiserror::Error;

/// Errors that can occur while provisioning or managing an instance.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// A required field (image, size, location) did not match any catalog entry.
    #[error("unknown {field}: Vultr does not have a {field} with id or name '{value}'")]
    UnresolvedReference {
        /// Which required field failed (`image`, `size`, `location`).
        field: &'static str,
        /// The identifier as supplied by the caller.
        value: String,
    },

    /// An optional reference (script, ISO, firewall group, SSH key) does not exist.
    #[error("invalid {kind}: your Vultr account does not have a {kind} with ID {id}")]
    InvalidReference {
        /// Kind of referenced resource.
        kind: &'static str,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// Input is syntactically wrong (bad URL, wrong type for a boolean field, ...).
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The provider answered with an error status.
    #[error("provider rejected request: {status} - {message}")]
    ProviderRejected { status: u16, message: String },

    /// Network or transport failure. The message is already redacted.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A readiness stage did not complete within its budget.
    ///
    /// The provider-side instance is left running; cleanup is up to the caller.
    #[error("timed out after {timeout_secs}s waiting for {stage}{}", last_error_suffix(.last_error))]
    Timeout {
        stage: &'static str,
        timeout_secs: u64,
        last_error: Option<String>,
    },

    /// The bootstrap collaborator failed.
    #[error("bootstrap failed: {0}")]
    Bootstrap(String),

    /// Node or key not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_deref()
        .map(|e| format!(" (last error: {e})"))
        .unwrap_or_default()
}

impl ProvisionError {
    /// Whether the error was raised before any mutating provider call.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedReference { .. } | Self::InvalidReference { .. } | Self::MalformedInput(_)
        )
    }

    /// Whether retrying the same read may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_classification() {
        assert!(ProvisionError::UnresolvedReference {
            field: "image",
            value: "Plan9".into()
        }
        .is_precondition());
        assert!(ProvisionError::MalformedInput("x".into()).is_precondition());
        assert!(!ProvisionError::Transport("reset".into()).is_precondition());
        assert!(!ProvisionError::ProviderRejected {
            status: 412,
            message: String::new()
        }
        .is_precondition());
    }

    #[test]
    fn test_timeout_message() {
        let err = ProvisionError::Timeout {
            stage: "server state ok",
            timeout_secs: 900,
            last_error: None,
        };
        assert_eq!(err.to_string(), "timed out after 900s waiting for server state ok");

        let err = ProvisionError::Timeout {
            stage: "network address",
            timeout_secs: 5,
            last_error: Some("connection reset".into()),
        };
        assert!(err.to_string().ends_with("(last error: connection reset)"));
    }
}
