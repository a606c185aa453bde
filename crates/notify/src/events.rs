//! Provisioning lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Topic prefix shared by every event.
const TOPIC_PREFIX: &str = "cloud";

/// Severity levels for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - normal operations
    Info,
    /// Warning - something needs attention
    Warning,
    /// Critical - immediate action required
    Critical,
}

/// Events published while creating or destroying an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProvisionEvent {
    /// Validation passed, creation is starting
    Creating {
        name: String,
        /// Resolved image, size and location IDs
        image: String,
        size: String,
        location: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// The creation request is about to be submitted
    Requesting {
        name: String,
        /// Submission fields (userdata excluded)
        #[serde(default)]
        fields: BTreeMap<String, String>,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// The provider rejected the submission, or it never arrived
    RequestFailed {
        name: String,
        reason: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// The instance is ready and bootstrapped
    Created {
        name: String,
        subid: String,
        main_ip: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// Destruction is starting
    Destroying {
        name: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// The instance is gone
    Destroyed {
        name: String,
        subid: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl ProvisionEvent {
    #[must_use]
    pub fn creating(
        name: impl Into<String>,
        image: impl Into<String>,
        size: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self::Creating {
            name: name.into(),
            image: image.into(),
            size: size.into(),
            location: location.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn requesting(name: impl Into<String>, fields: BTreeMap<String, String>) -> Self {
        Self::Requesting {
            name: name.into(),
            fields,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn request_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RequestFailed {
            name: name.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn created(
        name: impl Into<String>,
        subid: impl Into<String>,
        main_ip: impl Into<String>,
    ) -> Self {
        Self::Created {
            name: name.into(),
            subid: subid.into(),
            main_ip: main_ip.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn destroying(name: impl Into<String>) -> Self {
        Self::Destroying {
            name: name.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn destroyed(name: impl Into<String>, subid: impl Into<String>) -> Self {
        Self::Destroyed {
            name: name.into(),
            subid: subid.into(),
            timestamp: Utc::now(),
        }
    }

    /// Instance name the event is about.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Creating { name, .. }
            | Self::Requesting { name, .. }
            | Self::RequestFailed { name, .. }
            | Self::Created { name, .. }
            | Self::Destroying { name, .. }
            | Self::Destroyed { name, .. } => name,
        }
    }

    /// Event topic, e.g. `cloud/host1/requesting/failed`.
    #[must_use]
    pub fn topic(&self) -> String {
        let stage = match self {
            Self::Creating { .. } => "creating",
            Self::Requesting { .. } => "requesting",
            Self::RequestFailed { .. } => "requesting/failed",
            Self::Created { .. } => "created",
            Self::Destroying { .. } => "destroying",
            Self::Destroyed { .. } => "destroyed",
        };
        format!("{TOPIC_PREFIX}/{}/{stage}", self.name())
    }

    /// Get a short title for this event type.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::Creating { name, .. } => format!("Starting create: {name}"),
            Self::Requesting { name, .. } => format!("Requesting instance: {name}"),
            Self::RequestFailed { name, .. } => format!("Instance request failed: {name}"),
            Self::Created { name, .. } => format!("Created instance: {name}"),
            Self::Destroying { name, .. } => format!("Destroying instance: {name}"),
            Self::Destroyed { name, .. } => format!("Destroyed instance: {name}"),
        }
    }

    /// Get the severity level for this event.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::RequestFailed { .. } => Severity::Critical,
            Self::Destroying { .. } => Severity::Warning,
            Self::Creating { .. }
            | Self::Requesting { .. }
            | Self::Created { .. }
            | Self::Destroyed { .. } => Severity::Info,
        }
    }

    /// Get the timestamp for this event.
    #[must_use]
    pub const fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Creating { timestamp, .. }
            | Self::Requesting { timestamp, .. }
            | Self::RequestFailed { timestamp, .. }
            | Self::Created { timestamp, .. }
            | Self::Destroying { timestamp, .. }
            | Self::Destroyed { timestamp, .. } => timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        assert_eq!(
            ProvisionEvent::creating("host1", "362", "201", "7").topic(),
            "cloud/host1/creating"
        );
        assert_eq!(
            ProvisionEvent::request_failed("host1", "412").topic(),
            "cloud/host1/requesting/failed"
        );
        assert_eq!(
            ProvisionEvent::destroyed("host1", "576965").topic(),
            "cloud/host1/destroyed"
        );
    }

    #[test]
    fn test_severity_and_title() {
        let event = ProvisionEvent::request_failed("host1", "boom");
        assert_eq!(event.severity(), Severity::Critical);
        assert_eq!(event.title(), "Instance request failed: host1");
        assert_eq!(
            ProvisionEvent::created("host1", "1", "203.0.113.10").severity(),
            Severity::Info
        );
    }

    #[test]
    fn test_serde_tag() {
        let event = ProvisionEvent::destroying("host1");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "destroying");
        let back: ProvisionEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back.name(), "host1");
    }
}
