//! Provider listing endpoints.
//!
//! The v1 API answers every listing with an object keyed by the resource ID.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ProvisionError;
use crate::gateway::Query;

/// A provider listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listing {
    /// Datacenter locations.
    Locations,
    /// VPS plans.
    Sizes,
    /// Operating system images.
    Images,
    /// Startup scripts in the account.
    Scripts,
    /// ISO images uploaded to the account.
    AccountIsos,
    /// Public ISO images.
    PublicIsos,
    /// Firewall groups.
    FirewallGroups,
    /// SSH keys.
    SshKeys,
    /// Servers (instances).
    Servers,
}

impl Listing {
    /// Endpoint path relative to the API root.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Locations => "regions/list",
            Self::Sizes => "plans/list",
            Self::Images => "os/list",
            Self::Scripts => "startupscript/list",
            Self::AccountIsos => "iso/list",
            Self::PublicIsos => "iso/list_public",
            Self::FirewallGroups => "firewall/group_list",
            Self::SshKeys => "sshkey/list",
            Self::Servers => "server/list",
        }
    }
}

impl std::fmt::Display for Listing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Locations => "locations",
            Self::Sizes => "sizes",
            Self::Images => "images",
            Self::Scripts => "startup scripts",
            Self::AccountIsos => "account ISOs",
            Self::PublicIsos => "public ISOs",
            Self::FirewallGroups => "firewall groups",
            Self::SshKeys => "SSH keys",
            Self::Servers => "servers",
        };
        f.write_str(name)
    }
}

/// Fetch one listing as an ID-keyed mapping.
///
/// # Errors
/// Returns the gateway error unchanged.
pub async fn list(
    gateway: &dyn Query,
    listing: Listing,
) -> Result<Map<String, Value>, ProvisionError> {
    let entries = gateway.get(listing.path()).await?.into_map();
    debug!(listing = %listing, count = entries.len(), "Fetched listing");
    Ok(entries)
}

/// Render a scalar field as a string (the v1 API mixes numbers and strings).
#[must_use]
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Read `key` from an entry as a string.
#[must_use]
pub fn string_field(entry: &Map<String, Value>, key: &str) -> Option<String> {
    entry.get(key).and_then(scalar_string)
}
