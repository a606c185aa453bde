//! Resource validation for optional request references.
//!
//! Every check runs before the creation request is submitted. Pure checks
//! (private networking type, iPXE URL syntax) come first so they fail without
//! touching the network; each reference is then looked up in its own listing.

use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::error::ProvisionError;
use crate::gateway::Query;
use crate::listing::{self, Listing};
use crate::request::CreationRequest;

/// Optional fields of a request, checked and normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedOptions {
    pub private_networking: bool,
    pub startup_script: Option<String>,
    pub iso: Option<String>,
    pub ipxe_chain_url: Option<Url>,
    pub firewall_group: Option<String>,
    pub ssh_keys: Vec<String>,
}

/// Validate every optional reference of `request`.
///
/// # Errors
/// - [`ProvisionError::MalformedInput`] for a non-boolean private networking
///   flag or an unusable iPXE URL
/// - [`ProvisionError::InvalidReference`] for the first reference missing
///   from its listing
/// - gateway errors from the listing calls
pub async fn validate(
    gateway: &dyn Query,
    request: &CreationRequest,
) -> Result<ValidatedOptions, ProvisionError> {
    let private_networking = private_networking(request.private_networking.as_ref())?;
    let ipxe_chain_url = request
        .ipxe_chain_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .map(ipxe_url)
        .transpose()?;

    if let Some(script) = &request.startup_script {
        let scripts = listing::list(gateway, Listing::Scripts).await?;
        require(&scripts, "startup script", script)?;
    }

    if let Some(iso) = &request.iso {
        let account = listing::list(gateway, Listing::AccountIsos).await?;
        if !account.contains_key(iso) {
            let public = listing::list(gateway, Listing::PublicIsos).await?;
            require(&public, "ISO image", iso)?;
        }
    }

    if let Some(group) = &request.firewall_group_id {
        let groups = listing::list(gateway, Listing::FirewallGroups).await?;
        require(&groups, "firewall group", group)?;
    }

    if !request.ssh_keys.is_empty() {
        let keys = listing::list(gateway, Listing::SshKeys).await?;
        for key in &request.ssh_keys {
            require(&keys, "SSH key", key)?;
        }
    }

    debug!(name = %request.name, "Optional references validated");

    Ok(ValidatedOptions {
        private_networking,
        startup_script: request.startup_script.clone(),
        iso: request.iso.clone(),
        ipxe_chain_url,
        firewall_group: request.firewall_group_id.clone(),
        ssh_keys: request.ssh_keys.clone(),
    })
}

fn require(
    available: &Map<String, Value>,
    kind: &'static str,
    id: &str,
) -> Result<(), ProvisionError> {
    if available.contains_key(id) {
        Ok(())
    } else {
        Err(ProvisionError::InvalidReference {
            kind,
            id: id.to_string(),
        })
    }
}

fn private_networking(value: Option<&Value>) -> Result<bool, ProvisionError> {
    match value {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(enabled)) => Ok(*enabled),
        Some(other) => Err(ProvisionError::MalformedInput(format!(
            "'private_networking' should be a boolean value, got {other}"
        ))),
    }
}

/// Parse an iPXE chain URL: absolute, `http` or `https`, with a host.
fn ipxe_url(raw: &str) -> Result<Url, ProvisionError> {
    let malformed = || ProvisionError::MalformedInput(format!("iPXE chain URL '{raw}' is malformed"));
    let url = Url::parse(raw.trim()).map_err(|_| malformed())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().map_or(true, str::is_empty) {
        return Err(malformed());
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_private_networking_must_be_bool() {
        assert!(!private_networking(None).unwrap());
        assert!(private_networking(Some(&json!(true))).unwrap());
        let err = private_networking(Some(&json!("yes"))).unwrap_err();
        assert!(matches!(err, ProvisionError::MalformedInput(_)));
    }

    #[test]
    fn test_ipxe_url() {
        assert!(ipxe_url("https://boot.example.com/chain.ipxe").is_ok());
        assert!(ipxe_url("http://10.0.0.1/boot").is_ok());
        assert!(ipxe_url("not a url").is_err());
        assert!(ipxe_url("/relative/path").is_err());
        assert!(ipxe_url("ftp://example.com/boot").is_err());
        assert!(ipxe_url("file:///boot.ipxe").is_err());
    }

    #[test]
    fn test_require_matches_keys() {
        let groups = json!({"2aac0c5f": {}, "ef8d7e3c": {}});
        let groups = groups.as_object().unwrap();
        assert!(require(groups, "firewall group", "ef8d7e3c").is_ok());
        match require(groups, "firewall group", "99999999").unwrap_err() {
            ProvisionError::InvalidReference { kind, id } => {
                assert_eq!(kind, "firewall group");
                assert_eq!(id, "99999999");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
