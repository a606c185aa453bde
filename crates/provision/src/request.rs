//! Declarative creation request for one instance.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// The declarative intent for one VM.
///
/// `image`, `size` and `location` accept either a provider ID or a display
/// name. Reference fields accept strings or bare numbers, since YAML profiles
/// commonly write IDs unquoted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreationRequest {
    /// Instance name, used as label and hostname.
    #[serde(default)]
    pub name: String,

    /// Image reference (`OSID` or display name).
    #[serde(deserialize_with = "id_string")]
    pub image: String,

    /// Size reference (`VPSPLANID` or display name).
    #[serde(deserialize_with = "id_string")]
    pub size: String,

    /// Location reference (`DCID` or display name).
    #[serde(deserialize_with = "id_string")]
    pub location: String,

    /// Private networking flag. Kept untyped so a non-boolean value can be
    /// reported instead of failing deserialization.
    #[serde(
        default,
        alias = "enable_private_network",
        skip_serializing_if = "Option::is_none"
    )]
    pub private_networking: Option<Value>,

    /// Startup script ID.
    #[serde(
        default,
        alias = "startup_script_id",
        deserialize_with = "optional_id_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub startup_script: Option<String>,

    /// ISO ID (account or public).
    #[serde(
        default,
        alias = "isoid",
        deserialize_with = "optional_id_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub iso: Option<String>,

    /// iPXE chain URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipxe_chain_url: Option<String>,

    /// Firewall group ID.
    #[serde(
        default,
        deserialize_with = "optional_id_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub firewall_group_id: Option<String>,

    /// SSH key IDs. Accepts a list or a comma-separated string.
    #[serde(
        default,
        alias = "ssh_key_names",
        deserialize_with = "key_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub ssh_keys: Vec<String>,

    /// Userdata: a path to an existing file, or the literal payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userdata: Option<String>,

    /// Template renderer applied to file-sourced userdata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userdata_template: Option<String>,

    /// SSH username handed to bootstrap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_username: Option<String>,

    /// Explicit password. Skips the default-password readiness stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Per-stage readiness timeout override, in seconds.
    #[serde(
        default,
        alias = "wait_for_fun_timeout",
        skip_serializing_if = "Option::is_none"
    )]
    pub wait_timeout_secs: Option<u64>,
}

impl CreationRequest {
    /// Create a request with the required fields.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        size: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            size: size.into(),
            location: location.into(),
            ..Self::default()
        }
    }

    /// Set the private networking flag.
    #[must_use]
    pub fn with_private_networking(mut self, enabled: bool) -> Self {
        self.private_networking = Some(Value::Bool(enabled));
        self
    }

    /// Set the startup script ID.
    #[must_use]
    pub fn with_startup_script(mut self, id: impl Into<String>) -> Self {
        self.startup_script = Some(id.into());
        self
    }

    /// Set the ISO ID.
    #[must_use]
    pub fn with_iso(mut self, id: impl Into<String>) -> Self {
        self.iso = Some(id.into());
        self
    }

    /// Set the iPXE chain URL.
    #[must_use]
    pub fn with_ipxe_chain_url(mut self, url: impl Into<String>) -> Self {
        self.ipxe_chain_url = Some(url.into());
        self
    }

    /// Set the firewall group ID.
    #[must_use]
    pub fn with_firewall_group(mut self, id: impl Into<String>) -> Self {
        self.firewall_group_id = Some(id.into());
        self
    }

    /// Add an SSH key ID.
    #[must_use]
    pub fn with_ssh_key(mut self, id: impl Into<String>) -> Self {
        self.ssh_keys.push(id.into());
        self
    }

    /// Set userdata (file path or literal) and an optional template renderer.
    #[must_use]
    pub fn with_userdata(mut self, userdata: impl Into<String>, template: Option<&str>) -> Self {
        self.userdata = Some(userdata.into());
        self.userdata_template = template.map(str::to_string);
        self
    }

    /// Set explicit SSH credentials.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<&str>) -> Self {
        self.ssh_username = Some(username.into());
        self.password = password.map(str::to_string);
        self
    }

    /// Override the per-stage readiness timeout.
    #[must_use]
    pub fn with_wait_timeout_secs(mut self, secs: u64) -> Self {
        self.wait_timeout_secs = Some(secs);
        self
    }

    /// Explicit password, ignoring blank values.
    #[must_use]
    pub fn explicit_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Text(String),
    Unsigned(u64),
    Signed(i64),
}

impl From<IdRepr> for String {
    fn from(id: IdRepr) -> Self {
        match id {
            IdRepr::Text(s) => s.trim().to_string(),
            IdRepr::Unsigned(n) => n.to_string(),
            IdRepr::Signed(n) => n.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeyList {
    Joined(String),
    Many(Vec<IdRepr>),
}

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    IdRepr::deserialize(deserializer).map(String::from)
}

fn optional_id_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<IdRepr>::deserialize(deserializer)?
        .map(String::from)
        .filter(|id| !id.is_empty()))
}

fn key_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let keys = match Option::<KeyList>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(KeyList::Joined(joined)) => joined.split(',').map(str::to_string).collect(),
        Some(KeyList::Many(many)) => many.into_iter().map(String::from).collect(),
    };
    Ok(keys
        .into_iter()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .collect())
}
