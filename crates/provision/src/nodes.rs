//! Instance lookup and node operations.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::ProvisionError;
use crate::gateway::{Query, Reply};
use crate::listing::{self, string_field, Listing};

/// Server state as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionedInstance {
    /// Subscription ID.
    pub subid: String,
    pub label: String,
    pub main_ip: Option<String>,
    pub internal_ip: Option<String>,
    pub v6_main_ip: Option<String>,
    /// One-time password assigned by the provider.
    #[serde(skip_serializing)]
    pub default_password: Option<String>,
    /// Coarse lifecycle status (`pending`, `active`, ...).
    pub status: Option<String>,
    /// Hypervisor-level state (`none`, `locked`, `ok`, ...).
    pub server_state: Option<String>,
    pub power_status: Option<String>,
    pub os: Option<String>,
    pub plan_id: Option<String>,
    pub location_id: Option<String>,
    /// Entry as returned by `server/list`.
    #[serde(skip)]
    pub raw: Map<String, Value>,
}

impl ProvisionedInstance {
    /// Build from one `server/list` entry.
    #[must_use]
    pub fn from_entry(key: &str, raw: Map<String, Value>) -> Self {
        Self {
            subid: string_field(&raw, "SUBID").unwrap_or_else(|| key.to_string()),
            label: string_field(&raw, "label").unwrap_or_default(),
            main_ip: string_field(&raw, "main_ip"),
            internal_ip: string_field(&raw, "internal_ip"),
            v6_main_ip: string_field(&raw, "v6_main_ip"),
            default_password: string_field(&raw, "default_password"),
            status: string_field(&raw, "status"),
            server_state: string_field(&raw, "server_state"),
            power_status: string_field(&raw, "power_status"),
            os: string_field(&raw, "os"),
            plan_id: string_field(&raw, "VPSPLANID"),
            location_id: string_field(&raw, "DCID"),
            raw,
        }
    }

    /// The raw entry plus the normalized node fields.
    #[must_use]
    pub fn full_record(&self) -> Map<String, Value> {
        let mut record = self.raw.clone();
        let summary = self.summary();
        record.insert("id".into(), Value::String(summary.id));
        record.insert("image".into(), opt(summary.image));
        record.insert("size".into(), opt(summary.size));
        record.insert("state".into(), opt(summary.state));
        record.insert("private_ips".into(), opt(summary.private_ips));
        record.insert("public_ips".into(), opt(summary.public_ips));
        record
    }

    /// Brief projection.
    #[must_use]
    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            id: self.subid.clone(),
            image: self.os.clone(),
            size: self.plan_id.clone(),
            state: self.status.clone(),
            private_ips: self.internal_ip.clone(),
            public_ips: self.main_ip.clone(),
        }
    }
}

fn opt(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::String)
}

/// Brief node listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub id: String,
    pub image: Option<String>,
    pub size: Option<String>,
    pub state: Option<String>,
    pub private_ips: Option<String>,
    pub public_ips: Option<String>,
}

/// How to find an instance in `server/list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceLookup {
    BySubId(String),
    ByLabel(String),
}

impl InstanceLookup {
    fn matches(&self, instance: &ProvisionedInstance) -> bool {
        match self {
            Self::BySubId(subid) => instance.subid == *subid,
            Self::ByLabel(label) => instance.label == *label,
        }
    }
}

impl std::fmt::Display for InstanceLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BySubId(subid) => write!(f, "SUBID {subid}"),
            Self::ByLabel(label) => write!(f, "label '{label}'"),
        }
    }
}

async fn instances(gateway: &dyn Query) -> Result<Vec<ProvisionedInstance>, ProvisionError> {
    Ok(listing::list(gateway, Listing::Servers)
        .await?
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Object(raw) => Some(ProvisionedInstance::from_entry(&key, raw)),
            _ => None,
        })
        .collect())
}

/// Look up one instance. Issues exactly one `server/list` call.
///
/// # Errors
/// Returns the gateway error.
pub async fn find_instance(
    gateway: &dyn Query,
    lookup: &InstanceLookup,
) -> Result<Option<ProvisionedInstance>, ProvisionError> {
    let found = instances(gateway)
        .await?
        .into_iter()
        .find(|instance| lookup.matches(instance));
    debug!(lookup = %lookup, found = found.is_some(), "Instance lookup");
    Ok(found)
}

/// All nodes, keyed by label, with the normalized node fields added.
///
/// # Errors
/// Returns the gateway error.
pub async fn list_nodes_full(gateway: &dyn Query) -> Result<Map<String, Value>, ProvisionError> {
    Ok(instances(gateway)
        .await?
        .into_iter()
        .map(|instance| (instance.label.clone(), Value::Object(instance.full_record())))
        .collect())
}

/// Selection keyword keeping every field.
pub const SELECT_ALL: &str = "all";

/// All nodes, keyed by label, each reduced to the selected fields.
///
/// Fields a node does not carry are left out. Selecting [`SELECT_ALL`]
/// returns the full records.
///
/// # Errors
/// Returns the gateway error.
pub async fn list_nodes_select(
    gateway: &dyn Query,
    selection: &[String],
) -> Result<Map<String, Value>, ProvisionError> {
    let nodes = list_nodes_full(gateway).await?;
    if selection.iter().any(|field| field == SELECT_ALL) {
        return Ok(nodes);
    }
    Ok(nodes
        .into_iter()
        .map(|(label, node)| {
            let selected: Map<String, Value> = selection
                .iter()
                .filter_map(|field| node.get(field).map(|value| (field.clone(), value.clone())))
                .collect();
            (label, Value::Object(selected))
        })
        .collect())
}

/// All nodes, keyed by label, brief projection.
///
/// # Errors
/// Returns the gateway error.
pub async fn list_nodes(
    gateway: &dyn Query,
) -> Result<Vec<(String, NodeSummary)>, ProvisionError> {
    Ok(instances(gateway)
        .await?
        .into_iter()
        .map(|instance| (instance.label.clone(), instance.summary()))
        .collect())
}

/// One node by label, falling back to SUBID.
///
/// # Errors
/// Returns the gateway error.
pub async fn show_instance(
    gateway: &dyn Query,
    name: &str,
) -> Result<Option<ProvisionedInstance>, ProvisionError> {
    let all = instances(gateway).await?;
    let by_label = InstanceLookup::ByLabel(name.to_string());
    let by_subid = InstanceLookup::BySubId(name.to_string());
    Ok(all
        .iter()
        .find(|instance| by_label.matches(instance))
        .or_else(|| all.iter().find(|instance| by_subid.matches(instance)))
        .cloned())
}

async fn require_instance(
    gateway: &dyn Query,
    name: &str,
) -> Result<ProvisionedInstance, ProvisionError> {
    show_instance(gateway, name)
        .await?
        .ok_or_else(|| ProvisionError::NotFound(format!("no instance named '{name}'")))
}

/// POST an action endpoint that answers with an empty body on success.
async fn action(gateway: &dyn Query, path: &str, subid: &str) -> Result<(), ProvisionError> {
    let reply = gateway
        .post_form(path, vec![("SUBID".to_string(), subid.to_string())])
        .await?;
    check_action_reply(&reply)
}

fn check_action_reply(reply: &Reply) -> Result<(), ProvisionError> {
    match reply.error_message() {
        None => Ok(()),
        Some(message) => Err(ProvisionError::ProviderRejected {
            status: reply.status_code(),
            message,
        }),
    }
}

/// Destroy a node by label or SUBID. Returns the SUBID.
///
/// # Errors
/// [`ProvisionError::NotFound`] for an unknown node, or the provider error.
pub async fn destroy(gateway: &dyn Query, name: &str) -> Result<String, ProvisionError> {
    let instance = require_instance(gateway, name).await?;
    action(gateway, "server/destroy", &instance.subid).await?;
    info!(name = %name, subid = %instance.subid, "Instance destroyed");
    Ok(instance.subid)
}

/// Power a node on.
///
/// # Errors
/// [`ProvisionError::NotFound`] for an unknown node, or the provider error.
pub async fn start(gateway: &dyn Query, name: &str) -> Result<String, ProvisionError> {
    let instance = require_instance(gateway, name).await?;
    action(gateway, "server/start", &instance.subid).await?;
    info!(name = %name, subid = %instance.subid, "Instance started");
    Ok(instance.subid)
}

/// Halt a node.
///
/// # Errors
/// [`ProvisionError::NotFound`] for an unknown node, or the provider error.
pub async fn stop(gateway: &dyn Query, name: &str) -> Result<String, ProvisionError> {
    let instance = require_instance(gateway, name).await?;
    action(gateway, "server/halt", &instance.subid).await?;
    info!(name = %name, subid = %instance.subid, "Instance halted");
    Ok(instance.subid)
}

/// One SSH key by key ID.
///
/// # Errors
/// [`ProvisionError::NotFound`] for an unknown key, or the gateway error.
pub async fn show_keypair(gateway: &dyn Query, key_id: &str) -> Result<Value, ProvisionError> {
    listing::list(gateway, Listing::SshKeys)
        .await?
        .remove(key_id)
        .ok_or_else(|| ProvisionError::NotFound(format!("no SSH key with ID '{key_id}'")))
}
