//! Scripted collaborators for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use notify::{ChannelError, ProvisionEvent};
use serde_json::{json, Map, Value};

use provision::gateway::Method;
use provision::{
    BootstrapOptions, BootstrapTarget, Bootstrapper, EventSink, ProvisionError, Query, Reply,
    RequestBody,
};

pub const SUBID: &str = "576965";

/// One recorded gateway call.
#[derive(Debug, Clone)]
pub struct Call {
    pub path: String,
    pub method: Method,
    pub body: Option<RequestBody>,
}

impl Call {
    /// Form fields of a POST, as a map.
    pub fn form(&self) -> BTreeMap<String, String> {
        match &self.body {
            Some(RequestBody::Form(fields)) => fields.iter().cloned().collect(),
            _ => BTreeMap::new(),
        }
    }
}

/// How `server/create` answers.
#[derive(Debug, Clone)]
pub enum CreateReply {
    Subid(&'static str),
    Body(Value),
    Rejected(u16, &'static str),
    Transport,
}

/// In-memory gateway answering from fixtures and recording every call.
pub struct FakeGateway {
    listings: HashMap<&'static str, Value>,
    servers: Mutex<VecDeque<Value>>,
    create_reply: CreateReply,
    calls: Mutex<Vec<Call>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        let listings = HashMap::from([
            ("regions/list", locations()),
            ("plans/list", sizes()),
            ("os/list", images()),
            ("startupscript/list", scripts()),
            ("iso/list", acct_isos()),
            ("iso/list_public", public_isos()),
            ("firewall/group_list", firewall_groups()),
            ("sshkey/list", keys()),
        ]);
        Self {
            listings,
            servers: Mutex::new(VecDeque::new()),
            create_reply: CreateReply::Subid(SUBID),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Successive `server/list` answers. The last one repeats.
    pub fn with_servers(self, servers: Vec<Value>) -> Self {
        *self.servers.lock().unwrap() = servers.into();
        self
    }

    pub fn with_create_reply(mut self, reply: CreateReply) -> Self {
        self.create_reply = reply;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.path == path).collect()
    }

    pub fn mutating_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.method == Method::POST).count()
    }

    fn next_servers(&self) -> Value {
        let mut servers = self.servers.lock().unwrap();
        if servers.len() > 1 {
            servers.pop_front().unwrap_or_default()
        } else {
            servers.front().cloned().unwrap_or_else(|| json!([]))
        }
    }
}

#[async_trait]
impl Query for FakeGateway {
    async fn query(
        &self,
        path: &str,
        method: Method,
        body: Option<RequestBody>,
    ) -> Result<Reply, ProvisionError> {
        self.calls.lock().unwrap().push(Call {
            path: path.to_string(),
            method,
            body,
        });

        if let Some(listing) = self.listings.get(path) {
            return Ok(Reply::Data(listing.clone()));
        }

        match path {
            "server/list" => Ok(Reply::Data(self.next_servers())),
            "server/create" => match &self.create_reply {
                CreateReply::Subid(subid) => Ok(Reply::Data(json!({ "SUBID": subid }))),
                CreateReply::Body(body) => Ok(Reply::Data(body.clone())),
                CreateReply::Rejected(status, message) => Err(ProvisionError::ProviderRejected {
                    status: *status,
                    message: (*message).to_string(),
                }),
                CreateReply::Transport => {
                    Err(ProvisionError::Transport("connection reset by peer".into()))
                }
            },
            "server/destroy" | "server/start" | "server/halt" => Ok(Reply::NoContent),
            other => Err(ProvisionError::ProviderRejected {
                status: 404,
                message: format!("no fixture for {other}"),
            }),
        }
    }
}

/// A `server/list` answer holding one instance.
pub fn server(main_ip: &str, password: &str, status: &str, server_state: &str) -> Value {
    json!({
        (SUBID): {
            "SUBID": SUBID,
            "label": "host1",
            "os": "CentOS 8 x64",
            "VPSPLANID": "201",
            "DCID": "7",
            "location": "Amsterdam",
            "main_ip": main_ip,
            "internal_ip": "",
            "v6_main_ip": "",
            "default_password": password,
            "status": status,
            "server_state": server_state,
            "power_status": "running"
        }
    })
}

/// Instance already usable.
pub fn ready_server() -> Value {
    server("203.0.113.10", "xYz123", "active", "ok")
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProvisionEvent>>,
    fail: bool,
}

impl RecordingSink {
    /// A sink that records, then reports every publish as failed.
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<ProvisionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.events().iter().map(ProvisionEvent::topic).collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: ProvisionEvent) -> Result<(), ChannelError> {
        self.events.lock().unwrap().push(event);
        if self.fail {
            Err(ChannelError::NotConfigured("test sink".into()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct RecordingBootstrapper {
    targets: Mutex<Vec<BootstrapTarget>>,
}

impl RecordingBootstrapper {
    pub fn targets(&self) -> Vec<BootstrapTarget> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl Bootstrapper for RecordingBootstrapper {
    async fn bootstrap(
        &self,
        target: &BootstrapTarget,
        _options: &BootstrapOptions,
    ) -> Result<Map<String, Value>, ProvisionError> {
        self.targets.lock().unwrap().push(target.clone());
        Ok(Map::from_iter([("deployed".to_string(), Value::Bool(true))]))
    }
}

pub fn locations() -> Value {
    json!({
        "1": {"DCID": "1", "name": "New Jersey", "country": "US", "continent": "North America", "regioncode": "EWR"},
        "7": {"DCID": "7", "name": "Amsterdam", "country": "NL", "continent": "Europe", "regioncode": "AMS"},
        "22": {"DCID": "22", "name": "Toronto", "country": "CA", "continent": "North America", "regioncode": "YTO"}
    })
}

pub fn sizes() -> Value {
    json!({
        "115": {"VPSPLANID": "115", "name": "8192 MB RAM,110 GB SSD,10.00 TB BW", "vcpu_count": "2", "ram": "8192", "disk": "110", "bandwidth": "10.00", "price_per_month": "60.00"},
        "201": {"VPSPLANID": "201", "name": "1024 MB RAM,25 GB SSD,1.00 TB BW", "vcpu_count": "1", "ram": "1024", "disk": "25", "bandwidth": "1.00", "price_per_month": "5.00"},
        "203": {"VPSPLANID": "203", "name": "4096 MB RAM,80 GB SSD,3.00 TB BW", "vcpu_count": "2", "ram": "4096", "disk": "80", "bandwidth": "3.00", "price_per_month": "20.00"},
        "400": {"VPSPLANID": "400", "name": "1024 MB RAM,32 GB SSD,1.00 TB BW", "vcpu_count": "1", "ram": "1024", "disk": "32", "bandwidth": "1.00", "price_per_month": "6.00"},
        "401": {"VPSPLANID": "401", "name": "2048 MB RAM,64 GB SSD,2.00 TB BW", "vcpu_count": "1", "ram": "2048", "disk": "64", "bandwidth": "2.00", "price_per_month": "12.00"}
    })
}

pub fn images() -> Value {
    json!({
        "362": {"OSID": 362, "name": "CentOS 8 x64", "arch": "x64", "family": "centos", "windows": false},
        "240": {"OSID": 240, "name": "Windows 2016 x64", "arch": "x64", "family": "windows", "windows": true},
        "159": {"OSID": 159, "name": "Custom", "arch": "x64", "family": "iso", "windows": false},
        "164": {"OSID": 164, "name": "Snapshot", "arch": "x64", "family": "snapshot", "windows": false}
    })
}

pub fn scripts() -> Value {
    json!({
        "793055": {"SCRIPTID": "793055", "name": "boot", "type": "boot"},
        "793056": {"SCRIPTID": "793056", "name": "pxe", "type": "pxe"}
    })
}

pub fn acct_isos() -> Value {
    json!({
        "591272": {"ISOID": 591272, "filename": "CentOS-7-x86_64-DVD-1810.iso", "status": "complete"},
        "800882": {"ISOID": 800882, "filename": "CentOS-8.2.2004-x86_64-dvd1.iso", "status": "complete"}
    })
}

pub fn public_isos() -> Value {
    json!({
        "417366": {"ISOID": 417366, "name": "Ubuntu 18.04", "description": "18.04 x86_64"},
        "641216": {"ISOID": 641216, "name": "CentOS 8 x86_64", "description": "CentOS-8-x86_64-1905-dvd1.iso"},
        "802022": {"ISOID": 802022, "name": "SystemRescueCD", "description": "6.1.8"}
    })
}

pub fn keys() -> Value {
    json!({
        "6043ec83f126a": {"SSHKEYID": "6043ec83f126a", "name": "ed25519 SSH Key"},
        "6043eccc2800d": {"SSHKEYID": "6043eccc2800d", "name": "rsa-4096 SSH Key"}
    })
}

pub fn firewall_groups() -> Value {
    json!({
        "2aac0c5f": {"FIREWALLGROUPID": "2aac0c5f", "description": "group1"},
        "ef8d7e3c": {"FIREWALLGROUPID": "ef8d7e3c", "description": "group2"}
    })
}
