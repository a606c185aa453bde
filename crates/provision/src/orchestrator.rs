//! Creation orchestrator.
//!
//! `create` runs strictly in sequence: catalog resolution, reference
//! validation, submission, four readiness stages, bootstrap. Nothing is sent
//! to `server/create` unless resolution and validation both succeed.
//!
//! A readiness timeout leaves the provider-side instance running. It is not
//! destroyed automatically; call [`Provisioner::destroy`] to clean up.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use notify::{Notifier, ProvisionEvent};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::bootstrap::{BootstrapOptions, BootstrapTarget, Bootstrapper, NoopBootstrapper};
use crate::catalog::{CatalogCache, Category};
use crate::error::ProvisionError;
use crate::events::EventSink;
use crate::gateway::{Query, Reply};
use crate::listing::scalar_string;
use crate::nodes::{self, InstanceLookup, NodeSummary, ProvisionedInstance};
use crate::poller::{wait_for, Readiness};
use crate::request::CreationRequest;
use crate::userdata::{prepare_userdata, HandlebarsRenderer, TemplateRenderer};
use crate::validator::{self, ValidatedOptions};

/// Default per-stage readiness timeout.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Delay between address probes.
const ADDRESS_POLL_DELAY: Duration = Duration::from_secs(3);

/// Delay between password, status and server state probes.
const POLL_DELAY: Duration = Duration::from_secs(1);

/// Password placeholder reported for images without a default password.
const PASSWORD_NOT_SUPPORTED: &str = "not supported";

/// Run-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSettings {
    /// Budget for each readiness stage, unless the request overrides it.
    pub wait_timeout: Duration,
    /// Upper bound for the bootstrap step.
    pub hard_timeout: Option<Duration>,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            hard_timeout: None,
        }
    }
}

/// Result of a successful `create`.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedInstance {
    /// Final instance snapshot.
    #[serde(skip)]
    pub instance: ProvisionedInstance,
    /// Bootstrap result merged with the final snapshot.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Drives instance creation and node operations against one gateway.
pub struct Provisioner {
    gateway: Arc<dyn Query>,
    events: Arc<dyn EventSink>,
    bootstrapper: Arc<dyn Bootstrapper>,
    renderer: Arc<dyn TemplateRenderer>,
    settings: ProvisionSettings,
}

impl Provisioner {
    /// Create a provisioner with no event delivery and no bootstrap.
    #[must_use]
    pub fn new(gateway: Arc<dyn Query>) -> Self {
        Self {
            gateway,
            events: Arc::new(Notifier::disabled()),
            bootstrapper: Arc::new(NoopBootstrapper),
            renderer: Arc::new(HandlebarsRenderer::new()),
            settings: ProvisionSettings::default(),
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_bootstrapper(mut self, bootstrapper: Arc<dyn Bootstrapper>) -> Self {
        self.bootstrapper = bootstrapper;
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ProvisionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The gateway used for every call.
    #[must_use]
    pub fn gateway(&self) -> &dyn Query {
        self.gateway.as_ref()
    }

    fn publish(&self, event: ProvisionEvent) {
        let topic = event.topic();
        if let Err(e) = self.events.publish(event) {
            warn!(topic = %topic, error = %e, "Failed to publish event");
        }
    }

    /// Create one instance and wait until it is usable.
    ///
    /// # Errors
    /// - precondition errors ([`ProvisionError::is_precondition`]) before any
    ///   mutating call
    /// - [`ProvisionError::ProviderRejected`] or [`ProvisionError::Transport`]
    ///   from the submission, without retry
    /// - [`ProvisionError::Timeout`] from a readiness stage; the instance is
    ///   left running
    /// - [`ProvisionError::Bootstrap`] from the bootstrap collaborator
    pub async fn create(&self, request: &CreationRequest) -> Result<CreatedInstance, ProvisionError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(ProvisionError::MalformedInput("instance name is required".into()));
        }

        let gateway = self.gateway.as_ref();
        let mut catalog = CatalogCache::new(gateway);
        let os_id = catalog.resolve(Category::Images, &request.image).await?;
        let plan_id = catalog.resolve(Category::Sizes, &request.size).await?;
        let location_id = catalog.resolve(Category::Locations, &request.location).await?;

        let options = validator::validate(gateway, request).await?;

        self.publish(ProvisionEvent::creating(name, &os_id, &plan_id, &location_id));

        let userdata = prepare_userdata(self.renderer.as_ref(), request).await?;
        let form = submission_form(name, &os_id, &plan_id, &location_id, &options, userdata);

        let announced: BTreeMap<String, String> = form
            .iter()
            .filter(|(key, _)| key != "userdata")
            .cloned()
            .collect();
        self.publish(ProvisionEvent::requesting(name, announced));

        let reply = match self.submit(form).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(name = %name, error = %e, "Error creating instance on Vultr");
                if matches!(e, ProvisionError::ProviderRejected { status: 412, .. }) {
                    error!("Status 412 may mean that you are requesting an invalid location, image, or size");
                }
                self.publish(ProvisionEvent::request_failed(name, e.to_string()));
                return Err(e);
            }
        };

        let lookup = reply
            .field("SUBID")
            .and_then(scalar_string)
            .map_or_else(|| InstanceLookup::ByLabel(name.to_string()), InstanceLookup::BySubId);
        info!(name = %name, lookup = %lookup, "Instance requested, waiting for readiness");

        let timeout = request
            .wait_timeout_secs
            .map_or(self.settings.wait_timeout, Duration::from_secs);

        let main_ip = wait_for("network address", timeout, || {
            self.probe(&lookup, ADDRESS_POLL_DELAY, address_ready)
        })
        .await?;
        info!(name = %name, main_ip = %main_ip, "Address assigned");

        let password = match request.explicit_password() {
            Some(password) => password.to_string(),
            None => {
                wait_for("default password", timeout, || {
                    self.probe(&lookup, POLL_DELAY, password_ready)
                })
                .await?
            }
        };

        let status = wait_for("status active", timeout, || {
            self.probe(&lookup, POLL_DELAY, status_ready)
        })
        .await?;
        info!(name = %name, status = %status, "Instance active");

        let server_state = wait_for("server state ok", timeout, || {
            self.probe(&lookup, POLL_DELAY, server_state_ready)
        })
        .await?;
        info!(name = %name, server_state = %server_state, "Server state reached");

        let subid = match &lookup {
            InstanceLookup::BySubId(subid) => subid.clone(),
            InstanceLookup::ByLabel(_) => self.lookup(&lookup).await?.subid,
        };

        let target = BootstrapTarget {
            request: request.clone(),
            subid,
            ssh_host: main_ip.clone(),
            ssh_username: request.ssh_username.clone(),
            password: Some(password),
        };
        let bootstrap_options = BootstrapOptions {
            hard_timeout: self.settings.hard_timeout,
        };
        let mut details = self.bootstrapper.bootstrap(&target, &bootstrap_options).await?;

        let instance = self.lookup(&lookup).await?;
        details.extend(instance.full_record());

        info!(name = %name, subid = %instance.subid, "Created Cloud VM");
        self.publish(ProvisionEvent::created(name, &instance.subid, &main_ip));

        Ok(CreatedInstance { instance, details })
    }

    async fn submit(&self, form: Vec<(String, String)>) -> Result<Reply, ProvisionError> {
        let reply = self.gateway.post_form("server/create", form).await?;
        let status = reply.status_code();
        let error = reply.error_message();
        if status >= 300 || error.is_some() {
            let message = error
                .or_else(|| reply.body().map(Value::to_string))
                .unwrap_or_default();
            return Err(ProvisionError::ProviderRejected { status, message });
        }
        Ok(reply)
    }

    async fn lookup(&self, lookup: &InstanceLookup) -> Result<ProvisionedInstance, ProvisionError> {
        nodes::find_instance(self.gateway.as_ref(), lookup)
            .await?
            .ok_or_else(|| ProvisionError::NotFound(format!("instance with {lookup}")))
    }

    /// One lookup; an instance not listed yet counts as not ready.
    async fn probe<T>(
        &self,
        lookup: &InstanceLookup,
        delay: Duration,
        check: fn(&ProvisionedInstance) -> Option<T>,
    ) -> Result<Readiness<T>, ProvisionError> {
        let instance = nodes::find_instance(self.gateway.as_ref(), lookup).await?;
        Ok(instance
            .as_ref()
            .and_then(check)
            .map_or(Readiness::NotReady(delay), Readiness::Ready))
    }

    /// Destroy a node by label or SUBID, publishing lifecycle events.
    ///
    /// # Errors
    /// [`ProvisionError::NotFound`] for an unknown node, or the provider error.
    pub async fn destroy(&self, name: &str) -> Result<String, ProvisionError> {
        self.publish(ProvisionEvent::destroying(name));
        let subid = nodes::destroy(self.gateway.as_ref(), name).await?;
        self.publish(ProvisionEvent::destroyed(name, &subid));
        Ok(subid)
    }

    /// Power a node on.
    ///
    /// # Errors
    /// [`ProvisionError::NotFound`] for an unknown node, or the provider error.
    pub async fn start(&self, name: &str) -> Result<String, ProvisionError> {
        nodes::start(self.gateway.as_ref(), name).await
    }

    /// Halt a node.
    ///
    /// # Errors
    /// [`ProvisionError::NotFound`] for an unknown node, or the provider error.
    pub async fn stop(&self, name: &str) -> Result<String, ProvisionError> {
        nodes::stop(self.gateway.as_ref(), name).await
    }

    /// One node by label or SUBID.
    ///
    /// # Errors
    /// Returns the gateway error.
    pub async fn show_instance(
        &self,
        name: &str,
    ) -> Result<Option<ProvisionedInstance>, ProvisionError> {
        nodes::show_instance(self.gateway.as_ref(), name).await
    }

    /// Brief node listing.
    ///
    /// # Errors
    /// Returns the gateway error.
    pub async fn list_nodes(&self) -> Result<Vec<(String, NodeSummary)>, ProvisionError> {
        nodes::list_nodes(self.gateway.as_ref()).await
    }

    /// Full node listing keyed by label.
    ///
    /// # Errors
    /// Returns the gateway error.
    pub async fn list_nodes_full(&self) -> Result<Map<String, Value>, ProvisionError> {
        nodes::list_nodes_full(self.gateway.as_ref()).await
    }

    /// Node listing keyed by label, reduced to `selection`.
    ///
    /// # Errors
    /// Returns the gateway error.
    pub async fn list_nodes_select(
        &self,
        selection: &[String],
    ) -> Result<Map<String, Value>, ProvisionError> {
        nodes::list_nodes_select(self.gateway.as_ref(), selection).await
    }
}

/// Fields of the `server/create` form, in submission order.
fn submission_form(
    name: &str,
    os_id: &str,
    plan_id: &str,
    location_id: &str,
    options: &ValidatedOptions,
    userdata: Option<String>,
) -> Vec<(String, String)> {
    let mut form = vec![
        ("label".to_string(), name.to_string()),
        ("OSID".to_string(), os_id.to_string()),
        ("VPSPLANID".to_string(), plan_id.to_string()),
        ("DCID".to_string(), location_id.to_string()),
        ("hostname".to_string(), name.to_string()),
        (
            "enable_private_network".to_string(),
            if options.private_networking { "yes" } else { "no" }.to_string(),
        ),
    ];
    if let Some(script) = &options.startup_script {
        form.push(("SCRIPTID".into(), script.clone()));
    }
    if let Some(iso) = &options.iso {
        form.push(("ISOID".into(), iso.clone()));
    }
    if let Some(url) = &options.ipxe_chain_url {
        form.push(("ipxe_chain_url".into(), url.to_string()));
    }
    if let Some(userdata) = userdata {
        form.push(("userdata".into(), userdata));
    }
    if let Some(group) = &options.firewall_group {
        form.push(("FIREWALLGROUPID".into(), group.clone()));
    }
    if !options.ssh_keys.is_empty() {
        form.push(("SSHKEYID".into(), options.ssh_keys.join(",")));
    }
    form
}

fn address_ready(instance: &ProvisionedInstance) -> Option<String> {
    let ip = instance.main_ip.as_deref().unwrap_or("0");
    (!ip.is_empty() && !ip.starts_with('0')).then(|| ip.to_string())
}

fn password_ready(instance: &ProvisionedInstance) -> Option<String> {
    instance
        .default_password
        .as_deref()
        .filter(|p| !p.is_empty() && *p != PASSWORD_NOT_SUPPORTED)
        .map(str::to_string)
}

fn status_ready(instance: &ProvisionedInstance) -> Option<String> {
    instance.status.clone().filter(|status| status == "active")
}

fn server_state_ready(instance: &ProvisionedInstance) -> Option<String> {
    instance.server_state.clone().filter(|state| state == "ok")
}
