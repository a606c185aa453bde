//! VM provisioning against the Vultr v1 API.
//!
//! A [`CreationRequest`] names its image, size and location by ID or display
//! name. [`Provisioner::create`] resolves those through a per-run catalog
//! snapshot, checks every optional reference (startup script, ISO, firewall
//! group, SSH keys, iPXE URL), submits the instance, waits for it through four
//! readiness stages and hands it to a [`Bootstrapper`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use provision::{CreationRequest, Provisioner, VultrGateway};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let gateway = VultrGateway::new("api_key", "api.vultr.com")?;
//!     let provisioner = Provisioner::new(Arc::new(gateway));
//!
//!     let request = CreationRequest::new(
//!         "host1",
//!         "CentOS 8 x64",
//!         "1024 MB RAM,25 GB SSD,1.00 TB BW",
//!         "Amsterdam",
//!     );
//!     let created = provisioner.create(&request).await?;
//!     println!("{}", created.instance.subid);
//!     Ok(())
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod listing;
pub mod nodes;
pub mod orchestrator;
pub mod poller;
pub mod request;
pub mod userdata;
pub mod validator;

pub use bootstrap::{BootstrapOptions, BootstrapTarget, Bootstrapper, CommandBootstrapper, NoopBootstrapper};
pub use catalog::{CatalogCache, CatalogEntry, Category};
pub use config::ProvisionConfig;
pub use error::ProvisionError;
pub use events::EventSink;
pub use gateway::{Query, Reply, RequestBody, VultrGateway};
pub use listing::Listing;
pub use nodes::{InstanceLookup, NodeSummary, ProvisionedInstance};
pub use orchestrator::{CreatedInstance, ProvisionSettings, Provisioner};
pub use request::CreationRequest;
pub use userdata::{HandlebarsRenderer, TemplateRenderer};
