//! Provision CLI - create and manage Vultr instances.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use notify::Notifier;
use provision::config::{ENV_API_KEY, ENV_MANAGEMENT_HOST};
use provision::listing::{self, Listing};
use provision::{
    nodes, Bootstrapper, CommandBootstrapper, NoopBootstrapper, ProvisionConfig, Provisioner,
    VultrGateway,
};

/// Provision CLI - Vultr instance provisioning.
#[derive(Parser)]
#[command(name = "provision")]
#[command(about = "Create and manage Vultr instances")]
struct Cli {
    /// Configuration file (YAML).
    #[arg(short, long, env = "PROVISION_CONFIG", default_value = "provision.yaml")]
    config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Emit logs as JSON.
    #[arg(long, default_value = "false")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an instance from a profile and wait until it is ready.
    Create {
        /// Profile from the configuration file.
        #[arg(long)]
        profile: String,

        /// Instance name (label and hostname).
        name: String,
    },

    /// Destroy an instance by name or SUBID.
    Destroy { name: String },

    /// Show one instance.
    Show { name: String },

    /// List instances (brief).
    List,

    /// List instances with every provider field.
    ListFull,

    /// List instances reduced to selected fields.
    ListSelect {
        /// Field to keep (repeatable); `all` keeps everything. Defaults to
        /// provider.query_selection.
        #[arg(long = "field")]
        fields: Vec<String>,
    },

    /// Start an instance.
    Start { name: String },

    /// Halt an instance.
    Stop { name: String },

    /// List datacenter locations.
    Locations,

    /// List VPS plans.
    Sizes,

    /// List operating system images.
    Images,

    /// List startup scripts.
    Scripts,

    /// List SSH keys.
    Keys,

    /// Show one SSH key.
    ShowKey {
        /// SSH key ID.
        name: String,
    },

    /// List ISO images uploaded to the account.
    AcctIsos,

    /// List public ISO images.
    PublicIsos,

    /// List firewall groups.
    FirewallGroups,
}

fn init_logging(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn load_config(path: &Path) -> Result<ProvisionConfig> {
    let config = if tokio::fs::try_exists(path).await.unwrap_or(false) {
        ProvisionConfig::load(path).await?
    } else {
        debug!(path = %path.display(), "Config file not found, using defaults");
        ProvisionConfig::default()
    };
    let config = config.with_overrides(|key| std::env::var(key).ok());
    config
        .validate()
        .with_context(|| format!("Set provider.api_key in {} or {ENV_API_KEY}", path.display()))?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let config = load_config(&cli.config).await?;

    let gateway = VultrGateway::new(&config.provider.api_key, &config.provider.management_host)
        .with_context(|| format!("Failed to create Vultr gateway (see {ENV_MANAGEMENT_HOST})"))?;

    let events = match config.provider.event_webhook_url.as_deref() {
        Some(url) if !url.trim().is_empty() => Notifier::with_webhook(url),
        _ => Notifier::from_env(),
    };
    let bootstrapper: Arc<dyn Bootstrapper> = match config.provider.bootstrap_command.as_deref() {
        Some(command) if !command.trim().is_empty() => Arc::new(CommandBootstrapper::new(command)),
        _ => Arc::new(NoopBootstrapper),
    };

    let events = Arc::new(events);
    let provisioner = Provisioner::new(Arc::new(gateway))
        .with_events(events.clone())
        .with_bootstrapper(bootstrapper)
        .with_settings(config.settings());

    let outcome = run(cli.command, &config, &provisioner).await;
    events.flush().await;
    outcome
}

async fn run(command: Commands, config: &ProvisionConfig, provisioner: &Provisioner) -> Result<()> {
    let gateway = provisioner.gateway();

    match command {
        Commands::Create { profile, name } => {
            let request = config.request(&profile, &name)?;
            info!(name = %name, profile = %profile, "Creating instance");
            let created = provisioner
                .create(&request)
                .await
                .with_context(|| format!("Failed to create instance {name}"))?;
            print_json(&created)?;
        }

        Commands::Destroy { name } => {
            let subid = provisioner
                .destroy(&name)
                .await
                .with_context(|| format!("Failed to destroy instance {name}"))?;
            print_json(&serde_json::json!({ "name": name, "SUBID": subid, "destroyed": true }))?;
        }

        Commands::Show { name } => match provisioner.show_instance(&name).await? {
            Some(instance) => print_json(&instance.full_record())?,
            None => anyhow::bail!("No instance named {name}"),
        },

        Commands::List => {
            let nodes = provisioner.list_nodes().await?;
            println!(
                "\n{:<12} {:<24} {:<10} {:<16}",
                "SUBID", "LABEL", "STATE", "IPv4"
            );
            println!("{}", "-".repeat(64));
            for (label, node) in nodes {
                println!(
                    "{:<12} {:<24} {:<10} {:<16}",
                    node.id,
                    label,
                    node.state.unwrap_or_default(),
                    node.public_ips.unwrap_or_default()
                );
            }
        }

        Commands::ListFull => print_json(&provisioner.list_nodes_full().await?)?,

        Commands::ListSelect { fields } => {
            let selection = if fields.is_empty() {
                config.provider.query_selection.clone()
            } else {
                fields
            };
            if selection.is_empty() {
                anyhow::bail!("No fields selected: pass --field or set provider.query_selection");
            }
            print_json(&provisioner.list_nodes_select(&selection).await?)?;
        }

        Commands::Start { name } => {
            let subid = provisioner.start(&name).await?;
            print_json(&serde_json::json!({ "name": name, "SUBID": subid, "action": "start" }))?;
        }

        Commands::Stop { name } => {
            let subid = provisioner.stop(&name).await?;
            print_json(&serde_json::json!({ "name": name, "SUBID": subid, "action": "halt" }))?;
        }

        Commands::ShowKey { name } => print_json(&nodes::show_keypair(gateway, &name).await?)?,

        Commands::Locations => print_json(&listing::list(gateway, Listing::Locations).await?)?,
        Commands::Sizes => print_json(&listing::list(gateway, Listing::Sizes).await?)?,
        Commands::Images => print_json(&listing::list(gateway, Listing::Images).await?)?,
        Commands::Scripts => print_json(&listing::list(gateway, Listing::Scripts).await?)?,
        Commands::Keys => print_json(&listing::list(gateway, Listing::SshKeys).await?)?,
        Commands::AcctIsos => print_json(&listing::list(gateway, Listing::AccountIsos).await?)?,
        Commands::PublicIsos => print_json(&listing::list(gateway, Listing::PublicIsos).await?)?,
        Commands::FirewallGroups => {
            print_json(&listing::list(gateway, Listing::FirewallGroups).await?)?;
        }
    }

    Ok(())
}
