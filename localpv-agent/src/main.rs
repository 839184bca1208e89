// SPDX-License-Identifier: GPL-3.0-only

//! Node agent for partition-backed local volumes
//!
//! Wires the partition engine to the command line, for operators and for the
//! orchestration layer that drives volume requests on this node. Results go
//! to stdout, logs to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use localpv_contracts::{DiskDiscovery, VolumeProvisioner};
use localpv_sys::{Config, PartitionManager};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

mod output;
mod request;

use output::Format;

#[derive(Parser)]
#[command(name = "localpv-agent")]
#[command(about = "Provision node-local volumes as GPT partitions", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Node id, overriding the config file and LOCALPV_NODE_ID
    #[arg(long)]
    node_id: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List disk and loop devices
    Disks,
    /// List prepared disks with their largest free extent
    Inventory,
    /// List volume partitions on prepared disks
    Volumes,
    /// Create a volume partition
    Create {
        /// Volume name, used as the partition label
        name: String,
        /// Size in bytes or with a unit (e.g. 10GiB)
        size: String,
        /// Pattern matched against disk meta labels; empty matches any
        /// prepared disk. Disks without a meta partition are never used.
        #[arg(long, short, default_value = "")]
        pattern: String,
    },
    /// Wipe and delete a volume partition
    Destroy {
        /// Volume name
        name: String,
        /// Pattern matched against disk meta labels; empty matches any
        /// prepared disk
        #[arg(long, short, default_value = "")]
        pattern: String,
    },
    /// Print the device node of a volume
    Path {
        /// Volume name
        name: String,
        /// Pattern matched against disk meta labels; empty matches any
        /// prepared disk
        #[arg(long, short, default_value = "")]
        pattern: String,
    },
    /// Provision a volume request and print the resulting status as JSON
    Provision {
        /// JSON volume request file, `-` for stdin
        request: PathBuf,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(node_id) = &cli.node_id {
        config.node_id = node_id.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("localpv_agent=info,localpv_sys=info,warn")
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Arc::new(load_config(&cli)?);
    let format = if cli.json { Format::Json } else { Format::Text };

    if unsafe { libc::geteuid() } != 0 {
        tracing::error!("localpv-agent must run as root");
        anyhow::bail!("Partition management requires root privileges");
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling running commands");
            on_signal.cancel();
        }
    });

    let manager = PartitionManager::on_host(config.clone(), cancel);

    match cli.command {
        Commands::Disks => {
            let disks = manager.list_disks().await?;
            output::print_disks(format, &disks)?;
        }
        Commands::Inventory => {
            let devices = manager.list_disk_inventory().await?;
            output::print_inventory(format, &devices)?;
        }
        Commands::Volumes => {
            let volumes = VolumeProvisioner::list_volumes(&manager).await?;
            output::print_volumes(format, &volumes)?;
        }
        Commands::Create {
            name,
            size,
            pattern,
        } => {
            let size_bytes = localpv_types::pretty_to_bytes(&size)
                .with_context(|| format!("Invalid size {size:?}"))?;
            VolumeProvisioner::create_volume(&manager, &name, &pattern, size_bytes).await?;
            let path = manager.device_path(&name, &pattern).await?;
            output::print_path(format, &name, &path)?;
        }
        Commands::Destroy { name, pattern } => {
            VolumeProvisioner::destroy_volume(&manager, &name, &pattern).await?;
            tracing::info!("Volume {} destroyed", name);
        }
        Commands::Path { name, pattern } => {
            let path = manager.device_path(&name, &pattern).await?;
            output::print_path(format, &name, &path)?;
        }
        Commands::Provision { request } => {
            let node_id = config.require_node_id()?;
            let request = request::read_request(&request)?;
            let status = request::provision_on_node(&manager, node_id, &request).await;
            println!("{}", serde_json::to_string(&status)?);
        }
    }

    Ok(())
}
