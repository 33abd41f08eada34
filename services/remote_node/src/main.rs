//! Remote actor node - one executable for both roles
//!
//! Usage:
//!   remote-node --config config/slave.toml
//!   remote-node --role slave --listen 0.0.0.0:7400
//!   remote-node --role master --connect 10.0.0.5:7400 --demo

mod actors;
mod node;

use anyhow::{Context, Result};
use clap::Parser;
use config::{LoggingSettings, NodeConfig, NodeRole};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "remote-node")]
#[command(about = "Remote actor protocol node (master or slave)")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Role to run as (master, slave)
    #[arg(short, long)]
    role: Option<NodeRole>,

    /// Address to accept peers on
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Peer to dial; repeat for several
    #[arg(long)]
    connect: Vec<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,

    /// Master only: create a counter on the first slave and exercise it
    #[arg(long)]
    demo: bool,
}

impl Args {
    /// Command line flags win over the file
    fn apply(&self, config: &mut NodeConfig) {
        if let Some(role) = self.role {
            config.node.role = role;
        }
        if let Some(listen) = self.listen {
            config.network.listen = Some(listen);
        }
        if !self.connect.is_empty() {
            config.network.connect = self.connect.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        NodeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);

    init_logging(&config.logging)?;
    config.validate().context("Invalid configuration")?;

    info!("Starting remote node");
    if let Some(path) = &args.config {
        info!("Configuration: {}", path.display());
    }

    let runtime = Arc::new(node::start(&config).await?);

    if args.demo {
        match runtime.master() {
            Some(master) => {
                let master = master.clone();
                tokio::spawn(async move {
                    if let Err(e) = node::run_demo(master).await {
                        error!("Demo failed: {:#}", e);
                    }
                });
            }
            None => warn!("--demo ignored, node is not a master"),
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install CTRL+C signal handler")?;
    info!("Received shutdown signal");

    runtime.shutdown().await;
    Ok(())
}

fn init_logging(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .with_context(|| format!("Invalid log level {:?}", settings.level))?;

    if settings.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_file() {
        let args = Args::parse_from([
            "remote-node",
            "--role",
            "slave",
            "--listen",
            "127.0.0.1:7400",
            "--connect",
            "127.0.0.1:7401",
            "--connect",
            "127.0.0.1:7402",
            "--log-level",
            "debug",
            "--json-logs",
        ]);
        let mut config = NodeConfig::default();
        args.apply(&mut config);

        assert_eq!(config.node.role, NodeRole::Slave);
        assert_eq!(config.network.listen, Some("127.0.0.1:7400".parse().unwrap()));
        assert_eq!(config.network.connect.len(), 2);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_no_flags_keep_file_values() {
        let args = Args::parse_from(["remote-node"]);
        let mut config =
            NodeConfig::from_toml_str("[node]\nrole = \"slave\"\n[logging]\nlevel = \"warn\"")
                .unwrap();
        args.apply(&mut config);

        assert_eq!(config.node.role, NodeRole::Slave);
        assert_eq!(config.logging.level, "warn");
        assert!(!config.logging.json);
    }
}
