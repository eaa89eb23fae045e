//! doipd - DoIP Daemon
//!
//! Serves DoIP (ISO 13400) diagnostic connections over TCP and logs every
//! UDS request it receives.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 0.0.0.0:13400, 4 channels
//! ./doipd
//!
//! # With config file and overrides
//! ./doipd --config config/doipd.toml --port 13401 --verbose
//! ```

use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use doip_transport::{DoIpConfig, DoIpServer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod sink;

use sink::LoggingUdsSink;

/// Handler id reported to the transport manager
const HANDLER_ID: u8 = 0;

#[derive(Parser, Debug)]
#[command(name = "doipd")]
#[command(about = "DoIP (ISO 13400) TCP daemon")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address, overrides the config file
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Listen port, overrides the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum number of tester connections, overrides the config file
    #[arg(long)]
    max_channels: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply_overrides(&self, config: &mut DoIpConfig) {
        if let Some(bind) = self.bind {
            config.tcp.ip_address = bind;
        }
        if let Some(port) = self.port {
            config.tcp.port = port;
        }
        if let Some(max_channels) = self.max_channels {
            config.tcp.max_channels = max_channels;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "doipd=debug,doip_transport=debug"
    } else {
        "doipd=info,doip_transport=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting doipd (DoIP Daemon)");

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from: {}", path);
            DoIpConfig::load(path).with_context(|| format!("Failed to load config {path}"))?
        }
        None => DoIpConfig::default(),
    };
    args.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        address = %config.tcp.ip_address,
        port = config.tcp.port,
        max_channels = config.tcp.max_channels,
        entity = format_args!("0x{:04X}", config.primary_target_address),
        node_type = config.node_type,
        "Configuration loaded"
    );

    let sink = Arc::new(LoggingUdsSink::new());
    let server = DoIpServer::start(config, HANDLER_ID, sink.clone())
        .await
        .context("Failed to start DoIP server")?;
    info!("DoIP server listening on {}", server.local_addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    server.stop().await;
    info!(received = sink.received(), "doipd stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_config_values() {
        let args = Args::parse_from([
            "doipd",
            "--bind",
            "127.0.0.1",
            "--port",
            "13401",
            "--max-channels",
            "2",
        ]);
        let mut config = DoIpConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.tcp.ip_address, "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(config.tcp.port, 13401);
        assert_eq!(config.tcp.max_channels, 2);
    }

    #[test]
    fn test_no_overrides_keep_defaults() {
        let args = Args::parse_from(["doipd"]);
        let mut config = DoIpConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.tcp.port, 13400);
        assert_eq!(config.tcp.max_channels, 4);
    }

    #[test]
    fn test_bundled_config_is_valid() {
        let config = DoIpConfig::from_toml_str(include_str!("../config/doipd.toml")).unwrap();
        assert_eq!(config.target_addresses, vec![0x0010, 0x0011]);
        assert_eq!(config.routing_activation.min_source_address, 0x0E00);
        assert_eq!(config.node_type, 1);
    }
}
