//! rdfwd-host: connects a local forwarding engine to a guest agent's
//! control channel and applies the configured association rules.
//!
//! This binary is host plumbing, not part of the engine's semantics: it
//! wires [`rdfwd::Forwarder`] to a demonstration length-prefixed TCP
//! transport (`transport.rs`) and a TOML config file (`config.rs`).

mod config;
mod transport;

use clap::Parser;
use config::HostConfig;
use rdfwd::Forwarder;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// rdfwd-host — connection-forwarding engine host
#[derive(Parser, Debug)]
#[command(name = "rdfwd-host", version, about = "Connection-forwarding engine host")]
struct Cli {
    /// Address of the guest agent's control channel (host:port)
    #[arg(long)]
    agent_addr: Option<String>,

    /// Config file path
    #[arg(long, default_value = "~/.rdfwd/config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting rdfwd-host");

    let config_path = PathBuf::from(&cli.config);
    let host_config = match HostConfig::load(Some(&config_path), cli.agent_addr.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    info!(addr = %host_config.agent_addr, "connecting to agent control channel");
    let (read_half, sink) = match transport::connect(&host_config.agent_addr).await {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, addr = %host_config.agent_addr, "failed to connect to agent");
            std::process::exit(1);
        }
    };

    let forwarder = Forwarder::new(sink);

    for rule in &host_config.remote_rules {
        if !forwarder.associate_remote(rule) {
            warn!(rule, "startup associate_remote rule rejected");
        }
    }
    for rule in &host_config.local_rules {
        if !forwarder.associate_local(rule).await {
            warn!(rule, "startup associate_local rule rejected");
        }
    }

    let inbound_forwarder = forwarder.clone();
    tokio::select! {
        _ = transport::run_inbound(read_half, inbound_forwarder) => {
            warn!("agent channel closed, tearing down forwarder");
            forwarder.agent_disconnected();
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
            forwarder.delete();
        }
    }

    info!("rdfwd-host stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
