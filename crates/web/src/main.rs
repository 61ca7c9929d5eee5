//! fern-mockd
//!
//! Serves the PM tool emulators as a standalone process so a deployed stack
//! driven by a browser can reach them over the network.

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fern_mock_web::{
    Emulator, EmulatorHandle, GraphqlEmulator, JiraEmulator, MockServerConfig, PmToolEmulator,
};

#[derive(Parser)]
#[command(name = "fern-mockd")]
#[command(about = "PM tool emulators for Fern acceptance tests")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FERN_MOCK_CONFIG")]
    config: Option<PathBuf>,

    /// Interface to bind (overrides the config file)
    #[arg(long, env = "FERN_MOCK_HOST")]
    host: Option<String>,

    /// JIRA emulator port (0 = ephemeral)
    #[arg(long, env = "FERN_MOCK_JIRA_PORT")]
    jira_port: Option<u16>,

    /// GraphQL emulator port (0 = ephemeral)
    #[arg(long, env = "FERN_MOCK_GRAPHQL_PORT")]
    graphql_port: Option<u16>,

    /// Generic PM tool emulator port (0 = ephemeral)
    #[arg(long, env = "FERN_MOCK_PM_TOOL_PORT")]
    pm_tool_port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "FERN_MOCK_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }

    info!("fern-mockd v{}", fern_common::VERSION);

    let mut config = match &cli.config {
        Some(path) => MockServerConfig::load(path)?,
        None => MockServerConfig::default(),
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.jira_port {
        config.jira.port = port;
    }
    if let Some(port) = cli.graphql_port {
        config.graphql.port = port;
    }
    if let Some(port) = cli.pm_tool_port {
        config.pm_tool.port = port;
    }

    let ip: IpAddr = config.host.parse()?;
    let mut handles = Vec::new();

    if config.jira.enabled {
        let jira = JiraEmulator::new(config.jira.clone());
        handles.push(start(&jira, SocketAddr::new(ip, config.jira.port)).await?);
    }
    if config.graphql.enabled {
        let graphql = GraphqlEmulator::new(config.graphql.clone());
        handles.push(start(&graphql, SocketAddr::new(ip, config.graphql.port)).await?);
    }
    if config.pm_tool.enabled {
        let pm_tool = PmToolEmulator::new(config.pm_tool.clone());
        handles.push(start(&pm_tool, SocketAddr::new(ip, config.pm_tool.port)).await?);
    }

    if handles.is_empty() {
        anyhow::bail!("no emulators enabled");
    }

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    for handle in handles {
        handle.shutdown().await?;
    }

    info!("fern-mockd shutdown complete");
    Ok(())
}

async fn start(emulator: &dyn Emulator, addr: SocketAddr) -> anyhow::Result<EmulatorHandle> {
    let handle = EmulatorHandle::spawn_on(emulator, addr).await?;
    // one line per emulator on stdout for wrapper scripts
    println!("{}={}", handle.name(), handle.base_url());
    Ok(handle)
}
