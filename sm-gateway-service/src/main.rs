//! sm-gateway: Sovereign Mind MCP gateway
//!
//! Exposes Snowflake, Asana, Make, GitHub, ElevenLabs and Hive Mind tools to
//! MCP clients over two transports on one listener:
//!   POST /mcp                      # streaming HTTP (Mcp-Session-Id header)
//!   GET  /sse + POST /messages     # server-push (SSE)
//!
//! Credentials come from the environment (SNOWFLAKE_*, ASANA_*, MAKE_*,
//! GITHUB_TOKEN, ELEVENLABS_API_KEY); a backend without them stays listed
//! but answers ConfigurationMissing.
//!
//! Usage:
//!   sm-gateway                             # 0.0.0.0:8000
//!   sm-gateway --port 3001 --json-logs
//!   sm-gateway --config gateway.toml

use anyhow::{Context, Result};
use clap::Parser;
use sm_core::{BackendKind, GatewayConfig, GATEWAY_NAME, GATEWAY_VERSION};
use sm_mcp::Gateway;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sm-gateway")]
#[command(about = "Sovereign Mind MCP gateway", version)]
struct Cli {
    /// TOML config file (environment variables override it)
    #[arg(long, short, env = "SM_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(long, short)]
    port: Option<u16>,

    /// Log level, used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!(error = %e, "Failed to listen for ctrl-c"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    info!(name = GATEWAY_NAME, version = GATEWAY_VERSION, "Starting gateway");

    let mut config =
        GatewayConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    for kind in BackendKind::ALL {
        if !config.is_configured(kind) {
            warn!(
                backend = %kind,
                missing = ?config.missing_settings(kind),
                "Backend disabled"
            );
        }
    }

    let gateway = Gateway::from_config(&config).context("Failed to build tool registry")?;
    info!(
        idle_timeout_secs = config.server.idle_timeout.as_secs(),
        push_queue = config.server.push_queue_capacity,
        "Session limits"
    );

    sm_mcp::serve(Arc::new(gateway), &config.server.bind_addr(), shutdown_signal()).await
}
