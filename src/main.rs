//! Local edge emulator for the serverless JSON-RPC gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     HTTP client
//!         │
//!         ▼
//!   ┌──────────────┐    ┌─────────────────┐    ┌──────────────────┐
//!   │ http::server │───▶│ gateway         │───▶│ http::upstream   │
//!   │ (edge event) │    │ (GET reject,    │    │ (relay, optional │
//!   │              │◀───│  decode, record)│◀───│  auth transport) │
//!   └──────────────┘    └─────────────────┘    └────────┬─────────┘
//!                                                       │
//!                                                       ▼
//!                                              JSON-RPC server
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use cloud_rpc_gateway::auth::{AuthTransport, HttpForwarder, SharedForward};
use cloud_rpc_gateway::config::{load_config, GatewayConfig};
use cloud_rpc_gateway::gateway::ProtocolHandler;
use cloud_rpc_gateway::http::{Delivery, GatewayServer, UpstreamHandler};
use cloud_rpc_gateway::lifecycle::{self, Shutdown};
use cloud_rpc_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "cloud-rpc-gateway")]
#[command(about = "Run the serverless JSON-RPC gateway behind a local edge emulator", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability.log_level);
    tracing::info!("cloud-rpc-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.url,
        request_timeout_secs = config.listener.request_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.listener.request_timeout_secs))
        .build()?;
    let forward: SharedForward = Arc::new(HttpForwarder::with_client(client));
    let handler: Arc<dyn ProtocolHandler> = match &config.transport {
        Some(transport) => {
            let transport = AuthTransport::from_config(transport, forward).await?;
            tracing::info!(scheme = transport.scheme(), url = transport.url(), "Authenticated upstream");
            Arc::new(UpstreamHandler::authenticated(Arc::new(transport)))
        }
        None => Arc::new(UpstreamHandler::new(
            config.upstream.url.clone(),
            Delivery::Plain(forward),
        )),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = GatewayServer::new(config, handler);

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        lifecycle::trigger_on_signal(&signal_shutdown).await;
    });

    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
