use std::sync::Arc;

use clap::{Parser, ValueEnum};
use serde_json::Value;

use cloud_rpc_gateway::auth::{AuthTransport, HttpForwarder};
use cloud_rpc_gateway::config::{ApiKeyConfig, IamConfig, TransportConfig};
use cloud_rpc_gateway::observability::logging;
use cloud_rpc_gateway::RpcClient;

#[derive(Clone, Copy, ValueEnum)]
enum Scheme {
    ApiKey,
    Iam,
}

#[derive(Parser)]
#[command(name = "rpc-call")]
#[command(about = "Call a JSON-RPC method on a deployed gateway", long_about = None)]
struct Cli {
    /// Gateway endpoint.
    #[arg(short, long)]
    url: String,

    #[arg(short, long, value_enum, default_value = "iam")]
    scheme: Scheme,

    /// Shared-secret access key (api-key scheme).
    #[arg(long, env = "RPC_ACCESS", default_value = "")]
    access: String,

    /// Shared-secret secret (api-key scheme).
    #[arg(long, env = "RPC_SECRET", default_value = "", hide_env_values = true)]
    secret: String,

    /// Role to assume before signing (iam scheme).
    #[arg(long)]
    role: Option<String>,

    #[arg(long, requires = "role")]
    external_id: Option<String>,

    /// Signing region; falls back to AWS_REGION.
    #[arg(long)]
    region: Option<String>,

    /// Send as a notification and do not expect a result.
    #[arg(long)]
    notify: bool,

    #[arg(long, default_value = "warn")]
    log_level: String,

    method: String,

    /// JSON params, e.g. '{"name":"echo"}'.
    params: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let params: Option<Value> = cli.params.as_deref().map(serde_json::from_str).transpose()?;

    let config = match cli.scheme {
        Scheme::ApiKey => TransportConfig::ApiKey(ApiKeyConfig {
            url: cli.url,
            access: cli.access,
            secret: cli.secret,
        }),
        Scheme::Iam => TransportConfig::Iam(IamConfig {
            url: cli.url,
            role: cli.role,
            external_id: cli.external_id,
            region: cli.region,
            ..Default::default()
        }),
    };

    let transport = AuthTransport::from_config(&config, HttpForwarder::shared()).await?;
    let client = RpcClient::new(Arc::new(transport));

    if cli.notify {
        client.notify(&cli.method, params).await?;
        eprintln!("Notification accepted");
        return Ok(());
    }

    let result = client.call(&cli.method, params).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
