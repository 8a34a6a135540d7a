use anyhow::Result;
use clap::Parser;
use graphsheet_gateway::config::{CliArgs, ServerConfig};
use graphsheet_gateway::server::GatewayServer;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing();

    let config = Arc::new(ServerConfig::from_args(args)?);
    let server = GatewayServer::new(config)?;
    server.run().await
}
