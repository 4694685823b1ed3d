use anyhow::{Context, Result};
use clap::Parser;
use ragdesk::{api, config::Config, logging, processing::RagService};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Ragdesk HTTP server.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Port to listen on; overrides `SERVER_PORT`.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing();

    let config = Config::load().context("failed to load configuration")?;
    let port = cli.port.unwrap_or(config.server_port);

    let service = RagService::from_config(&config)
        .await
        .context("failed to initialize pipeline")?;
    let app = api::create_router(Arc::new(service), config.max_upload_bytes);

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("server terminated")?;
    Ok(())
}
