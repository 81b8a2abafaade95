use anyhow::{Context, Result};
use clap::Parser;
use intercom_relay::{
    create_router, AppState, Config, NatsPublisher, RelayFacade, StaticDirectory, TcpConnector,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "intercom-relay", version, about = "Bidirectional audio relay for intercom devices")]
struct Cli {
    /// Config file path (extension optional)
    #[arg(short, long, default_value = "config/intercom-relay")]
    config: String,

    /// Log level or filter, overrides the config file (RUST_LOG wins over both)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    let level = cli.log_level.as_deref().unwrap_or(&cfg.service.log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Device port {}, {} configured devices", cfg.device.port, cfg.devices.len());

    let publisher = Arc::new(NatsPublisher::connect(&cfg.nats.url, &cfg.nats.subject_prefix).await?);
    let connector = Arc::new(TcpConnector::new(cfg.transport_config()));
    let relay = RelayFacade::new(connector, publisher, cfg.session_config());
    let directory = Arc::new(StaticDirectory::new(cfg.devices.clone()));

    let app = create_router(AppState::new(relay.clone(), directory));

    let addr = cfg.http_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;
    info!("HTTP API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    relay.shutdown().await;
    info!("Shut down cleanly");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
