use std::net::IpAddr;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;

use soroban_relay::config::RelayConfig;
use soroban_relay::server::{build_router, AppState};

#[derive(Debug, Parser)]
#[command(name = "soroban-relay", version, about)]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,
}

#[cfg(feature = "trace")]
fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("soroban_relay=info,tower_http=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(not(feature = "trace"))]
fn init_tracing() {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = RelayConfig::from_env();
    tracing::info!(
        networks = ?config.networks.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(),
        max_attempts = config.settlement.max_attempts,
        poll_delay_secs = config.settlement.delay.as_secs(),
        max_settle_secs = config.settlement.max_wait().as_secs(),
        "starting relay"
    );
    let state = AppState::from_config(&config).context("invalid relay configuration")?;
    let supervisor = state.supervisor().clone();
    let app = build_router(state);

    let listener = TcpListener::bind((args.host, args.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", args.host, args.port))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let pending = supervisor.in_flight();
    if pending > 0 {
        tracing::warn!(pending, "shutting down with settlements still in flight");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
