//! Device lock controller service.
//!
//! Restores persisted state, re-arms durable work, then serves platform
//! signals on a local HTTP endpoint until interrupted.

mod api;
mod config;
mod context;
mod platform;
mod runtime;
mod signals;

#[cfg(test)]
mod test_support;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ControllerConfig;
use crate::signals::PlatformSignal;

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let config = ControllerConfig::from_env()?;
    info!(
        "Starting device lock controller (backend {}, debug {})",
        config.api_url, config.debug
    );
    let listen_addr = config.listen_addr;
    let context = context::build_context(config)?;

    // The process starting is treated as a boot: policies are re-applied and
    // alarms re-armed from persisted state.
    if let Err(err) = signals::handle_signal(&context, PlatformSignal::BootCompleted).await {
        warn!("Startup restore failed: {}", err);
    }
    runtime::start_work_loop(context.clone()).await;

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;
    info!("Listening for platform signals on {}", listen_addr);
    axum::serve(listener, api::router(context.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Signal server failed")?;

    runtime::stop_work_loop(&context).await;
    context.transports.shutdown();
    info!("Controller stopped");
    Ok(())
}
