use std::time::Duration;

use anyhow::Context;
use resender::scheduler::Scheduler;
use resender_server::{app::build_router, config::ServerConfig};
use resender_smtp::SmtpDispatcher;
use tracing::{info, warn};

const SMTP_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "resender=info,resender_smtp=info,resender_server=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = ServerConfig::load().context("failed to load configuration")?;
    let dispatcher = SmtpDispatcher::new(&config.smtp).context("failed to configure SMTP")?;

    // An unreachable relay is not fatal: attempts are retried on every interval.
    match tokio::time::timeout(SMTP_CHECK_TIMEOUT, dispatcher.check_health()).await {
        Ok(Ok(())) => info!("SMTP relay {} is reachable", config.smtp.host),
        Ok(Err(err)) => warn!("SMTP relay check failed: {err}"),
        Err(_) => warn!("SMTP relay check timed out after {SMTP_CHECK_TIMEOUT:?}"),
    }

    let scheduler = Scheduler::new(dispatcher).with_default_interval(config.default_interval()?)?;
    let router = build_router(scheduler.clone());

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.graceful_shutdown().await?;
    info!("All schedules stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
