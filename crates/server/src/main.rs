mod api;
mod bootstrap;
mod health;

use anyhow::Result;
use pulsey_core::config::{AppConfig, LoadOptions};
use tracing::{error, info, warn};

/// How often the scheduler sweep checks for due instance schedules.
const SCHEDULER_POLL_SECS: u64 = 60;

fn init_logging(config: &AppConfig) {
    use pulsey_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let refresh_worker = app.refresh_worker.clone();
    let refresh_task = tokio::spawn(async move { refresh_worker.run().await });

    let scheduler = app.orchestrator.clone();
    let scheduler_task = tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(SCHEDULER_POLL_SECS));
        loop {
            interval.tick().await;
            match scheduler.run_due_schedules().await {
                Ok(0) => {}
                Ok(triggered) => info!(
                    event_name = "system.scheduler.swept",
                    triggered, "scheduled runs triggered"
                ),
                Err(sweep_error) => warn!(
                    event_name = "system.scheduler.sweep_failed",
                    error = %sweep_error,
                    "scheduler sweep failed; will retry next interval"
                ),
            }
        }
    });

    let router = api::router(api::ApiState {
        orchestrator: app.orchestrator.clone(),
        stores: app.stores.clone(),
    })
    .merge(health::router(app.db_pool.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "pulsey-server listening"
    );

    let serve_result = axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown())
        .await;

    refresh_task.abort();
    scheduler_task.abort();

    if let Err(serve_error) = serve_result {
        error!(
            event_name = "system.server.error",
            correlation_id = "shutdown",
            error = %serve_error,
            "server terminated unexpectedly"
        );
        return Err(serve_error.into());
    }

    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "pulsey-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(signal_error) = tokio::signal::ctrl_c().await {
        error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %signal_error,
            "could not listen for shutdown signal"
        );
    }
}
