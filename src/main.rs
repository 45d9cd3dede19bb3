#![allow(clippy::result_large_err)]

use birthday_notifier::{
    api::{self, AppState},
    config::{self, database},
    errors::Result,
    scheduler, transport,
};
use dotenvy::dotenv;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars may also be set externally
    dotenv().ok();

    // 3. Load the process configuration
    let app_config = config::load_app_configuration()
        .inspect_err(|e| error!("Failed to load application configuration: {}", e))?;
    info!(
        bind_address = %app_config.bind_address,
        transport = ?app_config.transport.kind,
        "Configuration loaded"
    );

    // 4. Connect and ensure the schema
    let db = database::create_connection(&app_config.database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Build the outbound transport
    let transport = transport::build_transport(&app_config.transport)
        .inspect(|t| info!("Using {} transport", t.name()))
        .inspect_err(|e| error!("Failed to build transport: {}", e))?;

    // 6. Start the background trigger
    let cancel = CancellationToken::new();
    let scheduler_handle = if app_config.scheduler.enabled {
        Some(tokio::spawn(scheduler::run(
            db.clone(),
            Arc::clone(&transport),
            Duration::from_secs(app_config.scheduler.poll_interval_secs),
            app_config.transport.timeout(),
            cancel.clone(),
        )))
    } else {
        warn!("Scheduler disabled in config; only manual triggers will run");
        None
    };

    // 7. Serve the admin API until a shutdown signal arrives
    let listener = tokio::net::TcpListener::bind(&app_config.bind_address)
        .await
        .inspect_err(|e| error!("Failed to bind {}: {}", app_config.bind_address, e))?;
    info!("Admin API listening on {}", app_config.bind_address);

    let state = AppState {
        db,
        transport,
        config: Arc::new(app_config),
    };
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 8. Stop the scheduler and let an in-flight run finish
    cancel.cancel();
    if let Some(handle) = scheduler_handle {
        match tokio::time::timeout(Duration::from_secs(30), handle).await {
            Ok(Ok(())) => info!("Scheduler stopped"),
            Ok(Err(e)) => error!("Scheduler task panicked: {}", e),
            Err(_) => warn!("Scheduler did not stop within 30s"),
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
