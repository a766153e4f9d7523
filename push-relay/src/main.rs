use std::sync::Arc;

use anyhow::Context;
use push_relay::api::{ApiServer, ApiServerConfig, AppState};
use push_relay::config::ServiceConfig;
use push_relay::database;
use push_relay::logging::init_logging;
use push_relay::services::ServiceContext;
use push_relay::utils::{fs, http_client};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = ServiceConfig::from_env().context("loading configuration")?;
    let (logging_config, _log_guard) = init_logging(&config.log_dir)?;
    config.log_fallbacks();
    http_client::install_rustls_provider();

    // Initialize database
    if let Some(path) = database::sqlite_file_path(&config.database_url) {
        fs::ensure_parent_dir(&path).await?;
    }
    let pool = database::init_pool(&config.database_url)
        .await
        .context("opening database")?;
    database::run_migrations(&pool)
        .await
        .context("running migrations")?;

    let api_config = ApiServerConfig::from_service_config(&config);
    let context = Arc::new(ServiceContext::new(config, pool)?);
    context.initialize().await?;

    let log_cleanup = logging_config.start_retention_cleanup(context.cancellation_token());

    let state = AppState::new(context.clone()).with_logging_config(logging_config);
    let server = ApiServer::with_state(api_config, state);
    let server_task = tokio::spawn(async move { server.run().await });

    tracing::info!("push-relay initialized successfully");

    let shutdown_token = context.cancellation_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    // The server only returns on shutdown or a bind/serve error.
    let served = server_task.await.context("API server task panicked")?;
    context.shutdown().await;
    let _ = log_cleanup.await;

    served?;
    tracing::info!("push-relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
