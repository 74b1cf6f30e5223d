use contact_service::config::ContactConfig;
use contact_service::services::init_metrics;
use contact_service::startup::Application;
use secrecy::ExposeSecret;
use service_core::observability::init_tracing;
use tokio::signal;

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize metrics (must be before any metrics are recorded)
    init_metrics();

    let config = ContactConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        port = config.common.port,
        storage_endpoint = %config.storage.endpoint,
        avatar_bucket = %config.storage.avatar_bucket_id,
        storage_api_key_set = !config.storage.api_key.expose_secret().is_empty(),
        "Starting contact-service"
    );

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    app.run_until_stopped(shutdown_signal()).await?;

    tracing::info!("contact-service stopped");
    Ok(())
}
