use gateway::{app, config::get_configuration, logging::setup_logging, state::AppState};
use inference::{InferenceService, ModelCatalog, ModelRegistry, OrtLoader};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_configuration()?;
    let _telemetry = setup_logging(&config)?;

    tracing::info!(
        environment = config.environment.as_str(),
        address = %config.address(),
        models_dir = %config.models_dir.display(),
        default_model = config.default_model().unwrap_or("<none>"),
        output_format = ?config.output_format,
        max_upload_bytes = config.max_upload_bytes,
        request_timeout_ms = config.request_timeout_ms,
        "Gateway configuration loaded"
    );

    let loader = OrtLoader::new(
        ModelCatalog::new(config.models_dir.clone()),
        config.detector_config(),
    );
    let registry = Arc::new(ModelRegistry::new(Arc::new(loader)));
    let service = InferenceService::new(registry, config.inference_config());

    // The server also starts without a model; /detect answers 503 until one loads
    if let Some(name) = config.default_model() {
        match service.load_model(name).await {
            Ok(handle) => tracing::info!(model = %handle.name, "Default model ready"),
            Err(e) => tracing::warn!(model = name, error = %e, "Default model unavailable"),
        }
    }

    let router = app(AppState::new(service));
    let listener = tokio::net::TcpListener::bind(config.address()).await?;
    tracing::info!("Gateway listening on {}", config.address());

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
