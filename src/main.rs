use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use prompt_template_service::changefeed::{ChangeEventDispatcher, ChangeFeedConsumer};
use prompt_template_service::config::Settings;
use prompt_template_service::moderation::{
    create_analyzer, ModerationEngine, ModerationPipeline, ModerationWriter,
};
use prompt_template_service::server::{create_app, AppState};
use prompt_template_service::store::{create_content_store, import_templates, ContentStore};
use prompt_template_service::telemetry::init_telemetry;
use prompt_template_service::template::Template;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing (keep the guard alive until exit)
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!(run_mode = %std::env::var("RUN_MODE").unwrap_or_default(), "Configuration loaded");

    // Content store
    let store = create_content_store(&settings.store);
    tracing::info!(backend = store.backend_name(), "Content store initialized");

    // Subscribe before seeding so imported templates get moderated
    let feed = store.subscribe();

    // Moderation pipeline
    let analyzer = create_analyzer(&settings.moderation);
    let engine = ModerationEngine::new(analyzer, &settings.moderation);
    let writer = ModerationWriter::new(store.clone(), &settings.dispatcher);
    let pipeline = Arc::new(ModerationPipeline::new(engine, writer));
    let dispatcher = Arc::new(ChangeEventDispatcher::new(
        pipeline,
        &settings.dispatcher,
        &settings.moderation,
    ));

    // Change feed consumer in background
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let consumer = ChangeFeedConsumer::new(
        feed,
        dispatcher.clone(),
        &settings.dispatcher,
        shutdown_tx.clone(),
    );
    let consumer_handle = tokio::spawn(consumer.run());

    if let Some(path) = settings.server.seed_file.clone() {
        match seed_catalog(store.as_ref(), &path).await {
            Ok(count) => tracing::info!(path = %path, count, "Seed catalog imported"),
            Err(e) => tracing::error!(path = %path, error = %e, "Seed catalog import failed"),
        }
    }

    // Create Axum app
    let addr = settings.server_addr();
    let state = AppState::new(settings, store, dispatcher);
    let app = create_app(state);

    // Start server
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx.clone()))
        .await?;

    // The consumer finishes its current batch before exiting
    tracing::info!("Waiting for change feed consumer to finish...");
    let _ = shutdown_tx.send(());
    if let Err(e) = consumer_handle.await {
        tracing::error!(error = %e, "Change feed consumer task failed");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Import a JSON array of templates, deduplicated by title
async fn seed_catalog(store: &dyn ContentStore, path: &str) -> Result<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path))?;
    let templates: Vec<Template> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path))?;

    Ok(import_templates(store, templates).await)
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stop the change feed consumer
    let _ = shutdown_tx.send(());
}
