//! services/api/src/bin/api.rs

use api_lib::{
    adapters::SqliteTableStore,
    config::Config,
    error::ApiError,
    web::{
        get_session_handler, health_handler, list_rows_handler, post_event_handler,
        rest::ApiDoc, search_rows_handler, spawn_session_sweeper, state::AppState,
    },
};
use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        Method,
    },
    routing::{get, post},
    Router,
};
use nettable_core::registry::SessionRegistry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open the Table & Run Migrations ---
    info!("Connecting to database...");
    let store = Arc::new(
        SqliteTableStore::connect(&config.database_url, config.db_max_connections).await?,
    );
    info!("Running database migrations...");
    store.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Build the Session Registry & Start the Sweeper ---
    let registry = Arc::new(SessionRegistry::new(store.clone(), config.session_timeout));
    let shutdown = CancellationToken::new();
    let sweeper = spawn_session_sweeper(registry.clone(), config.sweep_interval, shutdown.clone());

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(registry));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    let api_router = Router::new()
        .route("/events", post(post_event_handler))
        .route("/sessions/{user_id}", get(get_session_handler))
        .route("/rows", get(list_rows_handler))
        .route("/rows/search", get(search_rows_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // --- 7. Shut Down ---
    shutdown.cancel();
    if let Err(e) = sweeper.await {
        error!("Session sweeper ended abnormally: {:?}", e);
    }
    store.close().await;
    info!("Server stopped.");

    Ok(())
}

/// Resolves on Ctrl+C and tells background tasks to stop.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for the shutdown signal: {}", e);
    }
    info!("Shutdown signal received.");
    shutdown.cancel();
}
