//! services/offline/src/bin/gateway.rs

use axum::extract::DefaultBodyLimit;
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use offline_lib::{
    config::Config,
    context::OfflineContext,
    error::{ServiceError, ServiceResult},
    web::{app_router, proxy::MAX_BODY_BYTES, rest::ApiDoc, state::AppState},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> ServiceResult<()> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting gateway...");

    // --- 2. Open Storage, Precache, and Build Components ---
    info!("Opening local storage at {}", config.database_url);
    let context = Arc::new(OfflineContext::init(config.clone()).await?);
    context.start();

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState::from_context(&context));

    let cors_origin = config
        .cors_origin
        .clone()
        .unwrap_or_else(|| config.app_origin.origin().ascii_serialization());
    let cors = CorsLayer::new()
        .allow_origin(cors_origin.parse::<HeaderValue>().map_err(|e| {
            ServiceError::Internal(format!("Invalid CORS origin '{}': {}", cors_origin, e))
        })?)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 4. Create the Web Router ---
    let app = app_router(app_state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting gateway on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received.");
        })
        .await?;

    context.shutdown().await;
    Ok(())
}
