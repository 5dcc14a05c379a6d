mod config;
mod docs;
mod handlers;
mod models;
mod routes;
mod ws;

use axum::http::HeaderValue;
use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use config::Config;
use docs::ApiDoc;
use routes::create_api_routes;
use std::panic;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use ws::registry::RoomRegistry;

/// Shared application state: the room table plus the knobs the coordinator
/// and diagnostics need.
pub struct AppState {
    pub registry: RoomRegistry,
    pub capacity: usize,
    pub started_at: DateTime<Utc>,
}

#[tokio::main]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "pairpad=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    if config.is_development() {
        info!("Running in development mode");
    }

    let app_state = Arc::new(AppState {
        registry: RoomRegistry::new(),
        capacity: config.room_capacity,
        started_at: Utc::now(),
    });

    // Restrict CORS to the configured origins, else stay permissive
    let cors = match &config.cors_origins {
        Some(origins) => CorsLayer::new()
            .allow_origin(AllowOrigin::list(
                origins
                    .split(',')
                    .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok()),
            ))
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };

    // Combine all routes
    let app_routes = Router::new()
        // Mount API routes
        .nest("/api", create_api_routes())
        // Mount the collaboration WebSocket
        .route("/ws", get(ws::handler::websocket_handler))
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 WebSocket available at ws://{}/ws", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}
