//! Relman HTTP API Server
//!
//! Serves release resolution for the calling user and release management
//! endpoints on top of the SQLite release store.

use axum::{Router, http::HeaderValue, response::Json, routing::get};
use relman::{PackageRegistry, ReleaseRegistry, SqliteStore};
use serde_json::{Value, json};
use std::{net::SocketAddr, path::Path, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

mod auth;
mod config;
mod error;
mod models;
mod routes;
#[cfg(test)]
mod test_util;

use config::ServerConfig;
use error::{ApiError, Result};

/// Main application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ReleaseRegistry>,
    pub config: ServerConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "relman_server=debug,tower_http=debug".to_string()),
        )
        .init();

    // Load configuration
    let config = ServerConfig::from_env()?;
    info!("Starting Relman Server on {}:{}", config.host, config.port);

    let packages = PackageRegistry::from_toml_file(&config.packages_path)?;
    info!(
        "Loaded {} packages from {}",
        packages.len(),
        config.packages_path
    );

    if let Some(parent) = config
        .database_url
        .strip_prefix("sqlite:")
        .and_then(|path| Path::new(path.trim_start_matches("//")).parent())
        .filter(|dir| !dir.as_os_str().is_empty())
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let store = SqliteStore::new(&config.database_url).await?;

    // Create application state
    let state = AppState {
        registry: Arc::new(ReleaseRegistry::new(Arc::new(store), packages)),
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let ip = config
        .host
        .parse()
        .map_err(|_| ApiError::Config(format!("Invalid HOST value: {}", config.host)))?;
    let addr = SocketAddr::new(ip, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // API routes
        .nest("/api", api_routes())
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// API routes
fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/packages", routes::packages::router())
        .nest("/releases", routes::releases::router())
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.allows_any_origin() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}

/// Health check endpoint
async fn health_check() -> Result<Json<Value>> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "relman-server",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": time::OffsetDateTime::now_utc()
    })))
}
