//! Package listing routes

use crate::{AppState, error::Result, models::{ApiResponse, PackageSummary}};
use axum::{Json, Router, extract::State, routing::get};
use tracing::debug;

/// Create package routes
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_packages))
}

/// List configured packages with their active release counts
async fn list_packages(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<PackageSummary>>>> {
    debug!("Listing configured packages");

    let packages = state
        .registry
        .package_overview()
        .await?
        .into_iter()
        .map(PackageSummary::from)
        .collect();

    Ok(Json(ApiResponse::new(packages)))
}
