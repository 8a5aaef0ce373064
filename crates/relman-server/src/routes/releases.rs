//! Release resolution and management routes

use crate::{
    AppState,
    auth::CurrentUser,
    error::{ApiError, Result},
    models::{ApiResponse, ReleaseQuery, ReleaseSummary, UpdateFilesRequest},
};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
};
use relman::{NewRelease, Release};
use tracing::{debug, info};

/// Create release routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_releases).post(create_release))
        .route("/latest", get(latest_release))
        .route("/{package}/{version}/files", patch(update_files))
}

/// Releases of a package visible to the caller, newest first
async fn list_releases(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ReleaseQuery>,
) -> Result<Json<ApiResponse<Vec<ReleaseSummary>>>> {
    let site = query.site_or(state.config.default_site);
    debug!(
        "Listing {} releases for {} on site {}",
        query.package, user.username, site
    );

    let releases = state
        .registry
        .accessible_releases(&user, site, &query.package)
        .await?;

    Ok(Json(ApiResponse::new(
        releases.into_iter().map(ReleaseSummary::from).collect(),
    )))
}

/// The current release of a package for the caller
async fn latest_release(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ReleaseQuery>,
) -> Result<Json<ApiResponse<ReleaseSummary>>> {
    let site = query.site_or(state.config.default_site);
    debug!(
        "Resolving latest {} release for {} on site {}",
        query.package, user.username, site
    );

    let release = state
        .registry
        .latest_release(&user, site, &query.package)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "no {} release available on site {}",
                query.package, site
            ))
        })?;

    Ok(Json(ApiResponse::new(ReleaseSummary::from(release))))
}

/// Create a new release
async fn create_release(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<NewRelease>,
) -> Result<impl IntoResponse> {
    info!(
        "{} creating release {} {}",
        user.username, request.package, request.version
    );

    let release = state.registry.create_release(&user, request).await?;
    let message = format!("Created release {}", release);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(release, message)),
    ))
}

/// Merge files into the manifest of a release
async fn update_files(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((package, version)): Path<(String, String)>,
    Json(request): Json<UpdateFilesRequest>,
) -> Result<Json<ApiResponse<Release>>> {
    if request.files.is_empty() {
        return Err(ApiError::bad_request("files must name at least one file"));
    }
    info!("{} updating files of {} {}", user.username, package, version);

    let release = state
        .registry
        .merge_files(&user, &package, &version, request.files)
        .await?;

    Ok(Json(ApiResponse::new(release)))
}
