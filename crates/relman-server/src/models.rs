//! API models for requests and responses

use relman::{ManifestPatch, PackageOverview, Release, SiteId, Status};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            message: None,
        }
    }

    pub fn with_message(data: T, message: String) -> Self {
        Self {
            data,
            message: Some(message),
        }
    }
}

/// Query parameters shared by the resolution endpoints
#[derive(Debug, Deserialize)]
pub struct ReleaseQuery {
    pub package: String,

    /// Falls back to the configured default site
    pub site: Option<i64>,
}

impl ReleaseQuery {
    pub fn site_or(&self, default: SiteId) -> SiteId {
        self.site.map(SiteId).unwrap_or(default)
    }
}

/// Release fields exposed to API clients
#[derive(Debug, Serialize)]
pub struct ReleaseSummary {
    pub package: String,
    pub version: String,
    pub release_notes: String,
    #[serde(with = "time::serde::rfc3339")]
    pub release_date: OffsetDateTime,
    pub status: Status,
    pub status_label: &'static str,
}

impl From<Release> for ReleaseSummary {
    fn from(release: Release) -> Self {
        Self {
            status_label: release.status.label(),
            status: release.status,
            package: release.package,
            version: release.version,
            release_notes: release.release_notes,
            release_date: release.release_date,
        }
    }
}

/// A configured package and how many active releases it has
#[derive(Debug, Serialize)]
pub struct PackageSummary {
    pub key: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub active_releases: usize,
}

impl From<PackageOverview> for PackageSummary {
    fn from(overview: PackageOverview) -> Self {
        Self {
            key: overview.key,
            name: overview.info.name,
            description: overview.info.description,
            active_releases: overview.active_releases.len(),
        }
    }
}

/// Body of a file manifest update
#[derive(Debug, Deserialize)]
pub struct UpdateFilesRequest {
    pub files: ManifestPatch,
}
