//! Shared fixture for route tests

use crate::{AppState, config::ServerConfig, create_router};
use axum::{Router, response::Response};
use relman::*;
use serde_json::Value;
use std::sync::Arc;
use time::macros::datetime;

pub async fn test_app() -> Router {
    let store: Arc<dyn ReleaseStore> = Arc::new(MemoryStore::new());
    store.create_site(&Site::new(1, "example.com", "Example")).await.unwrap();
    store.create_site(&Site::new(2, "example.org", "Example Org")).await.unwrap();
    store
        .create_group(&Group::new("testers").with_permission(VIEW_PRETEST_RELEASES))
        .await
        .unwrap();
    store
        .create_group(
            &Group::new("release_managers")
                .with_permission(ADD_RELEASE)
                .with_permission(CHANGE_RELEASE),
        )
        .await
        .unwrap();
    for username in ["sampleuser", "devuser", "releaseuser"] {
        store.create_user(username, false).await.unwrap();
    }
    store.add_group_member("testers", "devuser").await.unwrap();
    store.add_group_member("release_managers", "releaseuser").await.unwrap();

    let packages = PackageRegistry::new()
        .with_package("basic", PackageInfo::new("Basic"))
        .with_package("legacy", PackageInfo::new("Legacy").with_description("Kept for old sites"));
    let registry = ReleaseRegistry::new(store, packages);

    let admin = User::system();
    let releases = [
        NewRelease::new("basic", "v0.9")
            .status(Status::Released)
            .released_at(datetime!(2022-06-01 00:00 UTC))
            .active(false),
        NewRelease::new("basic", "v1.0")
            .status(Status::Released)
            .released_at(datetime!(2023-01-01 00:00 UTC)),
        NewRelease::new("basic", "v1.1")
            .status(Status::Released)
            .released_at(datetime!(2023-06-01 00:00 UTC))
            .notes("Bug fixes"),
        NewRelease::new("basic", "v2.0")
            .status(Status::Testing)
            .released_at(datetime!(2023-09-01 00:00 UTC))
            .group("testers")
            .site(1),
        NewRelease::new("legacy", "v1")
            .status(Status::Released)
            .released_at(datetime!(2023-01-01 00:00 UTC))
            .deprecated_at(datetime!(2023-02-01 00:00 UTC)),
    ];
    for release in releases {
        registry.create_release(&admin, release).await.unwrap();
    }

    create_router(AppState {
        registry: Arc::new(registry),
        config: ServerConfig::default(),
    })
}

pub async fn read_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
