//! Resolution scenarios against the in-memory store

mod common;

use common::*;
use relman::*;
use std::sync::Arc;

async fn registry() -> ReleaseRegistry {
    seed(Arc::new(MemoryStore::new())).await
}

#[tokio::test]
async fn test_default_and_tester_resolution() {
    check_default_and_tester_resolution(&registry().await).await;
}

#[tokio::test]
async fn test_accessible_release_lists() {
    check_accessible_release_lists(&registry().await).await;
}

#[tokio::test]
async fn test_tier_monotonicity() {
    check_tier_monotonicity(&registry().await).await;
}

#[tokio::test]
async fn test_released_outside_tester_groups() {
    check_released_outside_tester_groups(&registry().await).await;
}

#[tokio::test]
async fn test_site_scoping() {
    check_site_scoping(&registry().await).await;
}

#[tokio::test]
async fn test_deprecated_release_is_never_current() {
    check_deprecation_exclusion(&registry().await).await;
}

#[tokio::test]
async fn test_inactive_releases_hidden_from_everyone() {
    check_inactive_releases_hidden(&registry().await).await;
}

#[tokio::test]
async fn test_resolution_without_site() {
    check_unsited_resolution(&registry().await).await;
}

#[tokio::test]
async fn test_unknown_package_is_rejected() {
    check_unknown_package(&registry().await).await;
}

#[tokio::test]
async fn test_hold_visible_to_elevated_only() {
    let registry = registry().await;
    registry
        .create_release(
            &User::system(),
            NewRelease::new("basic", "v5.0.0-rc")
                .status(Status::Hold)
                .released_at(NOW),
        )
        .await
        .unwrap();

    let dev = user(&registry, "devuser").await;
    let sample = user(&registry, "sampleuser").await;

    let current = registry.latest_release_at(&dev, SITE_2, "basic", NOW).await.unwrap();
    assert_eq!(current.unwrap().version, "v5.0.0-rc");

    let current = registry.latest_release_at(&sample, SITE_2, "basic", NOW).await.unwrap();
    assert_eq!(current.unwrap().version, "v0.1.2");
}

#[tokio::test]
async fn test_same_release_date_ordered_by_id() {
    let registry = registry().await;
    let admin = User::system();
    for version in ["tie-a", "tie-b", "tie-c"] {
        registry
            .create_release(
                &admin,
                NewRelease::new("legacy", version)
                    .status(Status::Released)
                    .released_at(NOW),
            )
            .await
            .unwrap();
    }

    let sample = user(&registry, "sampleuser").await;
    let releases = registry.accessible_releases(&sample, SITE_1, "legacy").await.unwrap();
    assert_eq!(
        versions(&releases),
        vec!["tie-c", "tie-b", "tie-a", "v1.0", "v1.0-previous"]
    );
}

#[tokio::test]
async fn test_status_change_promotes_release() {
    let registry = registry().await;
    let sample = user(&registry, "sampleuser").await;
    let manager = user(&registry, "releaseuser").await;

    registry
        .set_status(&manager, "basic", "v2.0.0", Status::Released)
        .await
        .unwrap();

    // Standard users ignore group restrictions once a release is out
    let current = registry.latest_release_at(&sample, SITE_2, "basic", NOW).await.unwrap();
    assert_eq!(current.unwrap().version, "v2.0.0");
}

#[tokio::test]
async fn test_empty_site_and_package_give_no_release() {
    let store = Arc::new(MemoryStore::new());
    let registry = ReleaseRegistry::new(store, packages());
    let sample = User::new("sampleuser");

    assert!(registry.accessible_releases(&sample, SITE_1, "basic").await.unwrap().is_empty());
    assert!(registry.latest_release(&sample, SITE_1, "basic").await.unwrap().is_none());
    assert!(registry.accessible_release(&sample, "basic").await.unwrap().is_none());
}
