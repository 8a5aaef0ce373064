//! Shared fixture and resolution scenarios, run against every store
#![allow(dead_code)]

use relman::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use time::OffsetDateTime;
use time::macros::datetime;

pub const NOW: OffsetDateTime = datetime!(2024-06-01 00:00 UTC);

pub const SITE_1: SiteId = SiteId(1);
pub const SITE_2: SiteId = SiteId(2);

pub fn packages() -> PackageRegistry {
    PackageRegistry::new()
        .with_package("basic", PackageInfo::new("Basic"))
        .with_package("legacy", PackageInfo::new("Legacy"))
        .with_package("locked", PackageInfo::new("Locked"))
}

fn fixture_releases() -> Vec<NewRelease> {
    vec![
        NewRelease::new("basic", "v0.1.0")
            .status(Status::Released)
            .released_at(datetime!(2023-01-01 00:00 UTC)),
        NewRelease::new("basic", "v0.1.1")
            .status(Status::Released)
            .released_at(datetime!(2023-06-01 00:00 UTC)),
        NewRelease::new("basic", "v0.1.2")
            .status(Status::Released)
            .released_at(datetime!(2023-09-01 00:00 UTC))
            .site(2),
        NewRelease::new("basic", "v2.0.0")
            .status(Status::Testing)
            .released_at(datetime!(2023-10-01 00:00 UTC))
            .group("test_group"),
        NewRelease::new("basic", "v3.0.0")
            .status(Status::Development)
            .released_at(datetime!(2023-11-01 00:00 UTC))
            .group("test_group")
            .site(1),
        NewRelease::new("basic", "v4.0.0")
            .status(Status::Released)
            .released_at(datetime!(2023-12-01 00:00 UTC))
            .active(false),
        NewRelease::new("legacy", "v1.0-previous")
            .status(Status::Released)
            .released_at(datetime!(2024-05-01 00:00 UTC)),
        NewRelease::new("legacy", "v1.0")
            .status(Status::Released)
            .released_at(datetime!(2024-05-31 00:00 UTC))
            .deprecated_at(datetime!(2024-05-31 23:00 UTC)),
        NewRelease::new("locked", "v1")
            .status(Status::Released)
            .released_at(datetime!(2023-01-01 00:00 UTC))
            .group("test_group"),
    ]
}

/// Sites, groups, users and releases shared by the resolution scenarios
pub async fn seed(store: Arc<dyn ReleaseStore>) -> ReleaseRegistry {
    store
        .create_site(&Site::new(1, "example.com", "example.com"))
        .await
        .unwrap();
    store
        .create_site(&Site::new(2, "example.org", "example.org"))
        .await
        .unwrap();

    store
        .create_group(&Group::new("test_group").with_permission(VIEW_PRETEST_RELEASES))
        .await
        .unwrap();
    store
        .create_group(&Group::new("qa_team").with_permission(VIEW_PRETEST_RELEASES))
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

    for (username, superuser) in [
        ("sampleuser", false),
        ("devuser", false),
        ("qauser", false),
        ("releaseuser", false),
        ("admin", true),
    ] {
        store.create_user(username, superuser).await.unwrap();
    }
    store.add_group_member("test_group", "devuser").await.unwrap();
    store.add_group_member("qa_team", "qauser").await.unwrap();
    store
        .add_group_member("release_managers", "releaseuser")
        .await
        .unwrap();

    let registry = ReleaseRegistry::new(store, packages());
    let admin = User::system();
    for release in fixture_releases() {
        registry.create_release(&admin, release).await.unwrap();
    }
    registry
}

pub async fn user(registry: &ReleaseRegistry, username: &str) -> User {
    registry.store().get_user(username).await.unwrap()
}

pub fn versions(releases: &[Release]) -> Vec<&str> {
    releases.iter().map(|r| r.version.as_str()).collect()
}

async fn latest(registry: &ReleaseRegistry, user: &User, site: SiteId, package: &str) -> Option<String> {
    registry
        .latest_release_at(user, site, package, NOW)
        .await
        .unwrap()
        .map(|r| r.version)
}

pub async fn check_default_and_tester_resolution(registry: &ReleaseRegistry) {
    let sample = user(registry, "sampleuser").await;
    let dev = user(registry, "devuser").await;

    assert_eq!(latest(registry, &sample, SITE_1, "basic").await.as_deref(), Some("v0.1.1"));
    assert_eq!(latest(registry, &sample, SITE_2, "basic").await.as_deref(), Some("v0.1.2"));
    assert_eq!(latest(registry, &dev, SITE_1, "basic").await.as_deref(), Some("v3.0.0"));
    assert_eq!(latest(registry, &dev, SITE_2, "basic").await.as_deref(), Some("v2.0.0"));
}

pub async fn check_accessible_release_lists(registry: &ReleaseRegistry) {
    let sample = user(registry, "sampleuser").await;
    let dev = user(registry, "devuser").await;
    let admin = user(registry, "admin").await;

    let standard = registry.accessible_releases(&sample, SITE_1, "basic").await.unwrap();
    assert_eq!(versions(&standard), vec!["v0.1.1", "v0.1.0"]);

    let elevated = registry.accessible_releases(&dev, SITE_1, "basic").await.unwrap();
    assert_eq!(versions(&elevated), vec!["v3.0.0", "v2.0.0", "v0.1.1", "v0.1.0"]);

    let superuser = registry.accessible_releases(&admin, SITE_2, "basic").await.unwrap();
    assert_eq!(versions(&superuser), vec!["v2.0.0", "v0.1.2", "v0.1.1", "v0.1.0"]);

    let oldest_first = registry
        .engine()
        .accessible_releases_ordered(&sample, SITE_2, "basic", ReleaseOrder::OldestFirst)
        .await
        .unwrap();
    assert_eq!(versions(&oldest_first), vec!["v0.1.0", "v0.1.1", "v0.1.2"]);
}

pub async fn check_tier_monotonicity(registry: &ReleaseRegistry) {
    let ids = |releases: Vec<Release>| releases.into_iter().map(|r| r.id).collect::<BTreeSet<_>>();
    let admin = user(registry, "admin").await;
    let standard_users = [user(registry, "sampleuser").await, user(registry, "releaseuser").await];
    let elevated_users = [user(registry, "devuser").await, user(registry, "qauser").await];

    for site in [SITE_1, SITE_2, SiteId(3)] {
        for (package, _) in registry.packages().iter() {
            let su = ids(registry.accessible_releases(&admin, site, package).await.unwrap());

            for elevated in &elevated_users {
                let el = ids(registry.accessible_releases(elevated, site, package).await.unwrap());
                assert!(
                    su.is_superset(&el),
                    "superuser ⊇ {} for {} on {}",
                    elevated.username,
                    package,
                    site
                );

                for standard in &standard_users {
                    let st = ids(registry.accessible_releases(standard, site, package).await.unwrap());
                    assert!(
                        el.is_superset(&st),
                        "{} ⊇ {} for {} on {}",
                        elevated.username,
                        standard.username,
                        package,
                        site
                    );
                }
            }
        }
    }
}

/// Released versions scoped to a group stay visible to testers of other groups
pub async fn check_released_outside_tester_groups(registry: &ReleaseRegistry) {
    let qa = user(registry, "qauser").await;
    let sample = user(registry, "sampleuser").await;

    let releases = registry.accessible_releases(&qa, SITE_1, "locked").await.unwrap();
    assert_eq!(versions(&releases), vec!["v1"]);
    assert_eq!(latest(registry, &qa, SITE_1, "locked").await.as_deref(), Some("v1"));
    assert_eq!(latest(registry, &sample, SITE_1, "locked").await.as_deref(), Some("v1"));

    // Pre-release versions of another group stay hidden
    let releases = registry.accessible_releases(&qa, SITE_1, "basic").await.unwrap();
    assert_eq!(versions(&releases), vec!["v0.1.1", "v0.1.0"]);
}

pub async fn check_site_scoping(registry: &ReleaseRegistry) {
    for username in ["sampleuser", "devuser", "qauser", "admin"] {
        let u = user(registry, username).await;
        for site in [SITE_1, SITE_2, SiteId(3)] {
            let releases = registry.accessible_releases(&u, site, "basic").await.unwrap();
            for release in &releases {
                assert!(release.active);
                assert!(
                    release.sites.is_empty() || release.sites.contains(&site),
                    "{} leaked to site {} for {}",
                    release,
                    site,
                    username
                );
            }
        }
    }

    // A site with no scoped releases still sees the global ones
    let sample = user(registry, "sampleuser").await;
    let releases = registry.accessible_releases(&sample, SiteId(3), "basic").await.unwrap();
    assert_eq!(versions(&releases), vec!["v0.1.1", "v0.1.0"]);
}

pub async fn check_deprecation_exclusion(registry: &ReleaseRegistry) {
    for username in ["sampleuser", "devuser", "admin"] {
        let u = user(registry, username).await;
        let all = registry.accessible_releases(&u, SITE_1, "legacy").await.unwrap();
        assert_eq!(versions(&all), vec!["v1.0", "v1.0-previous"]);

        assert_eq!(latest(registry, &u, SITE_1, "legacy").await.as_deref(), Some("v1.0-previous"));
    }

    // Before its deprecation date the newer release is still current
    let sample = user(registry, "sampleuser").await;
    let before = registry
        .latest_release_at(&sample, SITE_1, "legacy", datetime!(2024-05-31 12:00 UTC))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.version, "v1.0");
}

pub async fn check_inactive_releases_hidden(registry: &ReleaseRegistry) {
    let admin = user(registry, "admin").await;
    let releases = registry.accessible_releases(&admin, SITE_1, "basic").await.unwrap();
    assert!(!versions(&releases).contains(&"v4.0.0"));
    assert_eq!(latest(registry, &admin, SITE_1, "basic").await.as_deref(), Some("v3.0.0"));
}

pub async fn check_unsited_resolution(registry: &ReleaseRegistry) {
    let engine = registry.engine();
    let version = |r: Option<Release>| r.map(|r| r.version);

    let sample = user(registry, "sampleuser").await;
    let dev = user(registry, "devuser").await;
    let qa = user(registry, "qauser").await;
    let admin = user(registry, "admin").await;

    assert_eq!(
        version(engine.accessible_release_at(&sample, "basic", NOW).await.unwrap()).as_deref(),
        Some("v0.1.2")
    );
    assert_eq!(
        version(engine.accessible_release_at(&dev, "basic", NOW).await.unwrap()).as_deref(),
        Some("v3.0.0")
    );
    assert_eq!(
        version(engine.accessible_release_at(&admin, "basic", NOW).await.unwrap()).as_deref(),
        Some("v3.0.0")
    );

    // qa_team holds no test_group pre-releases, only released versions
    assert_eq!(
        version(engine.accessible_release_at(&qa, "basic", NOW).await.unwrap()).as_deref(),
        Some("v0.1.2")
    );
    assert_eq!(
        version(engine.accessible_release_at(&qa, "locked", NOW).await.unwrap()).as_deref(),
        Some("v1")
    );

    assert_eq!(
        version(engine.accessible_release_at(&sample, "legacy", NOW).await.unwrap()).as_deref(),
        Some("v1.0-previous")
    );
}

pub async fn check_unknown_package(registry: &ReleaseRegistry) {
    let sample = user(registry, "sampleuser").await;
    let result = registry.accessible_releases(&sample, SITE_1, "nope").await;
    assert!(matches!(result, Err(RegistryError::UnknownPackage(_))));

    let result = registry.engine().accessible_release(&sample, "nope").await;
    assert!(matches!(result, Err(RegistryError::UnknownPackage(_))));
}
