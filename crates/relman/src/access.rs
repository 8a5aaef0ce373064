//! Access resolution: which releases of a package a user may see
//!
//! Resolution is a pure query compiler over the store. A user is first
//! classified into an [`AccessTier`]; the tier decides which predicates go
//! into the [`ReleaseFilter`] handed to the store:
//!
//! | tier      | site scope | group scope              | status        |
//! |-----------|------------|--------------------------|---------------|
//! | Superuser | yes        | ignored                  | any           |
//! | Elevated  | yes        | member, open or released | any           |
//! | Standard  | yes        | ignored                  | Released only |
//!
//! Inactive releases are never returned.

use std::collections::BTreeSet;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::entities::{Release, SiteId, Status, User, VIEW_PRETEST_RELEASES};
use crate::error::Result;
use crate::packages::PackageRegistry;
use crate::storage::{ReleaseFilter, ReleaseOrder, ReleaseStore};

/// Capability tier of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTier {
    /// Bypasses group and status filtering
    Superuser,
    /// Member of a group allowed to see pre-production releases
    Elevated,
    /// Sees released versions only
    Standard,
}

/// Determine the capability tier of a user
pub fn classify(user: &User) -> AccessTier {
    if user.is_superuser {
        AccessTier::Superuser
    } else if user
        .groups
        .iter()
        .any(|g| g.has_permission(VIEW_PRETEST_RELEASES))
    {
        AccessTier::Elevated
    } else {
        AccessTier::Standard
    }
}

/// Build the store filter for a tier. `site: None` drops site scoping.
pub fn release_filter(
    tier: AccessTier,
    user: &User,
    site: Option<SiteId>,
    package: &str,
    order: ReleaseOrder,
) -> ReleaseFilter {
    let mut filter = ReleaseFilter::package(package).active(true).order(order);
    if let Some(site) = site {
        filter = filter.site(site);
    }

    match tier {
        AccessTier::Superuser => filter,
        // Released versions stay visible even when scoped to other groups
        AccessTier::Elevated => filter.member_of_or_status(user.group_names(), Status::Released),
        AccessTier::Standard => filter.status(Status::Released),
    }
}

/// Stateless resolver over a shared store and package configuration
#[derive(Clone)]
pub struct AccessEngine {
    store: Arc<dyn ReleaseStore>,
    packages: Arc<PackageRegistry>,
}

impl AccessEngine {
    pub fn new(store: Arc<dyn ReleaseStore>, packages: Arc<PackageRegistry>) -> Self {
        Self { store, packages }
    }

    /// Releases of `package` visible to `user` on `site`, newest first
    pub async fn accessible_releases(
        &self,
        user: &User,
        site: SiteId,
        package: &str,
    ) -> Result<Vec<Release>> {
        self.accessible_releases_ordered(user, site, package, ReleaseOrder::NewestFirst)
            .await
    }

    /// Releases of `package` visible to `user` on `site`, in the given order
    pub async fn accessible_releases_ordered(
        &self,
        user: &User,
        site: SiteId,
        package: &str,
        order: ReleaseOrder,
    ) -> Result<Vec<Release>> {
        self.packages.get(package)?;
        let filter = release_filter(classify(user), user, Some(site), package, order);
        self.query(&filter).await
    }

    /// The current release for `user` on `site`, skipping deprecated releases
    pub async fn latest_release(
        &self,
        user: &User,
        site: SiteId,
        package: &str,
    ) -> Result<Option<Release>> {
        self.latest_release_at(user, site, package, OffsetDateTime::now_utc())
            .await
    }

    /// Same as [`latest_release`](Self::latest_release) evaluated at `now`
    pub async fn latest_release_at(
        &self,
        user: &User,
        site: SiteId,
        package: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Release>> {
        let releases = self.accessible_releases(user, site, package).await?;
        Ok(first_current(releases, now))
    }

    /// The current release for `user` without site scoping
    pub async fn accessible_release(&self, user: &User, package: &str) -> Result<Option<Release>> {
        self.accessible_release_at(user, package, OffsetDateTime::now_utc())
            .await
    }

    /// Same as [`accessible_release`](Self::accessible_release) evaluated at `now`
    pub async fn accessible_release_at(
        &self,
        user: &User,
        package: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Release>> {
        self.packages.get(package)?;
        let filter = release_filter(classify(user), user, None, package, ReleaseOrder::NewestFirst);
        Ok(first_current(self.query(&filter).await?, now))
    }

    /// Run a filter, dropping anything the store returned out of scope
    async fn query(&self, filter: &ReleaseFilter) -> Result<Vec<Release>> {
        let mut releases = self.store.find_releases(filter).await?;
        releases.retain(|r| filter.matches(r));

        let mut seen = BTreeSet::new();
        releases.retain(|r| seen.insert(r.id));
        Ok(releases)
    }
}

fn first_current(releases: Vec<Release>, now: OffsetDateTime) -> Option<Release> {
    releases.into_iter().find(|r| !r.is_deprecated_at(now))
}
