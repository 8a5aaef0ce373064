//! Storage abstraction for registry data

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::entities::{Group, NewRelease, Release, ReleaseId, Site, SiteId, Status, User};
use crate::error::Result;
use crate::manifest::{FileDescriptor, FileManifest, ManifestPatch};

pub mod memory;

pub use memory::MemoryStore;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Result ordering for release queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReleaseOrder {
    /// `release_date` descending, ties broken by id descending
    #[default]
    NewestFirst,
    /// `release_date` ascending, ties broken by id ascending
    OldestFirst,
}

impl ReleaseOrder {
    pub fn compare(self, a: &Release, b: &Release) -> Ordering {
        let ascending = a
            .release_date
            .cmp(&b.release_date)
            .then_with(|| a.id.cmp(&b.id));
        match self {
            ReleaseOrder::NewestFirst => ascending.reverse(),
            ReleaseOrder::OldestFirst => ascending,
        }
    }
}

/// Group restriction applied to a query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GroupScope {
    /// Group restrictions are ignored
    #[default]
    Any,
    /// Release must be unrestricted or share a group with this set
    MemberOf(BTreeSet<String>),
    /// As `MemberOf`, but releases in `status` pass regardless of their groups
    MemberOfOrStatus {
        groups: BTreeSet<String>,
        status: Status,
    },
}

/// Conjunction of predicates over releases, compiled by each store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFilter {
    pub package: String,
    pub active: Option<bool>,
    pub status: Option<Status>,
    /// Release must be unscoped or scoped to this site
    pub site: Option<SiteId>,
    pub groups: GroupScope,
    pub order: ReleaseOrder,
}

impl ReleaseFilter {
    /// All releases of a package, newest first
    pub fn package(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            active: None,
            status: None,
            site: None,
            groups: GroupScope::Any,
            order: ReleaseOrder::default(),
        }
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn site(mut self, site: SiteId) -> Self {
        self.site = Some(site);
        self
    }

    pub fn member_of(mut self, groups: BTreeSet<String>) -> Self {
        self.groups = GroupScope::MemberOf(groups);
        self
    }

    /// Group-scoped releases pass when shared with `groups` or already in `status`
    pub fn member_of_or_status(mut self, groups: BTreeSet<String>, status: Status) -> Self {
        self.groups = GroupScope::MemberOfOrStatus { groups, status };
        self
    }

    pub fn order(mut self, order: ReleaseOrder) -> Self {
        self.order = order;
        self
    }

    /// Evaluate the filter against a single release
    pub fn matches(&self, release: &Release) -> bool {
        if release.package != self.package {
            return false;
        }
        if let Some(active) = self.active {
            if release.active != active {
                return false;
            }
        }
        if let Some(status) = self.status {
            if release.status != status {
                return false;
            }
        }
        if let Some(site) = self.site {
            if !release.is_available_on(site) {
                return false;
            }
        }
        match &self.groups {
            GroupScope::Any => true,
            GroupScope::MemberOf(groups) => release.is_visible_to_groups(groups),
            GroupScope::MemberOfOrStatus { groups, status } => {
                release.status == *status || release.is_visible_to_groups(groups)
            }
        }
    }
}

/// A change to a release's file manifest, applied as one read-modify-write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestUpdate {
    /// Append one descriptor to a group
    Register { group: String, file: FileDescriptor },
    /// Merge a partial manifest
    Merge(ManifestPatch),
}

impl ManifestUpdate {
    pub fn register(group: impl Into<String>, path: impl Into<String>, options: BTreeMap<String, String>) -> Self {
        ManifestUpdate::Register {
            group: group.into(),
            file: FileDescriptor::with_options(path, options),
        }
    }

    pub fn apply(&self, manifest: &mut FileManifest) {
        match self {
            ManifestUpdate::Register { group, file } => manifest.push(group, file.clone()),
            ManifestUpdate::Merge(patch) => manifest.merge(patch.clone()),
        }
    }
}

/// Query and write interface over the entity store
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Insert a release; a duplicate (package, version) fails with a conflict
    async fn create_release(&self, release: NewRelease) -> Result<Release>;

    async fn get_release(&self, package: &str, version: &str) -> Result<Release>;

    async fn get_release_by_id(&self, id: ReleaseId) -> Result<Release>;

    /// Releases matching `filter`, each at most once, in `filter.order`
    async fn find_releases(&self, filter: &ReleaseFilter) -> Result<Vec<Release>>;

    async fn count_releases(&self, filter: &ReleaseFilter) -> Result<u64>;

    async fn release_exists(&self, package: &str, version: &str) -> Result<bool>;

    /// Apply a manifest change atomically to one release
    async fn update_manifest(
        &self,
        package: &str,
        version: &str,
        update: &ManifestUpdate,
    ) -> Result<Release>;

    async fn set_status(&self, package: &str, version: &str, status: Status) -> Result<Release>;

    async fn set_active(&self, package: &str, version: &str, active: bool) -> Result<Release>;

    async fn create_site(&self, site: &Site) -> Result<()>;

    async fn get_site(&self, id: SiteId) -> Result<Site>;

    async fn list_sites(&self) -> Result<Vec<Site>>;

    async fn create_group(&self, group: &Group) -> Result<()>;

    async fn get_group(&self, name: &str) -> Result<Group>;

    async fn create_user(&self, username: &str, is_superuser: bool) -> Result<()>;

    /// Add an existing user to an existing group
    async fn add_group_member(&self, group: &str, username: &str) -> Result<()>;

    /// Load a user with its groups materialized
    async fn get_user(&self, username: &str) -> Result<User>;
}
