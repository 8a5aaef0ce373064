//! High-level registry interface for release management

use std::sync::Arc;
use time::OffsetDateTime;

use crate::access::AccessEngine;
use crate::entities::{ADD_RELEASE, CHANGE_RELEASE, NewRelease, Release, SiteId, Status, User};
use crate::error::{RegistryError, Result};
use crate::manifest::{self, FileManifest, ManifestPatch};
use crate::packages::{PackageInfo, PackageRegistry};
use crate::storage::{ManifestUpdate, ReleaseFilter, ReleaseStore};

/// A configured package with its active releases, newest first
#[derive(Debug, Clone)]
pub struct PackageOverview {
    pub key: String,
    pub info: PackageInfo,
    pub active_releases: Vec<Release>,
}

/// Store, package configuration and resolver bundled for outer layers
#[derive(Clone)]
pub struct ReleaseRegistry {
    store: Arc<dyn ReleaseStore>,
    packages: Arc<PackageRegistry>,
    engine: AccessEngine,
}

fn authorize(actor: &User, permission: &str) -> Result<()> {
    if actor.has_permission(permission) {
        Ok(())
    } else {
        Err(RegistryError::PermissionDenied(format!(
            "{} lacks the {} permission",
            actor.username, permission
        )))
    }
}

impl ReleaseRegistry {
    pub fn new(store: Arc<dyn ReleaseStore>, packages: PackageRegistry) -> Self {
        let packages = Arc::new(packages);
        Self {
            engine: AccessEngine::new(store.clone(), packages.clone()),
            store,
            packages,
        }
    }

    pub fn store(&self) -> &Arc<dyn ReleaseStore> {
        &self.store
    }

    pub fn packages(&self) -> &PackageRegistry {
        &self.packages
    }

    pub fn engine(&self) -> &AccessEngine {
        &self.engine
    }

    /// Create a release after checking permission, package and scoping references
    pub async fn create_release(&self, actor: &User, release: NewRelease) -> Result<Release> {
        authorize(actor, ADD_RELEASE)?;
        release.validate()?;
        self.packages.get(&release.package)?;

        for site in &release.sites {
            self.store.get_site(*site).await?;
        }
        for group in &release.groups {
            self.store.get_group(group).await?;
        }

        self.store.create_release(release).await
    }

    pub async fn release(&self, package: &str, version: &str) -> Result<Release> {
        self.packages.get(package)?;
        self.store.get_release(package, version).await
    }

    /// Register one file on a release and return the updated manifest.
    ///
    /// Options are `key=value` strings; the group defaults to the path's extension.
    /// Nothing is written when validation fails.
    pub async fn register_file<S: AsRef<str>>(
        &self,
        actor: &User,
        package: &str,
        version: &str,
        group: Option<&str>,
        path: &str,
        options: &[S],
    ) -> Result<FileManifest> {
        authorize(actor, CHANGE_RELEASE)?;
        self.packages.get(package)?;

        let options = manifest::parse_options(options)?;
        let group = manifest::resolve_file_group(group, path)?;
        let update = ManifestUpdate::register(group, path, options);

        let release = self.store.update_manifest(package, version, &update).await?;
        Ok(release.files)
    }

    /// Merge a partial manifest into a release
    pub async fn merge_files(
        &self,
        actor: &User,
        package: &str,
        version: &str,
        patch: ManifestPatch,
    ) -> Result<Release> {
        authorize(actor, CHANGE_RELEASE)?;
        self.packages.get(package)?;
        self.store
            .update_manifest(package, version, &ManifestUpdate::Merge(patch))
            .await
    }

    pub async fn set_status(
        &self,
        actor: &User,
        package: &str,
        version: &str,
        status: Status,
    ) -> Result<Release> {
        authorize(actor, CHANGE_RELEASE)?;
        self.packages.get(package)?;
        self.store.set_status(package, version, status).await
    }

    pub async fn set_active(
        &self,
        actor: &User,
        package: &str,
        version: &str,
        active: bool,
    ) -> Result<Release> {
        authorize(actor, CHANGE_RELEASE)?;
        self.packages.get(package)?;
        self.store.set_active(package, version, active).await
    }

    /// Every configured package with its active releases
    pub async fn package_overview(&self) -> Result<Vec<PackageOverview>> {
        let mut overview = Vec::with_capacity(self.packages.len());
        for (key, info) in self.packages.iter() {
            let active_releases = self
                .store
                .find_releases(&ReleaseFilter::package(key).active(true))
                .await?;
            overview.push(PackageOverview {
                key: key.to_string(),
                info: info.clone(),
                active_releases,
            });
        }
        Ok(overview)
    }

    pub async fn accessible_releases(
        &self,
        user: &User,
        site: SiteId,
        package: &str,
    ) -> Result<Vec<Release>> {
        self.engine.accessible_releases(user, site, package).await
    }

    pub async fn latest_release(
        &self,
        user: &User,
        site: SiteId,
        package: &str,
    ) -> Result<Option<Release>> {
        self.engine.latest_release(user, site, package).await
    }

    pub async fn latest_release_at(
        &self,
        user: &User,
        site: SiteId,
        package: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Release>> {
        self.engine.latest_release_at(user, site, package, now).await
    }

    pub async fn accessible_release(&self, user: &User, package: &str) -> Result<Option<Release>> {
        self.engine.accessible_release(user, package).await
    }
}
