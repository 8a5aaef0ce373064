//! In-memory store for tests and development

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;

use super::{ManifestUpdate, ReleaseFilter, ReleaseStore};
use crate::entities::{Group, NewRelease, Release, ReleaseId, Site, SiteId, Status, User};
use crate::error::{RegistryError, Result};

#[derive(Debug, Default)]
struct State {
    releases: BTreeMap<ReleaseId, Release>,
    next_id: i64,
    sites: BTreeMap<SiteId, Site>,
    groups: BTreeMap<String, Group>,
    users: BTreeMap<String, StoredUser>,
}

#[derive(Debug)]
struct StoredUser {
    is_superuser: bool,
    groups: BTreeSet<String>,
}

impl State {
    fn find_mut(&mut self, package: &str, version: &str) -> Result<&mut Release> {
        self.releases
            .values_mut()
            .find(|r| r.package == package && r.version == version)
            .ok_or_else(|| RegistryError::release_not_found(package, version))
    }
}

/// Mutex-guarded store; every operation is atomic with respect to the others
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored releases (useful for testing)
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.releases.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| RegistryError::Storage("Lock poisoned".into()))
    }

    fn modify_release<F>(&self, package: &str, version: &str, f: F) -> Result<Release>
    where
        F: FnOnce(&mut Release),
    {
        let mut state = self.state()?;
        let release = state.find_mut(package, version)?;
        f(release);
        release.updated_at = OffsetDateTime::now_utc();
        Ok(release.clone())
    }
}

#[async_trait]
impl ReleaseStore for MemoryStore {
    async fn create_release(&self, release: NewRelease) -> Result<Release> {
        let mut state = self.state()?;

        let exists = state
            .releases
            .values()
            .any(|r| r.package == release.package && r.version == release.version);
        if exists {
            return Err(RegistryError::release_exists(&release.package, &release.version));
        }

        state.next_id += 1;
        let id = ReleaseId(state.next_id);
        let release = release.into_release(id, OffsetDateTime::now_utc());
        state.releases.insert(id, release.clone());
        Ok(release)
    }

    async fn get_release(&self, package: &str, version: &str) -> Result<Release> {
        let state = self.state()?;
        state
            .releases
            .values()
            .find(|r| r.package == package && r.version == version)
            .cloned()
            .ok_or_else(|| RegistryError::release_not_found(package, version))
    }

    async fn get_release_by_id(&self, id: ReleaseId) -> Result<Release> {
        let state = self.state()?;
        state
            .releases
            .get(&id)
            .cloned()
            .ok_or(RegistryError::ReleaseIdNotFound(id.0))
    }

    async fn find_releases(&self, filter: &ReleaseFilter) -> Result<Vec<Release>> {
        let state = self.state()?;
        let mut releases: Vec<Release> = state
            .releases
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        releases.sort_by(|a, b| filter.order.compare(a, b));
        Ok(releases)
    }

    async fn count_releases(&self, filter: &ReleaseFilter) -> Result<u64> {
        let state = self.state()?;
        Ok(state.releases.values().filter(|r| filter.matches(r)).count() as u64)
    }

    async fn release_exists(&self, package: &str, version: &str) -> Result<bool> {
        let state = self.state()?;
        Ok(state
            .releases
            .values()
            .any(|r| r.package == package && r.version == version))
    }

    async fn update_manifest(
        &self,
        package: &str,
        version: &str,
        update: &ManifestUpdate,
    ) -> Result<Release> {
        self.modify_release(package, version, |release| update.apply(&mut release.files))
    }

    async fn set_status(&self, package: &str, version: &str, status: Status) -> Result<Release> {
        self.modify_release(package, version, |release| release.status = status)
    }

    async fn set_active(&self, package: &str, version: &str, active: bool) -> Result<Release> {
        self.modify_release(package, version, |release| release.active = active)
    }

    async fn create_site(&self, site: &Site) -> Result<()> {
        let mut state = self.state()?;
        if state.sites.contains_key(&site.id) {
            return Err(RegistryError::SiteAlreadyExists(site.id.0));
        }
        state.sites.insert(site.id, site.clone());
        Ok(())
    }

    async fn get_site(&self, id: SiteId) -> Result<Site> {
        let state = self.state()?;
        state
            .sites
            .get(&id)
            .cloned()
            .ok_or(RegistryError::SiteNotFound(id.0))
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        let state = self.state()?;
        Ok(state.sites.values().cloned().collect())
    }

    async fn create_group(&self, group: &Group) -> Result<()> {
        let mut state = self.state()?;
        if state.groups.contains_key(&group.name) {
            return Err(RegistryError::GroupAlreadyExists(group.name.clone()));
        }
        state.groups.insert(group.name.clone(), group.clone());
        Ok(())
    }

    async fn get_group(&self, name: &str) -> Result<Group> {
        let state = self.state()?;
        state
            .groups
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::GroupNotFound(name.to_string()))
    }

    async fn create_user(&self, username: &str, is_superuser: bool) -> Result<()> {
        let mut state = self.state()?;
        if state.users.contains_key(username) {
            return Err(RegistryError::UserAlreadyExists(username.to_string()));
        }
        state.users.insert(
            username.to_string(),
            StoredUser {
                is_superuser,
                groups: BTreeSet::new(),
            },
        );
        Ok(())
    }

    async fn add_group_member(&self, group: &str, username: &str) -> Result<()> {
        let mut state = self.state()?;
        if !state.groups.contains_key(group) {
            return Err(RegistryError::GroupNotFound(group.to_string()));
        }
        let user = state
            .users
            .get_mut(username)
            .ok_or_else(|| RegistryError::UserNotFound(username.to_string()))?;
        user.groups.insert(group.to_string());
        Ok(())
    }

    async fn get_user(&self, username: &str) -> Result<User> {
        let state = self.state()?;
        let stored = state
            .users
            .get(username)
            .ok_or_else(|| RegistryError::UserNotFound(username.to_string()))?;

        Ok(User {
            username: username.to_string(),
            is_superuser: stored.is_superuser,
            groups: stored
                .groups
                .iter()
                .filter_map(|name| state.groups.get(name).cloned())
                .collect(),
        })
    }
}
