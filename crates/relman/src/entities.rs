//! Core data structures for the release registry

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use time::OffsetDateTime;

use crate::manifest::FileManifest;

/// Permission that lets group members see pre-production releases
pub const VIEW_PRETEST_RELEASES: &str = "can_view_pretest_releases";

/// Permission required to create releases
pub const ADD_RELEASE: &str = "add_release";

/// Permission required to change an existing release (files, status, active flag)
pub const CHANGE_RELEASE: &str = "change_release";

/// Identifier of a site (deployment context)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(pub i64);

impl From<i64> for SiteId {
    fn from(id: i64) -> Self {
        SiteId(id)
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A deployment context releases can be scoped to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub domain: String,
    pub name: String,
}

impl Site {
    pub fn new(id: impl Into<SiteId>, domain: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
            name: name.into(),
        }
    }
}

/// A named set of users carrying permissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub permissions: BTreeSet<String>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permissions: BTreeSet::new(),
        }
    }

    /// Grant a permission to the group
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// A user as seen by the registry: superuser flag plus materialized group memberships
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub is_superuser: bool,
    pub groups: Vec<Group>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_superuser: false,
            groups: Vec::new(),
        }
    }

    pub fn superuser(username: impl Into<String>) -> Self {
        Self {
            is_superuser: true,
            ..Self::new(username)
        }
    }

    /// Built-in superuser used by management commands
    pub fn system() -> Self {
        Self::superuser("system")
    }

    pub fn with_group(mut self, group: Group) -> Self {
        if !self.is_member_of(&group.name) {
            self.groups.push(group);
        }
        self
    }

    pub fn is_member_of(&self, group_name: &str) -> bool {
        self.groups.iter().any(|g| g.name == group_name)
    }

    /// Names of all groups the user belongs to
    pub fn group_names(&self) -> BTreeSet<String> {
        self.groups.iter().map(|g| g.name.clone()).collect()
    }

    /// Superusers hold every permission; everyone else through a group
    pub fn has_permission(&self, permission: &str) -> bool {
        self.is_superuser || self.groups.iter().any(|g| g.has_permission(permission))
    }
}

/// Lifecycle status of a release. The integer codes are part of the storage format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Status {
    Development = 1,
    Testing = 10,
    Hold = 20,
    Released = 30,
    Deprecated = 40,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Development,
        Status::Testing,
        Status::Hold,
        Status::Released,
        Status::Deprecated,
    ];

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Development => "Development",
            Status::Testing => "Testing",
            Status::Hold => "Hold",
            Status::Released => "Released",
            Status::Deprecated => "Deprecated",
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Development
    }
}

impl TryFrom<i64> for Status {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Status::ALL
            .into_iter()
            .find(|s| s.code() == code)
            .ok_or_else(|| format!("invalid release status code {}", code))
    }
}

impl From<Status> for i64 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Store-assigned release identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseId(pub i64);

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A versioned release of a package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub id: ReleaseId,

    /// Key of the configured package this release belongs to
    pub package: String,

    pub version: String,

    /// Production availability gate
    pub active: bool,

    pub status: Status,

    /// Effective-from timestamp, also the ordering key
    #[serde(with = "time::serde::rfc3339")]
    pub release_date: OffsetDateTime,

    /// Effective-until timestamp
    #[serde(with = "time::serde::rfc3339::option")]
    pub deprecation_date: Option<OffsetDateTime>,

    pub release_notes: String,

    /// Opaque integrity token, stored as given
    pub signature: Option<String>,

    pub files: FileManifest,

    /// Groups allowed to see the release; empty means unrestricted
    pub groups: BTreeSet<String>,

    /// Sites the release is available on; empty means every site
    pub sites: BTreeSet<SiteId>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Release {
    /// Whether the release is past its deprecation date at `now`
    pub fn is_deprecated_at(&self, now: OffsetDateTime) -> bool {
        matches!(self.deprecation_date, Some(date) if date < now)
    }

    pub fn is_available_on(&self, site: SiteId) -> bool {
        self.sites.is_empty() || self.sites.contains(&site)
    }

    pub fn is_visible_to_groups(&self, groups: &BTreeSet<String>) -> bool {
        self.groups.is_empty() || !self.groups.is_disjoint(groups)
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.package, self.version)
    }
}

/// Input for creating a release
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRelease {
    pub package: String,

    pub version: String,

    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default)]
    pub status: Status,

    /// Defaults to the creation time when absent
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub release_date: Option<OffsetDateTime>,

    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deprecation_date: Option<OffsetDateTime>,

    #[serde(default)]
    pub release_notes: String,

    #[serde(default)]
    pub signature: Option<String>,

    #[serde(default)]
    pub files: FileManifest,

    #[serde(default)]
    pub groups: BTreeSet<String>,

    #[serde(default)]
    pub sites: BTreeSet<SiteId>,
}

fn default_active() -> bool {
    true
}

impl NewRelease {
    pub fn new(package: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
            active: true,
            status: Status::default(),
            release_date: None,
            deprecation_date: None,
            release_notes: String::new(),
            signature: None,
            files: FileManifest::default(),
            groups: BTreeSet::new(),
            sites: BTreeSet::new(),
        }
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn released_at(mut self, date: OffsetDateTime) -> Self {
        self.release_date = Some(date);
        self
    }

    pub fn deprecated_at(mut self, date: OffsetDateTime) -> Self {
        self.deprecation_date = Some(date);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.release_notes = notes.into();
        self
    }

    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn files(mut self, files: FileManifest) -> Self {
        self.files = files;
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    pub fn site(mut self, site: impl Into<SiteId>) -> Self {
        self.sites.insert(site.into());
        self
    }

    /// Basic shape checks before anything is written
    pub fn validate(&self) -> crate::Result<()> {
        if self.package.trim().is_empty() {
            return Err(crate::RegistryError::Validation(
                "Package key cannot be empty".into(),
            ));
        }
        if self.version.trim().is_empty() {
            return Err(crate::RegistryError::Validation(
                "Version cannot be empty".into(),
            ));
        }
        Ok(())
    }

    /// Materialize the release with a store-assigned id
    pub fn into_release(self, id: ReleaseId, now: OffsetDateTime) -> Release {
        Release {
            id,
            package: self.package,
            version: self.version,
            active: self.active,
            status: self.status,
            release_date: self.release_date.unwrap_or(now),
            deprecation_date: self.deprecation_date,
            release_notes: self.release_notes,
            signature: self.signature,
            files: self.files,
            groups: self.groups,
            sites: self.sites,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_status_codes_are_stable() {
        let codes: Vec<i64> = Status::ALL.iter().map(|s| s.code()).collect();
        assert_eq!(codes, vec![1, 10, 20, 30, 40]);
        assert_eq!(Status::try_from(20).unwrap(), Status::Hold);
        assert!(Status::try_from(5).is_err());
    }

    #[test]
    fn test_status_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Status::Released).unwrap(), "30");
        let status: Status = serde_json::from_str("10").unwrap();
        assert_eq!(status, Status::Testing);
        assert!(serde_json::from_str::<Status>("11").is_err());
    }

    #[test]
    fn test_user_permissions() {
        let testers = Group::new("testers").with_permission(VIEW_PRETEST_RELEASES);
        let user = User::new("dev").with_group(testers.clone()).with_group(testers);

        assert_eq!(user.groups.len(), 1);
        assert!(user.has_permission(VIEW_PRETEST_RELEASES));
        assert!(!user.has_permission(ADD_RELEASE));
        assert!(User::superuser("root").has_permission(ADD_RELEASE));
    }

    #[test]
    fn test_new_release_defaults() {
        let now = datetime!(2024-05-22 12:00 UTC);
        let release = NewRelease::new("basic", "v1.0").into_release(ReleaseId(7), now);

        assert!(release.active);
        assert_eq!(release.status, Status::Development);
        assert_eq!(release.release_date, now);
        assert_eq!(release.files, FileManifest::default());
        assert!(release.groups.is_empty());
        assert!(release.sites.is_empty());
        assert_eq!(release.to_string(), "basic - v1.0");
    }

    #[test]
    fn test_new_release_from_json() {
        let body = r#"{
            "package": "test_package",
            "version": "v1.1",
            "release_date": "2024-05-22T12:00:00Z",
            "status": 1,
            "release_notes": "Added new features.",
            "files": {"css": ["css/styles.css"]},
            "signature": "signature123"
        }"#;
        let new: NewRelease = serde_json::from_str(body).unwrap();

        assert!(new.active);
        assert_eq!(new.status, Status::Development);
        assert_eq!(new.release_date, Some(datetime!(2024-05-22 12:00 UTC)));
        assert_eq!(new.files.group("css").unwrap()[0].path, "css/styles.css");
        assert_eq!(new.signature.as_deref(), Some("signature123"));
    }

    #[test]
    fn test_release_scoping_helpers() {
        let now = datetime!(2024-05-22 12:00 UTC);
        let release = NewRelease::new("basic", "v1")
            .site(1)
            .group("testers")
            .deprecated_at(now)
            .into_release(ReleaseId(1), now);

        assert!(release.is_available_on(SiteId(1)));
        assert!(!release.is_available_on(SiteId(2)));
        assert!(!release.is_deprecated_at(now));
        assert!(release.is_deprecated_at(now + time::Duration::seconds(1)));

        let groups: BTreeSet<String> = ["testers".to_string()].into();
        assert!(release.is_visible_to_groups(&groups));
        assert!(!release.is_visible_to_groups(&BTreeSet::new()));
    }
}
