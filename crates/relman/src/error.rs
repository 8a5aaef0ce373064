//! Error types for the release registry

use thiserror::Error;

/// Registry-specific errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Release {version} not found for package {package}")]
    ReleaseNotFound { package: String, version: String },

    #[error("Release with id {0} not found")]
    ReleaseIdNotFound(i64),

    #[error("Site not found: {0}")]
    SiteNotFound(i64),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Release {version} already exists for package {package}")]
    ReleaseAlreadyExists { package: String, version: String },

    #[error("Site already exists: {0}")]
    SiteAlreadyExists(i64),

    #[error("Group already exists: {0}")]
    GroupAlreadyExists(String),

    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("Package \"{0}\" is not configured")]
    UnknownPackage(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification of [`RegistryError`] for outer layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Configuration,
    PermissionDenied,
    Validation,
    Internal,
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::ReleaseNotFound { .. }
            | RegistryError::ReleaseIdNotFound(_)
            | RegistryError::SiteNotFound(_)
            | RegistryError::GroupNotFound(_)
            | RegistryError::UserNotFound(_) => ErrorKind::NotFound,
            RegistryError::ReleaseAlreadyExists { .. }
            | RegistryError::SiteAlreadyExists(_)
            | RegistryError::GroupAlreadyExists(_)
            | RegistryError::UserAlreadyExists(_) => ErrorKind::Conflict,
            RegistryError::UnknownPackage(_) => ErrorKind::Configuration,
            RegistryError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            RegistryError::Validation(_) => ErrorKind::Validation,
            RegistryError::Storage(_) | RegistryError::Serialization(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn release_not_found(package: &str, version: &str) -> Self {
        Self::ReleaseNotFound {
            package: package.to_string(),
            version: version.to_string(),
        }
    }

    pub(crate) fn release_exists(package: &str, version: &str) -> Self {
        Self::ReleaseAlreadyExists {
            package: package.to_string(),
            version: version.to_string(),
        }
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
