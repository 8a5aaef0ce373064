//! Static package configuration
//!
//! Packages are not stored records: they are declared up front and handed to
//! the registry as an immutable [`PackageRegistry`]. Releases refer to them by key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{RegistryError, Result};

/// Display information for a configured package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,
}

impl PackageInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Immutable map of package key to package information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRegistry {
    #[serde(default)]
    packages: BTreeMap<String, PackageInfo>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package while building the registry
    pub fn with_package(mut self, key: impl Into<String>, info: PackageInfo) -> Self {
        self.packages.insert(key.into(), info);
        self
    }

    /// Parse a TOML document of the form
    ///
    /// ```toml
    /// [packages.basic]
    /// name = "Basic"
    /// description = "Optional text"
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let registry: PackageRegistry = toml::from_str(source)
            .map_err(|e| RegistryError::Validation(format!("Invalid package configuration: {}", e)))?;

        for key in registry.packages.keys() {
            if key.trim().is_empty() {
                return Err(RegistryError::Validation(
                    "Package key cannot be empty".into(),
                ));
            }
        }
        Ok(registry)
    }

    /// Load the registry from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            RegistryError::Storage(format!(
                "Failed to read package configuration {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&source)
    }

    /// Look up a package; an unknown key is a configuration error
    pub fn get(&self, key: &str) -> Result<&PackageInfo> {
        self.packages
            .get(key)
            .ok_or_else(|| RegistryError::UnknownPackage(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.packages.contains_key(key)
    }

    /// Packages sorted by key
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PackageInfo)> {
        self.packages.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
