//! Per-release file manifest: file-group key to an ordered list of file descriptors

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{RegistryError, Result};

/// A reference to a static asset plus free-form options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FileEntry")]
pub struct FileDescriptor {
    pub path: String,
    pub options: BTreeMap<String, String>,
}

impl FileDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            options: BTreeMap::new(),
        }
    }

    pub fn with_options(path: impl Into<String>, options: BTreeMap<String, String>) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    /// Extension of the final path segment, if any
    pub fn extension(&self) -> Option<&str> {
        infer_file_group(&self.path)
    }
}

/// Accepted input shapes for a manifest entry: a bare path or a full descriptor
#[derive(Deserialize)]
#[serde(untagged)]
enum FileEntry {
    Path(String),
    Descriptor {
        path: String,
        #[serde(default)]
        options: BTreeMap<String, String>,
    },
}

impl From<FileEntry> for FileDescriptor {
    fn from(entry: FileEntry) -> Self {
        match entry {
            FileEntry::Path(path) => FileDescriptor::new(path),
            FileEntry::Descriptor { path, options } => FileDescriptor { path, options },
        }
    }
}

/// One entry or a list of entries for a group in a patch
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<FileDescriptor>),
    One(FileDescriptor),
}

impl From<OneOrMany> for Vec<FileDescriptor> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::Many(files) => files,
            OneOrMany::One(file) => vec![file],
        }
    }
}

/// Grouped list of asset descriptors attached to a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileManifest {
    groups: BTreeMap<String, Vec<FileDescriptor>>,
}

impl Default for FileManifest {
    /// Empty `css` and `js` groups
    fn default() -> Self {
        let mut groups = BTreeMap::new();
        groups.insert("css".to_string(), Vec::new());
        groups.insert("js".to_string(), Vec::new());
        Self { groups }
    }
}

impl FileManifest {
    /// A manifest with no groups at all
    pub fn empty() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }

    pub fn group(&self, key: &str) -> Option<&[FileDescriptor]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    pub fn group_keys(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a file to `group`, or to the group inferred from the path's extension.
    ///
    /// Returns the group key the file landed in. Paths are not deduplicated.
    pub fn register_file(
        &mut self,
        group: Option<&str>,
        path: &str,
        options: BTreeMap<String, String>,
    ) -> Result<String> {
        let group = resolve_file_group(group, path)?;
        self.push(&group, FileDescriptor::with_options(path, options));
        Ok(group)
    }

    /// Append an already-built descriptor to a group
    pub fn push(&mut self, group: &str, file: FileDescriptor) {
        self.groups.entry(group.to_string()).or_default().push(file);
    }

    /// Apply a partial update: existing groups are extended, new groups inserted
    pub fn merge(&mut self, patch: ManifestPatch) {
        for (group, files) in patch.groups {
            self.groups.entry(group).or_default().extend(files);
        }
    }
}

/// Partial manifest used for merge updates.
///
/// Each group accepts either a single entry or a list; entries are paths or descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestPatch {
    groups: BTreeMap<String, Vec<FileDescriptor>>,
}

impl<'de> Deserialize<'de> for ManifestPatch {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = BTreeMap::<String, OneOrMany>::deserialize(deserializer)?;
        Ok(Self {
            groups: raw.into_iter().map(|(k, v)| (k, v.into())).collect(),
        })
    }
}

impl ManifestPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, group: impl Into<String>, file: FileDescriptor) -> Self {
        self.groups.entry(group.into()).or_default().push(file);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.groups.values().all(Vec::is_empty)
    }
}

/// Group key derived from the extension of the path's final segment
pub fn infer_file_group(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(ext),
        _ => None,
    }
}

/// Explicit group if given, otherwise the inferred one
pub fn resolve_file_group(group: Option<&str>, path: &str) -> Result<String> {
    if path.trim().is_empty() {
        return Err(RegistryError::Validation("File path cannot be empty".into()));
    }
    match group {
        Some(g) if !g.trim().is_empty() => Ok(g.to_string()),
        Some(_) => Err(RegistryError::Validation("File group cannot be empty".into())),
        None => infer_file_group(path).map(str::to_string).ok_or_else(|| {
            RegistryError::Validation(format!(
                "Cannot infer a file group for \"{}\": no extension",
                path
            ))
        }),
    }
}

/// Parse `key=value` option pairs. Any malformed pair rejects the whole list.
pub fn parse_options<S: AsRef<str>>(pairs: &[S]) -> Result<BTreeMap<String, String>> {
    let mut options = BTreeMap::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let mut parts = pair.split('=');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) if !key.is_empty() => {
                options.insert(key.to_string(), value.to_string());
            }
            _ => {
                return Err(RegistryError::Validation(format!(
                    "Options must be in the format key=value, got \"{}\"",
                    pair
                )));
            }
        }
    }
    Ok(options)
}
