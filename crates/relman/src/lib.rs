//! # Relman
//!
//! A release metadata registry. It keeps track of:
//! - versioned releases of configured packages, ordered by release date
//! - the static-asset file manifest of each release
//! - which users, groups and sites may see which release
//!
//! ## Core Concepts
//!
//! - **Packages** are configured up front in a [`PackageRegistry`]
//! - **Releases** carry a status (Development → Released → Deprecated), an
//!   active flag, optional group and site scoping and a deprecation date
//! - **Access tiers**: superusers see every active release, members of a group
//!   holding `can_view_pretest_releases` also see pre-production releases of
//!   their groups, everyone else sees released versions only
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use relman::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! let packages = PackageRegistry::new().with_package("basic", PackageInfo::new("Basic"));
//! let registry = ReleaseRegistry::new(Arc::new(MemoryStore::new()), packages);
//!
//! let admin = User::system();
//! registry
//!     .create_release(&admin, NewRelease::new("basic", "v1.0").status(Status::Released))
//!     .await?;
//! registry
//!     .register_file(&admin, "basic", "v1.0", None, "js/app.min.js", &["defer=true"])
//!     .await?;
//!
//! let current = registry
//!     .latest_release(&User::new("visitor"), SiteId(1), "basic")
//!     .await?;
//! println!("Current release: {:?}", current.map(|r| r.version));
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod entities;
pub mod error;
pub mod manifest;
pub mod packages;
pub mod registry;
pub mod storage;

pub use access::{AccessEngine, AccessTier, classify};
pub use entities::*;
pub use error::{ErrorKind, RegistryError, Result};
pub use manifest::{FileDescriptor, FileManifest, ManifestPatch};
pub use packages::{PackageInfo, PackageRegistry};
pub use registry::{PackageOverview, ReleaseRegistry};
pub use storage::{MemoryStore, ReleaseFilter, ReleaseOrder, ReleaseStore};

#[cfg(feature = "sqlite")]
pub use storage::SqliteStore;
