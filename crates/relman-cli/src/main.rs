//! `relman` command line tool
//!
//! Inspects the configured packages and seeds releases, files, sites,
//! groups and users directly in the release store.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relman::{PackageRegistry, ReleaseRegistry, SqliteStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

mod commands;

use commands::{AddFileArgs, AddGroupArgs, AddReleaseArgs, AddSiteArgs, AddUserArgs, SetStatusArgs};

#[derive(Parser, Debug)]
#[command(name = "relman", version, about = "Manage packages and releases")]
struct Cli {
    /// SQLite database holding releases, sites, groups and users
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:./data/relman.db", global = true)]
    database_url: String,

    /// TOML file declaring the packages
    #[arg(long, env = "RELMAN_PACKAGES", default_value = "./packages.toml", global = true)]
    packages: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured packages and their active releases
    Packages,
    /// Register a new release for a package
    AddRelease(AddReleaseArgs),
    /// Register a file under a release
    AddFile(AddFileArgs),
    /// Change the status of a release
    SetStatus(SetStatusArgs),
    /// Create a site
    AddSite(AddSiteArgs),
    /// Create a group
    AddGroup(AddGroupArgs),
    /// Create a user
    AddUser(AddUserArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "relman_cli=info".to_string()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let registry = open_registry(&cli.database_url, &cli.packages).await?;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Command::Packages => commands::packages(&registry, &mut out).await,
        Command::AddRelease(args) => commands::add_release(&registry, args, &mut out).await,
        Command::AddFile(args) => commands::add_file(&registry, args, &mut out).await,
        Command::SetStatus(args) => commands::set_status(&registry, args, &mut out).await,
        Command::AddSite(args) => commands::add_site(&registry, args, &mut out).await,
        Command::AddGroup(args) => commands::add_group(&registry, args, &mut out).await,
        Command::AddUser(args) => commands::add_user(&registry, args, &mut out).await,
    }
}

async fn open_registry(database_url: &str, packages: &Path) -> Result<ReleaseRegistry> {
    let packages = PackageRegistry::from_toml_file(packages)
        .with_context(|| format!("Failed to load packages from {}", packages.display()))?;
    debug!("Loaded {} packages", packages.len());

    if let Some(parent) = database_url
        .strip_prefix("sqlite:")
        .and_then(|path| Path::new(path.trim_start_matches("//")).parent())
        .filter(|dir| !dir.as_os_str().is_empty())
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let store = SqliteStore::new(database_url)
        .await
        .with_context(|| format!("Failed to open database {}", database_url))?;
    Ok(ReleaseRegistry::new(Arc::new(store), packages))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add_file() {
        let cli = Cli::try_parse_from([
            "relman",
            "add-file",
            "basic",
            "v1.0",
            "js/app.js",
            "--file-group",
            "scripts",
            "--option",
            "defer=true",
            "--option",
            "async=false",
        ])
        .unwrap();

        match cli.command {
            Command::AddFile(args) => {
                assert_eq!(args.path, "js/app.js");
                assert_eq!(args.file_group.as_deref(), Some("scripts"));
                assert_eq!(args.option, vec!["defer=true", "async=false"]);
            }
            other => panic!("Expected add-file, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_add_release_status() {
        let cli = Cli::try_parse_from(["relman", "add-release", "basic", "v1.0", "--status", "released"]).unwrap();
        match cli.command {
            Command::AddRelease(args) => assert_eq!(args.status, relman::Status::Released),
            other => panic!("Expected add-release, got {:?}", other),
        }

        let cli = Cli::try_parse_from(["relman", "add-release", "basic", "v1.0", "--status", "10"]).unwrap();
        match cli.command {
            Command::AddRelease(args) => assert_eq!(args.status, relman::Status::Testing),
            other => panic!("Expected add-release, got {:?}", other),
        }

        assert!(Cli::try_parse_from(["relman", "add-release", "basic", "v1.0", "--status", "15"]).is_err());
    }
}
