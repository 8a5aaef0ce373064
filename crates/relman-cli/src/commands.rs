//! Subcommand implementations

use anyhow::{Context, Result, bail};
use clap::Args;
use console::style;
use relman::{
    ErrorKind, Group, NewRelease, RegistryError, ReleaseRegistry, Site, Status, User,
};
use std::io::Write;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;

/// Accept a status code (`30`) or a label (`released`)
pub fn parse_status(value: &str) -> std::result::Result<Status, String> {
    if let Ok(code) = value.parse::<i64>() {
        return Status::try_from(code);
    }
    Status::ALL
        .into_iter()
        .find(|s| s.label().eq_ignore_ascii_case(value))
        .ok_or_else(|| {
            let labels: Vec<&str> = Status::ALL.iter().map(|s| s.label()).collect();
            format!("unknown status {}; expected one of {}", value, labels.join(", "))
        })
}

fn parse_timestamp(value: &str) -> std::result::Result<OffsetDateTime, String> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|e| format!("invalid RFC 3339 timestamp: {}", e))
}

#[derive(Args, Debug)]
pub struct AddReleaseArgs {
    /// Key of a configured package
    pub package: String,
    pub version: String,

    /// Status code or label
    #[arg(long, value_parser = parse_status, default_value = "development")]
    pub status: Status,

    #[arg(long, default_value = "")]
    pub notes: String,

    /// Release date (RFC 3339), defaults to now
    #[arg(long, value_parser = parse_timestamp)]
    pub released_at: Option<OffsetDateTime>,

    /// Deprecation date (RFC 3339)
    #[arg(long, value_parser = parse_timestamp)]
    pub deprecated_at: Option<OffsetDateTime>,

    /// Create the release switched off
    #[arg(long)]
    pub inactive: bool,

    /// Restrict to a group; repeatable
    #[arg(long = "group")]
    pub groups: Vec<String>,

    /// Restrict to a site id; repeatable
    #[arg(long = "site")]
    pub sites: Vec<i64>,
}

#[derive(Args, Debug)]
pub struct AddFileArgs {
    pub package: String,
    pub version: String,
    pub path: String,

    /// Group to file under; defaults to the path's extension
    #[arg(long)]
    pub file_group: Option<String>,

    /// key=value pair stored with the file; repeatable
    #[arg(long)]
    pub option: Vec<String>,
}

#[derive(Args, Debug)]
pub struct SetStatusArgs {
    pub package: String,
    pub version: String,
    #[arg(value_parser = parse_status)]
    pub status: Status,
}

#[derive(Args, Debug)]
pub struct AddSiteArgs {
    pub id: i64,
    pub domain: String,

    /// Display name, defaults to the domain
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct AddGroupArgs {
    pub name: String,

    /// Permission granted to members; repeatable
    #[arg(long = "permission")]
    pub permissions: Vec<String>,
}

#[derive(Args, Debug)]
pub struct AddUserArgs {
    pub username: String,

    #[arg(long)]
    pub superuser: bool,

    /// Group to join; repeatable
    #[arg(long = "group")]
    pub groups: Vec<String>,
}

pub async fn packages(registry: &ReleaseRegistry, out: &mut impl Write) -> Result<()> {
    let overview = registry.package_overview().await?;
    if overview.is_empty() {
        writeln!(out, "{}", style("No packages configured.").yellow())?;
        return Ok(());
    }

    writeln!(
        out,
        "{}",
        style("Listing all configured packages and their active releases:").green()
    )?;
    for package in overview {
        writeln!(out, "Package key: {}, Name: {}", package.key, package.info.name)?;
        if package.active_releases.is_empty() {
            writeln!(out, "\tNo active releases")?;
            continue;
        }

        writeln!(out, "\tActive Releases:")?;
        for release in &package.active_releases {
            let line = match release.status {
                Status::Released => style(format!("\t\tVersion: {}*", release.version)).green(),
                Status::Testing | Status::Development => {
                    style(format!("\t\tVersion: {}", release.version)).yellow()
                }
                Status::Deprecated => style(format!("\t\tVersion: {}~", release.version)).red(),
                Status::Hold => style(format!("\t\tVersion: {}", release.version)),
            };
            writeln!(out, "{}", line)?;
        }
    }
    Ok(())
}

pub async fn add_release(registry: &ReleaseRegistry, args: AddReleaseArgs, out: &mut impl Write) -> Result<()> {
    let mut release = NewRelease::new(&args.package, &args.version)
        .status(args.status)
        .notes(args.notes)
        .active(!args.inactive);
    if let Some(date) = args.released_at {
        release = release.released_at(date);
    }
    if let Some(date) = args.deprecated_at {
        release = release.deprecated_at(date);
    }
    for group in args.groups {
        release = release.group(group);
    }
    for site in args.sites {
        release = release.site(site);
    }

    match registry.create_release(&User::system(), release).await {
        Ok(release) => {
            info!("Created release {} ({})", release, release.id);
            writeln!(
                out,
                "{}",
                style(format!(
                    "Successfully registered release {} for package {}.",
                    args.version, args.package
                ))
                .green()
            )?;
        }
        Err(RegistryError::ReleaseAlreadyExists { package, version }) => {
            writeln!(
                out,
                "{}",
                style(format!("Release {} for package {} already exists.", version, package)).yellow()
            )?;
        }
        Err(e) => return Err(e).context("Failed to register release"),
    }
    Ok(())
}

pub async fn add_file(registry: &ReleaseRegistry, args: AddFileArgs, out: &mut impl Write) -> Result<()> {
    let files = registry
        .register_file(
            &User::system(),
            &args.package,
            &args.version,
            args.file_group.as_deref(),
            &args.path,
            args.option.as_slice(),
        )
        .await
        .with_context(|| format!("Error registering file {}", args.path))?;

    let group = relman::manifest::resolve_file_group(args.file_group.as_deref(), &args.path)?;
    info!("{} {} now lists {} files", args.package, args.version, files.len());
    writeln!(
        out,
        "{}",
        style(format!(
            "Successfully registered file at {} under {} in release {} of package {}.",
            args.path, group, args.version, args.package
        ))
        .green()
    )?;
    Ok(())
}

pub async fn set_status(registry: &ReleaseRegistry, args: SetStatusArgs, out: &mut impl Write) -> Result<()> {
    let release = registry
        .set_status(&User::system(), &args.package, &args.version, args.status)
        .await
        .context("Failed to change status")?;

    writeln!(
        out,
        "{}",
        style(format!("{} is now {}.", release, release.status)).green()
    )?;
    Ok(())
}

pub async fn add_site(registry: &ReleaseRegistry, args: AddSiteArgs, out: &mut impl Write) -> Result<()> {
    let name = args.name.unwrap_or_else(|| args.domain.clone());
    let site = Site::new(args.id, args.domain, name);
    registry
        .store()
        .create_site(&site)
        .await
        .with_context(|| format!("Failed to create site {}", args.id))?;

    writeln!(out, "{}", style(format!("Created site {} ({}).", site.id, site.domain)).green())?;
    Ok(())
}

pub async fn add_group(registry: &ReleaseRegistry, args: AddGroupArgs, out: &mut impl Write) -> Result<()> {
    let group = args
        .permissions
        .into_iter()
        .fold(Group::new(&args.name), Group::with_permission);
    registry
        .store()
        .create_group(&group)
        .await
        .with_context(|| format!("Failed to create group {}", args.name))?;

    writeln!(out, "{}", style(format!("Created group {}.", args.name)).green())?;
    Ok(())
}

pub async fn add_user(registry: &ReleaseRegistry, args: AddUserArgs, out: &mut impl Write) -> Result<()> {
    let store = registry.store();
    for group in &args.groups {
        match store.get_group(group).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => bail!("Group {} does not exist", group),
            Err(e) => return Err(e.into()),
        }
    }

    store
        .create_user(&args.username, args.superuser)
        .await
        .with_context(|| format!("Failed to create user {}", args.username))?;
    for group in &args.groups {
        store.add_group_member(group, &args.username).await?;
    }

    writeln!(out, "{}", style(format!("Created user {}.", args.username)).green())?;
    Ok(())
}
