//! SQLite store implementation
//!
//! Releases live in one row each; group and site scoping are join tables that
//! are queried with `EXISTS` subqueries, so a release never appears twice in a
//! result set. Scoping sets are loaded in the same statement as the row.
//! Manifest updates run inside `BEGIN IMMEDIATE` so writers queue on the
//! database lock instead of overwriting each other.

use super::{GroupScope, ManifestUpdate, ReleaseFilter, ReleaseOrder, ReleaseStore};
use crate::entities::{Group, NewRelease, Release, ReleaseId, Site, SiteId, Status, User};
use crate::error::{RegistryError, Result};
use crate::manifest::FileManifest;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// How long a writer waits for the database lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const RELEASE_COLUMNS: &str = "r.id, r.package, r.version, r.active, r.status, r.release_date, \
     r.deprecation_date, r.release_notes, r.signature, r.files, r.created_at, r.updated_at, \
     (SELECT json_group_array(g.group_name) FROM release_groups g WHERE g.release_id = r.id) AS group_names, \
     (SELECT json_group_array(s.site_id) FROM release_sites s WHERE s.release_id = r.id) AS site_ids";

/// SQLite-based release store
pub struct SqliteStore {
    pool: SqlitePool,
}

fn storage_err(context: &str) -> impl FnOnce(sqlx::Error) -> RegistryError + '_ {
    move |e| RegistryError::Storage(format!("{}: {}", context, e))
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(column)
        .map_err(|e| RegistryError::Storage(format!("Failed to read column {}: {}", column, e)))
}

fn site_from_row(row: &SqliteRow) -> Result<Site> {
    Ok(Site {
        id: SiteId(get(row, "id")?),
        domain: get(row, "domain")?,
        name: get(row, "name")?,
    })
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Timestamps are stored as UTC microseconds so SQL ordering matches time
/// ordering. Every `OffsetDateTime` fits; sub-microsecond precision is dropped.
fn to_db_time(t: OffsetDateTime) -> Result<i64> {
    i64::try_from(t.unix_timestamp_nanos().div_euclid(1_000))
        .map_err(|_| RegistryError::Validation(format!("Timestamp out of range: {}", t)))
}

fn from_db_time(micros: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
        .map_err(|e| RegistryError::Storage(format!("Failed to decode timestamp: {}", e)))
}

fn release_from_row(row: &SqliteRow) -> Result<Release> {
    let status = Status::try_from(get::<i64>(row, "status")?).map_err(RegistryError::Storage)?;
    let files: FileManifest = serde_json::from_str(&get::<String>(row, "files")?)?;
    let groups: BTreeSet<String> = serde_json::from_str(&get::<String>(row, "group_names")?)?;
    let sites: BTreeSet<SiteId> = serde_json::from_str(&get::<String>(row, "site_ids")?)?;
    let deprecation: Option<i64> = get(row, "deprecation_date")?;

    Ok(Release {
        id: ReleaseId(get(row, "id")?),
        package: get(row, "package")?,
        version: get(row, "version")?,
        active: get(row, "active")?,
        status,
        release_date: from_db_time(get(row, "release_date")?)?,
        deprecation_date: deprecation.map(from_db_time).transpose()?,
        release_notes: get(row, "release_notes")?,
        signature: get(row, "signature")?,
        files,
        groups,
        sites,
        created_at: from_db_time(get(row, "created_at")?)?,
        updated_at: from_db_time(get(row, "updated_at")?)?,
    })
}

fn push_predicates(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ReleaseFilter) {
    qb.push(" WHERE r.package = ");
    qb.push_bind(filter.package.clone());

    if let Some(active) = filter.active {
        qb.push(" AND r.active = ");
        qb.push_bind(active);
    }

    if let Some(status) = filter.status {
        qb.push(" AND r.status = ");
        qb.push_bind(status.code());
    }

    if let Some(site) = filter.site {
        qb.push(
            " AND (NOT EXISTS (SELECT 1 FROM release_sites s WHERE s.release_id = r.id) \
             OR EXISTS (SELECT 1 FROM release_sites s WHERE s.release_id = r.id AND s.site_id = ",
        );
        qb.push_bind(site.0);
        qb.push("))");
    }

    let (groups, status) = match &filter.groups {
        GroupScope::Any => return,
        GroupScope::MemberOf(groups) => (groups, None),
        GroupScope::MemberOfOrStatus { groups, status } => (groups, Some(*status)),
    };

    qb.push(" AND (NOT EXISTS (SELECT 1 FROM release_groups g WHERE g.release_id = r.id)");
    if let Some(status) = status {
        qb.push(" OR r.status = ");
        qb.push_bind(status.code());
    }
    if !groups.is_empty() {
        qb.push(
            " OR EXISTS (SELECT 1 FROM release_groups g WHERE g.release_id = r.id AND g.group_name IN (",
        );
        let mut names = qb.separated(", ");
        for group in groups {
            names.push_bind(group.clone());
        }
        names.push_unseparated("))");
    }
    qb.push(")");
}

impl SqliteStore {
    /// Create a new SQLite store with the given database URL
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| RegistryError::Storage(format!("Invalid database path: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(storage_err("Failed to connect to SQLite"))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS releases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                package TEXT NOT NULL,
                version TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                status INTEGER NOT NULL,
                release_date INTEGER NOT NULL,       -- UTC microseconds
                deprecation_date INTEGER,
                release_notes TEXT NOT NULL DEFAULT '',
                signature TEXT,
                files TEXT NOT NULL,                 -- JSON manifest
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (package, version)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS release_groups (
                release_id INTEGER NOT NULL REFERENCES releases(id),
                group_name TEXT NOT NULL,
                PRIMARY KEY (release_id, group_name)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS release_sites (
                release_id INTEGER NOT NULL REFERENCES releases(id),
                site_id INTEGER NOT NULL,
                PRIMARY KEY (release_id, site_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sites (
                id INTEGER PRIMARY KEY,
                domain TEXT NOT NULL,
                name TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS groups (
                name TEXT PRIMARY KEY,
                permissions TEXT NOT NULL            -- JSON array
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS users (
                username TEXT PRIMARY KEY,
                is_superuser INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS group_members (
                group_name TEXT NOT NULL REFERENCES groups(name),
                username TEXT NOT NULL REFERENCES users(username),
                PRIMARY KEY (group_name, username)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_releases_package_date ON releases(package, release_date)",
            "CREATE INDEX IF NOT EXISTS idx_release_sites_site ON release_sites(site_id)",
            "CREATE INDEX IF NOT EXISTS idx_release_groups_group ON release_groups(group_name)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage_err("Failed to initialize schema"))?;
        }

        Ok(())
    }

    async fn fetch_release(&self, package: &str, version: &str) -> Result<Release> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM releases r WHERE r.package = ? AND r.version = ?",
            RELEASE_COLUMNS
        ))
        .bind(package)
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err("Failed to get release"))?
        .ok_or_else(|| RegistryError::release_not_found(package, version))?;

        release_from_row(&row)
    }

    async fn update_column(&self, package: &str, version: &str, column: &str, value: i64) -> Result<Release> {
        let now = to_db_time(OffsetDateTime::now_utc())?;
        let result = sqlx::query(&format!(
            "UPDATE releases SET {} = ?, updated_at = ? \
             WHERE package = ? AND version = ?",
            column
        ))
        .bind(value)
        .bind(now)
        .bind(package)
        .bind(version)
        .execute(&self.pool)
        .await
        .map_err(storage_err("Failed to update release"))?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::release_not_found(package, version));
        }
        self.fetch_release(package, version).await
    }

    async fn user_exists(&self, username: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err("Failed to look up user"))?;
        Ok(row.is_some())
    }

    /// Read-modify-write of one manifest on a connection holding the write lock
    async fn write_manifest(
        conn: &mut SqliteConnection,
        package: &str,
        version: &str,
        update: &ManifestUpdate,
    ) -> Result<i64> {
        let row = sqlx::query("SELECT id, files FROM releases WHERE package = ? AND version = ?")
            .bind(package)
            .bind(version)
            .fetch_optional(&mut *conn)
            .await
            .map_err(storage_err("Failed to read release files"))?
            .ok_or_else(|| RegistryError::release_not_found(package, version))?;

        let id: i64 = get(&row, "id")?;
        let mut manifest: FileManifest = serde_json::from_str(&get::<String>(&row, "files")?)?;
        update.apply(&mut manifest);

        sqlx::query("UPDATE releases SET files = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&manifest)?)
            .bind(to_db_time(OffsetDateTime::now_utc())?)
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(storage_err("Failed to write release files"))?;

        Ok(id)
    }
}

#[async_trait]
impl ReleaseStore for SqliteStore {
    async fn create_release(&self, release: NewRelease) -> Result<Release> {
        let now = OffsetDateTime::now_utc();
        let release_date = to_db_time(release.release_date.unwrap_or(now))?;
        let deprecation_date = release.deprecation_date.map(to_db_time).transpose()?;
        let files = serde_json::to_string(&release.files)?;
        let now = to_db_time(now)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage_err("Failed to begin transaction"))?;

        let result = sqlx::query(
            r#"
            INSERT INTO releases
            (package, version, active, status, release_date, deprecation_date,
             release_notes, signature, files, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&release.package)
        .bind(&release.version)
        .bind(release.active)
        .bind(release.status.code())
        .bind(release_date)
        .bind(deprecation_date)
        .bind(&release.release_notes)
        .bind(release.signature.as_deref())
        .bind(files)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RegistryError::release_exists(&release.package, &release.version)
            } else {
                RegistryError::Storage(format!("Failed to insert release: {}", e))
            }
        })?;

        let id = result.last_insert_rowid();

        for group in &release.groups {
            sqlx::query("INSERT INTO release_groups (release_id, group_name) VALUES (?, ?)")
                .bind(id)
                .bind(group)
                .execute(&mut *tx)
                .await
                .map_err(storage_err("Failed to insert release group"))?;
        }

        for site in &release.sites {
            sqlx::query("INSERT INTO release_sites (release_id, site_id) VALUES (?, ?)")
                .bind(id)
                .bind(site.0)
                .execute(&mut *tx)
                .await
                .map_err(storage_err("Failed to insert release site"))?;
        }

        tx.commit()
            .await
            .map_err(storage_err("Failed to commit release"))?;

        self.get_release_by_id(ReleaseId(id)).await
    }

    async fn get_release(&self, package: &str, version: &str) -> Result<Release> {
        self.fetch_release(package, version).await
    }

    async fn get_release_by_id(&self, id: ReleaseId) -> Result<Release> {
        let row = sqlx::query(&format!("SELECT {} FROM releases r WHERE r.id = ?", RELEASE_COLUMNS))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err("Failed to get release"))?
            .ok_or(RegistryError::ReleaseIdNotFound(id.0))?;

        release_from_row(&row)
    }

    async fn find_releases(&self, filter: &ReleaseFilter) -> Result<Vec<Release>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM releases r", RELEASE_COLUMNS));
        push_predicates(&mut qb, filter);
        qb.push(match filter.order {
            ReleaseOrder::NewestFirst => " ORDER BY r.release_date DESC, r.id DESC",
            ReleaseOrder::OldestFirst => " ORDER BY r.release_date ASC, r.id ASC",
        });

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err("Failed to query releases"))?;

        rows.iter().map(release_from_row).collect()
    }

    async fn count_releases(&self, filter: &ReleaseFilter) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS n FROM releases r");
        push_predicates(&mut qb, filter);

        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err("Failed to count releases"))?;
        let count: i64 = get(&row, "n")?;
        Ok(count as u64)
    }

    async fn release_exists(&self, package: &str, version: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM releases WHERE package = ? AND version = ?")
            .bind(package)
            .bind(version)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err("Failed to check release"))?;
        Ok(row.is_some())
    }

    async fn update_manifest(
        &self,
        package: &str,
        version: &str,
        update: &ManifestUpdate,
    ) -> Result<Release> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(storage_err("Failed to acquire connection"))?;

        // Writers queue here on the database write lock
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(storage_err("Failed to begin manifest update"))?;

        let written = Self::write_manifest(&mut conn, package, version, update).await;
        let finish = if written.is_ok() { "COMMIT" } else { "ROLLBACK" };
        sqlx::query(finish)
            .execute(&mut *conn)
            .await
            .map_err(storage_err("Failed to finish manifest update"))?;

        self.get_release_by_id(ReleaseId(written?)).await
    }

    async fn set_status(&self, package: &str, version: &str, status: Status) -> Result<Release> {
        self.update_column(package, version, "status", status.code()).await
    }

    async fn set_active(&self, package: &str, version: &str, active: bool) -> Result<Release> {
        self.update_column(package, version, "active", i64::from(active)).await
    }

    async fn create_site(&self, site: &Site) -> Result<()> {
        sqlx::query("INSERT INTO sites (id, domain, name) VALUES (?, ?, ?)")
            .bind(site.id.0)
            .bind(&site.domain)
            .bind(&site.name)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RegistryError::SiteAlreadyExists(site.id.0)
                } else {
                    RegistryError::Storage(format!("Failed to insert site: {}", e))
                }
            })?;
        Ok(())
    }

    async fn get_site(&self, id: SiteId) -> Result<Site> {
        let row = sqlx::query("SELECT id, domain, name FROM sites WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err("Failed to get site"))?
            .ok_or(RegistryError::SiteNotFound(id.0))?;

        site_from_row(&row)
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        let rows = sqlx::query("SELECT id, domain, name FROM sites ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err("Failed to list sites"))?;

        rows.iter().map(site_from_row).collect()
    }

    async fn create_group(&self, group: &Group) -> Result<()> {
        let permissions = serde_json::to_string(&group.permissions)?;
        sqlx::query("INSERT INTO groups (name, permissions) VALUES (?, ?)")
            .bind(&group.name)
            .bind(permissions)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RegistryError::GroupAlreadyExists(group.name.clone())
                } else {
                    RegistryError::Storage(format!("Failed to insert group: {}", e))
                }
            })?;
        Ok(())
    }

    async fn get_group(&self, name: &str) -> Result<Group> {
        let row = sqlx::query("SELECT name, permissions FROM groups WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err("Failed to get group"))?
            .ok_or_else(|| RegistryError::GroupNotFound(name.to_string()))?;

        let permissions: String = get(&row, "permissions")?;
        Ok(Group {
            name: name.to_string(),
            permissions: serde_json::from_str(&permissions)?,
        })
    }

    async fn create_user(&self, username: &str, is_superuser: bool) -> Result<()> {
        sqlx::query("INSERT INTO users (username, is_superuser) VALUES (?, ?)")
            .bind(username)
            .bind(is_superuser)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RegistryError::UserAlreadyExists(username.to_string())
                } else {
                    RegistryError::Storage(format!("Failed to insert user: {}", e))
                }
            })?;
        Ok(())
    }

    async fn add_group_member(&self, group: &str, username: &str) -> Result<()> {
        self.get_group(group).await?;
        if !self.user_exists(username).await? {
            return Err(RegistryError::UserNotFound(username.to_string()));
        }

        sqlx::query("INSERT OR IGNORE INTO group_members (group_name, username) VALUES (?, ?)")
            .bind(group)
            .bind(username)
            .execute(&self.pool)
            .await
            .map_err(storage_err("Failed to add group member"))?;
        Ok(())
    }

    async fn get_user(&self, username: &str) -> Result<User> {
        let row = sqlx::query("SELECT is_superuser FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err("Failed to get user"))?
            .ok_or_else(|| RegistryError::UserNotFound(username.to_string()))?;
        let is_superuser: bool = get(&row, "is_superuser")?;

        let rows = sqlx::query(
            r#"
            SELECT g.name, g.permissions
            FROM groups g
            JOIN group_members m ON m.group_name = g.name
            WHERE m.username = ?
            ORDER BY g.name
            "#,
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err("Failed to load user groups"))?;

        let mut groups = Vec::with_capacity(rows.len());
        for row in &rows {
            let permissions: String = get(row, "permissions")?;
            groups.push(Group {
                name: get(row, "name")?,
                permissions: serde_json::from_str(&permissions)?,
            });
        }

        Ok(User {
            username: username.to_string(),
            is_superuser,
            groups,
        })
    }
}
