//! SQLite backend for settings and content pools.
//!
//! The only durable state in the system. The pending-task schedule is derived
//! from these tables on startup and never persisted itself.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, params};

use weekcast_core::error::{Result, WeekcastError};
use weekcast_core::settings;
use weekcast_core::traits::{ContentStore, SettingsStore};
use weekcast_core::types::{SharedContentRecord, TenantContentRecord, TenantId};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        migrate(&conn)?;
        tracing::debug!("Store opened: {}", path.display());
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| WeekcastError::store(e.to_string()))
    }
}

/// `user_version`-gated migration ladder.
fn migrate(conn: &Connection) -> Result<()> {
    let version: i64 =
        conn.query_row("PRAGMA user_version", [], |row| row.get(0)).map_err(db_err)?;
    if version < 1 {
        conn.execute_batch(
            "CREATE TABLE tenant_settings (
                tenant_id BIGINT NOT NULL,
                key TEXT NOT NULL,
                value TEXT,
                PRIMARY KEY (tenant_id, key)
            );
            CREATE TABLE tenant_content (
                tenant_id BIGINT NOT NULL,
                url TEXT NOT NULL,
                last_used TEXT,
                submitter BIGINT,
                PRIMARY KEY (tenant_id, url)
            );
            CREATE TABLE shared_content (
                url TEXT NOT NULL PRIMARY KEY,
                approved BOOLEAN NOT NULL DEFAULT 0,
                submitter BIGINT
            );
            PRAGMA user_version = 1;",
        )
        .map_err(db_err)?;
    }
    Ok(())
}

fn db_err(e: rusqlite::Error) -> WeekcastError {
    WeekcastError::Store(e.to_string())
}

/// Map a unique-key violation to `DuplicateContent`, anything else to `Store`.
fn insert_err(e: rusqlite::Error, key: String) -> WeekcastError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            return WeekcastError::DuplicateContent(key);
        }
    }
    db_err(e)
}

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn get(&self, tenant: TenantId, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT value FROM tenant_settings WHERE tenant_id=?1 AND key=?2 LIMIT 1")
            .map_err(db_err)?;
        let value: Option<Option<String>> = stmt
            .query_row(params![tenant.0, key], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db_err(other)),
            })?;
        Ok(value.flatten())
    }

    async fn set(&self, tenant: TenantId, key: &str, value: &str) -> Result<()> {
        // fail fast on malformed values for recognized keys
        settings::validate(key, value)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO tenant_settings (tenant_id, key, value) VALUES (?1, ?2, ?3)",
            params![tenant.0, key, value],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn tenants(&self) -> Result<Vec<TenantId>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT tenant_id FROM tenant_settings ORDER BY tenant_id")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .map_err(db_err)?
            .filter_map(|r| r.ok())
            .map(TenantId)
            .collect();
        Ok(rows)
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn select_tenant_content(&self, tenant: TenantId) -> Result<Option<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT url FROM tenant_content
                 WHERE tenant_id=?1 AND last_used IS NULL
                 ORDER BY RANDOM() LIMIT 1",
            )
            .map_err(db_err)?;
        optional_url(stmt.query_row(params![tenant.0], |row| row.get(0)))
    }

    async fn select_shared_content(&self, tenant: TenantId) -> Result<Option<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT url FROM shared_content
                 WHERE approved=1 AND NOT EXISTS (
                     SELECT 1 FROM tenant_content
                     WHERE tenant_id=?1 AND url=shared_content.url AND last_used IS NOT NULL
                 )
                 ORDER BY RANDOM() LIMIT 1",
            )
            .map_err(db_err)?;
        optional_url(stmt.query_row(params![tenant.0], |row| row.get(0)))
    }

    async fn mark_used(&self, tenant: TenantId, url: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO tenant_content (tenant_id, url, last_used) VALUES (?1, ?2, ?3)
             ON CONFLICT (tenant_id, url) DO UPDATE SET last_used=excluded.last_used",
            params![tenant.0, url, Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn add_tenant_content(
        &self,
        tenant: TenantId,
        url: &str,
        submitter: Option<i64>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO tenant_content (tenant_id, url, submitter) VALUES (?1, ?2, ?3)",
            params![tenant.0, url, submitter],
        )
        .map_err(|e| insert_err(e, format!("({tenant}, {url})")))?;
        Ok(())
    }

    async fn add_shared_content(
        &self,
        url: &str,
        approved: bool,
        submitter: Option<i64>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO shared_content (url, approved, submitter) VALUES (?1, ?2, ?3)",
            params![url, approved, submitter],
        )
        .map_err(|e| insert_err(e, url.to_string()))?;
        Ok(())
    }

    async fn get_tenant_content(
        &self,
        tenant: TenantId,
        url: &str,
    ) -> Result<Option<TenantContentRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT url, last_used, submitter FROM tenant_content
                 WHERE tenant_id=?1 AND url=?2",
            )
            .map_err(db_err)?;
        let record = stmt
            .query_row(params![tenant.0, url], |row| {
                Ok(TenantContentRecord {
                    tenant_id: tenant,
                    url: row.get(0)?,
                    last_used: row
                        .get::<_, Option<String>>(1)?
                        .and_then(|raw| chrono::DateTime::parse_from_rfc3339(&raw).ok())
                        .map(|dt| dt.with_timezone(&Utc)),
                    submitter: row.get(2)?,
                })
            })
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db_err(other)),
            })?;
        Ok(record)
    }

    async fn get_shared_content(&self, url: &str) -> Result<Option<SharedContentRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT url, approved, submitter FROM shared_content WHERE url=?1")
            .map_err(db_err)?;
        let record = stmt
            .query_row(params![url], |row| {
                Ok(SharedContentRecord {
                    url: row.get(0)?,
                    approved: row.get(1)?,
                    submitter: row.get(2)?,
                })
            })
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db_err(other)),
            })?;
        Ok(record)
    }

    async fn queue_depth(&self, tenant: TenantId) -> Result<u64> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM tenant_content WHERE tenant_id=?1 AND last_used IS NULL",
            params![tenant.0],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as u64)
        .map_err(db_err)
    }

    async fn shared_queue_depth(&self, tenant: TenantId) -> Result<u64> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM shared_content
             WHERE approved=1 AND NOT EXISTS (
                 SELECT 1 FROM tenant_content
                 WHERE tenant_id=?1 AND url=shared_content.url AND last_used IS NOT NULL
             )",
            params![tenant.0],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as u64)
        .map_err(db_err)
    }
}

fn optional_url(result: rusqlite::Result<String>) -> Result<Option<String>> {
    match result {
        Ok(url) => Ok(Some(url)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T1: TenantId = TenantId(1);
    const T2: TenantId = TenantId(2);

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get(T1, "timezone").await.unwrap(), None);

        store.set(T1, "timezone", "Europe/Berlin").await.unwrap();
        store.set(T1, "timezone", "Asia/Tokyo").await.unwrap();
        assert_eq!(store.get(T1, "timezone").await.unwrap(), Some("Asia/Tokyo".into()));

        store.set(T2, "time", "18:00").await.unwrap();
        assert_eq!(store.tenants().await.unwrap(), vec![T1, T2]);
    }

    #[tokio::test]
    async fn test_malformed_setting_fails_fast() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.set(T1, "time", "half past nine").await.unwrap_err();
        assert!(matches!(err, WeekcastError::InvalidSetting { .. }));
        // nothing was stored
        assert_eq!(store.get(T1, "time").await.unwrap(), None);

        assert!(store.set(T1, "timezone", "Atlantis/Lost").await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_tenant_content() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_tenant_content(T1, "https://a", Some(99)).await.unwrap();

        let err = store.add_tenant_content(T1, "https://a", None).await.unwrap_err();
        assert!(err.is_duplicate());

        // same url for a different tenant is fine
        store.add_tenant_content(T2, "https://a", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_shared_content() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_shared_content("https://s", true, None).await.unwrap();
        let err = store.add_shared_content("https://s", false, None).await.unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_tenant_pool_selection_skips_used() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_tenant_content(T1, "https://a", None).await.unwrap();
        store.add_tenant_content(T1, "https://b", None).await.unwrap();

        store.mark_used(T1, "https://a").await.unwrap();
        assert_eq!(store.select_tenant_content(T1).await.unwrap(), Some("https://b".into()));

        store.mark_used(T1, "https://b").await.unwrap();
        assert_eq!(store.select_tenant_content(T1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_shared_selection_requires_approval() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_shared_content("https://pending", false, None).await.unwrap();
        assert_eq!(store.select_shared_content(T1).await.unwrap(), None);

        store.add_shared_content("https://ok", true, None).await.unwrap();
        assert_eq!(store.select_shared_content(T1).await.unwrap(), Some("https://ok".into()));
    }

    #[tokio::test]
    async fn test_shared_use_is_per_tenant() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_shared_content("https://s", true, None).await.unwrap();

        store.mark_used(T1, "https://s").await.unwrap();
        assert_eq!(store.select_shared_content(T1).await.unwrap(), None);
        // the other tenant's view is untouched
        assert_eq!(store.select_shared_content(T2).await.unwrap(), Some("https://s".into()));
    }

    #[tokio::test]
    async fn test_queue_depths() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_tenant_content(T1, "https://a", None).await.unwrap();
        store.add_tenant_content(T1, "https://b", None).await.unwrap();
        store.add_shared_content("https://s1", true, None).await.unwrap();
        store.add_shared_content("https://s2", true, None).await.unwrap();
        store.add_shared_content("https://s3", false, None).await.unwrap();

        assert_eq!(store.queue_depth(T1).await.unwrap(), 2);
        assert_eq!(store.shared_queue_depth(T1).await.unwrap(), 2);

        store.mark_used(T1, "https://a").await.unwrap();
        store.mark_used(T1, "https://s1").await.unwrap();
        assert_eq!(store.queue_depth(T1).await.unwrap(), 1);
        assert_eq!(store.shared_queue_depth(T1).await.unwrap(), 1);
        // depths are per tenant
        assert_eq!(store.shared_queue_depth(T2).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_mark_used_upserts_and_preserves_submitter() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_tenant_content(T1, "https://a", Some(42)).await.unwrap();
        store.mark_used(T1, "https://a").await.unwrap();

        let record = store.get_tenant_content(T1, "https://a").await.unwrap().unwrap();
        assert!(record.last_used.is_some());
        assert_eq!(record.submitter, Some(42));

        // marking a shared URL creates the tenant record
        assert!(store.get_tenant_content(T1, "https://s").await.unwrap().is_none());
        store.mark_used(T1, "https://s").await.unwrap();
        let record = store.get_tenant_content(T1, "https://s").await.unwrap().unwrap();
        assert!(record.last_used.is_some());
    }

    #[tokio::test]
    async fn test_get_shared_content() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_shared_content("https://s", true, Some(7)).await.unwrap();

        let record = store.get_shared_content("https://s").await.unwrap().unwrap();
        assert!(record.approved);
        assert_eq!(record.submitter, Some(7));
        assert!(store.get_shared_content("https://missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weekcast.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.add_tenant_content(T1, "https://a", None).await.unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.queue_depth(T1).await.unwrap(), 1);
    }
}
