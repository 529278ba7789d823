//! SQLite-backed installation store.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_schema::{BotInstallation, ServiceIdentity};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::store::{InstallationStore, StoredBotDefinition};

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

/// Flat row shape; JSON columns are decoded after the query.
struct InstallationRow {
    id: String,
    bot_id: String,
    source: String,
    version: String,
    manifest: String,
    config: String,
    config_yaml: Option<String>,
    enabled: bool,
    is_default: bool,
    installed_at: String,
    updated_at: String,
}

const INSTALLATION_COLUMNS: &str = "id, bot_id, source, version, manifest, config, config_yaml, \
     enabled, is_default, installed_at, updated_at";

fn read_installation_row(row: &rusqlite::Row) -> rusqlite::Result<InstallationRow> {
    Ok(InstallationRow {
        id: row.get(0)?,
        bot_id: row.get(1)?,
        source: row.get(2)?,
        version: row.get(3)?,
        manifest: row.get(4)?,
        config: row.get(5)?,
        config_yaml: row.get(6)?,
        enabled: row.get::<_, i64>(7)? != 0,
        is_default: row.get::<_, i64>(8)? != 0,
        installed_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn decode_installation(row: InstallationRow) -> Result<BotInstallation> {
    Ok(BotInstallation {
        id: Uuid::parse_str(&row.id).context("installation id")?,
        bot_id: row.bot_id,
        source: serde_json::from_str(&row.source).context("installation source")?,
        version: row.version,
        manifest: serde_json::from_str(&row.manifest).context("installation manifest")?,
        config: serde_json::from_str(&row.config).context("installation config")?,
        config_yaml: row.config_yaml,
        enabled: row.enabled,
        is_default: row.is_default,
        installed_at: parse_timestamp(&row.installed_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("timestamp {raw}"))?
        .with_timezone(&Utc))
}

#[async_trait]
impl InstallationStore for SqliteStore {
    async fn upsert_definition(&self, definition: &StoredBotDefinition) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT OR REPLACE INTO bot_definitions
               (bot_id, display_name, description, version, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                definition.bot_id,
                definition.display_name,
                definition.description,
                definition.version,
                definition.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn get_definition(&self, bot_id: &str) -> Result<Option<StoredBotDefinition>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT bot_id, display_name, description, version, updated_at
             FROM bot_definitions WHERE bot_id = ?1",
        )?;
        let row = stmt
            .query_row([bot_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .optional()?;
        match row {
            None => Ok(None),
            Some((bot_id, display_name, description, version, updated_at)) => {
                Ok(Some(StoredBotDefinition {
                    bot_id,
                    display_name,
                    description,
                    version,
                    updated_at: parse_timestamp(&updated_at)?,
                }))
            }
        }
    }

    async fn delete_definition(&self, bot_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM bot_definitions WHERE bot_id = ?1", [bot_id])?;
        Ok(())
    }

    async fn insert_installation(&self, record: &BotInstallation) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO bot_installations
               (id, bot_id, source, version, manifest, config, config_yaml,
                enabled, is_default, installed_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            params![
                record.id.to_string(),
                record.bot_id,
                serde_json::to_string(&record.source)?,
                record.version,
                serde_json::to_string(&record.manifest)?,
                serde_json::to_string(&record.config)?,
                record.config_yaml,
                record.enabled as i64,
                record.is_default as i64,
                record.installed_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn get_installation(&self, bot_id: &str) -> Result<Option<BotInstallation>> {
        let row = {
            let conn = self.conn.lock().await;
            let mut stmt = conn.prepare(&format!(
                "SELECT {INSTALLATION_COLUMNS} FROM bot_installations WHERE bot_id = ?1"
            ))?;
            stmt.query_row([bot_id], read_installation_row).optional()?
        };
        row.map(decode_installation).transpose()
    }

    async fn list_installations(&self) -> Result<Vec<BotInstallation>> {
        let rows = {
            let conn = self.conn.lock().await;
            let mut stmt = conn.prepare(&format!(
                "SELECT {INSTALLATION_COLUMNS} FROM bot_installations ORDER BY bot_id"
            ))?;
            let rows = stmt.query_map([], read_installation_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        rows.into_iter().map(decode_installation).collect()
    }

    async fn update_installation(&self, record: &BotInstallation) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"UPDATE bot_installations
               SET source = ?2, version = ?3, manifest = ?4, config = ?5,
                   config_yaml = ?6, enabled = ?7, is_default = ?8, updated_at = ?9
               WHERE bot_id = ?1"#,
            params![
                record.bot_id,
                serde_json::to_string(&record.source)?,
                record.version,
                serde_json::to_string(&record.manifest)?,
                serde_json::to_string(&record.config)?,
                record.config_yaml,
                record.enabled as i64,
                record.is_default as i64,
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn delete_installation(&self, bot_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM bot_installations WHERE bot_id = ?1", [bot_id])?;
        Ok(())
    }

    async fn installation_count_for(&self, bot_id: &str) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM bot_installations WHERE bot_id = ?1",
            [bot_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    async fn ensure_service_identity(
        &self,
        bot_id: &str,
        address: &str,
    ) -> Result<ServiceIdentity> {
        let conn = self.conn.lock().await;
        let existing = conn
            .query_row(
                "SELECT user_id, address FROM service_identities WHERE bot_id = ?1",
                [bot_id],
                |row| {
                    Ok(ServiceIdentity {
                        user_id: row.get(0)?,
                        address: row.get(1)?,
                    })
                },
            )
            .optional()?;
        if let Some(identity) = existing {
            return Ok(identity);
        }

        let identity = ServiceIdentity {
            user_id: format!("svc-{}", Uuid::new_v4()),
            address: address.to_string(),
        };
        conn.execute(
            "INSERT INTO service_identities (bot_id, user_id, address) VALUES (?1, ?2, ?3)",
            params![bot_id, identity.user_id, identity.address],
        )?;
        Ok(identity)
    }

    async fn get_service_identity(&self, bot_id: &str) -> Result<Option<ServiceIdentity>> {
        let conn = self.conn.lock().await;
        let identity = conn
            .query_row(
                "SELECT user_id, address FROM service_identities WHERE bot_id = ?1",
                [bot_id],
                |row| {
                    Ok(ServiceIdentity {
                        user_id: row.get(0)?,
                        address: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(identity)
    }
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"CREATE TABLE IF NOT EXISTS __folio_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );"#,
    )?;

    let applied: std::collections::HashSet<i64> = {
        let mut stmt = conn.prepare("SELECT version FROM __folio_schema_version")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        rows.filter_map(|r| r.ok()).collect()
    };

    let migrations: Vec<(i64, &str)> = vec![(
        1,
        r#"
        CREATE TABLE IF NOT EXISTS bot_definitions (
            bot_id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            description TEXT NOT NULL,
            version TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS bot_installations (
            id TEXT PRIMARY KEY,
            bot_id TEXT NOT NULL UNIQUE,
            source TEXT NOT NULL,
            version TEXT NOT NULL,
            manifest TEXT NOT NULL,
            config TEXT NOT NULL,
            config_yaml TEXT,
            enabled INTEGER NOT NULL DEFAULT 1,
            is_default INTEGER NOT NULL DEFAULT 0,
            installed_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_bot_installations_enabled
            ON bot_installations(enabled);

        CREATE TABLE IF NOT EXISTS service_identities (
            bot_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            address TEXT NOT NULL
        );
        "#,
    )];

    for (version, sql) in migrations {
        if applied.contains(&version) {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO __folio_schema_version(version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}
