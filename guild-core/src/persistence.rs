//! SQLite storage for guild snapshots.
//!
//! One row per ledger key; the snapshot is stored as JSON in a BLOB column:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS guild_snapshots (
//!     ledger_key TEXT PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! WAL mode is on by default, a CRC-32 of the payload flags corrupted saves,
//! and backups go through SQLite's online-backup API.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::Result;
use crate::metrics::{GuildCounters, spans};
use crate::snapshot::GuildSnapshot;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS guild_snapshots (
    ledger_key TEXT PRIMARY KEY,
    data       BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);";

fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

/// CRC-32 (ISO 3309).
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

/// Handle to an open snapshot database.
///
/// ```no_run
/// # use guild_core::persistence::GuildStore;
/// # use guild_core::config::{GuildConfig, PersistenceConfig};
/// # use guild_core::ledger::GuildLedger;
/// let store = GuildStore::open("guild.db", &PersistenceConfig::default())?;
/// let ledger = GuildLedger::with_system_clock(GuildConfig::default());
/// store.save("world-1", &ledger.snapshot())?;
/// let restored = store.load("world-1")?;
/// # Ok::<(), guild_core::error::GuildError>(())
/// ```
pub struct GuildStore {
    conn: Connection,
    config: PersistenceConfig,
    db_path: PathBuf,
    counters: Option<Arc<GuildCounters>>,
}

impl std::fmt::Debug for GuildStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuildStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GuildStore {
    /// Open (or create) a database at `path` and ensure the schema exists.
    ///
    /// # Errors
    /// Returns [`GuildError::Database`](crate::error::GuildError::Database) on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "Guild store opened"
        );

        Ok(Self {
            conn,
            config: config.clone(),
            db_path,
            counters: None,
        })
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns [`GuildError::Database`](crate::error::GuildError::Database) on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn,
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
            counters: None,
        })
    }

    /// Count completed saves on `counters` (usually the ledger's).
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<GuildCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Upsert the snapshot stored under `key`.
    ///
    /// # Errors
    /// Serialization or SQLite failures.
    pub fn save(&self, key: &str, snapshot: &GuildSnapshot) -> Result<()> {
        let _span = tracing::span!(tracing::Level::DEBUG, spans::PERSIST_SAVE).entered();
        let start = Instant::now();

        let json = snapshot.to_json()?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO guild_snapshots (ledger_key, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(ledger_key) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![key, json, now, checksum],
        )?;

        if let Some(counters) = &self.counters {
            GuildCounters::bump(&counters.saves_completed);
        }

        debug!(
            key,
            instances = snapshot.instance_count(),
            bytes = json.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved guild snapshot"
        );

        Ok(())
    }

    /// Load the snapshot stored under `key`, or `None` if there is none.
    ///
    /// A checksum mismatch is logged but the data is still decoded.
    ///
    /// # Errors
    /// Serialization or SQLite failures.
    pub fn load(&self, key: &str) -> Result<Option<GuildSnapshot>> {
        let _span = tracing::span!(tracing::Level::DEBUG, spans::PERSIST_LOAD).entered();
        let start = Instant::now();

        let mut stmt = self
            .conn
            .prepare_cached("SELECT data, checksum FROM guild_snapshots WHERE ledger_key = ?1")?;
        let row: Option<(Vec<u8>, Option<String>)> = stmt
            .query_row(params![key], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((data, stored_checksum)) = row else {
            return Ok(None);
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(&data);
                if expected != actual {
                    warn!(key, %expected, %actual, "Checksum mismatch, save may be corrupt");
                }
            }
        }

        let snapshot = GuildSnapshot::from_json(&data)?;

        debug!(
            key,
            instances = snapshot.instance_count(),
            elapsed_us = start.elapsed().as_micros(),
            "Loaded guild snapshot"
        );

        Ok(Some(snapshot))
    }

    /// Delete the snapshot under `key`. Returns whether a row existed.
    ///
    /// # Errors
    /// SQLite failures.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM guild_snapshots WHERE ledger_key = ?1", params![key])?;
        Ok(deleted > 0)
    }

    /// All stored keys, sorted.
    ///
    /// # Errors
    /// SQLite failures.
    pub fn list_keys(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT ledger_key FROM guild_snapshots ORDER BY ledger_key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    /// Number of stored snapshots.
    ///
    /// # Errors
    /// SQLite failures.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM guild_snapshots", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Copy the database to `dest_path` with the online-backup API.
    ///
    /// # Errors
    /// SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&self.conn, &mut dest)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;

        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Guild store backup completed"
        );
        Ok(())
    }

    /// Write `<db>.bak.1`, shifting older backups up and keeping at most
    /// `backup_count`. No-op for in-memory stores.
    ///
    /// # Errors
    /// SQLite or filesystem failures.
    pub fn create_rotating_backup(&self) -> Result<()> {
        let max = self.config.backup_count;
        if self.db_path.as_os_str() == ":memory:" || max == 0 {
            return Ok(());
        }

        for i in (1..max).rev() {
            let src = self.backup_path(i);
            if src.exists() {
                std::fs::rename(&src, self.backup_path(i + 1))?;
            }
        }
        let oldest = self.backup_path(max + 1);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }

        self.backup(self.backup_path(1))?;
        info!(max_backups = max, "Rotating backup created");
        Ok(())
    }

    /// Path of numbered backup `n` (e.g. `guild.db.bak.1`).
    #[must_use]
    pub fn backup_path(&self, n: u32) -> PathBuf {
        let mut path = self.db_path.clone();
        let ext = format!(
            "{}.bak.{n}",
            path.extension()
                .map_or(String::new(), |e| e.to_string_lossy().into_owned())
        );
        path.set_extension(ext);
        path
    }

    /// Database file path (`:memory:` for in-memory stores).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `PRAGMA integrity_check`.
    ///
    /// # Errors
    /// SQLite failures.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}
