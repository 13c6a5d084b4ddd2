//! SQLite save slots.
//!
//! A whole [`MemoryStore`] (entities, events, graph, schedules and the
//! calendar blob) is serialized to JSON and written to one numbered slot:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS worlds (
//!     slot       INTEGER PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! Slot 0 is the running game. A stored CRC-32 flags corrupted saves; a
//! mismatch is logged and the data is still returned.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info, info_span, warn};

use crate::config::PersistenceConfig;
use crate::error::{GensimError, Result};
use crate::metrics::spans;
use crate::store::MemoryStore;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS worlds (
    slot       INTEGER PRIMARY KEY,
    data       BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);";

/// CRC-32 (ISO 3309) of `data` as eight lowercase hex digits.
fn crc32_hex(data: &[u8]) -> String {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc = u32::MAX;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    format!("{:08x}", !crc)
}

/// Summary of one stored slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    /// Slot number.
    pub slot: i64,
    /// When the slot was last written.
    pub updated_at: DateTime<Utc>,
    /// Size of the stored JSON.
    pub bytes: usize,
}

/// An open save file.
pub struct SaveEngine {
    conn: Connection,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SaveEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveEngine")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SaveEngine {
    /// Open or create the save file at `path`.
    ///
    /// # Errors
    /// Returns [`GensimError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "Save file opened");
        Ok(Self {
            conn,
            config: config.clone(),
            db_path,
        })
    }

    /// Open a throwaway in-memory save file.
    ///
    /// # Errors
    /// Returns [`GensimError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    // ------------------------------------------------------------------
    // Slots
    // ------------------------------------------------------------------

    /// Write `world` to `slot`, replacing what was there.
    ///
    /// # Errors
    /// Returns [`GensimError::Serialization`] or [`GensimError::Database`].
    pub fn save_world(&self, slot: i64, world: &MemoryStore) -> Result<()> {
        let _span = info_span!(spans::PERSIST_SAVE, slot).entered();
        let start = Instant::now();

        let json =
            serde_json::to_vec(world).map_err(|e| GensimError::Serialization(e.to_string()))?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));

        self.conn.execute(
            "INSERT INTO worlds (slot, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(slot) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![slot, json, Utc::now().to_rfc3339(), checksum],
        )?;

        debug!(
            slot,
            entities = world.entity_count(),
            events = world.event_count(),
            bytes = json.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved world"
        );
        Ok(())
    }

    /// Read the world stored in `slot`, or `None` if the slot is empty.
    ///
    /// # Errors
    /// Returns [`GensimError::Serialization`] or [`GensimError::Database`].
    pub fn load_world(&self, slot: i64) -> Result<Option<MemoryStore>> {
        let _span = info_span!(spans::PERSIST_LOAD, slot).entered();

        let row: Option<(Vec<u8>, Option<String>)> = self
            .conn
            .prepare_cached("SELECT data, checksum FROM worlds WHERE slot = ?1")?
            .query_row(params![slot], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;
        let Some((data, stored)) = row else {
            return Ok(None);
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored {
                let actual = crc32_hex(&data);
                if expected != actual {
                    warn!(slot, %expected, %actual, "Checksum mismatch, save may be corrupted");
                }
            }
        }

        let world: MemoryStore =
            serde_json::from_slice(&data).map_err(|e| GensimError::Serialization(e.to_string()))?;
        debug!(slot, events = world.event_count(), "Loaded world");
        Ok(Some(world))
    }

    /// Empty a slot; returns whether it held a world.
    ///
    /// # Errors
    /// Returns [`GensimError::Database`] on SQLite failures.
    pub fn delete_world(&self, slot: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM worlds WHERE slot = ?1", params![slot])?;
        Ok(deleted > 0)
    }

    /// Every occupied slot, lowest first.
    ///
    /// # Errors
    /// Returns [`GensimError::Database`] on SQLite failures.
    pub fn list_slots(&self) -> Result<Vec<SlotInfo>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT slot, updated_at, length(data) FROM worlds ORDER BY slot")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut slots = Vec::new();
        for row in rows {
            let (slot, stamp, bytes) = row?;
            match DateTime::parse_from_rfc3339(&stamp) {
                Ok(at) => slots.push(SlotInfo {
                    slot,
                    updated_at: at.with_timezone(&Utc),
                    bytes: usize::try_from(bytes).unwrap_or_default(),
                }),
                Err(e) => warn!(slot, error = %e, "Skipping slot with unreadable timestamp"),
            }
        }
        Ok(slots)
    }

    // ------------------------------------------------------------------
    // Backups
    // ------------------------------------------------------------------

    /// Copy the save file to `dest` with SQLite's online backup.
    ///
    /// # Errors
    /// Returns [`GensimError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest: P) -> Result<()> {
        let start = Instant::now();
        let mut target = Connection::open(dest.as_ref())?;
        rusqlite::backup::Backup::new(&self.conn, &mut target)?.run_to_completion(
            256,
            Duration::from_millis(50),
            None,
        )?;
        info!(
            dest = %dest.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Save backup written"
        );
        Ok(())
    }

    /// Write `<file>.bak.1`, shifting older backups up and keeping at most
    /// `backup_count` of them. A no-op for in-memory files.
    ///
    /// # Errors
    /// Returns [`GensimError::Io`] or [`GensimError::Database`].
    pub fn create_rotating_backup(&self) -> Result<()> {
        let keep = self.config.backup_count;
        if keep == 0 || self.db_path.as_os_str() == ":memory:" {
            return Ok(());
        }

        for n in (1..keep).rev() {
            let from = self.backup_path(n);
            if from.exists() {
                std::fs::rename(&from, self.backup_path(n + 1))?;
            }
        }
        let overflow = self.backup_path(keep + 1);
        if overflow.exists() {
            std::fs::remove_file(&overflow)?;
        }

        self.backup(self.backup_path(1))?;
        info!(keep, "Rotating backup created");
        Ok(())
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        let mut name = self.db_path.clone().into_os_string();
        name.push(format!(".bak.{n}"));
        PathBuf::from(name)
    }

    /// Location of the save file.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Whether SQLite's integrity check passes.
    ///
    /// # Errors
    /// Returns [`GensimError::Database`] if the check cannot run.
    pub fn integrity_check(&self) -> Result<bool> {
        let verdict: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(verdict == "ok")
    }
}
