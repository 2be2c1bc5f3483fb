//! Persistence for memories, links, curiosity items, dissonances and engine
//! settings
//!
//! All state lives in a single SQLite database file. Every engine operation
//! that touches more than one row runs inside [`SqliteStore::atomically`].

mod curiosity;
mod dissonance;
mod filter;
mod links;
mod memories;
mod schema;
mod settings;

pub use filter::{MemoryFilter, escape_like};
pub use links::LinkUpsert;
pub use schema::SCHEMA_VERSION;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use crate::error::{LtmError, Result};

/// SQLite-backed store for all engine entities.
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories
    /// and applying the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        let store = Self::init(conn, Some(path.to_path_buf()))?;
        tracing::debug!("Opened memory store at {}", path.display());
        Ok(store)
    }

    /// Open a throwaway in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(schema::SCHEMA)?;
        let store = Self { conn, path };
        store.set_setting("schema_version", &SCHEMA_VERSION.to_string())?;
        Ok(store)
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` inside a transaction, committing on `Ok` and rolling back on
    /// `Err`. Calls nested inside an open transaction run in a savepoint, so
    /// a failed inner call undoes only its own writes.
    pub fn atomically<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("SAVEPOINT ltm_nested")?;
            return match f(self) {
                Ok(value) => {
                    self.conn.execute_batch("RELEASE ltm_nested")?;
                    Ok(value)
                }
                Err(e) => {
                    self.conn
                        .execute_batch("ROLLBACK TO ltm_nested; RELEASE ltm_nested")?;
                    Err(e)
                }
            };
        }
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }
}

pub(crate) fn to_micros(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_micros()
}

pub(crate) fn from_micros(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp out of range: {micros}").into(),
        )
    })
}

pub(crate) fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = LtmError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: LtmError| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_opt_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Uuid::parse_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Little-endian f32 packing for embedding BLOBs
pub(crate) fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Key used for rows scoped to "no project"
pub(crate) fn project_key(project_id: Option<&str>) -> &str {
    project_id.unwrap_or("")
}
