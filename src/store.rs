//! Local persistence of managed device records.
//!
//! [`DeviceStore`] is keyed by [`ManagedDevice::KEY_FIELD`]. Two backends ship
//! with the crate: [`MemoryDeviceStore`] for a single process run and
//! [`SqliteDeviceStore`], an SQLite database holding one row per device with
//! the full record as JSON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::debug;

use crate::devices::ManagedDevice;
use crate::error::{IntuneError, Result};

/// How long a write waits for another connection's lock on the same file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether an upsert created a record or overwrote one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record with this primary key existed.
    Inserted,
    /// An existing record was overwritten.
    Replaced,
}

/// Keyed storage for device records.
pub trait DeviceStore: Send + Sync {
    /// Returns `true` if any record has `key_field == key_value`.
    fn exists(&self, key_field: &str, key_value: &str) -> Result<bool> {
        Ok(self.get_by_property(key_field, key_value)?.is_some())
    }

    /// First record whose `key_field` equals `key_value` as a string.
    fn get_by_property(&self, key_field: &str, key_value: &str) -> Result<Option<ManagedDevice>>;

    /// Inserts `device`, or replaces the record with the same primary key.
    fn upsert(&self, device: &ManagedDevice) -> Result<UpsertOutcome>;

    /// Number of stored records.
    fn len(&self) -> Result<usize>;

    /// Returns `true` when nothing is stored.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn matches(device: &ManagedDevice, key_field: &str, key_value: &str) -> bool {
    if key_field == ManagedDevice::KEY_FIELD {
        return device.id() == Some(key_value);
    }
    matches!(device.get(key_field), Some(Value::String(v)) if v == key_value)
}

fn primary_key(device: &ManagedDevice) -> Result<String> {
    device
        .id()
        .map(str::to_owned)
        .ok_or_else(|| IntuneError::store("device record has no Id field"))
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryDeviceStore {
    records: Mutex<BTreeMap<String, ManagedDevice>>,
}

impl MemoryDeviceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, BTreeMap<String, ManagedDevice>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copies every stored record, ordered by primary key.
    pub fn all(&self) -> Vec<ManagedDevice> {
        self.records().values().cloned().collect()
    }
}

impl DeviceStore for MemoryDeviceStore {
    fn get_by_property(&self, key_field: &str, key_value: &str) -> Result<Option<ManagedDevice>> {
        let records = self.records();
        if key_field == ManagedDevice::KEY_FIELD {
            return Ok(records.get(key_value).cloned());
        }
        Ok(records
            .values()
            .find(|d| matches(d, key_field, key_value))
            .cloned())
    }

    fn upsert(&self, device: &ManagedDevice) -> Result<UpsertOutcome> {
        let key = primary_key(device)?;
        let outcome = match self.records().insert(key, device.clone()) {
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        };
        Ok(outcome)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.records().len())
    }
}

/// SQLite-backed store. Every upsert is its own transaction, so several
/// handles (or processes) can share one database file.
pub struct SqliteDeviceStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteDeviceStore {
    /// Opens or creates the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS devices (
                id TEXT PRIMARY KEY,
                record TEXT NOT NULL
            );",
        )?;
        debug!(path = %path.display(), "Opened device store");

        Ok(SqliteDeviceStore {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn decode(record: &str) -> Result<ManagedDevice> {
    Ok(serde_json::from_str(record)?)
}

impl DeviceStore for SqliteDeviceStore {
    fn get_by_property(&self, key_field: &str, key_value: &str) -> Result<Option<ManagedDevice>> {
        let conn = self.conn();

        if key_field == ManagedDevice::KEY_FIELD {
            let record: Option<String> = conn
                .query_row(
                    "SELECT record FROM devices WHERE id = ?1",
                    [key_value],
                    |row| row.get(0),
                )
                .optional()?;
            return record.as_deref().map(decode).transpose();
        }

        let mut stmt = conn.prepare("SELECT record FROM devices ORDER BY id")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let record: String = row.get(0)?;
            let device = decode(&record)?;
            if matches(&device, key_field, key_value) {
                return Ok(Some(device));
            }
        }
        Ok(None)
    }

    fn upsert(&self, device: &ManagedDevice) -> Result<UpsertOutcome> {
        let key = primary_key(device)?;
        let record = serde_json::to_string(device)?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let existed: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM devices WHERE id = ?1)",
            [&key],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO devices (id, record) VALUES (?1, ?2)",
            params![key, record],
        )?;
        tx.commit()?;

        Ok(if existed {
            UpsertOutcome::Replaced
        } else {
            UpsertOutcome::Inserted
        })
    }

    fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM devices", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
