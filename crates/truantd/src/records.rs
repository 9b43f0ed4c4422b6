//! Confirmed truancy records.
//!
//! When a reviewer marks a pending alert, it leaves the registry and becomes
//! a permanent row here, referencing the proof image. This table is the
//! terminal state of the alert lifecycle; the registry never holds
//! confirmed entries.

use crate::watch::Alert;
use chrono::Local;
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("records db: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("records dir: {0}")]
    Io(#[from] std::io::Error),
}

/// One confirmed truancy.
#[derive(Debug, Clone, Serialize)]
pub struct TruancyRecord {
    pub id: i64,
    pub identity: String,
    pub detected_at: String,
    pub percent: u8,
    pub proof: String,
    pub recorded_at: String,
}

pub struct RecordStore {
    conn: Mutex<Connection>,
}

impl RecordStore {
    /// Open (creating if needed) the records database.
    pub fn open(path: &Path) -> Result<Self, RecordError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS truancy_records (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                identity    TEXT NOT NULL,
                detected_at TEXT NOT NULL,
                percent     INTEGER NOT NULL,
                proof       TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            )",
            [],
        )?;

        tracing::info!(path = %path.display(), "records database ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a marked alert. Returns the new row id.
    pub fn insert(&self, alert: &Alert) -> Result<i64, RecordError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO truancy_records (identity, detected_at, percent, proof, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                alert.identity,
                alert.detected_at.to_rfc3339(),
                (alert.score * 100.0).round().clamp(0.0, 100.0) as i64,
                alert.proof,
                Local::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent records, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<TruancyRecord>, RecordError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, identity, detected_at, percent, proof, recorded_at
             FROM truancy_records ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            Ok(TruancyRecord {
                id: row.get(0)?,
                identity: row.get(1)?,
                detected_at: row.get(2)?,
                percent: row.get::<_, i64>(3)? as u8,
                proof: row.get(4)?,
                recorded_at: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> RecordStore {
        RecordStore::open(Path::new(":memory:")).unwrap()
    }

    #[test]
    fn insert_then_read_back() {
        let store = memory_store();
        let alert = Alert::new("S1", 0.82, "S1_20260101_090000.jpg".into());
        let id = store.insert(&alert).unwrap();
        assert!(id > 0);

        let records = store.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identity, "S1");
        assert_eq!(records[0].percent, 82);
        assert_eq!(records[0].proof, "S1_20260101_090000.jpg");
    }

    #[test]
    fn recent_is_newest_first_and_limited() {
        let store = memory_store();
        for i in 0..5 {
            store
                .insert(&Alert::new(&format!("S{i}"), 0.6, format!("p{i}.jpg")))
                .unwrap();
        }

        let records = store.recent(2).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identity, "S4");
        assert_eq!(records[1].identity, "S3");
    }
}
