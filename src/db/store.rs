//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

use super::history::HistoryStore;
use super::models::*;

mod embedded {
    refinery::embed_migrations!("migrations");
}

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Could not prepare database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database connection lock poisoned")]
    LockPoisoned,
    #[error("Not found")]
    NotFound,
}

const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

const MONITOR_COLUMNS: &str = "id, name, url, icon, check_interval, is_third_party, paused, \
     status, response_time, uptime, last_check, created_at, updated_at";

/// Thread-safe database store.
///
/// All access goes through one connection behind a mutex, so writes are
/// serialized and a read that follows a write always observes it.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Configure the connection and run embedded migrations.
    fn init(&self) -> Result<(), DbError> {
        let mut conn = self.conn()?;

        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.pragma_update(None, "foreign_keys", true)?;

        embedded::migrations::runner()
            .run(&mut *conn)
            .map_err(|e| DbError::Migration(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    // --- Monitor CRUD ---

    /// Insert a new monitor and return it as stored.
    pub fn create_monitor(&self, new: &NewMonitor) -> Result<Monitor, DbError> {
        let check_interval = if new.check_interval <= 0 {
            DEFAULT_CHECK_INTERVAL
        } else {
            new.check_interval
        };
        let now = format_db_time(Utc::now());

        let id = {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO monitors (name, url, icon, check_interval, is_third_party, paused, \
                 status, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    new.name,
                    new.url,
                    new.icon,
                    check_interval,
                    new.is_third_party,
                    new.paused,
                    MonitorStatus::Unknown.as_str(),
                    now,
                ],
            )?;
            conn.last_insert_rowid()
        };

        self.get_monitor(id)
    }

    /// Apply user edits to a monitor. Live fields are left alone.
    pub fn update_monitor(&self, id: i64, changes: &MonitorChanges) -> Result<Monitor, DbError> {
        let mut monitor = self.get_monitor(id)?;

        if let Some(name) = &changes.name {
            monitor.name = name.clone();
        }
        if let Some(url) = &changes.url {
            monitor.url = url.clone();
        }
        if let Some(icon) = &changes.icon {
            monitor.icon = icon.clone();
        }
        if let Some(interval) = changes.check_interval {
            monitor.check_interval = if interval <= 0 { DEFAULT_CHECK_INTERVAL } else { interval };
        }
        if let Some(third_party) = changes.is_third_party {
            monitor.is_third_party = third_party;
        }
        if let Some(paused) = changes.paused {
            monitor.paused = paused;
        }

        {
            let conn = self.conn()?;
            conn.execute(
                "UPDATE monitors SET name=?1, url=?2, icon=?3, check_interval=?4, \
                 is_third_party=?5, paused=?6, updated_at=?7 \
                 WHERE id=?8",
                params![
                    monitor.name,
                    monitor.url,
                    monitor.icon,
                    monitor.check_interval,
                    monitor.is_third_party,
                    monitor.paused,
                    format_db_time(Utc::now()),
                    id,
                ],
            )?;
        }

        self.get_monitor(id)
    }

    /// Get all monitors, ordered by id.
    pub fn list_monitors(&self) -> Result<Vec<Monitor>, DbError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM monitors ORDER BY id", MONITOR_COLUMNS))?;

        let monitors = stmt
            .query_map([], monitor_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(monitors)
    }

    /// Get a monitor by ID.
    pub fn get_monitor(&self, id: i64) -> Result<Monitor, DbError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM monitors WHERE id = ?1", MONITOR_COLUMNS),
            params![id],
            monitor_from_row,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Delete a monitor and its check history.
    pub fn delete_monitor(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute("DELETE FROM check_history WHERE monitor_id = ?1", params![id])?;
        let removed = tx.execute("DELETE FROM monitors WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(DbError::NotFound);
        }

        tx.commit()?;
        Ok(())
    }

    /// Write the live fields produced by a probe.
    pub fn record_probe(
        &self,
        id: i64,
        status: MonitorStatus,
        response_time: i64,
        uptime: f64,
        checked_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let conn = self.conn()?;
        let checked_at = format_db_time(checked_at);
        let updated = conn.execute(
            "UPDATE monitors SET status=?1, response_time=?2, uptime=?3, last_check=?4, \
             updated_at=?4 WHERE id=?5",
            params![status.as_str(), response_time, uptime, checked_at, id],
        )?;

        if updated == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

impl HistoryStore for Store {
    fn append(&self, record: &CheckRecord) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO check_history (monitor_id, status, response_time, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.monitor_id,
                record.status.as_str(),
                record.response_time,
                format_db_time(record.created_at),
            ],
        )?;
        Ok(())
    }

    fn count(
        &self,
        monitor_id: i64,
        since: DateTime<Utc>,
        status: Option<MonitorStatus>,
    ) -> Result<i64, DbError> {
        let conn = self.conn()?;
        let since = format_db_time(since);

        let count = match status {
            Some(status) => conn.query_row(
                "SELECT COUNT(*) FROM check_history \
                 WHERE monitor_id = ?1 AND created_at > ?2 AND status = ?3",
                params![monitor_id, since, status.as_str()],
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(*) FROM check_history WHERE monitor_id = ?1 AND created_at > ?2",
                params![monitor_id, since],
                |row| row.get(0),
            )?,
        };

        Ok(count)
    }

    fn average_response_time(&self, since: DateTime<Utc>) -> Result<Option<f64>, DbError> {
        let conn = self.conn()?;
        let avg: Option<f64> = conn.query_row(
            "SELECT AVG(response_time) FROM check_history \
             WHERE created_at > ?1 AND response_time > 0",
            params![format_db_time(since)],
            |row| row.get(0),
        )?;
        Ok(avg)
    }

    fn most_recent(&self, monitor_id: i64, limit: usize) -> Result<Vec<CheckRecord>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT monitor_id, status, response_time, created_at FROM check_history \
             WHERE monitor_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;

        let records = stmt
            .query_map(params![monitor_id, limit as i64], |row| {
                let status: String = row.get(1)?;
                Ok(CheckRecord {
                    monitor_id: row.get(0)?,
                    status: MonitorStatus::from_db(&status),
                    response_time: row.get(2)?,
                    created_at: time_column(row, 3)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(records)
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM check_history WHERE created_at < ?1",
            params![format_db_time(cutoff)],
        )?;
        Ok(deleted)
    }
}

fn monitor_from_row(row: &Row<'_>) -> SqlResult<Monitor> {
    let status: String = row.get(7)?;

    Ok(Monitor {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        icon: row.get(3)?,
        check_interval: row.get(4)?,
        is_third_party: row.get(5)?,
        paused: row.get(6)?,
        status: MonitorStatus::from_db(&status),
        response_time: row.get(8)?,
        uptime: row.get(9)?,
        last_check: optional_time_column(row, 10)?,
        created_at: time_column(row, 11)?,
        updated_at: time_column(row, 12)?,
    })
}

/// Read a timestamp column. Text that does not parse is a conversion error,
/// never a substitute value.
fn time_column(row: &Row<'_>, idx: usize) -> SqlResult<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_db_time(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid timestamp {:?}", text).into(),
        )
    })
}

fn optional_time_column(row: &Row<'_>, idx: usize) -> SqlResult<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => time_column(row, idx).map(Some),
        None => Ok(None),
    }
}

/// Format a timestamp as fixed-width UTC text so that lexical and
/// chronological order agree.
pub fn format_db_time(t: DateTime<Utc>) -> String {
    t.format(DB_TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [DB_TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
