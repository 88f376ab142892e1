//! SQLite sink implementation
//!
//! Records and failure reports are appended under the active run. The same
//! database keeps run history and the frontier snapshot used to resume an
//! interrupted crawl.

use crate::crawler::{FailureKind, Role, Task};
use crate::listing::ListingRecord;
use crate::sink::schema::initialize_schema;
use crate::sink::traits::{FailureReport, Sink, SinkError, SinkResult};
use crate::sink::{RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

const NO_RUN: i64 = 0;

/// SQLite-backed sink
pub struct SqliteSink {
    conn: Mutex<Connection>,
    active_run: AtomicI64,
}

impl SqliteSink {
    /// Opens (or creates) the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Successfully opened/created database
    /// * `Err(SinkError)` - Failed to open database
    pub fn new(path: &Path) -> SinkResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            active_run: AtomicI64::new(NO_RUN),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> SinkResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            active_run: AtomicI64::new(NO_RUN),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn require_run(&self) -> SinkResult<i64> {
        match self.active_run.load(Ordering::Acquire) {
            NO_RUN => Err(SinkError::NoActiveRun),
            id => Ok(id),
        }
    }

    /// The run appends are written under, if any
    pub fn active_run(&self) -> Option<i64> {
        match self.active_run.load(Ordering::Acquire) {
            NO_RUN => None,
            id => Some(id),
        }
    }

    // ===== Run Management =====

    /// Creates a new run and makes it the active run
    pub fn create_run(&self, config_hash: &str) -> SinkResult<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        let id = conn.last_insert_rowid();
        self.active_run.store(id, Ordering::Release);
        Ok(id)
    }

    /// Makes an existing run the active run and marks it running again
    pub fn resume_run(&self, run_id: i64) -> SinkResult<RunRecord> {
        let run = self.get_run(run_id)?;
        self.update_run_status(run_id, RunStatus::Running)?;
        self.active_run.store(run_id, Ordering::Release);
        Ok(run)
    }

    pub fn get_run(&self, run_id: i64) -> SinkResult<RunRecord> {
        self.conn()
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(SinkError::RunNotFound(run_id))
    }

    pub fn get_latest_run(&self) -> SinkResult<Option<RunRecord>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?)
    }

    pub fn update_run_status(&self, run_id: i64, status: RunStatus) -> SinkResult<()> {
        self.conn().execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), run_id],
        )?;
        Ok(())
    }

    /// Marks a run finished with the given terminal status
    pub fn finish_run(&self, run_id: i64, status: RunStatus) -> SinkResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        Ok(())
    }

    // ===== Frontier Snapshot =====

    /// Replaces the saved frontier of a run with `tasks`, in order
    pub fn save_frontier(&self, run_id: i64, tasks: &[Task]) -> SinkResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM frontier WHERE run_id = ?1", params![run_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO frontier (run_id, position, task_json) VALUES (?1, ?2, ?3)",
            )?;
            for (position, task) in tasks.iter().enumerate() {
                let json = serde_json::to_string(task)?;
                stmt.execute(params![run_id, position as i64, json])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Loads the saved frontier of a run in dequeue order
    pub fn load_frontier(&self, run_id: i64) -> SinkResult<Vec<Task>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT task_json FROM frontier WHERE run_id = ?1 ORDER BY position")?;
        let rows = stmt.query_map(params![run_id], |row| row.get::<_, String>(0))?;

        let mut tasks = Vec::new();
        for json in rows {
            tasks.push(serde_json::from_str(&json?)?);
        }
        Ok(tasks)
    }

    pub fn clear_frontier(&self, run_id: i64) -> SinkResult<()> {
        self.conn()
            .execute("DELETE FROM frontier WHERE run_id = ?1", params![run_id])?;
        Ok(())
    }

    // ===== Queries =====

    /// URLs of records appended in a run
    pub fn emitted_urls(&self, run_id: i64) -> SinkResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT DISTINCT url FROM listings WHERE run_id = ?1")?;
        let urls = stmt
            .query_map(params![run_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(urls)
    }

    /// Records appended in a run, in append order
    pub fn load_listings(&self, run_id: i64) -> SinkResult<Vec<ListingRecord>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT record_json FROM listings WHERE run_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![run_id], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for json in rows {
            records.push(serde_json::from_str(&json?)?);
        }
        Ok(records)
    }

    /// Distinct listing URLs appended in a run
    pub fn count_listings(&self, run_id: i64) -> SinkResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(DISTINCT url) FROM listings WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Failure reports of a run
    pub fn load_failures(&self, run_id: i64) -> SinkResult<Vec<FailureReport>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT url, role, attempts, error_kind, message FROM failures
             WHERE run_id = ?1 ORDER BY id",
        )?;
        let reports = stmt
            .query_map(params![run_id], |row| {
                let role: Option<String> = row.get(1)?;
                let kind: String = row.get(3)?;
                Ok(FailureReport {
                    url: row.get(0)?,
                    role: role.as_deref().and_then(Role::from_db_string),
                    attempts: row.get(2)?,
                    last_error_kind: FailureKind::from_db_string(&kind)
                        .unwrap_or(FailureKind::Network),
                    message: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reports)
    }

    /// Failure counts per error kind
    pub fn failures_by_kind(&self, run_id: i64) -> SinkResult<HashMap<FailureKind, u64>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT error_kind, COUNT(*) FROM failures WHERE run_id = ?1 GROUP BY error_kind",
        )?;

        let mut summary = HashMap::new();
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (kind, count) = row?;
            if let Some(kind) = FailureKind::from_db_string(&kind) {
                summary.insert(kind, count as u64);
            }
        }
        Ok(summary)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

impl Sink for SqliteSink {
    fn append(&self, record: &ListingRecord) -> SinkResult<()> {
        let run_id = self.require_run()?;
        let json = serde_json::to_string(record)?;
        let now = Utc::now().to_rfc3339();

        self.conn().execute(
            "INSERT INTO listings (run_id, url, title, price, record_json, scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![run_id, record.url, record.title, record.price, json, now],
        )?;
        Ok(())
    }

    fn append_failure(&self, report: &FailureReport) -> SinkResult<()> {
        let run_id = self.require_run()?;
        let now = Utc::now().to_rfc3339();

        self.conn().execute(
            "INSERT INTO failures (run_id, url, role, attempts, error_kind, message, failed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_id,
                report.url,
                report.role.map(|r| r.as_str()),
                report.attempts,
                report.last_error_kind.as_str(),
                report.message,
                now
            ],
        )?;
        Ok(())
    }
}
