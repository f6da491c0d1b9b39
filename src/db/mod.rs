use std::{
    convert::TryFrom,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use log::{error, info};
use rusqlite::{params, Connection};
use tokio::sync::oneshot;

mod migrations;

use crate::models::{JournalEntry, SyncOutcome};
use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to journal thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join journal thread: {join_err:?}");
            }
        }
    }
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

fn to_u64(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("value {value} is negative"))
}

fn to_u32(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("value {value} out of range for attempt count"))
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|err| anyhow!("invalid date '{value}': {err}"))
}

fn outcome_from_str(value: &str) -> Result<SyncOutcome> {
    match value {
        "Submitted" => Ok(SyncOutcome::Submitted),
        "Abandoned" => Ok(SyncOutcome::Abandoned),
        _ => Err(anyhow!("unknown sync outcome '{value}'")),
    }
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> Result<JournalEntry> {
    Ok(JournalEntry {
        id: row.get::<_, String>(0)?,
        user_id: row.get::<_, String>(1)?,
        date: parse_date(&row.get::<_, String>(2)?)?,
        steps: to_u64(row.get::<_, i64>(3)?)?,
        midnight_step_count: to_u64(row.get::<_, i64>(4)?)?,
        outcome: outcome_from_str(&row.get::<_, String>(5)?)?,
        attempts: to_u32(row.get::<_, i64>(6)?)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?)?,
    })
}

/// Local sync journal: one row per (user, date) reconciliation cycle.
/// All access funnels through a dedicated worker thread owning the
/// connection, so callers never block the async runtime on SQLite.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("stridesync-journal".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(
                            Err(anyhow::Error::new(err).context("failed to open SQLite database")),
                        );
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run journal migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("Journal initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Journal thread shutting down");
            })
            .with_context(|| "failed to spawn journal worker thread")?;

        ready_rx
            .recv()
            .context("journal worker exited before signaling readiness")??;

        info!("Sync journal initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("Journal caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to journal thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("journal thread terminated unexpectedly"))?
    }

    /// Insert or replace the journal row for the entry's (user, date).
    /// Replacement covers the restart-after-abandon case: a later cycle for
    /// the same date overwrites the abandoned row.
    pub async fn record_entry(&self, entry: &JournalEntry) -> Result<()> {
        let record = entry.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO daily_records
                     (id, user_id, date, steps, midnight_step_count, outcome, attempts, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.user_id,
                    record.date.format("%Y-%m-%d").to_string(),
                    to_i64(record.steps)?,
                    to_i64(record.midnight_step_count)?,
                    record.outcome.as_str(),
                    i64::from(record.attempts),
                    record.created_at.to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert journal entry")?;
            Ok(())
        })
        .await
    }

    pub async fn get_entry_for_date(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<JournalEntry>> {
        let user_id = user_id.to_string();
        let date = date.format("%Y-%m-%d").to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, date, steps, midnight_step_count, outcome, attempts, created_at
                 FROM daily_records
                 WHERE user_id = ?1 AND date = ?2
                 LIMIT 1",
            )?;

            let mut rows = stmt.query(params![user_id, date])?;
            if let Some(row) = rows.next()? {
                Ok(Some(entry_from_row(row)?))
            } else {
                Ok(None)
            }
        })
        .await
    }

    pub async fn list_recent_entries(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<JournalEntry>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, date, steps, midnight_step_count, outcome, attempts, created_at
                 FROM daily_records
                 WHERE user_id = ?1
                 ORDER BY date DESC
                 LIMIT ?2",
            )?;

            let mut rows = stmt.query(params![user_id, i64::from(limit)])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(entry_from_row(row)?);
            }

            Ok(entries)
        })
        .await
    }
}
