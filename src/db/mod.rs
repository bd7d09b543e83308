use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use log::{error, info};
use rusqlite::{params, Connection};
use tokio::sync::oneshot;

mod migrations;

use crate::models::{CoverageObservation, TIMESTAMP_FORMAT};
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
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map_err(|err| anyhow!("invalid timestamp '{value}': {err}"))
}

/// Handle to a SQLite connection owned by a dedicated worker thread.
///
/// All access funnels through `execute`, which ships a closure to the worker
/// and awaits its reply; the async callers never block on SQLite directly.
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
            .name("skywatch-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
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

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    #[allow(dead_code)]
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
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    /// Inserts or replaces the observation for its (city, timestamp) key.
    pub async fn upsert_observation(&self, observation: &CoverageObservation) -> Result<()> {
        let record = observation.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO observations (city, [values], type, timestamp)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (city, timestamp)
                 DO UPDATE SET [values] = excluded.[values], type = excluded.type",
                params![
                    record.city,
                    record.values,
                    record.kind,
                    record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                ],
            )
            .with_context(|| "failed to upsert observation")?;
            Ok(())
        })
        .await
    }

    /// All stored observations, newest first.
    pub async fn list_observations(&self) -> Result<Vec<CoverageObservation>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT city, [values], type, timestamp
                 FROM observations
                 ORDER BY timestamp DESC",
            )?;

            let mut rows = stmt.query([])?;
            let mut observations = Vec::new();
            while let Some(row) = rows.next()? {
                observations.push(CoverageObservation {
                    city: row.get(0)?,
                    values: row.get(1)?,
                    kind: row.get(2)?,
                    timestamp: parse_timestamp(&row.get::<_, String>(3)?)?,
                });
            }

            Ok(observations)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn test_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("skywatch.sqlite3")).unwrap();
        (dir, db)
    }

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn upsert_replaces_same_key() {
        let (_dir, db) = test_db();

        let first = CoverageObservation::new("Ramanathapuram", ts(10, 20), 12.0, "adhani_solar");
        let second = CoverageObservation::new("Ramanathapuram", ts(10, 20), 87.5, "adhani_solar");
        db.upsert_observation(&first).await.unwrap();
        db.upsert_observation(&second).await.unwrap();

        let stored = db.list_observations().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].values, "87.50%");
    }

    #[tokio::test]
    async fn distinct_timestamps_coexist_newest_first() {
        let (_dir, db) = test_db();

        for (h, m, pct) in [(10, 20, 10.0), (10, 40, 30.0), (10, 30, 20.0)] {
            let obs = CoverageObservation::new("Ramanathapuram", ts(h, m), pct, "adhani_solar");
            db.upsert_observation(&obs).await.unwrap();
        }

        let stored = db.list_observations().await.unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].timestamp, ts(10, 40));
        assert_eq!(stored[2].timestamp, ts(10, 20));
    }

    #[tokio::test]
    async fn same_timestamp_different_city_is_two_rows() {
        let (_dir, db) = test_db();

        let a = CoverageObservation::new("Ramanathapuram", ts(10, 20), 10.0, "adhani_solar");
        let b = CoverageObservation::new("Madurai", ts(10, 20), 20.0, "adhani_solar");
        db.upsert_observation(&a).await.unwrap();
        db.upsert_observation(&b).await.unwrap();

        assert_eq!(db.list_observations().await.unwrap().len(), 2);
    }
}
