//! SQLite persistence on a dedicated worker thread.
//!
//! rusqlite connections are not `Sync`, so all database work runs on a single
//! owned thread. Callers submit closures over a channel and await the result
//! through a oneshot reply; the async side never blocks on SQLite directly.

use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::appctx::AppContext;
use crate::events::{FeedbackEvent, KeyEvent, MouseEvent};
use crate::core::features::FeatureVector;
use crate::wellness::patterns::{ErgonomicIssue, EyeStrainPattern};
use crate::wellness::Recommendation;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct StorageInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StorageInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(e) = self.sender.send(DbCommand::Shutdown) {
                tracing::error!("failed to send shutdown to storage thread: {e}");
            }
            if let Err(e) = handle.join() {
                tracing::error!("failed to join storage thread: {e:?}");
            }
        }
    }
}

/// Averages over a session's recent predictions, consumed by the wellness
/// pattern detectors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionAggregate {
    pub count: u32,
    pub avg_typing_speed: f64,
    pub avg_mouse_randomness: f64,
    pub avg_click_frequency: f64,
}

/// One finished session summary, newest first in history reads.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub duration_secs: Option<i64>,
    pub stress_level: Option<String>,
    pub confidence: Option<f64>,
}

/// One recommendation the client has not yet accepted.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: Option<String>,
    pub time: String,
    pub stress_level: Option<i64>,
    pub duration: Option<i64>,
}

/// Handle to the storage worker. Cheap to clone; the worker shuts down when
/// the last handle drops.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<StorageInner>,
    db_path: Arc<PathBuf>,
}

impl Storage {
    /// Open (or create) the database and run migrations on the worker thread.
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("stresswatch-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(e) => {
                        let _ = ready_tx.send(Err(
                            anyhow::Error::new(e).context("failed to open SQLite database")
                        ));
                        return;
                    }
                };

                if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
                    tracing::error!("failed to enable WAL mode: {e}");
                }
                if let Err(e) = conn.pragma_update(None, "foreign_keys", "ON") {
                    tracing::error!("failed to enable foreign keys: {e}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    tracing::error!("storage initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }

                tracing::info!("storage thread shutting down");
            })
            .context("failed to spawn storage worker thread")?;

        ready_rx
            .recv()
            .context("storage worker exited before signaling readiness")??;

        tracing::info!("database initialized at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(StorageInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    /// Run a task on the worker thread and await its result.
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
                tracing::error!("storage caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|e| anyhow!("failed to send command to storage thread: {e}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("storage thread terminated unexpectedly"))?
    }

    pub async fn append_key_event(&self, session_id: Uuid, event: &KeyEvent) -> Result<()> {
        let record = event.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO keyboard_events (session_id, timestamp, key_pressed, key_released, press_duration)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    session_id.to_string(),
                    record.timestamp.to_rfc3339(),
                    record.key_pressed,
                    record.key_released,
                    record.press_duration,
                ],
            )
            .context("failed to insert keyboard event")?;
            Ok(())
        })
        .await
    }

    pub async fn append_mouse_event(&self, session_id: Uuid, event: &MouseEvent) -> Result<()> {
        let record = event.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO mouse_events (session_id, timestamp, x, y, movement_speed, click_type, scroll_delta)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    session_id.to_string(),
                    record.timestamp.to_rfc3339(),
                    record.x,
                    record.y,
                    record.movement_speed,
                    record.click_type,
                    record.scroll_delta,
                ],
            )
            .context("failed to insert mouse event")?;
            Ok(())
        })
        .await
    }

    pub async fn append_prediction(
        &self,
        session_id: Uuid,
        timestamp: DateTime<Utc>,
        features: &FeatureVector,
        stress_level: &str,
        confidence: f64,
    ) -> Result<()> {
        let features = features.clone();
        let stress_level = stress_level.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO stress_predictions
                 (session_id, timestamp, typing_speed, key_press_variance, mouse_randomness,
                  click_frequency, backspace_ratio, mouse_speed_variance, predicted_stress, confidence)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    session_id.to_string(),
                    timestamp.to_rfc3339(),
                    features.typing_speed,
                    features.key_press_variance,
                    features.mouse_randomness,
                    features.click_frequency,
                    features.backspace_ratio,
                    features.mouse_speed_variance,
                    stress_level,
                    confidence,
                ],
            )
            .context("failed to insert stress prediction")?;
            Ok(())
        })
        .await
    }

    pub async fn append_session_summary(
        &self,
        session_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        stress_level: &str,
        confidence: f64,
    ) -> Result<()> {
        let stress_level = stress_level.to_string();
        self.execute(move |conn| {
            let duration_secs = (end_time - start_time).num_seconds().max(0);
            conn.execute(
                "INSERT OR REPLACE INTO sessions
                 (session_id, start_time, end_time, duration_secs, stress_level, confidence)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    session_id.to_string(),
                    start_time.to_rfc3339(),
                    end_time.to_rfc3339(),
                    duration_secs,
                    stress_level,
                    confidence,
                ],
            )
            .context("failed to insert session summary")?;
            Ok(())
        })
        .await
    }

    /// Persist one fired recommendation; returns its row id so client
    /// feedback can reference it.
    pub async fn append_recommendation(
        &self,
        session_id: Uuid,
        timestamp: DateTime<Utc>,
        stress_level_index: u8,
        app_context: &str,
        recommendation: &Recommendation,
    ) -> Result<i64> {
        let app_context = app_context.to_string();
        let record = recommendation.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO wellness_recommendations
                 (session_id, timestamp, stress_level, app_context, recommendation_type,
                  recommendation_text, duration_seconds)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    session_id.to_string(),
                    timestamp.to_rfc3339(),
                    stress_level_index,
                    app_context,
                    record.kind,
                    record.message,
                    record.duration,
                ],
            )
            .context("failed to insert recommendation")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Persist one application usage segment (entered at `start`, left at `end`).
    pub async fn append_app_usage(
        &self,
        session_id: Uuid,
        app: &AppContext,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<()> {
        let app = app.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO app_usage
                 (session_id, app_id, app_name, category, start_time, end_time, duration_secs)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    session_id.to_string(),
                    app.app_id,
                    app.name,
                    app.category,
                    start.to_rfc3339(),
                    end.to_rfc3339(),
                    (end - start).num_seconds().max(0),
                ],
            )
            .context("failed to insert app usage segment")?;
            Ok(())
        })
        .await
    }

    pub async fn append_ergonomic_issue(
        &self,
        session_id: Uuid,
        timestamp: DateTime<Utc>,
        issue: &ErgonomicIssue,
    ) -> Result<()> {
        let record = issue.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO ergonomic_feedback (session_id, timestamp, issue_type, severity, suggestion)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    session_id.to_string(),
                    timestamp.to_rfc3339(),
                    record.kind.as_str(),
                    record.severity,
                    record.suggestion,
                ],
            )
            .context("failed to insert ergonomic issue")?;
            Ok(())
        })
        .await
    }

    pub async fn append_eye_strain_pattern(
        &self,
        session_id: Uuid,
        pattern: &EyeStrainPattern,
    ) -> Result<()> {
        let record = pattern.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO eye_strain_patterns
                 (session_id, start_time, end_time, duration_seconds,
                  avg_typing_speed, avg_mouse_randomness, likely_eye_strain)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    session_id.to_string(),
                    record.start.to_rfc3339(),
                    record.end.to_rfc3339(),
                    record.duration_secs,
                    record.avg_typing_speed,
                    record.avg_mouse_randomness,
                    record.likely_eye_strain,
                ],
            )
            .context("failed to insert eye strain pattern")?;
            Ok(())
        })
        .await
    }

    /// Apply client feedback to a previously delivered recommendation.
    pub async fn record_feedback(&self, feedback: &FeedbackEvent) -> Result<()> {
        let record = feedback.clone();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE wellness_recommendations
                 SET accepted = ?1, completed = ?2, effectiveness = ?3
                 WHERE recommendation_id = ?4",
                params![
                    record.accepted,
                    record.completed,
                    record.effectiveness,
                    record.recommendation_id,
                ],
            )
            .context("failed to record recommendation feedback")?;
            Ok(())
        })
        .await
    }

    /// Averages over the session's predictions since `since`.
    pub async fn read_predictions_since(
        &self,
        session_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<PredictionAggregate> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT COUNT(*), AVG(typing_speed), AVG(mouse_randomness), AVG(click_frequency)
                 FROM stress_predictions
                 WHERE session_id = ?1 AND timestamp >= ?2",
            )?;

            let aggregate = stmt.query_row(
                params![session_id.to_string(), since.to_rfc3339()],
                |row| {
                    Ok(PredictionAggregate {
                        count: row.get::<_, u32>(0)?,
                        avg_typing_speed: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                        avg_mouse_randomness: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                        avg_click_frequency: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                    })
                },
            )?;

            Ok(aggregate)
        })
        .await
    }

    /// The most recent session summaries, newest first.
    pub async fn read_session_history(&self, limit: u32) -> Result<Vec<SessionRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, start_time, end_time, duration_secs, stress_level, confidence
                 FROM sessions
                 ORDER BY start_time DESC
                 LIMIT ?1",
            )?;
            let records = stmt
                .query_map(params![limit], |row| {
                    Ok(SessionRecord {
                        session_id: row.get(0)?,
                        start_time: row.get(1)?,
                        end_time: row.get(2)?,
                        duration_secs: row.get(3)?,
                        stress_level: row.get(4)?,
                        confidence: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
    }

    /// Recommendations the client has not accepted yet, newest first.
    pub async fn read_recent_recommendations(
        &self,
        limit: u32,
    ) -> Result<Vec<RecommendationRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT recommendation_type, recommendation_text, timestamp, stress_level, duration_seconds
                 FROM wellness_recommendations
                 WHERE accepted = 0
                 ORDER BY timestamp DESC
                 LIMIT ?1",
            )?;
            let records = stmt
                .query_map(params![limit], |row| {
                    Ok(RecommendationRecord {
                        kind: row.get(0)?,
                        message: row.get(1)?,
                        time: row.get(2)?,
                        stress_level: row.get(3)?,
                        duration: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
    }
}

fn run_migrations(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            start_time TEXT NOT NULL,
            end_time TEXT,
            duration_secs INTEGER,
            stress_level TEXT,
            confidence REAL
        );

        CREATE TABLE IF NOT EXISTS keyboard_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            key_pressed TEXT,
            key_released TEXT,
            press_duration REAL
        );

        CREATE TABLE IF NOT EXISTS mouse_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            x REAL NOT NULL,
            y REAL NOT NULL,
            movement_speed REAL,
            click_type TEXT,
            scroll_delta INTEGER
        );

        CREATE TABLE IF NOT EXISTS stress_predictions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            typing_speed REAL,
            key_press_variance REAL,
            mouse_randomness REAL,
            click_frequency REAL,
            backspace_ratio REAL,
            mouse_speed_variance REAL,
            predicted_stress TEXT,
            confidence REAL
        );
        CREATE INDEX IF NOT EXISTS idx_predictions_session_time
            ON stress_predictions (session_id, timestamp);

        CREATE TABLE IF NOT EXISTS wellness_recommendations (
            recommendation_id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            stress_level INTEGER,
            app_context TEXT,
            recommendation_type TEXT NOT NULL,
            recommendation_text TEXT,
            duration_seconds INTEGER,
            accepted INTEGER DEFAULT 0,
            completed INTEGER DEFAULT 0,
            effectiveness INTEGER DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS app_usage (
            usage_id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            app_id TEXT NOT NULL,
            app_name TEXT,
            category TEXT,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            duration_secs INTEGER
        );

        CREATE TABLE IF NOT EXISTS ergonomic_feedback (
            feedback_id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            issue_type TEXT NOT NULL,
            severity INTEGER,
            suggestion TEXT
        );

        CREATE TABLE IF NOT EXISTS eye_strain_patterns (
            pattern_id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            duration_seconds INTEGER,
            avg_typing_speed REAL,
            avg_mouse_randomness REAL,
            likely_eye_strain INTEGER
        );",
    )
    .context("failed to create tables")?;
    Ok(())
}
