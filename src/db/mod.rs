// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/tamperwatch

//! Journal database - persisted monitoring state and escalation history

use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::DatabaseConfig;
use crate::core::{EventBus, MonitoringState};
use crate::escalation::{ChannelResult, EscalationRun};

const MONITORING_KEY: &str = "monitoring";

/// Journal of monitoring toggles and escalation runs
#[derive(Clone)]
pub struct Journal {
    conn: Arc<Mutex<Connection>>,
    config: DatabaseConfig,
}

impl Journal {
    /// Open or create the journal
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.path)?;

        conn.execute_batch(r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        "#)?;

        let journal = Self::with_connection(conn, config)?;
        info!("Journal opened at {:?}", config.path);
        Ok(journal)
    }

    /// In-memory journal, nothing survives a restart
    pub fn in_memory(config: &DatabaseConfig) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, config)
    }

    fn with_connection(conn: Connection, config: &DatabaseConfig) -> Result<Self> {
        let journal = Self {
            conn: Arc::new(Mutex::new(conn)),
            config: config.clone(),
        };
        journal.create_tables()?;
        Ok(journal)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS escalation_runs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                timestamp TEXT NOT NULL,
                source_id INTEGER NOT NULL,
                results TEXT NOT NULL,
                total_failure INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_runs_timestamp ON escalation_runs(timestamp);
        "#)?;

        Ok(())
    }

    /// Last persisted monitoring toggle, if any
    pub fn load_monitoring(&self) -> Result<Option<bool>> {
        Ok(self.get_setting(MONITORING_KEY)?.map(|v| v == "true"))
    }

    /// Persist the monitoring toggle
    pub fn save_monitoring(&self, enabled: bool) -> Result<()> {
        self.set_setting(MONITORING_KEY, if enabled { "true" } else { "false" })
    }

    /// Append a run and prune the oldest beyond the retention limit
    pub fn record_run(&self, run: &EscalationRun) -> Result<()> {
        let results = serde_json::to_string(&run.results)?;
        let conn = self.conn.lock();

        conn.execute(
            "INSERT OR IGNORE INTO escalation_runs (id, timestamp, source_id, results, total_failure)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run.id.to_string(),
                run.timestamp.to_rfc3339(),
                run.triggering_source_id.0,
                results,
                run.is_total_failure(),
            ],
        )?;

        let pruned = conn.execute(
            "DELETE FROM escalation_runs WHERE seq NOT IN
             (SELECT seq FROM escalation_runs ORDER BY seq DESC LIMIT ?1)",
            params![self.retention_limit()],
        )?;
        if pruned > 0 {
            debug!("Pruned {} escalation runs from journal", pruned);
        }

        Ok(())
    }

    // SQLite treats a negative LIMIT as unlimited
    fn retention_limit(&self) -> i64 {
        i64::try_from(self.config.journal_retention).unwrap_or(i64::MAX)
    }

    /// Most recent runs first
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<StoredRun>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, source_id, results, total_failure FROM escalation_runs
             ORDER BY seq DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, bool>(4)?,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (id, timestamp, source_id, json, total_failure) = row?;
            results.push(StoredRun {
                id,
                timestamp,
                source_id,
                results: serde_json::from_str(&json)?,
                total_failure,
            });
        }

        Ok(results)
    }

    /// Number of runs currently kept
    pub fn run_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM escalation_runs", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();

        let result: Result<String, _> = conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist monitoring toggles and escalation runs as they appear on the bus
    pub fn spawn_recorder(&self, event_bus: &EventBus, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let journal = self.clone();
        let mut monitoring_rx = event_bus.subscribe_monitoring();
        let mut run_rx = event_bus.subscribe_runs();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = monitoring_rx.recv() => match msg {
                        Ok(state) => journal.on_monitoring(state),
                        Err(RecvError::Lagged(n)) => warn!("Journal lagged {} monitoring changes", n),
                        Err(RecvError::Closed) => break,
                    },
                    msg = run_rx.recv() => match msg {
                        Ok(run) => journal.on_run(&run),
                        Err(RecvError::Lagged(n)) => warn!("Journal lagged, lost {} escalation runs", n),
                        Err(RecvError::Closed) => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
            // anything published before shutdown is still queued
            while let Ok(state) = monitoring_rx.try_recv() {
                journal.on_monitoring(state);
            }
            while let Ok(run) = run_rx.try_recv() {
                journal.on_run(&run);
            }
            debug!("Journal recorder stopped");
        })
    }

    fn on_monitoring(&self, state: MonitoringState) {
        if let Err(e) = self.save_monitoring(state.is_armed()) {
            error!("Failed to persist monitoring state: {}", e);
        }
    }

    fn on_run(&self, run: &EscalationRun) {
        if let Err(e) = self.record_run(run) {
            error!("Failed to journal escalation {}: {}", run.id, e);
        }
    }
}

/// Escalation run as read back from the journal
#[derive(Debug, Clone)]
pub struct StoredRun {
    /// Run id
    pub id: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
    /// Triggering source
    pub source_id: u32,
    /// Per-channel outcomes in invocation order
    pub results: Vec<ChannelResult>,
    /// No channel succeeded
    pub total_failure: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StatusSink;
    use crate::escalation::{ChannelKind, ChannelOutcome};
    use crate::sources::SourceId;
    use uuid::Uuid;

    fn run(source: u32, outcome: ChannelOutcome) -> EscalationRun {
        EscalationRun {
            id: Uuid::new_v4(),
            triggering_source_id: SourceId(source),
            timestamp: Utc::now(),
            results: ChannelKind::ORDER
                .iter()
                .map(|&channel| ChannelResult {
                    channel,
                    outcome: outcome.clone(),
                })
                .collect(),
        }
    }

    fn config(retention: usize) -> DatabaseConfig {
        DatabaseConfig {
            journal_retention: retention,
            ..Default::default()
        }
    }

    #[test]
    fn test_monitoring_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("journal.db"),
            ..config(10)
        };

        let journal = Journal::open(&config).unwrap();
        assert_eq!(journal.load_monitoring().unwrap(), None);
        journal.save_monitoring(true).unwrap();
        drop(journal);

        let journal = Journal::open(&config).unwrap();
        assert_eq!(journal.load_monitoring().unwrap(), Some(true));
    }

    #[test]
    fn test_runs_are_pruned_to_retention() {
        let journal = Journal::in_memory(&config(3)).unwrap();

        for source in 1..=5 {
            journal.record_run(&run(source, ChannelOutcome::Succeeded)).unwrap();
        }
        journal
            .record_run(&run(6, ChannelOutcome::Failed("offline".into())))
            .unwrap();

        assert_eq!(journal.run_count().unwrap(), 3);
        let recent = journal.recent_runs(10).unwrap();
        let sources: Vec<u32> = recent.iter().map(|r| r.source_id).collect();
        assert_eq!(sources, vec![6, 5, 4]);
        assert!(recent[0].total_failure);
        assert!(!recent[1].total_failure);
        assert_eq!(recent[0].results.len(), 4);
        assert_eq!(recent[0].results[0].channel, ChannelKind::Notification);
    }

    #[test]
    fn test_huge_retention_stays_a_positive_limit() {
        let journal = Journal::in_memory(&config(usize::MAX)).unwrap();
        assert_eq!(journal.retention_limit(), i64::MAX);

        for source in 1..=3 {
            journal.record_run(&run(source, ChannelOutcome::Succeeded)).unwrap();
        }
        assert_eq!(journal.run_count().unwrap(), 3);
        assert_eq!(Journal::in_memory(&config(2)).unwrap().retention_limit(), 2);
    }

    #[tokio::test]
    async fn test_recorder_follows_bus() {
        let journal = Journal::in_memory(&config(10)).unwrap();
        let bus = EventBus::new(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = journal.spawn_recorder(&bus, shutdown_rx);

        bus.publish_monitoring(MonitoringState::Armed);
        bus.publish_run(run(9, ChannelOutcome::Skipped));
        tokio::task::yield_now().await;
        shutdown_tx.send(()).unwrap();
        task.await.unwrap();

        assert_eq!(journal.load_monitoring().unwrap(), Some(true));
        assert_eq!(journal.recent_runs(1).unwrap()[0].source_id, 9);
    }
}
