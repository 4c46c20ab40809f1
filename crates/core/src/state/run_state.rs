//! # Run State Management
//!
//! One row per materialization attempt. The single `in_progress` row per
//! project is the idempotency signal the materializer checks before starting.

use super::db::WadiDb;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    InProgress,
    Success,
    Failed,
    /// Reserved for preview rows written by the wider product surface
    Preview,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Preview => "preview",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "in_progress" => Self::InProgress,
            "success" => Self::Success,
            "failed" => Self::Failed,
            "preview" => Self::Preview,
            _ => Self::InProgress,
        }
    }
}

/// A materialization attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    pub project_id: String,
    /// Label describing the attempt: SAFE_PREVIEW, PREVIEW_BLUEPRINT, MATERIALIZATION
    pub step_name: String,
    pub status: RunStatus,
    pub correlation_id: String,
    /// Free-form structured record of what happened
    #[serde(default)]
    pub logs: Option<serde_json::Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Manager for run storage in SQLite
pub struct RunManager {
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl RunManager {
    pub fn new(db: &WadiDb) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    /// Insert a new `in_progress` run and return its id.
    pub fn start_run(&self, project_id: &str, step_name: &str, correlation_id: &str) -> Result<i64> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            r#"
            INSERT INTO runs (project_id, step_name, status, correlation_id, started_at)
            VALUES (?1, ?2, 'in_progress', ?3, ?4)
            "#,
            params![project_id, step_name, correlation_id, Utc::now().to_rfc3339()],
        )
        .context("Failed to start run")?;

        Ok(conn.last_insert_rowid())
    }

    /// Move a run to a terminal status, exactly once.
    pub fn end_run(
        &self,
        run_id: i64,
        status: RunStatus,
        logs: Option<&serde_json::Value>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let logs_json = logs.map(|v| v.to_string());
        let affected = conn.execute(
            r#"
            UPDATE runs SET status = ?1, logs_json = ?2, error_message = ?3, finished_at = ?4
            WHERE id = ?5
            "#,
            params![
                status.as_str(),
                logs_json,
                error_message,
                Utc::now().to_rfc3339(),
                run_id
            ],
        )?;

        if affected == 0 {
            anyhow::bail!("Run not found: {}", run_id);
        }

        Ok(())
    }

    /// Whether any run for the project is still `in_progress`.
    ///
    /// This is the check half of the check-then-insert idempotency guard; a
    /// race window exists between it and `start_run` and is accepted.
    pub fn has_in_progress(&self, project_id: &str) -> Result<bool> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE project_id = ?1 AND status = 'in_progress'",
            params![project_id],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    /// Load a run by id
    pub fn load(&self, run_id: i64) -> Result<Run> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let run = conn
            .query_row(
                r#"
            SELECT id, project_id, step_name, status, correlation_id, logs_json, error_message, started_at, finished_at
            FROM runs WHERE id = ?1
            "#,
                params![run_id],
                Self::row_to_run,
            )
            .context("Run not found")?;

        Ok(run)
    }

    /// List runs for a project, newest first (support lookups by correlation id)
    pub fn list_for_project(&self, project_id: &str) -> Result<Vec<Run>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, project_id, step_name, status, correlation_id, logs_json, error_message, started_at, finished_at
            FROM runs
            WHERE project_id = ?1
            ORDER BY id DESC
            "#,
        )?;

        let runs = stmt
            .query_map(params![project_id], Self::row_to_run)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list runs")?;

        Ok(runs)
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<Run> {
        let id: i64 = row.get(0)?;
        let project_id: String = row.get(1)?;
        let step_name: String = row.get(2)?;
        let status: String = row.get(3)?;
        let correlation_id: String = row.get(4)?;
        let logs_json: Option<String> = row.get(5)?;
        let error_message: Option<String> = row.get(6)?;
        let started_at_str: String = row.get(7)?;
        let finished_at_str: Option<String> = row.get(8)?;

        Ok(Run {
            id,
            project_id,
            step_name,
            status: RunStatus::from_str(&status),
            correlation_id,
            logs: logs_json.and_then(|j| serde_json::from_str(&j).ok()),
            error_message,
            started_at: DateTime::parse_from_rfc3339(&started_at_str)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            finished_at: finished_at_str.and_then(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|t| t.with_timezone(&Utc))
                    .ok()
            }),
        })
    }
}
