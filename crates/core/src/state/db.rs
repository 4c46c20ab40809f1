//! # Unified WADI Database
//!
//! Single SQLite database for all materializer state: project structures,
//! run records, and derived metric rows, in `.wadi/wadi.db`.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// Unified database manager for all WADI materializer state
pub struct WadiDb {
    conn: Arc<Mutex<Connection>>,
}

impl WadiDb {
    /// Open or create the database at `.wadi/wadi.db`
    pub fn open() -> Result<Self> {
        Self::open_at(".wadi/wadi.db")
    }

    /// Open database at a specific path (useful for testing)
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(path.as_ref()).context("Failed to open wadi database")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations()?;

        Ok(db)
    }

    /// Get a shared connection for use by the state managers
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < 1 {
            self.migrate_v1(&conn)?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                [1],
            )?;
        }

        Ok(())
    }

    /// Migration to version 1 - complete schema
    fn migrate_v1(&self, conn: &Connection) -> Result<()> {
        // Projects: structure blob authored by the brain layer
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                structure_json TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
            [],
        )?;

        // Runs: one row per materialization attempt
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                step_name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'in_progress',
                correlation_id TEXT NOT NULL,
                logs_json TEXT,
                error_message TEXT,
                started_at TEXT NOT NULL,
                finished_at TEXT
            )
            "#,
            [],
        )?;

        // Deploy metrics (best-effort rows written by MetricsService)
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS deploy_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                success INTEGER NOT NULL,
                error TEXT,
                recorded_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
            [],
        )?;

        // Run metrics (duration absent when scaffolding never ran)
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS run_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                correlation_id TEXT NOT NULL,
                success INTEGER NOT NULL,
                files_created INTEGER NOT NULL DEFAULT 0,
                duration_ms INTEGER,
                recorded_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_runs_project_status ON runs(project_id, status)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_runs_correlation ON runs(correlation_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_deploy_metrics_provider ON deploy_metrics(provider)",
            [],
        )?;

        tracing::info!("WadiDb initialized with schema version {}", SCHEMA_VERSION);

        Ok(())
    }

    // =========================================================================
    // Metric row methods (best-effort callers; errors are theirs to swallow)
    // =========================================================================

    /// Insert a deploy metric row
    pub fn insert_deploy_metric(
        &self,
        project_id: &str,
        provider: &str,
        success: bool,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "INSERT INTO deploy_metrics (project_id, provider, success, error) VALUES (?1, ?2, ?3, ?4)",
            params![project_id, provider, success as i32, error],
        )
        .context("Failed to insert deploy metric")?;

        Ok(())
    }

    /// Insert a run metric row
    pub fn insert_run_metric(
        &self,
        project_id: &str,
        correlation_id: &str,
        success: bool,
        files_created: usize,
        duration_ms: Option<i64>,
    ) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            r#"
            INSERT INTO run_metrics (project_id, correlation_id, success, files_created, duration_ms)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                project_id,
                correlation_id,
                success as i32,
                files_created as i64,
                duration_ms
            ],
        )
        .context("Failed to insert run metric")?;

        Ok(())
    }

    /// Count deploy metric rows (test/support helper)
    pub fn count_deploy_metrics(&self) -> Result<i64> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.query_row("SELECT COUNT(*) FROM deploy_metrics", [], |row| row.get(0))
            .context("Failed to count deploy metrics")
    }
}
