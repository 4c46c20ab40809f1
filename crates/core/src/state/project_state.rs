//! # Project State
//!
//! Storage for the structure blob the brain layer authors per project. The
//! materializer only ever reads it; writes come from the (out-of-process)
//! crystallization flow.

use super::db::WadiDb;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;
use std::sync::{Arc, Mutex};

use crate::models::ProjectStructure;

/// Manager for project rows in SQLite
pub struct ProjectManager {
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl ProjectManager {
    pub fn new(db: &WadiDb) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    /// Create or replace a project and its structure blob
    pub fn upsert(&self, project_id: &str, structure: &ProjectStructure) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let structure_json =
            serde_json::to_string(structure).context("Failed to serialize structure")?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO projects (id, name, structure_json, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT(id) DO UPDATE SET
                name = ?2,
                structure_json = ?3,
                updated_at = ?4
            "#,
            params![project_id, structure.name, structure_json, now],
        )
        .context("Failed to upsert project")?;

        Ok(())
    }

    /// Load the structure for a project; `None` when the project is missing
    /// or has no structure yet.
    pub fn load_structure(&self, project_id: &str) -> Result<Option<ProjectStructure>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let structure_json: Option<Option<String>> = conn
            .query_row(
                "SELECT structure_json FROM projects WHERE id = ?1",
                params![project_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        match structure_json.flatten() {
            Some(json) => {
                let structure = serde_json::from_str(&json)
                    .with_context(|| format!("Corrupt structure for project '{}'", project_id))?;
                Ok(Some(structure))
            }
            None => Ok(None),
        }
    }

    /// Delete a project row
    pub fn delete(&self, project_id: &str) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute("DELETE FROM projects WHERE id = ?1", params![project_id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_structure_upsert_and_load() {
        let path = std::env::temp_dir().join("wadi_test_projects.db");
        let _ = fs::remove_file(&path);
        let db = WadiDb::open_at(&path).unwrap();
        let projects = ProjectManager::new(&db);

        let structure: ProjectStructure =
            serde_json::from_str(r#"{"name":"Demo","files":[{"path":"a.ts","content":"x"}]}"#)
                .unwrap();

        projects.upsert("p-1", &structure).unwrap();
        let loaded = projects.load_structure("p-1").unwrap().unwrap();
        assert_eq!(loaded.name, "Demo");
        assert_eq!(loaded.files.len(), 1);

        assert!(projects.load_structure("p-missing").unwrap().is_none());

        projects.delete("p-1").unwrap();
        assert!(projects.load_structure("p-1").unwrap().is_none());

        let _ = fs::remove_file(&path);
    }
}
