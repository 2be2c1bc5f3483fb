use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};
use uuid::Uuid;

use super::{SqliteStore, parse_uuid, project_key, to_micros};
use crate::error::Result;
use crate::memory::types::{Agent, Project};

fn row_to_agent(row: &Row<'_>) -> rusqlite::Result<Agent> {
    let definition_path: Option<String> = row.get(2)?;
    Ok(Agent {
        id: row.get(0)?,
        name: row.get(1)?,
        definition_path: definition_path.map(PathBuf::from),
        signing_key_ref: row.get(3)?,
    })
}

fn row_to_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    let path: String = row.get(2)?;
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        path: PathBuf::from(path),
    })
}

impl SqliteStore {
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Insert or update an agent
    pub fn upsert_agent(&self, agent: &Agent) -> Result<()> {
        self.conn.execute(
            "INSERT INTO agents (id, name, definition_path, signing_key_ref, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, \
             definition_path = excluded.definition_path, signing_key_ref = excluded.signing_key_ref",
            params![
                agent.id,
                agent.name,
                agent
                    .definition_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
                agent.signing_key_ref,
                to_micros(Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub fn get_agent(&self, id: &str) -> Result<Option<Agent>> {
        let agent = self
            .conn
            .query_row(
                "SELECT id, name, definition_path, signing_key_ref FROM agents WHERE id = ?1",
                params![id],
                row_to_agent,
            )
            .optional()?;
        Ok(agent)
    }

    /// Find the project registered for `path`, registering it (named after
    /// the directory) when unknown.
    pub fn ensure_project(&self, path: &Path) -> Result<Project> {
        if let Some(project) = self.project_by_path(path)? {
            return Ok(project);
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let project = Project {
            id: Uuid::new_v4().to_string(),
            name,
            path: path.to_path_buf(),
        };
        self.conn.execute(
            "INSERT INTO projects (id, name, path, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                project.id,
                project.name,
                project.path.to_string_lossy().into_owned(),
                to_micros(Utc::now())
            ],
        )?;
        tracing::info!("Registered project '{}' at {}", project.name, path.display());
        Ok(project)
    }

    pub fn project_by_path(&self, path: &Path) -> Result<Option<Project>> {
        let project = self
            .conn
            .query_row(
                "SELECT id, name, path FROM projects WHERE path = ?1",
                params![path.to_string_lossy().into_owned()],
                row_to_project,
            )
            .optional()?;
        Ok(project)
    }

    pub fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let project = self
            .conn
            .query_row(
                "SELECT id, name, path FROM projects WHERE id = ?1",
                params![id],
                row_to_project,
            )
            .optional()?;
        Ok(project)
    }

    /// Replace the deferred list for (agent, project), keeping order
    pub fn set_deferred(&self, agent_id: &str, project_id: Option<&str>, ids: &[Uuid]) -> Result<()> {
        let key = project_key(project_id);
        self.atomically(|store| {
            store.conn.execute(
                "DELETE FROM deferred_context WHERE agent_id = ?1 AND project_key = ?2",
                params![agent_id, key],
            )?;
            let mut stmt = store.conn.prepare(
                "INSERT INTO deferred_context (agent_id, project_key, position, memory_id) \
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, id) in ids.iter().enumerate() {
                stmt.execute(params![agent_id, key, position as i64, id.to_string()])?;
            }
            Ok(())
        })
    }

    /// Deferred ids for (agent, project) in order, without clearing them
    pub fn peek_deferred(&self, agent_id: &str, project_id: Option<&str>) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn.prepare(
            "SELECT memory_id FROM deferred_context WHERE agent_id = ?1 AND project_key = ?2 \
             ORDER BY position",
        )?;
        let ids = stmt
            .query_map(params![agent_id, project_key(project_id)], |row| {
                parse_uuid(row, 0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Deferred ids for (agent, project) in order; the list is cleared
    pub fn take_deferred(&self, agent_id: &str, project_id: Option<&str>) -> Result<Vec<Uuid>> {
        self.atomically(|store| {
            let ids = store.peek_deferred(agent_id, project_id)?;
            store.conn.execute(
                "DELETE FROM deferred_context WHERE agent_id = ?1 AND project_key = ?2",
                params![agent_id, project_key(project_id)],
            )?;
            Ok(ids)
        })
    }
}
