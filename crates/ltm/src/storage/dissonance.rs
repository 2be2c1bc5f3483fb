use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use uuid::Uuid;

use super::filter::escape_like;
use super::{SqliteStore, from_micros, parse_column, parse_uuid, to_micros};
use crate::dissonance::types::{Dissonance, DissonanceStatus};
use crate::error::{LtmError, Result};

const DISSONANCE_COLUMNS: &str = "id, agent_id, memory_a, memory_b, description, detected_at, \
     resolved_at, resolution, status";

fn row_to_dissonance(row: &Row<'_>) -> rusqlite::Result<Dissonance> {
    let resolved_at: Option<i64> = row.get(6)?;
    Ok(Dissonance {
        id: parse_uuid(row, 0)?,
        agent_id: row.get(1)?,
        memory_a: parse_uuid(row, 2)?,
        memory_b: parse_uuid(row, 3)?,
        description: row.get(4)?,
        detected_at: from_micros(row, 5)?,
        resolved_at: resolved_at.and_then(DateTime::from_timestamp_micros),
        resolution: row.get(7)?,
        status: parse_column(row, 8)?,
    })
}

impl SqliteStore {
    pub fn insert_dissonance(&self, dissonance: &Dissonance) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO dissonance_queue ({DISSONANCE_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                dissonance.id.to_string(),
                dissonance.agent_id,
                dissonance.memory_a.to_string(),
                dissonance.memory_b.to_string(),
                dissonance.description,
                to_micros(dissonance.detected_at),
                dissonance.resolved_at.map(to_micros),
                dissonance.resolution,
                dissonance.status.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn get_dissonance(&self, id: Uuid) -> Result<Option<Dissonance>> {
        let dissonance = self
            .conn
            .query_row(
                &format!("SELECT {DISSONANCE_COLUMNS} FROM dissonance_queue WHERE id = ?1"),
                params![id.to_string()],
                row_to_dissonance,
            )
            .optional()?;
        Ok(dissonance)
    }

    /// Resolve a full id or unique prefix of a dissonance
    pub fn resolve_dissonance_id(&self, id_or_prefix: &str) -> Result<Uuid> {
        let needle = id_or_prefix.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return Err(LtmError::NotFound("empty dissonance id".to_string()));
        }
        let mut stmt = self.conn.prepare(
            "SELECT id FROM dissonance_queue WHERE id LIKE ?1 ESCAPE '\\' \
             ORDER BY detected_at LIMIT 11",
        )?;
        let candidates = stmt
            .query_map(params![format!("{}%", escape_like(&needle))], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        match candidates.as_slice() {
            [] => Err(LtmError::NotFound(format!("dissonance {id_or_prefix}"))),
            [only] => Uuid::parse_str(only).map_err(|e| LtmError::Storage(e.to_string())),
            _ => Err(LtmError::AmbiguousId {
                prefix: id_or_prefix.to_string(),
                candidates: candidates.into_iter().take(10).collect(),
            }),
        }
    }

    /// An agent's dissonances, oldest first; `status = None` lists all
    pub fn list_dissonances(
        &self,
        agent_id: &str,
        status: Option<DissonanceStatus>,
    ) -> Result<Vec<Dissonance>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DISSONANCE_COLUMNS} FROM dissonance_queue WHERE agent_id = ?1 \
             AND (?2 IS NULL OR status = ?2) ORDER BY detected_at, id"
        ))?;
        let rows = stmt
            .query_map(params![agent_id, status.map(|s| s.as_str())], row_to_dissonance)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Whether the pair is already queued, in either order and any status
    pub fn dissonance_exists(&self, a: Uuid, b: Uuid) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM dissonance_queue \
             WHERE (memory_a = ?1 AND memory_b = ?2) OR (memory_a = ?2 AND memory_b = ?1)",
            params![a.to_string(), b.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Close a dissonance with its final status
    pub fn close_dissonance(
        &self,
        id: Uuid,
        status: DissonanceStatus,
        resolution: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE dissonance_queue SET status = ?1, resolution = ?2, resolved_at = ?3 \
             WHERE id = ?4",
            params![status.as_str(), resolution, to_micros(now), id.to_string()],
        )?;
        if updated == 0 {
            return Err(LtmError::NotFound(format!("dissonance {id}")));
        }
        Ok(())
    }
}
