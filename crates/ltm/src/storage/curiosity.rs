use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use uuid::Uuid;

use super::filter::escape_like;
use super::{SqliteStore, from_micros, parse_column, parse_uuid, to_micros};
use crate::curiosity::types::{CuriosityFilter, CuriosityItem, CuriosityStatus};
use crate::error::{LtmError, Result};
use crate::memory::types::Region;

const CURIOSITY_COLUMNS: &str = "id, agent_id, region, project_id, question, context, \
     recurrence_count, first_seen, last_seen, status, priority_boost";

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<CuriosityItem> {
    let recurrence: i64 = row.get(6)?;
    Ok(CuriosityItem {
        id: parse_uuid(row, 0)?,
        agent_id: row.get(1)?,
        region: parse_column(row, 2)?,
        project_id: row.get(3)?,
        question: row.get(4)?,
        context: row.get(5)?,
        recurrence_count: recurrence.max(1) as u32,
        first_seen: from_micros(row, 7)?,
        last_seen: from_micros(row, 8)?,
        status: parse_column(row, 9)?,
        priority_boost: row.get(10)?,
    })
}

impl SqliteStore {
    pub fn insert_curiosity(&self, item: &CuriosityItem) -> Result<()> {
        if item.region == Region::Project && item.project_id.is_none() {
            return Err(LtmError::InvalidRegion);
        }
        self.conn.execute(
            &format!(
                "INSERT INTO curiosity_queue ({CURIOSITY_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                item.id.to_string(),
                item.agent_id,
                item.region.as_str(),
                item.project_id,
                item.question,
                item.context,
                item.recurrence_count as i64,
                to_micros(item.first_seen),
                to_micros(item.last_seen),
                item.status.as_str(),
                item.priority_boost,
            ],
        )?;
        Ok(())
    }

    pub fn get_curiosity(&self, id: Uuid) -> Result<Option<CuriosityItem>> {
        let item = self
            .conn
            .query_row(
                &format!("SELECT {CURIOSITY_COLUMNS} FROM curiosity_queue WHERE id = ?1"),
                params![id.to_string()],
                row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    /// Resolve a full id or unique prefix of a curiosity item
    pub fn resolve_curiosity_id(&self, id_or_prefix: &str) -> Result<Uuid> {
        let needle = id_or_prefix.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return Err(LtmError::NotFound("empty curiosity id".to_string()));
        }
        let mut stmt = self.conn.prepare(
            "SELECT id FROM curiosity_queue WHERE id LIKE ?1 ESCAPE '\\' ORDER BY first_seen LIMIT 11",
        )?;
        let candidates = stmt
            .query_map(params![format!("{}%", escape_like(&needle))], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        match candidates.as_slice() {
            [] => Err(LtmError::NotFound(format!("curiosity item {id_or_prefix}"))),
            [only] => Uuid::parse_str(only).map_err(|e| LtmError::Storage(e.to_string())),
            _ => Err(LtmError::AmbiguousId {
                prefix: id_or_prefix.to_string(),
                candidates: candidates.into_iter().take(10).collect(),
            }),
        }
    }

    /// OPEN items with exactly this agent, region and project
    pub fn open_curiosity_in_scope(
        &self,
        agent_id: &str,
        region: Region,
        project_id: Option<&str>,
    ) -> Result<Vec<CuriosityItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CURIOSITY_COLUMNS} FROM curiosity_queue WHERE agent_id = ?1 AND region = ?2 \
             AND project_id IS ?3 AND status = 'OPEN' ORDER BY first_seen, id"
        ))?;
        let items = stmt
            .query_map(params![agent_id, region.as_str(), project_id], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Items matching `filter`, oldest first
    pub fn list_curiosity(&self, filter: &CuriosityFilter) -> Result<Vec<CuriosityItem>> {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if let Some(ref agent_id) = filter.agent_id {
            conditions.push("agent_id = ?");
            params.push(Value::Text(agent_id.clone()));
        }
        match filter.project_id {
            Some(ref project_id) => {
                conditions.push("(region = 'AGENT' OR project_id = ?)");
                params.push(Value::Text(project_id.clone()));
            }
            None => conditions.push("region = 'AGENT'"),
        }
        if let Some(region) = filter.region {
            conditions.push("region = ?");
            params.push(Value::Text(region.as_str().to_string()));
        }
        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Value::Text(status.as_str().to_string()));
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CURIOSITY_COLUMNS} FROM curiosity_queue WHERE {} ORDER BY first_seen, id",
            conditions.join(" AND ")
        ))?;
        let items = stmt
            .query_map(params_from_iter(params), row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Count a repeat sighting: bump recurrence and `last_seen`, and fill in
    /// the context if the item had none
    pub fn bump_curiosity(
        &self,
        id: Uuid,
        context: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE curiosity_queue SET recurrence_count = recurrence_count + 1, \
             last_seen = ?1, context = COALESCE(context, ?2) WHERE id = ?3",
            params![to_micros(now), context, id.to_string()],
        )?;
        Ok(())
    }

    pub fn set_curiosity_status(&self, id: Uuid, status: CuriosityStatus) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE curiosity_queue SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id.to_string()],
        )?;
        if updated == 0 {
            return Err(LtmError::NotFound(format!("curiosity item {id}")));
        }
        Ok(())
    }

    pub fn add_priority_boost(&self, id: Uuid, amount: i64) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE curiosity_queue SET priority_boost = priority_boost + ?1 WHERE id = ?2",
            params![amount, id.to_string()],
        )?;
        if updated == 0 {
            return Err(LtmError::NotFound(format!("curiosity item {id}")));
        }
        Ok(())
    }
}
