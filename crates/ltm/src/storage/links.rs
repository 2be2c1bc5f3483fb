use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use uuid::Uuid;

use super::{SqliteStore, from_micros, parse_column, parse_uuid, to_micros};
use crate::error::Result;
use crate::memory::types::{LinkType, MemoryLink};

/// What happened when an auto-detected similarity link was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkUpsert {
    /// No link existed for the pair
    Created,
    /// An existing link had a lower or unknown similarity and was replaced
    Strengthened,
    /// An existing link already had an equal or higher similarity
    Kept,
}

fn row_to_link(row: &Row<'_>) -> rusqlite::Result<MemoryLink> {
    let similarity: Option<f64> = row.get(3)?;
    Ok(MemoryLink {
        source_id: parse_uuid(row, 0)?,
        target_id: parse_uuid(row, 1)?,
        link_type: parse_column(row, 2)?,
        similarity: similarity.map(|s| s as f32),
        created_at: from_micros(row, 4)?,
    })
}

impl SqliteStore {
    /// The link between two memories in either direction, if any
    pub fn link_between(&self, a: Uuid, b: Uuid) -> Result<Option<MemoryLink>> {
        let link = self
            .conn
            .query_row(
                "SELECT source_id, target_id, link_type, similarity, created_at FROM memory_links \
                 WHERE (source_id = ?1 AND target_id = ?2) OR (source_id = ?2 AND target_id = ?1) \
                 LIMIT 1",
                params![a.to_string(), b.to_string()],
                row_to_link,
            )
            .optional()?;
        Ok(link)
    }

    /// Record a link, replacing any existing link for the same pair
    pub fn put_link(&self, link: &MemoryLink) -> Result<()> {
        self.atomically(|store| {
            store.delete_pair(link.source_id, link.target_id)?;
            store.insert_link_row(link)
        })
    }

    /// Record an auto-detected RELATES_TO link between `source` and `target`.
    ///
    /// A pair holds at most one link. When one exists with an equal or
    /// higher similarity it is kept; otherwise the higher similarity wins.
    /// Typed links (anything but RELATES_TO) keep their type and direction
    /// and only take the new similarity.
    pub fn upsert_similarity_link(
        &self,
        source: Uuid,
        target: Uuid,
        similarity: f32,
        now: DateTime<Utc>,
    ) -> Result<LinkUpsert> {
        self.atomically(|store| match store.link_between(source, target)? {
            None => {
                store.insert_link_row(&MemoryLink {
                    source_id: source,
                    target_id: target,
                    link_type: LinkType::RelatesTo,
                    similarity: Some(similarity),
                    created_at: now,
                })?;
                Ok(LinkUpsert::Created)
            }
            Some(existing) if existing.similarity.is_some_and(|s| s >= similarity) => {
                Ok(LinkUpsert::Kept)
            }
            Some(existing) if existing.link_type != LinkType::RelatesTo => {
                store.conn.execute(
                    "UPDATE memory_links SET similarity = ?1 WHERE source_id = ?2 AND target_id = ?3",
                    params![
                        similarity as f64,
                        existing.source_id.to_string(),
                        existing.target_id.to_string()
                    ],
                )?;
                Ok(LinkUpsert::Strengthened)
            }
            Some(existing) => {
                store.delete_pair(source, target)?;
                store.insert_link_row(&MemoryLink {
                    source_id: source,
                    target_id: target,
                    link_type: LinkType::RelatesTo,
                    similarity: Some(similarity),
                    created_at: existing.created_at,
                })?;
                Ok(LinkUpsert::Strengthened)
            }
        })
    }

    /// All links touching `id`, in either direction
    pub fn links_for(&self, id: Uuid) -> Result<Vec<MemoryLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, target_id, link_type, similarity, created_at FROM memory_links \
             WHERE source_id = ?1 OR target_id = ?1 ORDER BY created_at, source_id, target_id",
        )?;
        let links = stmt
            .query_map(params![id.to_string()], row_to_link)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(links)
    }

    pub fn count_links(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM memory_links", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn delete_pair(&self, a: Uuid, b: Uuid) -> Result<()> {
        self.conn.execute(
            "DELETE FROM memory_links WHERE (source_id = ?1 AND target_id = ?2) \
             OR (source_id = ?2 AND target_id = ?1)",
            params![a.to_string(), b.to_string()],
        )?;
        Ok(())
    }

    fn insert_link_row(&self, link: &MemoryLink) -> Result<()> {
        self.conn.execute(
            "INSERT INTO memory_links (source_id, target_id, link_type, similarity, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                link.source_id.to_string(),
                link.target_id.to_string(),
                link.link_type.as_str(),
                link.similarity.map(|s| s as f64),
                to_micros(link.created_at),
            ],
        )?;
        Ok(())
    }
}
