use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use uuid::Uuid;

use super::filter::{MemoryFilter, escape_like};
use super::{
    SqliteStore, decode_embedding, encode_embedding, from_micros, parse_column, parse_opt_uuid,
    parse_uuid, to_micros,
};
use crate::error::{LtmError, Result};
use crate::memory::types::{LinkType, Memory, MemoryLink, Region, Tier};

const MEMORY_COLUMNS: &str = "id, agent_id, region, project_id, kind, content, original_content, \
     impact, confidence, created_at, last_accessed, previous_memory_id, superseded_by, version, \
     signature, token_count, platform, embedding, embedding_model, tier, compaction, session_id, \
     git_commit, git_branch";

/// Maximum candidates listed in an `AmbiguousId` error
const MAX_PREFIX_CANDIDATES: usize = 10;

fn row_to_memory(row: &Row<'_>) -> rusqlite::Result<Memory> {
    let embedding: Option<Vec<u8>> = row.get(17)?;
    let version: i64 = row.get(13)?;
    let token_count: i64 = row.get(15)?;
    Ok(Memory {
        id: parse_uuid(row, 0)?,
        agent_id: row.get(1)?,
        region: parse_column(row, 2)?,
        project_id: row.get(3)?,
        kind: parse_column(row, 4)?,
        content: row.get(5)?,
        original_content: row.get(6)?,
        impact: parse_column(row, 7)?,
        confidence: row.get(8)?,
        created_at: from_micros(row, 9)?,
        last_accessed: from_micros(row, 10)?,
        previous_memory_id: parse_opt_uuid(row, 11)?,
        superseded_by: parse_opt_uuid(row, 12)?,
        version: version.max(1) as u32,
        signature: row.get(14)?,
        token_count: token_count.max(0) as usize,
        platform: row.get(16)?,
        embedding: embedding.map(|b| decode_embedding(&b)),
        embedding_model: row.get(18)?,
        tier: parse_column(row, 19)?,
        compaction: parse_column(row, 20)?,
        session_id: row.get(21)?,
        git_commit: row.get(22)?,
        git_branch: row.get(23)?,
    })
}

impl SqliteStore {
    /// Insert a memory row.
    ///
    /// Fails with `InvalidRegion` when a PROJECT memory has no project.
    pub fn insert_memory(&self, memory: &Memory) -> Result<()> {
        if !memory.region_is_valid() {
            return Err(LtmError::InvalidRegion);
        }
        self.conn.execute(
            &format!(
                "INSERT INTO memories ({MEMORY_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, \
                  ?18, ?19, ?20, ?21, ?22, ?23, ?24)"
            ),
            params![
                memory.id.to_string(),
                memory.agent_id,
                memory.region.as_str(),
                memory.project_id,
                memory.kind.as_str(),
                memory.content,
                memory.original_content,
                memory.impact.as_str(),
                memory.confidence,
                to_micros(memory.created_at),
                to_micros(memory.last_accessed),
                memory.previous_memory_id.map(|id| id.to_string()),
                memory.superseded_by.map(|id| id.to_string()),
                memory.version as i64,
                memory.signature,
                memory.token_count as i64,
                memory.platform,
                memory.embedding.as_deref().map(encode_embedding),
                memory.embedding_model,
                memory.tier.as_str(),
                memory.compaction.as_str(),
                memory.session_id,
                memory.git_commit,
                memory.git_branch,
            ],
        )?;
        Ok(())
    }

    /// Fetch a memory by id
    pub fn get_memory(&self, id: Uuid) -> Result<Option<Memory>> {
        let memory = self
            .conn
            .query_row(
                &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"),
                params![id.to_string()],
                row_to_memory,
            )
            .optional()?;
        Ok(memory)
    }

    /// Fetch a memory by id, failing with `NotFound` if absent
    pub fn require_memory(&self, id: Uuid) -> Result<Memory> {
        self.get_memory(id)?
            .ok_or_else(|| LtmError::NotFound(format!("memory {id}")))
    }

    /// Resolve a full id or unique id prefix.
    ///
    /// Fails with `NotFound` when nothing matches and with `AmbiguousId`
    /// (listing candidates) when several rows share the prefix.
    pub fn resolve_memory_id(&self, id_or_prefix: &str) -> Result<Uuid> {
        let needle = id_or_prefix.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return Err(LtmError::NotFound("empty memory id".to_string()));
        }
        if let Ok(id) = Uuid::parse_str(&needle) {
            return self.require_memory(id).map(|m| m.id);
        }

        let mut stmt = self.conn.prepare(
            "SELECT id FROM memories WHERE id LIKE ?1 ESCAPE '\\' ORDER BY created_at LIMIT ?2",
        )?;
        let candidates = stmt
            .query_map(
                params![
                    format!("{}%", escape_like(&needle)),
                    (MAX_PREFIX_CANDIDATES + 1) as i64
                ],
                |row| row.get::<_, String>(0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        match candidates.as_slice() {
            [] => Err(LtmError::NotFound(format!("memory {id_or_prefix}"))),
            [only] => Uuid::parse_str(only).map_err(|e| LtmError::Storage(e.to_string())),
            _ => Err(LtmError::AmbiguousId {
                prefix: id_or_prefix.to_string(),
                candidates: candidates
                    .into_iter()
                    .take(MAX_PREFIX_CANDIDATES)
                    .collect(),
            }),
        }
    }

    /// List memories matching `filter`, newest first
    pub fn query(&self, filter: &MemoryFilter) -> Result<Vec<Memory>> {
        self.select(filter, None, "created_at DESC, id")
    }

    /// Case-insensitive substring search over content and original content,
    /// newest first
    pub fn search_keyword(
        &self,
        filter: &MemoryFilter,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        let pattern = format!("%{}%", escape_like(query.trim()));
        let filter = filter.clone().limit(limit);
        self.select(
            &filter,
            Some((
                "(content LIKE ? ESCAPE '\\' OR original_content LIKE ? ESCAPE '\\')",
                vec![Value::Text(pattern.clone()), Value::Text(pattern)],
            )),
            "created_at DESC, id",
        )
    }

    /// Count memories matching `filter`
    pub fn count(&self, filter: &MemoryFilter) -> Result<usize> {
        let (clause, params) = filter
            .to_sql_clause()
            .unwrap_or_else(|| ("1".to_string(), Vec::new()));
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM memories WHERE {clause}"),
            params_from_iter(params),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn select(
        &self,
        filter: &MemoryFilter,
        extra: Option<(&str, Vec<Value>)>,
        order_by: &str,
    ) -> Result<Vec<Memory>> {
        let (mut clause, mut params) = filter
            .to_sql_clause()
            .unwrap_or_else(|| ("1".to_string(), Vec::new()));
        if let Some((condition, extra_params)) = extra {
            clause = format!("{clause} AND {condition}");
            params.extend(extra_params);
        }
        let mut sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE {clause} ORDER BY {order_by}");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let memories = stmt
            .query_map(params_from_iter(params), row_to_memory)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(memories)
    }

    /// Replace a current memory with a new version.
    ///
    /// The new row copies owner, region, kind, impact and project, gets
    /// `version + 1` and a back-pointer; the old row gets `superseded_by`
    /// and a SUPERSEDES link is recorded, all in one transaction.
    pub fn supersede(&self, old_id: Uuid, new_content: &str, now: DateTime<Utc>) -> Result<Memory> {
        self.atomically(|store| {
            let old = store.require_memory(old_id)?;
            if let Some(next) = old.superseded_by {
                return Err(LtmError::NotFound(format!(
                    "current memory {old_id} (already superseded by {next})"
                )));
            }

            let new = old.successor(new_content, now);
            store.insert_memory(&new)?;
            store.conn.execute(
                "UPDATE memories SET superseded_by = ?1 WHERE id = ?2",
                params![new.id.to_string(), old.id.to_string()],
            )?;
            store.put_link(&MemoryLink {
                source_id: new.id,
                target_id: old.id,
                link_type: LinkType::Supersedes,
                similarity: None,
                created_at: now,
            })?;
            Ok(new)
        })
    }

    /// Update `last_accessed` only
    pub fn mark_accessed(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE memories SET last_accessed = ?1 WHERE id = ?2",
            params![to_micros(now), id.to_string()],
        )?;
        if updated == 0 {
            return Err(LtmError::NotFound(format!("memory {id}")));
        }
        Ok(())
    }

    /// Hard-delete a memory and every link that references it.
    ///
    /// A forgotten middle version is spliced out of its chain so the
    /// neighbours point at each other; forgetting the current version
    /// leaves its predecessor as the chain head.
    pub fn forget(&self, id_or_prefix: &str) -> Result<Memory> {
        let id = self.resolve_memory_id(id_or_prefix)?;
        self.atomically(|store| {
            let memory = store.require_memory(id)?;
            let key = id.to_string();
            store.conn.execute(
                "DELETE FROM memory_links WHERE source_id = ?1 OR target_id = ?1",
                params![key],
            )?;
            store
                .conn
                .execute("DELETE FROM deferred_context WHERE memory_id = ?1", params![key])?;

            let next = memory.superseded_by.map(|id| id.to_string());
            let prev = memory.previous_memory_id.map(|id| id.to_string());
            store.conn.execute(
                "UPDATE memories SET superseded_by = ?1 WHERE superseded_by = ?2",
                params![next, key],
            )?;
            store.conn.execute(
                "UPDATE memories SET previous_memory_id = ?1 WHERE previous_memory_id = ?2",
                params![prev, key],
            )?;
            if let (Some(next), Some(prev)) = (memory.superseded_by, memory.previous_memory_id) {
                store.put_link(&MemoryLink {
                    source_id: next,
                    target_id: prev,
                    link_type: LinkType::Supersedes,
                    similarity: None,
                    created_at: memory.created_at,
                })?;
            }

            store
                .conn
                .execute("DELETE FROM memories WHERE id = ?1", params![key])?;
            Ok(memory)
        })
    }

    /// Persist the fields decay is allowed to change
    pub fn update_decayed(&self, memory: &Memory) -> Result<()> {
        self.conn.execute(
            "UPDATE memories SET content = ?1, confidence = ?2, tier = ?3, compaction = ?4, \
             token_count = ?5 WHERE id = ?6",
            params![
                memory.content,
                memory.confidence,
                memory.tier.as_str(),
                memory.compaction.as_str(),
                memory.token_count as i64,
                memory.id.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn set_tier(&self, id: Uuid, tier: Tier) -> Result<()> {
        self.conn.execute(
            "UPDATE memories SET tier = ?1 WHERE id = ?2",
            params![tier.as_str(), id.to_string()],
        )?;
        Ok(())
    }

    pub fn set_signature(&self, id: Uuid, signature: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE memories SET signature = ?1 WHERE id = ?2",
            params![signature, id.to_string()],
        )?;
        Ok(())
    }

    pub fn set_session(&self, id: Uuid, session_id: Option<&str>) -> Result<()> {
        self.conn.execute(
            "UPDATE memories SET session_id = ?1 WHERE id = ?2",
            params![session_id, id.to_string()],
        )?;
        Ok(())
    }

    pub fn set_token_count(&self, id: Uuid, token_count: usize) -> Result<()> {
        self.conn.execute(
            "UPDATE memories SET token_count = ?1 WHERE id = ?2",
            params![token_count as i64, id.to_string()],
        )?;
        Ok(())
    }

    /// Store an embedding together with the tag of the model that made it
    pub fn set_embedding(&self, id: Uuid, embedding: &[f32], model: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE memories SET embedding = ?1, embedding_model = ?2 WHERE id = ?3",
            params![encode_embedding(embedding), model, id.to_string()],
        )?;
        Ok(())
    }

    /// Embeddings a memory may link against: same agent and model, and for
    /// PROJECT memories only AGENT rows or rows of the same project.
    pub fn embedding_candidates(
        &self,
        agent_id: &str,
        region: Region,
        project_id: Option<&str>,
        model: &str,
        exclude: Uuid,
    ) -> Result<Vec<(Uuid, Vec<f32>)>> {
        let mut sql = String::from(
            "SELECT id, embedding FROM memories WHERE agent_id = ?1 AND embedding_model = ?2 \
             AND embedding IS NOT NULL AND id != ?3",
        );
        let mut params = vec![
            Value::Text(agent_id.to_string()),
            Value::Text(model.to_string()),
            Value::Text(exclude.to_string()),
        ];
        if region == Region::Project {
            sql.push_str(" AND (region = 'AGENT' OR project_id = ?4)");
            params.push(Value::Text(project_id.unwrap_or_default().to_string()));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| {
                let bytes: Vec<u8> = row.get(1)?;
                Ok((parse_uuid(row, 0)?, decode_embedding(&bytes)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Ids and content of rows still lacking an embedding, oldest first,
    /// skipping the first `offset` of them
    pub fn missing_embeddings(&self, limit: usize, offset: usize) -> Result<Vec<(Uuid, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, content FROM memories WHERE embedding IS NULL \
             ORDER BY created_at, id LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
            .query_map(params![limit as i64, offset as i64], |row| {
                Ok((parse_uuid(row, 0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_missing_embeddings(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE embedding IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Achievement lookup for idempotent commit imports
    pub fn find_by_commit(
        &self,
        agent_id: &str,
        project_id: Option<&str>,
        commit: &str,
    ) -> Result<Option<Memory>> {
        let memory = self
            .conn
            .query_row(
                &format!(
                    "SELECT {MEMORY_COLUMNS} FROM memories WHERE agent_id = ?1 \
                     AND project_id IS ?2 AND git_commit = ?3 LIMIT 1"
                ),
                params![agent_id, project_id, commit],
                row_to_memory,
            )
            .optional()?;
        Ok(memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{Impact, MemoryKind};
    use chrono::Duration;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("open")
    }

    fn memory(content: &str) -> Memory {
        Memory::new("anima", MemoryKind::Learnings, Impact::Medium, content)
    }

    #[test]
    fn test_insert_and_get_roundtrip() {
        let store = store();
        let mut m = memory("Prefer explicit transactions").in_project("p1");
        m.embedding = Some(vec![0.5; 8]);
        m.embedding_model = Some("mock".to_string());
        store.insert_memory(&m).expect("insert");

        let back = store.get_memory(m.id).expect("get").expect("present");
        assert_eq!(back.content, m.content);
        assert_eq!(back.region, Region::Project);
        assert_eq!(back.project_id.as_deref(), Some("p1"));
        assert_eq!(back.embedding, Some(vec![0.5; 8]));
        assert_eq!(back.created_at, m.created_at);
    }

    #[test]
    fn test_project_region_without_project_is_rejected() {
        let store = store();
        let mut m = memory("orphan");
        m.region = Region::Project;
        assert!(matches!(store.insert_memory(&m), Err(LtmError::InvalidRegion)));
        assert_eq!(store.count(&MemoryFilter::new()).expect("count"), 0);
    }

    #[test]
    fn test_resolve_prefix() {
        let store = store();
        let m = memory("one");
        store.insert_memory(&m).expect("insert");

        let prefix = &m.id.to_string()[..6];
        assert_eq!(store.resolve_memory_id(prefix).expect("resolve"), m.id);
        assert!(matches!(
            store.resolve_memory_id("zzzz"),
            Err(LtmError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_ambiguous_prefix() {
        let store = store();
        let mut a = memory("a");
        let mut b = memory("b");
        a.id = Uuid::parse_str("abcd0000-0000-4000-8000-000000000001").expect("uuid");
        b.id = Uuid::parse_str("abcd0000-0000-4000-8000-000000000002").expect("uuid");
        store.insert_memory(&a).expect("insert");
        store.insert_memory(&b).expect("insert");

        match store.resolve_memory_id("abcd") {
            Err(LtmError::AmbiguousId { candidates, .. }) => assert_eq!(candidates.len(), 2),
            other => panic!("expected AmbiguousId, got {other:?}"),
        }
    }

    #[test]
    fn test_supersede_twice_fails() {
        let store = store();
        let m = memory("v1");
        store.insert_memory(&m).expect("insert");
        let now = Utc::now();
        store.supersede(m.id, "v2", now).expect("first supersede");
        assert!(matches!(
            store.supersede(m.id, "v3", now),
            Err(LtmError::NotFound(_))
        ));
    }

    #[test]
    fn test_forget_middle_version_splices_chain() {
        let store = store();
        let v1 = memory("v1");
        store.insert_memory(&v1).expect("insert");
        let now = Utc::now();
        let v2 = store.supersede(v1.id, "v2", now).expect("v2");
        let v3 = store.supersede(v2.id, "v3", now).expect("v3");

        store.forget(&v2.id.to_string()).expect("forget");

        let v1 = store.require_memory(v1.id).expect("v1");
        let v3 = store.require_memory(v3.id).expect("v3");
        assert_eq!(v1.superseded_by, Some(v3.id));
        assert_eq!(v3.previous_memory_id, Some(v1.id));
        let current = store.query(&MemoryFilter::new()).expect("query");
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id, v3.id);
    }

    #[test]
    fn test_forget_current_version_restores_predecessor() {
        let store = store();
        let v1 = memory("v1");
        store.insert_memory(&v1).expect("insert");
        let v2 = store.supersede(v1.id, "v2", Utc::now()).expect("v2");

        store.forget(&v2.id.to_string()).expect("forget");

        let v1 = store.require_memory(v1.id).expect("v1");
        assert_eq!(v1.superseded_by, None);
    }

    #[test]
    fn test_missing_embeddings_offset() {
        let store = store();
        for content in ["a", "b", "c"] {
            store.insert_memory(&memory(content)).expect("insert");
        }
        let all = store.missing_embeddings(10, 0).expect("all");
        let rest = store.missing_embeddings(10, 1).expect("rest");
        assert_eq!(all.len(), 3);
        assert_eq!(rest, all[1..].to_vec());
    }

    #[test]
    fn test_mark_accessed_only_touches_timestamp() {
        let store = store();
        let m = memory("touch me");
        store.insert_memory(&m).expect("insert");
        let later = m.last_accessed + Duration::hours(3);
        store.mark_accessed(m.id, later).expect("mark");

        let back = store.require_memory(m.id).expect("get");
        assert_eq!(back.last_accessed, later);
        assert_eq!(back.content, m.content);
        assert_eq!(back.confidence, m.confidence);
    }

    #[test]
    fn test_keyword_search_escapes_wildcards() {
        let store = store();
        store.insert_memory(&memory("coverage is 100% now")).expect("insert");
        store.insert_memory(&memory("coverage is 1000 lines")).expect("insert");

        let hits = store
            .search_keyword(&MemoryFilter::new(), "100%", 10)
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("100%"));

        let hits = store
            .search_keyword(&MemoryFilter::new(), "COVERAGE", 10)
            .expect("search");
        assert_eq!(hits.len(), 2, "search should be case-insensitive");
    }

    #[test]
    fn test_find_by_commit_scopes_project() {
        let store = store();
        let m = memory("shipped v1").in_project("p1").with_git(Some("abc123".into()), None);
        store.insert_memory(&m).expect("insert");

        assert!(store.find_by_commit("anima", Some("p1"), "abc123").expect("find").is_some());
        assert!(store.find_by_commit("anima", Some("p2"), "abc123").expect("find").is_none());
        assert!(store.find_by_commit("anima", None, "abc123").expect("find").is_none());
    }
}
