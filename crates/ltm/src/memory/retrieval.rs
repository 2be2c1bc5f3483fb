//! Recall: semantic search with keyword fallback
//!
//! Candidates are the memories matching a [`MemoryFilter`] whose embedding
//! was produced by the same model as the query vector. They are ranked by
//! cosine similarity, ties broken by most recent access. When no embedder is
//! configured, or embedding the query fails, recall degrades to a keyword
//! search instead of failing.

use std::cmp::Ordering;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

use crate::config::SearchConfig;
use crate::embedding::{Embedder, cosine_similarity};
use crate::error::{LtmError, Result};
use crate::memory::tier::assign_tier;
use crate::memory::types::Memory;
use crate::signing::{self, Signer, Trust};
use crate::storage::{MemoryFilter, SqliteStore};

/// How a recall was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecallMode {
    Semantic,
    Keyword,
}

/// A recalled memory
#[derive(Debug, Clone, Serialize)]
pub struct RecallHit {
    pub memory: Memory,
    /// Cosine similarity to the query, `None` for keyword hits
    pub score: Option<f32>,
    pub trust: Trust,
}

/// Hits plus whether recall had to fall back to keywords
#[derive(Debug, Clone, Serialize)]
pub struct RecallOutcome {
    pub hits: Vec<RecallHit>,
    pub mode: RecallMode,
    /// Semantic search was unavailable for this call
    pub degraded: bool,
}

/// Ranks stored memories against a query
pub struct Retriever<'a> {
    store: &'a SqliteStore,
    embedder: Option<&'a dyn Embedder>,
    signer: Option<&'a dyn Signer>,
    config: SearchConfig,
    semantic: bool,
}

impl<'a> Retriever<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self {
            store,
            embedder: None,
            signer: None,
            config: SearchConfig::default(),
            semantic: true,
        }
    }

    pub fn with_embedder(mut self, embedder: Option<&'a dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_signer(mut self, signer: Option<&'a dyn Signer>) -> Self {
        self.signer = signer;
        self
    }

    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Skip the embedder and match keywords only
    pub fn keyword_only(mut self) -> Self {
        self.semantic = false;
        self
    }

    /// Look a memory up by full id or unique prefix and mark it accessed.
    ///
    /// Superseded versions are returned too.
    pub fn recall_by_id(&self, id_or_prefix: &str, now: DateTime<Utc>) -> Result<RecallHit> {
        let id = self.store.resolve_memory_id(id_or_prefix)?;
        self.store.atomically(|store| {
            let memory = touch(store, store.require_memory(id)?, now)?;
            Ok(self.hit(memory, None))
        })
    }

    /// Return up to `limit` memories matching `query` within `filter`.
    ///
    /// Every hit is marked accessed at `now`, which may move it back into a
    /// livelier tier.
    pub fn recall(
        &self,
        query: &str,
        filter: &MemoryFilter,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<RecallOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(LtmError::InvalidInput("query is empty".to_string()));
        }

        let embedder = self.embedder.filter(|_| self.semantic);
        let semantic = match embedder {
            Some(embedder) => match embedder.embed(query) {
                Ok(vector) => Some(self.rank(embedder.model_tag(), &vector, filter, limit)?),
                Err(e) => {
                    tracing::warn!("Semantic recall unavailable, using keyword search: {}", e);
                    None
                }
            },
            None => {
                if self.semantic {
                    tracing::debug!("No embedder configured, using keyword search");
                }
                None
            }
        };

        let (scored, mode) = match semantic {
            Some(scored) => (scored, RecallMode::Semantic),
            None => {
                let hits = self.store.search_keyword(filter, query, limit)?;
                (
                    hits.into_iter().map(|m| (m, None)).collect(),
                    RecallMode::Keyword,
                )
            }
        };

        let hits = self.store.atomically(|store| {
            scored
                .into_iter()
                .map(|(memory, score)| Ok(self.hit(touch(store, memory, now)?, score)))
                .collect::<Result<Vec<_>>>()
        })?;

        tracing::debug!("Recall '{}' returned {} hits ({:?})", query, hits.len(), mode);
        Ok(RecallOutcome {
            hits,
            mode,
            degraded: self.semantic && mode == RecallMode::Keyword,
        })
    }

    fn hit(&self, memory: Memory, score: Option<f32>) -> RecallHit {
        let trust = signing::check(self.signer, &memory.original_content, memory.signature.as_deref());
        if trust == Trust::Untrusted {
            tracing::warn!("{}", LtmError::SignatureInvalid(memory.id.to_string()));
        }
        RecallHit {
            memory,
            score,
            trust,
        }
    }

    fn rank(
        &self,
        model_tag: &str,
        query: &[f32],
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<(Memory, Option<f32>)>> {
        let mut scored: Vec<(Memory, f32)> = self
            .store
            .query(filter)?
            .into_iter()
            .filter(|m| m.embedding_model.as_deref() == Some(model_tag))
            .filter_map(|m| {
                let score = cosine_similarity(query, m.embedding.as_deref()?);
                Some((m, score))
            })
            .filter(|(_, score)| *score >= self.config.min_score)
            .collect();

        scored.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.last_accessed.cmp(&a.last_accessed))
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(m, s)| (m, Some(s))).collect())
    }
}

fn touch(store: &SqliteStore, mut memory: Memory, now: DateTime<Utc>) -> Result<Memory> {
    store.mark_accessed(memory.id, now)?;
    memory.last_accessed = now.trunc_subsecs(6);
    let tier = assign_tier(
        memory.impact,
        memory.kind,
        memory.age_days(now),
        memory.last_accessed_days_ago(now),
    );
    if tier != memory.tier {
        store.set_tier(memory.id, tier)?;
        memory.tier = tier;
    }
    Ok(memory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{Impact, MemoryKind, Tier};
    use crate::signing::HmacSigner;
    use crate::testing::{FixedEmbedder, MockEmbedder, UnavailableEmbedder};
    use chrono::Duration;

    fn insert_embedded(store: &SqliteStore, embedder: &dyn Embedder, memory: &Memory) {
        store.insert_memory(memory).expect("insert");
        let vector = embedder.embed(&memory.content).expect("embed");
        store
            .set_embedding(memory.id, &vector, embedder.model_tag())
            .expect("embedding");
    }

    #[test]
    fn test_semantic_ranking() {
        let store = SqliteStore::open_in_memory().expect("open");
        let embedder = MockEmbedder::new();
        let sqlite = Memory::new("a", MemoryKind::Architectural, Impact::High, "Team chose SQLite for simplicity");
        let css = Memory::new("a", MemoryKind::Learnings, Impact::Medium, "CSS grid needs explicit rows");
        insert_embedded(&store, &embedder, &sqlite);
        insert_embedded(&store, &embedder, &css);

        let outcome = Retriever::new(&store)
            .with_embedder(Some(&embedder))
            .recall("SQLite simplicity", &MemoryFilter::new().for_agent("a"), 5, Utc::now())
            .expect("recall");

        assert_eq!(outcome.mode, RecallMode::Semantic);
        assert!(!outcome.degraded);
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].memory.id, sqlite.id);
        assert!(outcome.hits[0].score.expect("score") > 0.3);
    }

    #[test]
    fn test_other_model_vectors_are_ignored() {
        let store = SqliteStore::open_in_memory().expect("open");
        let memory = Memory::new("a", MemoryKind::Learnings, Impact::Medium, "borrow checker rules");
        insert_embedded(&store, &MockEmbedder::new(), &memory);

        let other = FixedEmbedder::new().with_tag("other-model");
        let outcome = Retriever::new(&store)
            .with_embedder(Some(&other))
            .recall("borrow checker rules", &MemoryFilter::new().for_agent("a"), 5, Utc::now())
            .expect("recall");
        assert!(outcome.hits.is_empty());
    }

    #[test]
    fn test_falls_back_to_keyword_when_embedder_fails() {
        let store = SqliteStore::open_in_memory().expect("open");
        let memory = Memory::new("a", MemoryKind::Learnings, Impact::Low, "Use WAL mode for SQLite");
        store.insert_memory(&memory).expect("insert");

        let outcome = Retriever::new(&store)
            .with_embedder(Some(&UnavailableEmbedder))
            .recall("wal mode", &MemoryFilter::new().for_agent("a"), 5, Utc::now())
            .expect("recall");
        assert_eq!(outcome.mode, RecallMode::Keyword);
        assert!(outcome.degraded);
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].score, None);
        assert_eq!(outcome.hits[0].memory.tier, Tier::Deep);
    }

    #[test]
    fn test_recall_marks_accessed_and_reactivates() {
        let store = SqliteStore::open_in_memory().expect("open");
        let created = Utc::now() - Duration::days(20);
        let mut memory = Memory::new_at("a", MemoryKind::Architectural, Impact::High, "Pin the toolchain", created);
        memory.tier = Tier::Contextual;
        store.insert_memory(&memory).expect("insert");

        let now = Utc::now();
        let outcome = Retriever::new(&store)
            .recall("toolchain", &MemoryFilter::new().for_agent("a"), 5, now)
            .expect("recall");
        assert_eq!(outcome.hits[0].memory.tier, Tier::Active);

        let stored = store.require_memory(memory.id).expect("stored");
        assert_eq!(stored.last_accessed, now.trunc_subsecs(6));
        assert_eq!(stored.tier, Tier::Active);
    }

    #[test]
    fn test_trust_is_reported() {
        let store = SqliteStore::open_in_memory().expect("open");
        let signer = HmacSigner::new(b"k".to_vec()).expect("signer");
        let mut memory = Memory::new("a", MemoryKind::Learnings, Impact::Medium, "signed fact");
        memory.signature = Some(signer.sign("signed fact").expect("sign"));
        store.insert_memory(&memory).expect("insert");

        let outcome = Retriever::new(&store)
            .with_signer(Some(&signer))
            .recall("signed", &MemoryFilter::new().for_agent("a"), 5, Utc::now())
            .expect("recall");
        assert_eq!(outcome.hits[0].trust, Trust::Verified);
    }

    #[test]
    fn test_keyword_only_is_not_degraded() {
        let store = SqliteStore::open_in_memory().expect("open");
        let memory = Memory::new("a", MemoryKind::Learnings, Impact::Medium, "cargo vendor offline");
        store.insert_memory(&memory).expect("insert");

        let outcome = Retriever::new(&store)
            .with_embedder(Some(&MockEmbedder))
            .keyword_only()
            .recall("vendor", &MemoryFilter::new().for_agent("a"), 5, Utc::now())
            .expect("recall");
        assert_eq!(outcome.mode, RecallMode::Keyword);
        assert!(!outcome.degraded);
        assert_eq!(outcome.hits.len(), 1);
    }

    #[test]
    fn test_recall_by_prefix_includes_superseded() {
        let store = SqliteStore::open_in_memory().expect("open");
        let memory = Memory::new("a", MemoryKind::Learnings, Impact::Medium, "old wording");
        store.insert_memory(&memory).expect("insert");
        store.supersede(memory.id, "new wording", Utc::now()).expect("supersede");

        let hit = Retriever::new(&store)
            .recall_by_id(&memory.short_id(), Utc::now())
            .expect("recall");
        assert_eq!(hit.memory.content, "old wording");
        assert!(!hit.memory.is_current());
    }

    #[test]
    fn test_empty_query_is_rejected() {
        let store = SqliteStore::open_in_memory().expect("open");
        let result = Retriever::new(&store).recall("  ", &MemoryFilter::new(), 5, Utc::now());
        assert!(matches!(result, Err(LtmError::InvalidInput(_))));
    }
}
