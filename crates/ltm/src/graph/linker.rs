use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::LinkingConfig;
use crate::embedding::cosine_similarity;
use crate::error::Result;
use crate::memory::types::Memory;
use crate::storage::{LinkUpsert, SqliteStore};

/// Outcome of linking one memory against its neighbours
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    pub created: usize,
    pub strengthened: usize,
    pub kept: usize,
}

impl LinkReport {
    pub fn total(&self) -> usize {
        self.created + self.strengthened + self.kept
    }

    fn record(&mut self, upsert: LinkUpsert) {
        match upsert {
            LinkUpsert::Created => self.created += 1,
            LinkUpsert::Strengthened => self.strengthened += 1,
            LinkUpsert::Kept => self.kept += 1,
        }
    }
}

/// Creates RELATES_TO links between memories with similar embeddings
pub struct Linker<'a> {
    store: &'a SqliteStore,
    config: LinkingConfig,
}

impl<'a> Linker<'a> {
    pub fn new(store: &'a SqliteStore, config: LinkingConfig) -> Self {
        Self { store, config }
    }

    /// Link `memory` to every in-scope memory whose embedding from the same
    /// model is at least `similarity_threshold` similar, strongest first, up
    /// to `max_links`.
    pub fn link_new(
        &self,
        memory: &Memory,
        embedding: &[f32],
        model: &str,
        now: DateTime<Utc>,
    ) -> Result<LinkReport> {
        let candidates = self.store.embedding_candidates(
            &memory.agent_id,
            memory.region,
            memory.project_id.as_deref(),
            model,
            memory.id,
        )?;

        let mut similar: Vec<_> = candidates
            .into_iter()
            .map(|(id, vector)| (id, cosine_similarity(embedding, &vector)))
            .filter(|(_, sim)| *sim >= self.config.similarity_threshold)
            .collect();
        similar.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa).unwrap_or(Ordering::Equal).then_with(|| a.cmp(b))
        });
        similar.truncate(self.config.max_links);

        let mut report = LinkReport::default();
        self.store.atomically(|store| {
            for (target, similarity) in &similar {
                let upsert = store.upsert_similarity_link(memory.id, *target, *similarity, now)?;
                report.record(upsert);
            }
            Ok(())
        })?;

        if report.total() > 0 {
            tracing::debug!(
                "Linked memory {}: {} created, {} strengthened, {} kept",
                memory.short_id(),
                report.created,
                report.strengthened,
                report.kept
            );
        }
        Ok(report)
    }
}
