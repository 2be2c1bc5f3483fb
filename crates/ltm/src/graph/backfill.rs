use chrono::{DateTime, Utc};
use serde::Serialize;

use super::linker::Linker;
use crate::config::LinkingConfig;
use crate::embedding::Embedder;
use crate::error::{LtmError, Result};
use crate::storage::SqliteStore;

/// Progress of an embedding backfill run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillReport {
    /// Rows lacking an embedding when the run started
    pub pending: usize,
    pub embedded: usize,
    /// Links created or strengthened while backfilling
    pub linked: usize,
    pub failed: usize,
    pub batches: usize,
    pub dry_run: bool,
}

/// Embed and link rows that have no embedding yet.
///
/// Only rows without an embedding are picked up, so an interrupted run can
/// simply be started again. A batch the embedder rejects is retried row by
/// row; rows that still fail are counted and skipped for the rest of the
/// run. Each row is written in its own savepoint. The run stops early only
/// when the embedding backend is unavailable.
pub fn backfill_embeddings(
    store: &SqliteStore,
    embedder: &dyn Embedder,
    linking: &LinkingConfig,
    batch_size: usize,
    dry_run: bool,
    now: DateTime<Utc>,
) -> Result<BackfillReport> {
    if batch_size == 0 {
        return Err(LtmError::InvalidInput("batch size must be positive".to_string()));
    }

    let mut report = BackfillReport {
        pending: store.count_missing_embeddings()?,
        dry_run,
        ..BackfillReport::default()
    };
    if dry_run || report.pending == 0 {
        tracing::info!("Backfill: {} memories without embeddings", report.pending);
        return Ok(report);
    }

    let linker = Linker::new(store, linking.clone());
    let model = embedder.model_tag().to_string();

    // Failed rows keep their place at the head of the oldest-first queue
    let mut skip = 0;
    'run: loop {
        let batch = store.missing_embeddings(batch_size, skip)?;
        if batch.is_empty() {
            break;
        }

        let texts: Vec<String> = batch.iter().map(|(_, content)| content.clone()).collect();
        let vectors: Vec<Result<Vec<f32>>> = match embedder.embed_batch(&texts) {
            Ok(vectors) if vectors.len() == batch.len() => vectors.into_iter().map(Ok).collect(),
            Ok(vectors) => {
                tracing::warn!(
                    "Backfill: embedder returned {} vectors for {} texts, retrying row by row",
                    vectors.len(),
                    batch.len()
                );
                texts.iter().map(|t| embedder.embed(t)).collect::<Vec<_>>()
            }
            Err(e) => {
                tracing::debug!("Backfill: batch failed, retrying row by row: {}", e);
                texts.iter().map(|t| embedder.embed(t)).collect::<Vec<_>>()
            }
        };

        for ((id, _), vector) in batch.iter().zip(vectors) {
            let vector = match vector {
                Ok(vector) => vector,
                Err(LtmError::EmbeddingUnavailable(reason)) => {
                    tracing::warn!("Backfill: embedding backend unavailable, stopping: {}", reason);
                    report.failed += 1;
                    break 'run;
                }
                Err(e) => {
                    tracing::warn!("Backfill: could not embed memory {}: {}", id, e);
                    report.failed += 1;
                    continue;
                }
            };

            let written = store.atomically(|store| {
                store.set_embedding(*id, &vector, &model)?;
                let memory = store.require_memory(*id)?;
                let links = linker.link_new(&memory, &vector, &model, now)?;
                Ok(links.created + links.strengthened)
            });
            match written {
                Ok(linked) => {
                    report.embedded += 1;
                    report.linked += linked;
                }
                Err(e) => {
                    tracing::warn!("Backfill: could not store embedding for {}: {}", id, e);
                    report.failed += 1;
                }
            }
        }

        skip = report.failed;
        report.batches += 1;
        tracing::debug!(
            "Backfill: batch {} done, {} embedded so far",
            report.batches,
            report.embedded
        );
    }

    tracing::info!(
        "Backfill complete: {} embedded, {} linked, {} failed",
        report.embedded,
        report.linked,
        report.failed
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{Impact, Memory, MemoryKind};
    use crate::testing::{MockEmbedder, RejectingEmbedder, UnavailableEmbedder};

    fn seed(store: &SqliteStore, n: usize) {
        for i in 0..n {
            let m = Memory::new("agent", MemoryKind::Learnings, Impact::Medium, format!("sqlite note {i}"));
            store.insert_memory(&m).expect("insert");
        }
    }

    #[test]
    fn test_dry_run_counts_only() {
        let store = SqliteStore::open_in_memory().expect("open");
        seed(&store, 3);
        let report =
            backfill_embeddings(&store, &MockEmbedder, &LinkingConfig::default(), 2, true, Utc::now())
                .expect("backfill");
        assert_eq!(report.pending, 3);
        assert_eq!(report.embedded, 0);
        assert_eq!(store.count_missing_embeddings().expect("count"), 3);
    }

    #[test]
    fn test_batches_and_resume() {
        let store = SqliteStore::open_in_memory().expect("open");
        seed(&store, 5);
        let report =
            backfill_embeddings(&store, &MockEmbedder, &LinkingConfig::default(), 2, false, Utc::now())
                .expect("backfill");
        assert_eq!(report.embedded, 5);
        assert_eq!(report.batches, 3);
        assert!(report.linked > 0);

        let again =
            backfill_embeddings(&store, &MockEmbedder, &LinkingConfig::default(), 2, false, Utc::now())
                .expect("backfill");
        assert_eq!(again.pending, 0);
        assert_eq!(again.embedded, 0);
    }

    #[test]
    fn test_unavailable_embedder_stops_without_writes() {
        let store = SqliteStore::open_in_memory().expect("open");
        seed(&store, 2);
        let report = backfill_embeddings(
            &store,
            &UnavailableEmbedder,
            &LinkingConfig::default(),
            10,
            false,
            Utc::now(),
        )
        .expect("backfill");
        assert_eq!(report.failed, 1);
        assert_eq!(report.embedded, 0);
        assert_eq!(store.count_missing_embeddings().expect("count"), 2);
    }

    #[test]
    fn test_rejected_row_is_skipped_within_run() {
        let store = SqliteStore::open_in_memory().expect("open");
        seed(&store, 4);
        let embedder = RejectingEmbedder::new("1");
        let report =
            backfill_embeddings(&store, &embedder, &LinkingConfig::default(), 2, false, Utc::now())
                .expect("backfill");
        assert_eq!(report.embedded, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(store.count_missing_embeddings().expect("count"), 1);
    }
}
