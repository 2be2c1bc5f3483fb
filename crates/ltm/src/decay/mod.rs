//! Decay and compaction
//!
//! Run once per end-of-session. Memories idle past their impact's horizon
//! are compacted once, then lose confidence on later passes down to a
//! floor. Tiers are recomputed for every scanned memory. CRITICAL memories
//! are never touched.

pub mod compaction;
pub mod policy;

pub use policy::{DecayAction, DecayPolicy, DecayRule};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::DecayConfig;
use crate::error::Result;
use crate::injection::format::line_token_count;
use crate::memory::tier::assign_tier;
use crate::memory::types::{Impact, Memory};
use crate::storage::{MemoryFilter, SqliteStore};

/// Result of a decay pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct DecaySummary {
    /// Memories examined
    pub scanned: usize,
    /// Memories compacted for the first time
    pub compacted: usize,
    /// Already-compacted memories that lost confidence
    pub faded: usize,
    /// Memories whose tier changed
    pub retiered: usize,
    /// CRITICAL memories left alone
    pub critical_skipped: usize,
    /// Memories that failed to update (logged, not fatal)
    pub failed: usize,
    /// IDs of compacted memories
    pub compacted_ids: Vec<Uuid>,
}

/// Applies the decay policy to stored memories
pub struct DecayEngine<'a> {
    store: &'a SqliteStore,
    policy: DecayPolicy,
    config: DecayConfig,
}

impl<'a> DecayEngine<'a> {
    /// Create a new DecayEngine with default configuration
    pub fn new(store: &'a SqliteStore) -> Self {
        Self::with_config(store, DecayConfig::default())
    }

    /// Create a new DecayEngine with custom configuration
    pub fn with_config(store: &'a SqliteStore, config: DecayConfig) -> Self {
        Self {
            store,
            policy: DecayPolicy::from_config(&config),
            config,
        }
    }

    pub fn policy(&self) -> &DecayPolicy {
        &self.policy
    }

    /// Decay current memories of `agent_id`.
    ///
    /// With a project, the scan covers the agent's AGENT-region memories and
    /// that project's memories; without one it covers all of the agent's
    /// memories. A failure on one memory is logged and counted, and the
    /// rest of the pass still commits.
    pub fn run(
        &self,
        agent_id: &str,
        project_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DecaySummary> {
        let mut filter = MemoryFilter::new().for_agent(agent_id);
        if let Some(project_id) = project_id {
            filter = filter.visible_in(Some(project_id));
        }

        self.store.atomically(|store| {
            let mut summary = DecaySummary::default();
            for memory in store.query(&filter)? {
                summary.scanned += 1;
                if memory.impact == Impact::Critical {
                    summary.critical_skipped += 1;
                    continue;
                }

                let id = memory.id;
                match store.atomically(|store| self.apply(store, memory, now)) {
                    Ok(outcome) => {
                        if outcome.compacted {
                            summary.compacted += 1;
                            summary.compacted_ids.push(id);
                        }
                        if outcome.faded {
                            summary.faded += 1;
                        }
                        if outcome.retiered {
                            summary.retiered += 1;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Decay failed for memory {}: {}", id, e);
                        summary.failed += 1;
                    }
                }
            }

            tracing::info!(
                "Decay pass: scanned={} compacted={} faded={} retiered={} failed={}",
                summary.scanned,
                summary.compacted,
                summary.faded,
                summary.retiered,
                summary.failed
            );
            Ok(summary)
        })
    }

    fn apply(&self, store: &SqliteStore, mut memory: Memory, now: DateTime<Utc>) -> Result<Outcome> {
        let mut outcome = Outcome::default();

        match self.policy.plan(&memory, now) {
            DecayAction::Keep => {}
            DecayAction::Compact { level, confidence } => {
                memory.content = compaction::compact(&memory.original_content, level, &self.config);
                memory.compaction = level;
                memory.confidence = confidence;
                outcome.compacted = true;
                tracing::debug!("Compacted memory {} to {}", memory.short_id(), level);
            }
            DecayAction::Fade { confidence } => {
                memory.confidence = confidence;
                outcome.faded = true;
            }
        }

        let tier = assign_tier(
            memory.impact,
            memory.kind,
            memory.age_days(now),
            memory.last_accessed_days_ago(now),
        );
        if tier != memory.tier {
            tracing::debug!("Memory {} moved {} -> {}", memory.short_id(), memory.tier, tier);
            memory.tier = tier;
            outcome.retiered = true;
        }

        if outcome.compacted || outcome.faded || outcome.retiered {
            memory.token_count = line_token_count(&memory);
            store.update_decayed(&memory)?;
        }
        Ok(outcome)
    }
}

#[derive(Debug, Default)]
struct Outcome {
    compacted: bool,
    faded: bool,
    retiered: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{CompactionLevel, MemoryKind, Tier};
    use chrono::Duration;

    fn insert(store: &SqliteStore, impact: Impact, content: &str, created: DateTime<Utc>) -> Memory {
        let memory = Memory::new_at("anima", MemoryKind::Learnings, impact, content, created);
        store.insert_memory(&memory).expect("insert");
        memory
    }

    mod compactor_integration {
        use super::*;

        #[test]
        fn test_low_memory_compacts_after_one_day() {
            let store = SqliteStore::open_in_memory().expect("open");
            let now = Utc::now();
            let memory = insert(
                &store,
                Impact::Low,
                "minor formatting nit. Trailing commas in the config loader.",
                now - Duration::days(2),
            );

            let summary = DecayEngine::new(&store).run("anima", None, now).expect("run");
            assert_eq!(summary.compacted, 1);
            assert_eq!(summary.compacted_ids, vec![memory.id]);

            let after = store.require_memory(memory.id).expect("get");
            assert_eq!(after.content, "minor formatting nit.");
            assert_eq!(after.original_content, memory.original_content);
            assert_eq!(after.compaction, CompactionLevel::OneLine);
            assert_eq!(after.tier, Tier::Deep);
            assert!((after.confidence - 0.7).abs() < 1e-9);
        }

        #[test]
        fn test_repeated_passes_do_not_recompact() {
            let store = SqliteStore::open_in_memory().expect("open");
            let now = Utc::now();
            let memory = insert(&store, Impact::Medium, "One. Two. Three. Four.", now - Duration::days(10));
            let engine = DecayEngine::new(&store);

            let first = engine.run("anima", None, now).expect("run");
            let second = engine.run("anima", None, now + Duration::days(1)).expect("run");
            assert_eq!(first.compacted, 1);
            assert_eq!(second.compacted, 0);
            assert_eq!(second.faded, 1);

            let after = store.require_memory(memory.id).expect("get");
            assert_eq!(after.content, "One. Two. Three.");
            assert!((after.confidence - 0.6).abs() < 1e-9);
        }

        #[test]
        fn test_critical_is_untouched() {
            let store = SqliteStore::open_in_memory().expect("open");
            let now = Utc::now();
            let memory = insert(&store, Impact::Critical, "Never force-push main.", now - Duration::days(400));

            let engine = DecayEngine::new(&store);
            for day in 0..5 {
                let summary = engine.run("anima", None, now + Duration::days(day)).expect("run");
                assert_eq!(summary.critical_skipped, 1);
            }

            let after = store.require_memory(memory.id).expect("get");
            assert_eq!(after.content, memory.content);
            assert_eq!(after.confidence, 1.0);
            assert_eq!(after.tier, Tier::Core);
            assert_eq!(after.compaction, CompactionLevel::Full);
        }

        #[test]
        fn test_high_memory_demotes_from_active() {
            let store = SqliteStore::open_in_memory().expect("open");
            let now = Utc::now();
            let memory = insert(&store, Impact::High, "Use rusqlite 0.32 with bundled SQLite.", now - Duration::days(10));
            assert_eq!(memory.tier, Tier::Active);

            let summary = DecayEngine::new(&store).run("anima", None, now).expect("run");
            assert_eq!(summary.compacted, 0);
            assert_eq!(summary.retiered, 1);
            assert_eq!(store.require_memory(memory.id).expect("get").tier, Tier::Contextual);
        }

        #[test]
        fn test_project_scope_leaves_other_projects() {
            let store = SqliteStore::open_in_memory().expect("open");
            let now = Utc::now();
            let other = Memory::new_at("anima", MemoryKind::Learnings, Impact::Low, "elsewhere", now - Duration::days(3))
                .in_project("p2");
            store.insert_memory(&other).expect("insert");

            let summary = DecayEngine::new(&store).run("anima", Some("p1"), now).expect("run");
            assert_eq!(summary.scanned, 0);
            assert_eq!(
                store.require_memory(other.id).expect("get").compaction,
                CompactionLevel::Full
            );
        }
    }
}
