//! Curiosity queue
//!
//! A prioritized backlog of open questions. Asking the same question again
//! raises its recurrence instead of adding a row, and the item with the
//! highest score is handed out first for research.

pub mod types;

pub use types::{CuriosityFilter, CuriosityItem, CuriosityStatus};

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::config::CuriosityConfig;
use crate::error::{LtmError, Result};
use crate::memory::types::Region;
use crate::storage::SqliteStore;

/// Settings key holding the time of the last research pop
pub const LAST_RESEARCH_KEY: &str = "last_research";

/// Curiosity queue operations over the shared store
pub struct CuriosityQueue<'a> {
    store: &'a SqliteStore,
    config: CuriosityConfig,
}

impl<'a> CuriosityQueue<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self {
            store,
            config: CuriosityConfig::default(),
        }
    }

    pub fn with_config(store: &'a SqliteStore, config: CuriosityConfig) -> Self {
        Self { store, config }
    }

    /// Record a question.
    ///
    /// If an OPEN item in the same scope matches after normalization, its
    /// recurrence is bumped and it is returned; otherwise a new OPEN item is
    /// inserted with a recurrence of 1.
    pub fn add(
        &self,
        agent_id: &str,
        question: &str,
        context: Option<&str>,
        region: Region,
        project_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CuriosityItem> {
        let question = question.trim();
        if question.is_empty() {
            return Err(LtmError::InvalidInput("question is empty".to_string()));
        }
        if region == Region::Project && project_id.is_none() {
            return Err(LtmError::InvalidRegion);
        }
        let project_id = match region {
            Region::Agent => None,
            Region::Project => project_id,
        };

        let normalized = normalize_question(question);
        self.store.atomically(|store| {
            let open = store.open_curiosity_in_scope(agent_id, region, project_id)?;
            let existing = open.into_iter().find(|item| {
                questions_match(
                    &normalize_question(&item.question),
                    &normalized,
                    self.config.match_threshold,
                )
            });

            if let Some(item) = existing {
                store.bump_curiosity(item.id, context, now)?;
                tracing::debug!(
                    "Curiosity {} seen again (recurrence {})",
                    item.short_id(),
                    item.recurrence_count + 1
                );
                return store
                    .get_curiosity(item.id)?
                    .ok_or_else(|| LtmError::NotFound(format!("curiosity item {}", item.id)));
            }

            let item = CuriosityItem::new(
                agent_id,
                region,
                project_id.map(str::to_string),
                question,
                context.map(str::to_string),
                now,
            );
            store.insert_curiosity(&item)?;
            tracing::debug!("Curiosity {} queued: {}", item.short_id(), item.question);
            Ok(item)
        })
    }

    /// The OPEN item with the highest priority, ties going to the item seen
    /// first. The item stays OPEN; the pop time is recorded.
    pub fn pop(
        &self,
        agent_id: &str,
        project_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<CuriosityItem>> {
        let top = self
            .store
            .list_curiosity(&CuriosityFilter::open(agent_id, project_id))?
            .into_iter()
            .max_by(|a, b| self.compare(a, b, now));
        self.store
            .set_setting(LAST_RESEARCH_KEY, &now.to_rfc3339())?;
        Ok(top)
    }

    /// Items matching `filter`, highest priority first
    pub fn list(&self, filter: &CuriosityFilter, now: DateTime<Utc>) -> Result<Vec<CuriosityItem>> {
        let mut items = self.store.list_curiosity(filter)?;
        items.sort_by(|a, b| self.compare(b, a, now));
        Ok(items)
    }

    pub fn count_open(&self, agent_id: &str, project_id: Option<&str>) -> Result<usize> {
        Ok(self
            .store
            .list_curiosity(&CuriosityFilter::open(agent_id, project_id))?
            .len())
    }

    /// Mark an item researched; the row is kept for history
    pub fn complete(&self, id_or_prefix: &str) -> Result<CuriosityItem> {
        self.set_status(id_or_prefix, CuriosityStatus::Researched)
    }

    /// Mark an item dismissed; the row is kept for history
    pub fn dismiss(&self, id_or_prefix: &str) -> Result<CuriosityItem> {
        self.set_status(id_or_prefix, CuriosityStatus::Dismissed)
    }

    /// Add a manual adjustment to an item's priority
    pub fn boost(&self, id_or_prefix: &str, amount: i64) -> Result<CuriosityItem> {
        let id = self.store.resolve_curiosity_id(id_or_prefix)?;
        self.store.add_priority_boost(id, amount)?;
        self.require(id)
    }

    /// Priority score: recurrence weight, manual boost and recency bonus
    pub fn priority(&self, item: &CuriosityItem, now: DateTime<Utc>) -> i64 {
        priority_score(item, &self.config, now)
    }

    pub fn last_research(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .store
            .get_setting(LAST_RESEARCH_KEY)?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    fn set_status(&self, id_or_prefix: &str, status: CuriosityStatus) -> Result<CuriosityItem> {
        let id = self.store.resolve_curiosity_id(id_or_prefix)?;
        self.store.set_curiosity_status(id, status)?;
        self.require(id)
    }

    fn require(&self, id: uuid::Uuid) -> Result<CuriosityItem> {
        self.store
            .get_curiosity(id)?
            .ok_or_else(|| LtmError::NotFound(format!("curiosity item {id}")))
    }

    /// Ascending order: lower priority first, and on a tie the later
    /// first_seen first, so `max_by` picks the oldest of equal scores.
    fn compare(&self, a: &CuriosityItem, b: &CuriosityItem, now: DateTime<Utc>) -> Ordering {
        self.priority(a, now)
            .cmp(&self.priority(b, now))
            .then_with(|| b.first_seen.cmp(&a.first_seen))
            .then_with(|| b.id.cmp(&a.id))
    }
}

/// `recurrence * weight + boost + bonus`, where the bonus applies to items
/// seen within the recency window
pub fn priority_score(item: &CuriosityItem, config: &CuriosityConfig, now: DateTime<Utc>) -> i64 {
    let recency_bonus = if now - item.last_seen <= Duration::days(config.recency_window_days) {
        config.recency_bonus
    } else {
        0
    };
    item.recurrence_count as i64 * config.recurrence_weight + item.priority_boost + recency_bonus
}

/// Lowercase, collapse whitespace and drop trailing punctuation
pub fn normalize_question(question: &str) -> String {
    let folded = question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    folded
        .trim_end_matches(|c: char| matches!(c, '?' | '.' | '!'))
        .trim_end()
        .to_string()
}

/// Two normalized questions match when equal, or when their word sets
/// overlap (Jaccard) at least `threshold`
pub fn questions_match(a: &str, b: &str, threshold: f64) -> bool {
    if a == b {
        return true;
    }
    let words_a: HashSet<&str> = a.split(' ').filter(|w| !w.is_empty()).collect();
    let words_b: HashSet<&str> = b.split(' ').filter(|w| !w.is_empty()).collect();
    if words_a.is_empty() || words_b.is_empty() {
        return false;
    }
    let shared = words_a.intersection(&words_b).count() as f64;
    let total = words_a.union(&words_b).count() as f64;
    shared / total >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("open")
    }

    mod normalization {
        use super::*;

        #[test]
        fn test_folds_case_whitespace_and_punctuation() {
            assert_eq!(normalize_question("  Deploy   flakiness?? "), "deploy flakiness");
            assert_eq!(normalize_question("Why is CI slow!"), "why is ci slow");
        }

        #[test]
        fn test_exact_and_fuzzy_match() {
            assert!(questions_match("deploy flakiness", "deploy flakiness", 0.85));
            assert!(questions_match(
                "why does the deploy job flake on monday mornings",
                "why does the deploy job flake on monday morning mornings",
                0.85
            ));
            assert!(!questions_match("deploy flakiness", "cache eviction", 0.85));
        }
    }

    mod scoring {
        use super::*;

        #[test]
        fn test_priority_formula() {
            let config = CuriosityConfig::default();
            let now = Utc::now();
            let mut item = CuriosityItem::new("anima", Region::Agent, None, "q", None, now);
            item.recurrence_count = 3;
            item.priority_boost = 2;
            assert_eq!(priority_score(&item, &config, now), 30 + 2 + 5);

            item.last_seen = now - Duration::days(8);
            assert_eq!(priority_score(&item, &config, now), 32);
        }

        #[test]
        fn test_recency_bonus_is_monotonic() {
            let config = CuriosityConfig::default();
            let now = Utc::now();
            let mut item = CuriosityItem::new("anima", Region::Agent, None, "q", None, now);
            let mut previous = i64::MAX;
            for days in 0..20 {
                item.last_seen = now - Duration::days(days);
                let score = priority_score(&item, &config, now);
                assert!(score <= previous);
                previous = score;
            }
        }
    }

    mod queue {
        use super::*;

        #[test]
        fn test_repeat_question_bumps_recurrence() {
            let store = queue_store();
            let queue = CuriosityQueue::new(&store);
            let now = Utc::now();

            let first = queue
                .add("anima", "Deploy flakiness", None, Region::Agent, None, now)
                .expect("add");
            let second = queue
                .add("anima", "deploy   flakiness?", Some("CI run 42"), Region::Agent, None, now)
                .expect("add");

            assert_eq!(first.id, second.id);
            assert_eq!(second.recurrence_count, 2);
            assert_eq!(second.context.as_deref(), Some("CI run 42"));
            assert_eq!(queue.count_open("anima", None).expect("count"), 1);
        }

        #[test]
        fn test_project_region_requires_project() {
            let store = queue_store();
            let queue = CuriosityQueue::new(&store);
            let result = queue.add("anima", "q", None, Region::Project, None, Utc::now());
            assert!(matches!(result, Err(LtmError::InvalidRegion)));
        }

        #[test]
        fn test_pop_prefers_priority_then_age() {
            let store = queue_store();
            let queue = CuriosityQueue::new(&store);
            let now = Utc::now();

            let older = queue
                .add("anima", "first question", None, Region::Agent, None, now - Duration::hours(2))
                .expect("add");
            let _newer = queue
                .add("anima", "second question", None, Region::Agent, None, now - Duration::hours(1))
                .expect("add");

            let top = queue.pop("anima", None, now).expect("pop").expect("item");
            assert_eq!(top.id, older.id, "ties go to the earliest first_seen");
            assert_eq!(top.status, CuriosityStatus::Open);
            assert!(queue.last_research().expect("last").is_some());

            let boosted = queue
                .add("anima", "third question", None, Region::Agent, None, now)
                .expect("add");
            queue.boost(&boosted.short_id(), 1).expect("boost");
            let top = queue.pop("anima", None, now).expect("pop").expect("item");
            assert_eq!(top.id, boosted.id);
        }

        #[test]
        fn test_complete_and_dismiss_keep_rows() {
            let store = queue_store();
            let queue = CuriosityQueue::new(&store);
            let now = Utc::now();
            let a = queue
                .add("anima", "alpha", None, Region::Agent, None, now)
                .expect("add");
            let b = queue
                .add("anima", "beta", None, Region::Agent, None, now)
                .expect("add");

            assert_eq!(
                queue.complete(&a.id.to_string()).expect("complete").status,
                CuriosityStatus::Researched
            );
            assert_eq!(
                queue.dismiss(&b.id.to_string()).expect("dismiss").status,
                CuriosityStatus::Dismissed
            );
            assert!(queue.pop("anima", None, now).expect("pop").is_none());

            let all = queue
                .list(&CuriosityFilter::open("anima", None).all(), now)
                .expect("list");
            assert_eq!(all.len(), 2);
        }

        #[test]
        fn test_completed_question_can_be_asked_again() {
            let store = queue_store();
            let queue = CuriosityQueue::new(&store);
            let now = Utc::now();
            let a = queue
                .add("anima", "alpha", None, Region::Agent, None, now)
                .expect("add");
            queue.complete(&a.id.to_string()).expect("complete");
            let again = queue
                .add("anima", "alpha", None, Region::Agent, None, now)
                .expect("add");
            assert_ne!(again.id, a.id);
            assert_eq!(again.recurrence_count, 1);
        }
    }
}
