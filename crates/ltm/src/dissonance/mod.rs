//! Dissonance queue
//!
//! Contradictions between two memories that the agent cannot settle on its
//! own are queued here for a human. Queuing a pair also records a
//! CONTRADICTS link between the memories. Items are closed as RESOLVED with
//! an explanation or DISMISSED as a false alarm; closed rows stay for
//! history.

pub mod types;

pub use types::{Dissonance, DissonanceDetail, DissonanceStatus};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{LtmError, Result};
use crate::memory::types::{LinkType, MemoryLink};
use crate::storage::SqliteStore;

/// Dissonance queue operations over the shared store
pub struct DissonanceQueue<'a> {
    store: &'a SqliteStore,
}

impl<'a> DissonanceQueue<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    /// Queue a confirmed contradiction between two memories.
    ///
    /// Fails with `InvalidInput` for an empty description, a memory paired
    /// with itself, or a pair that is already queued in either order.
    pub fn add(
        &self,
        agent_id: &str,
        memory_a: &str,
        memory_b: &str,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<Dissonance> {
        let description = description.trim();
        if description.is_empty() {
            return Err(LtmError::InvalidInput("dissonance description is empty".to_string()));
        }
        let a = self.store.resolve_memory_id(memory_a)?;
        let b = self.store.resolve_memory_id(memory_b)?;
        if a == b {
            return Err(LtmError::InvalidInput(
                "a memory cannot contradict itself".to_string(),
            ));
        }

        self.store.atomically(|store| {
            if store.dissonance_exists(a, b)? {
                return Err(LtmError::InvalidInput(format!(
                    "contradiction between {a} and {b} is already queued"
                )));
            }
            let dissonance = Dissonance::new(agent_id, a, b, description, now);
            store.insert_dissonance(&dissonance)?;
            store.put_link(&MemoryLink {
                source_id: a,
                target_id: b,
                link_type: LinkType::Contradicts,
                similarity: None,
                created_at: dissonance.detected_at,
            })?;
            tracing::info!("Dissonance {} queued: {}", dissonance.short_id(), description);
            Ok(dissonance)
        })
    }

    /// OPEN dissonances for an agent, or every status with `include_closed`
    pub fn list(&self, agent_id: &str, include_closed: bool) -> Result<Vec<Dissonance>> {
        let status = (!include_closed).then_some(DissonanceStatus::Open);
        self.store.list_dissonances(agent_id, status)
    }

    pub fn count_open(&self, agent_id: &str) -> Result<usize> {
        Ok(self.list(agent_id, false)?.len())
    }

    /// A dissonance together with both memories as they are now
    pub fn show(&self, id_or_prefix: &str) -> Result<DissonanceDetail> {
        let dissonance = self.require(self.store.resolve_dissonance_id(id_or_prefix)?)?;
        Ok(DissonanceDetail {
            memory_a: self.store.get_memory(dissonance.memory_a)?,
            memory_b: self.store.get_memory(dissonance.memory_b)?,
            dissonance,
        })
    }

    /// Close an OPEN dissonance with a written resolution
    pub fn resolve(&self, id_or_prefix: &str, resolution: &str, now: DateTime<Utc>) -> Result<Dissonance> {
        let resolution = resolution.trim();
        if resolution.is_empty() {
            return Err(LtmError::InvalidInput("resolution is empty".to_string()));
        }
        self.close(id_or_prefix, DissonanceStatus::Resolved, Some(resolution), now)
    }

    /// Close an OPEN dissonance as not a real contradiction
    pub fn dismiss(&self, id_or_prefix: &str, now: DateTime<Utc>) -> Result<Dissonance> {
        self.close(id_or_prefix, DissonanceStatus::Dismissed, None, now)
    }

    fn close(
        &self,
        id_or_prefix: &str,
        status: DissonanceStatus,
        resolution: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Dissonance> {
        let id = self.store.resolve_dissonance_id(id_or_prefix)?;
        self.store.atomically(|store| {
            let current = self.require(id)?;
            if !current.is_open() {
                return Err(LtmError::InvalidInput(format!(
                    "dissonance {} is already {}",
                    current.short_id(),
                    current.status
                )));
            }
            store.close_dissonance(id, status, resolution, now)?;
            tracing::info!("Dissonance {} {}", current.short_id(), status);
            self.require(id)
        })
    }

    fn require(&self, id: Uuid) -> Result<Dissonance> {
        self.store
            .get_dissonance(id)?
            .ok_or_else(|| LtmError::NotFound(format!("dissonance {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{Impact, Memory, MemoryKind};

    fn store_with_pair() -> (SqliteStore, Memory, Memory) {
        let store = SqliteStore::open_in_memory().expect("open");
        let a = Memory::new("anima", MemoryKind::Architectural, Impact::High, "Use tabs");
        let b = Memory::new("anima", MemoryKind::Architectural, Impact::High, "Use spaces");
        store.insert_memory(&a).expect("insert");
        store.insert_memory(&b).expect("insert");
        (store, a, b)
    }

    #[test]
    fn test_add_records_contradicts_link() {
        let (store, a, b) = store_with_pair();
        let queue = DissonanceQueue::new(&store);
        let d = queue
            .add("anima", &a.short_id(), &b.short_id(), "indentation style", Utc::now())
            .expect("add");

        assert_eq!(d.status, DissonanceStatus::Open);
        assert_eq!((d.memory_a, d.memory_b), (a.id, b.id));
        let link = store.link_between(a.id, b.id).expect("query").expect("link");
        assert_eq!(link.link_type, LinkType::Contradicts);
        assert_eq!(queue.count_open("anima").expect("count"), 1);
    }

    #[test]
    fn test_duplicate_pair_rejected_in_either_order() {
        let (store, a, b) = store_with_pair();
        let queue = DissonanceQueue::new(&store);
        let (a, b) = (a.id.to_string(), b.id.to_string());
        queue.add("anima", &a, &b, "style", Utc::now()).expect("add");
        assert!(matches!(
            queue.add("anima", &b, &a, "style again", Utc::now()),
            Err(LtmError::InvalidInput(_))
        ));
        assert_eq!(queue.list("anima", true).expect("list").len(), 1);
    }

    #[test]
    fn test_self_pair_and_empty_description_rejected() {
        let (store, a, b) = store_with_pair();
        let queue = DissonanceQueue::new(&store);
        let (a, b) = (a.id.to_string(), b.id.to_string());
        assert!(queue.add("anima", &a, &a, "same", Utc::now()).is_err());
        assert!(queue.add("anima", &a, &b, "   ", Utc::now()).is_err());
        assert!(matches!(
            queue.add("anima", &a, "ffffffff", "missing", Utc::now()),
            Err(LtmError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_closes_once() {
        let (store, a, b) = store_with_pair();
        let queue = DissonanceQueue::new(&store);
        let d = queue
            .add("anima", &a.id.to_string(), &b.id.to_string(), "style", Utc::now())
            .expect("add");

        assert!(queue.resolve(&d.short_id(), "  ", Utc::now()).is_err());
        let resolved = queue
            .resolve(&d.short_id(), "Tabs in Makefiles, spaces elsewhere", Utc::now())
            .expect("resolve");
        assert_eq!(resolved.status, DissonanceStatus::Resolved);
        assert_eq!(resolved.resolution.as_deref(), Some("Tabs in Makefiles, spaces elsewhere"));
        assert!(resolved.resolved_at.is_some());

        assert!(matches!(
            queue.dismiss(&d.short_id(), Utc::now()),
            Err(LtmError::InvalidInput(_))
        ));
        assert!(queue.list("anima", false).expect("list").is_empty());
        assert_eq!(queue.list("anima", true).expect("list").len(), 1);
    }

    #[test]
    fn test_show_survives_forgotten_memory() {
        let (store, a, b) = store_with_pair();
        let queue = DissonanceQueue::new(&store);
        let d = queue
            .add("anima", &a.id.to_string(), &b.id.to_string(), "style", Utc::now())
            .expect("add");
        store.forget(&b.id.to_string()).expect("forget");

        let detail = queue.show(&d.id.to_string()).expect("show");
        assert_eq!(detail.memory_a.map(|m| m.id), Some(a.id));
        assert!(detail.memory_b.is_none());
    }
}
