use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::memory::types::{LinkType, Memory};
use crate::storage::SqliteStore;

/// A memory reached by following links
#[derive(Debug, Clone, Serialize)]
pub struct LinkedMemory {
    pub memory: Memory,
    /// Hops from the starting memory, starting at 1
    pub depth: usize,
    /// Type of the link that first reached this memory
    pub link_type: LinkType,
    pub similarity: Option<f32>,
}

/// Breadth-first walk over links in both directions.
///
/// Each memory appears once, at the depth it was first reached. With
/// `link_types` set, only links of those types are followed.
pub fn linked_memories(
    store: &SqliteStore,
    start: Uuid,
    max_depth: usize,
    link_types: Option<&[LinkType]>,
) -> Result<Vec<LinkedMemory>> {
    store.require_memory(start)?;

    let mut visited = HashSet::from([start]);
    let mut queue = VecDeque::from([(start, 0usize)]);
    let mut found = Vec::new();

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let mut links = store.links_for(current)?;
        if let Some(types) = link_types {
            links.retain(|l| types.contains(&l.link_type));
        }
        // Strongest first so ties at the same depth are deterministic
        links.sort_by(|a, b| {
            b.similarity
                .unwrap_or(0.0)
                .total_cmp(&a.similarity.unwrap_or(0.0))
        });

        for link in links {
            let Some(next) = link.other(current) else {
                continue;
            };
            if !visited.insert(next) {
                continue;
            }
            let Some(memory) = store.get_memory(next)? else {
                continue;
            };
            found.push(LinkedMemory {
                memory,
                depth: depth + 1,
                link_type: link.link_type,
                similarity: link.similarity,
            });
            queue.push_back((next, depth + 1));
        }
    }

    Ok(found)
}

/// Every version of the memory `id` belongs to, oldest first
pub fn supersession_chain(store: &SqliteStore, id: Uuid) -> Result<Vec<Memory>> {
    let start = store.require_memory(id)?;
    let mut seen = HashSet::from([start.id]);

    let mut older = Vec::new();
    let mut cursor = start.previous_memory_id;
    while let Some(prev) = cursor {
        if !seen.insert(prev) {
            break;
        }
        match store.get_memory(prev)? {
            Some(memory) => {
                cursor = memory.previous_memory_id;
                older.push(memory);
            }
            None => break,
        }
    }
    older.reverse();

    let mut cursor = start.superseded_by;
    older.push(start);
    while let Some(next) = cursor {
        if !seen.insert(next) {
            break;
        }
        match store.get_memory(next)? {
            Some(memory) => {
                cursor = memory.superseded_by;
                older.push(memory);
            }
            None => break,
        }
    }

    Ok(older)
}
