//! Context assembly
//!
//! Builds the token-budgeted block injected at session start. CORE memories
//! are always included. ACTIVE then CONTEXTUAL memories follow in priority
//! order until the first one that does not fit; it and everything after it
//! go to a deferred list that a follow-up call can drain. DEEP memories are
//! only reachable through recall.
//!
//! An empty block says `(no memories)` when nothing was eligible and
//! `(all memories deferred)` when everything eligible was deferred. Without
//! CORE content the block always fits the budget; a budget too small for the
//! frame and marker is rejected.

pub mod budget;
pub mod format;

pub use budget::Budget;

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{LtmError, Result};
use crate::memory::types::{Agent, Memory, Project, Region, Tier};
use crate::signing::{self, Signer, Trust};
use crate::storage::{MemoryFilter, SqliteStore};
use format::{
    ALL_DEFERRED, LineFlags, NO_MEMORIES, frame_cost, header, line_cost, render_block,
    render_block_or, render_line,
};

/// Who is loading context, where, and with how much room
#[derive(Debug, Clone)]
pub struct ContextRequest {
    pub agent: Agent,
    pub project: Option<Project>,
    /// Set when `agent` is a sub-agent bridged to this primary agent
    pub primary: Option<Agent>,
    pub budget: Budget,
}

impl ContextRequest {
    pub fn new(agent: Agent, budget: Budget) -> Self {
        Self {
            agent,
            project: None,
            primary: None,
            budget,
        }
    }

    pub fn in_project(mut self, project: Option<Project>) -> Self {
        self.project = project;
        self
    }

    /// Sub-agent mode: merge `primary`'s CORE memories as inherited identity
    pub fn as_subagent_of(mut self, primary: Agent) -> Self {
        if primary.id != self.agent.id {
            self.primary = Some(primary);
        }
        self
    }

    fn project_id(&self) -> Option<&str> {
        self.project.as_ref().map(|p| p.id.as_str())
    }

    fn header(&self) -> String {
        header(&self.agent.name, self.project.as_ref().map(|p| p.name.as_str()))
    }
}

/// Counters describing one assembled block
#[derive(Debug, Clone, Default, Serialize)]
pub struct InjectionStats {
    pub core: usize,
    pub active: usize,
    pub contextual: usize,
    /// CORE memories merged in from the primary agent
    pub inherited: usize,
    pub untrusted: usize,
    pub agent_memories: usize,
    pub project_memories: usize,
    pub deferred: usize,
    pub tokens_used: usize,
    pub budget_tokens: usize,
}

/// Output of context assembly
#[derive(Debug, Clone, Serialize)]
pub struct AssembledContext {
    /// The `[LTM:...]` block
    pub text: String,
    /// Ids left out for lack of budget, in priority order
    pub deferred_ids: Vec<Uuid>,
    /// Ids included, in block order
    pub included_ids: Vec<Uuid>,
    pub stats: InjectionStats,
}

struct Entry {
    memory: Memory,
    flags: LineFlags,
    line: String,
}

/// Assembles context blocks from the store
pub struct ContextAssembler<'a> {
    store: &'a SqliteStore,
    signer: Option<&'a dyn Signer>,
}

impl<'a> ContextAssembler<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self {
            store,
            signer: None,
        }
    }

    pub fn with_signer(mut self, signer: Option<&'a dyn Signer>) -> Self {
        self.signer = signer;
        self
    }

    /// Build the context block and record the deferred list for
    /// (agent, project), replacing any earlier one.
    pub fn assemble(&self, request: &ContextRequest) -> Result<AssembledContext> {
        let project_id = request.project_id();
        let budget_tokens = request.budget.tokens();

        let own = self.store.query(
            &MemoryFilter::new()
                .for_agent(&request.agent.id)
                .visible_in(project_id)
                .with_tiers(vec![Tier::Core, Tier::Active, Tier::Contextual]),
        )?;

        let mut seen = HashSet::new();
        let mut core = Vec::new();
        let mut active = Vec::new();
        let mut contextual = Vec::new();
        for memory in own {
            seen.insert(memory.id);
            match memory.tier {
                Tier::Core => core.push(self.entry(memory, false)),
                Tier::Active => active.push(memory),
                Tier::Contextual => contextual.push(memory),
                Tier::Deep => {}
            }
        }

        if let Some(ref primary) = request.primary {
            let inherited = self.store.query(
                &MemoryFilter::new()
                    .for_agent(&primary.id)
                    .visible_in(project_id)
                    .with_tiers(vec![Tier::Core]),
            )?;
            for memory in inherited {
                if seen.insert(memory.id) {
                    core.push(self.entry(memory, true));
                }
            }
        }

        active.sort_by(selection_order);
        contextual.sort_by(selection_order);

        let head = request.header();
        let mut used = frame_cost(&head);
        let mut stats = InjectionStats {
            budget_tokens,
            ..InjectionStats::default()
        };

        let mut selected = Vec::new();
        for entry in core {
            used += line_cost(&entry.line);
            stats.core += 1;
            if entry.flags.inherited {
                stats.inherited += 1;
            }
            selected.push(entry);
        }

        let mut deferred_ids = Vec::new();
        for memory in active.into_iter().chain(contextual) {
            if !deferred_ids.is_empty() {
                deferred_ids.push(memory.id);
                continue;
            }
            let entry = self.entry(memory, false);
            let cost = line_cost(&entry.line);
            if used + cost > budget_tokens {
                deferred_ids.push(entry.memory.id);
                continue;
            }
            used += cost;
            match entry.memory.tier {
                Tier::Active => stats.active += 1,
                _ => stats.contextual += 1,
            }
            selected.push(entry);
        }

        selected.sort_by(|a, b| block_order(&a.memory, &b.memory));
        for entry in &selected {
            if entry.flags.untrusted {
                stats.untrusted += 1;
            }
            match entry.memory.region {
                Region::Agent => stats.agent_memories += 1,
                Region::Project => stats.project_memories += 1,
            }
        }

        // A block with no lines still carries a marker, and the marker is budgeted
        let marker = if deferred_ids.is_empty() { NO_MEMORIES } else { ALL_DEFERRED };
        if selected.is_empty() {
            used += line_cost(marker);
            if used > budget_tokens {
                return Err(LtmError::InvalidInput(format!(
                    "budget of {budget_tokens} tokens cannot hold a context block ({used} needed)"
                )));
            }
        }

        let lines: Vec<String> = selected.iter().map(|e| e.line.clone()).collect();
        let text = render_block_or(&head, &lines, marker);
        stats.tokens_used = format::estimate_tokens(&text);
        stats.deferred = deferred_ids.len();

        self.store
            .set_deferred(&request.agent.id, project_id, &deferred_ids)?;

        tracing::info!(
            "Assembled context: core={} active={} contextual={} deferred={} tokens={}/{}",
            stats.core,
            stats.active,
            stats.contextual,
            stats.deferred,
            stats.tokens_used,
            budget_tokens
        );

        Ok(AssembledContext {
            text,
            deferred_ids,
            included_ids: selected.iter().map(|e| e.memory.id).collect(),
            stats,
        })
    }

    /// Render and clear the deferred list for (agent, project).
    ///
    /// Returns an empty string when nothing is deferred. Memories forgotten
    /// or superseded since deferral are skipped.
    pub fn drain_deferred(&self, request: &ContextRequest) -> Result<String> {
        let ids = self
            .store
            .take_deferred(&request.agent.id, request.project_id())?;

        let mut entries = Vec::new();
        for id in ids {
            match self.store.get_memory(id)? {
                Some(memory) if memory.is_current() => entries.push(self.entry(memory, false)),
                _ => tracing::debug!("Deferred memory {} no longer current, skipping", id),
            }
        }
        if entries.is_empty() {
            return Ok(String::new());
        }

        entries.sort_by(|a, b| block_order(&a.memory, &b.memory));
        let lines: Vec<String> = entries.into_iter().map(|e| e.line).collect();
        Ok(render_block(&request.header(), &lines))
    }

    fn entry(&self, memory: Memory, inherited: bool) -> Entry {
        let mut flags = LineFlags::for_memory(&memory);
        flags.inherited = inherited;
        if signing::check(self.signer, &memory.original_content, memory.signature.as_deref())
            == Trust::Untrusted
        {
            tracing::warn!("{}", LtmError::SignatureInvalid(memory.id.to_string()));
            flags.untrusted = true;
        }
        let line = render_line(&memory, flags);
        Entry {
            memory,
            flags,
            line,
        }
    }
}

/// Selection priority: impact desc, created_at desc, id
fn selection_order(a: &Memory, b: &Memory) -> Ordering {
    b.impact
        .cmp(&a.impact)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Block order: impact desc, grouped by kind, then created_at desc
fn block_order(a: &Memory, b: &Memory) -> Ordering {
    b.impact
        .cmp(&a.impact)
        .then_with(|| a.kind.rank().cmp(&b.kind.rank()))
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}
