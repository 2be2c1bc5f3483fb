//! Store integrity checks
//!
//! Read-only scan that reports rows violating the entity invariants. Nothing
//! is repaired here; callers decide what to do with the findings.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::memory::types::Memory;
use crate::signing::{self, Signer, Trust};
use crate::storage::{MemoryFilter, SqliteStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    EmptyContent,
    ConfidenceOutOfRange,
    MissingProject,
    DanglingPrevious,
    DanglingSuccessor,
    BrokenChain,
    SignatureMismatch,
}

impl IssueKind {
    pub fn severity(self) -> Severity {
        match self {
            IssueKind::SignatureMismatch | IssueKind::EmptyContent => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityIssue {
    pub memory_id: Uuid,
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    pub checked: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn errors(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warnings(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    fn flag(&mut self, memory: &Memory, kind: IssueKind, message: String) {
        self.issues.push(IntegrityIssue {
            memory_id: memory.id,
            kind,
            severity: kind.severity(),
            message,
        });
    }
}

/// Check every memory of `agent_id` visible in `project_id`, superseded
/// versions included.
pub fn check_integrity(
    store: &SqliteStore,
    agent_id: &str,
    project_id: Option<&str>,
    signer: Option<&dyn Signer>,
) -> Result<IntegrityReport> {
    let memories = store.query(
        &MemoryFilter::new()
            .for_agent(agent_id)
            .visible_in(project_id)
            .include_superseded(true),
    )?;
    let by_id: HashMap<Uuid, &Memory> = memories.iter().map(|m| (m.id, m)).collect();

    let mut report = IntegrityReport {
        checked: memories.len(),
        ..IntegrityReport::default()
    };

    for memory in &memories {
        if memory.content.trim().is_empty() {
            report.flag(memory, IssueKind::EmptyContent, "content is empty".to_string());
        }
        if !(0.0..=1.0).contains(&memory.confidence) {
            report.flag(
                memory,
                IssueKind::ConfidenceOutOfRange,
                format!("confidence {} outside [0, 1]", memory.confidence),
            );
        }
        if !memory.region_is_valid() {
            report.flag(
                memory,
                IssueKind::MissingProject,
                "PROJECT memory has no project".to_string(),
            );
        }

        if let Some(prev_id) = memory.previous_memory_id {
            match lookup(store, &by_id, prev_id)? {
                None => report.flag(
                    memory,
                    IssueKind::DanglingPrevious,
                    format!("previous version {prev_id} does not exist"),
                ),
                Some(prev) if prev.version >= memory.version => report.flag(
                    memory,
                    IssueKind::BrokenChain,
                    format!(
                        "version {} does not follow previous version {}",
                        memory.version, prev.version
                    ),
                ),
                Some(_) => {}
            }
        }

        if let Some(next_id) = memory.superseded_by {
            match lookup(store, &by_id, next_id)? {
                None => report.flag(
                    memory,
                    IssueKind::DanglingSuccessor,
                    format!("successor {next_id} does not exist"),
                ),
                Some(next) if next.previous_memory_id != Some(memory.id) => report.flag(
                    memory,
                    IssueKind::BrokenChain,
                    format!("successor {} does not point back", next.short_id()),
                ),
                Some(_) => {}
            }
        }

        if signing::check(signer, &memory.original_content, memory.signature.as_deref())
            == Trust::Untrusted
        {
            report.flag(
                memory,
                IssueKind::SignatureMismatch,
                "signature does not match original content".to_string(),
            );
        }
    }

    if !report.is_clean() {
        tracing::warn!(
            "Integrity check found {} errors and {} warnings in {} memories",
            report.errors(),
            report.warnings(),
            report.checked
        );
    }
    Ok(report)
}

/// Chain neighbours may live outside the scanned scope
fn lookup(store: &SqliteStore, by_id: &HashMap<Uuid, &Memory>, id: Uuid) -> Result<Option<Memory>> {
    match by_id.get(&id) {
        Some(memory) => Ok(Some((*memory).clone())),
        None => store.get_memory(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{Impact, MemoryKind};
    use crate::signing::HmacSigner;
    use chrono::Utc;

    #[test]
    fn test_clean_store() {
        let store = SqliteStore::open_in_memory().expect("open");
        let m = Memory::new("a", MemoryKind::Learnings, Impact::Medium, "fine");
        store.insert_memory(&m).expect("insert");
        store.supersede(m.id, "still fine", Utc::now()).expect("supersede");

        let report = check_integrity(&store, "a", None, None).expect("check");
        assert_eq!(report.checked, 2);
        assert!(report.is_clean(), "{:?}", report.issues);
    }

    #[test]
    fn test_version_order_break_is_an_error() {
        let store = SqliteStore::open_in_memory().expect("open");
        let first = Memory::new("a", MemoryKind::Learnings, Impact::Medium, "first");
        store.insert_memory(&first).expect("insert");
        let mut second = Memory::new("a", MemoryKind::Learnings, Impact::Medium, "second");
        second.previous_memory_id = Some(first.id);
        store.insert_memory(&second).expect("insert");

        let report = check_integrity(&store, "a", None, None).expect("check");
        assert_eq!(report.errors(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::BrokenChain);
    }

    #[test]
    fn test_signature_mismatch_is_a_warning() {
        let store = SqliteStore::open_in_memory().expect("open");
        let signer = HmacSigner::new(b"k".to_vec()).expect("signer");
        let mut m = Memory::new("a", MemoryKind::Learnings, Impact::Medium, "text");
        m.signature = Some("00".repeat(32));
        store.insert_memory(&m).expect("insert");

        let report = check_integrity(&store, "a", None, Some(&signer)).expect("check");
        assert_eq!(report.warnings(), 1);
        assert_eq!(report.errors(), 0);
        assert_eq!(report.issues[0].kind, IssueKind::SignatureMismatch);
    }
}
