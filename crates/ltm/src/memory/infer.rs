//! Keyword inference for memories saved without explicit metadata
//!
//! Cues are matched as whole words or phrases against the lowercased text.
//! The first matching rule wins.

use crate::memory::types::{Impact, MemoryKind, Region};

const CRITICAL_CUES: &[&str] = &["crucial", "critical", "never", "always", "must", "essential", "vital"];
const HIGH_CUES: &[&str] = &["important", "significant", "key", "major", "remember"];
const LOW_CUES: &[&str] = &["minor", "small", "trivial", "maybe", "possibly", "might", "nit"];

const KIND_CUES: &[(MemoryKind, &[&str])] = &[
    (
        MemoryKind::Architectural,
        &[
            "architecture", "pattern", "structure", "layer", "service", "repository", "router",
            "dependency", "injection", "module", "component", "interface", "api", "endpoint",
            "database", "schema", "sqlite", "postgres",
        ],
    ),
    (
        MemoryKind::Achievements,
        &[
            "completed", "finished", "done", "implemented", "shipped", "released", "deployed",
            "launched", "achieved", "built",
        ],
    ),
    (
        MemoryKind::Emotional,
        &[
            "prefer", "prefers", "like", "likes", "enjoy", "appreciate", "style", "tone", "humor",
            "formal", "casual", "communication", "relationship",
        ],
    ),
    (
        MemoryKind::Introspect,
        &["introspect", "observe myself", "notice myself", "feel like", "feels like"],
    ),
];

const AGENT_WIDE_CUES: &[&str] = &[
    "always", "general", "all projects", "everywhere", "universally", "in general", "as a rule",
];

/// Impact from importance cues; MEDIUM when nothing matches
pub fn infer_impact(text: &str) -> Impact {
    let text = Words::new(text);
    if text.has_any(CRITICAL_CUES) {
        Impact::Critical
    } else if text.has_any(HIGH_CUES) {
        Impact::High
    } else if text.has_any(LOW_CUES) {
        Impact::Low
    } else {
        Impact::Medium
    }
}

/// Kind from topic cues; LEARNINGS when nothing matches
pub fn infer_kind(text: &str) -> MemoryKind {
    let text = Words::new(text);
    KIND_CUES
        .iter()
        .find(|(_, cues)| text.has_any(cues))
        .map(|(kind, _)| *kind)
        .unwrap_or(MemoryKind::Learnings)
}

/// AGENT for cross-project cues, otherwise PROJECT when a project is known
pub fn infer_region(text: &str, has_project: bool) -> Region {
    if !has_project || Words::new(text).has_any(AGENT_WIDE_CUES) {
        Region::Agent
    } else {
        Region::Project
    }
}

/// Lowercased text padded so cues only match on word boundaries
struct Words(String);

impl Words {
    fn new(text: &str) -> Self {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        Self(format!(" {} ", words.join(" ")))
    }

    fn has(&self, cue: &str) -> bool {
        self.0.contains(&format!(" {cue} "))
    }

    fn has_any(&self, cues: &[&str]) -> bool {
        cues.iter().any(|cue| self.has(cue))
    }
}
