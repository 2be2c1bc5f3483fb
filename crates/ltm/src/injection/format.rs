//! Context block formatting
//!
//! ```text
//! [LTM:Anima@ltm]
//! ~EMOT:CRIT| Matt prefers terse answers
//! ~ARCH:HIGH| Team chose SQLite for simplicity
//! [/LTM]
//! ```
//!
//! Line flags follow the impact code: `^` inherited from the primary agent,
//! `?` low confidence, `⚠` signature check failed.

use crate::memory::types::{Impact, Memory, MemoryKind};

/// Closing marker of a context block
pub const FOOTER: &str = "[/LTM]";

/// Body of a block with nothing to inject
pub const NO_MEMORIES: &str = "(no memories)";

/// Body of a block whose eligible memories were all deferred
pub const ALL_DEFERRED: &str = "(all memories deferred)";

/// Memories below this confidence carry the `?` flag
pub const LOW_CONFIDENCE: f64 = 0.5;

/// Per-line annotations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineFlags {
    /// Inherited identity from the primary agent
    pub inherited: bool,
    /// Signature check failed
    pub untrusted: bool,
    pub low_confidence: bool,
}

impl LineFlags {
    pub fn for_memory(memory: &Memory) -> Self {
        Self {
            low_confidence: memory.confidence < LOW_CONFIDENCE,
            ..Self::default()
        }
    }
}

pub fn kind_code(kind: MemoryKind) -> &'static str {
    match kind {
        MemoryKind::Emotional => "EMOT",
        MemoryKind::Architectural => "ARCH",
        MemoryKind::Learnings => "LEARN",
        MemoryKind::Achievements => "ACHV",
        MemoryKind::Introspect => "INTRO",
        MemoryKind::Dream => "DREAM",
    }
}

pub fn impact_code(impact: Impact) -> &'static str {
    match impact {
        Impact::Critical => "CRIT",
        Impact::High => "HIGH",
        Impact::Medium => "MED",
        Impact::Low => "LOW",
    }
}

/// Opening marker: `[LTM:<agent>@<project>]`, or `[LTM:<agent>]`
pub fn header(agent_name: &str, project_name: Option<&str>) -> String {
    match project_name {
        Some(project) => format!("[LTM:{agent_name}@{project}]"),
        None => format!("[LTM:{agent_name}]"),
    }
}

/// One DSL line (without trailing newline)
pub fn render_line(memory: &Memory, flags: LineFlags) -> String {
    let mut marks = String::new();
    if flags.inherited {
        marks.push('^');
    }
    if flags.low_confidence {
        marks.push('?');
    }
    if flags.untrusted {
        marks.push('⚠');
    }
    format!(
        "~{}:{}{}| {}",
        kind_code(memory.kind),
        impact_code(memory.impact),
        marks,
        single_line(&memory.content)
    )
}

/// Assemble a full block from already rendered lines
pub fn render_block(header: &str, lines: &[String]) -> String {
    render_block_or(header, lines, NO_MEMORIES)
}

/// Like [`render_block`], with `marker` as the body when `lines` is empty
pub fn render_block_or(header: &str, lines: &[String], marker: &str) -> String {
    let mut out = String::with_capacity(header.len() + FOOTER.len() + lines.len() * 64);
    out.push_str(header);
    out.push('\n');
    if lines.is_empty() {
        out.push_str(marker);
        out.push('\n');
    }
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(FOOTER);
    out
}

/// Rough token estimate: one token per four bytes, rounded up
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Tokens a rendered line costs inside a block, newline included
pub fn line_cost(line: &str) -> usize {
    estimate_tokens(line) + 1
}

/// Cached `token_count` for a memory: its unflagged line's cost
pub fn line_token_count(memory: &Memory) -> usize {
    line_cost(&render_line(memory, LineFlags::for_memory(memory)))
}

/// Cost of the header, footer and their newlines
pub fn frame_cost(header: &str) -> usize {
    line_cost(header) + estimate_tokens(FOOTER)
}

fn single_line(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" / ")
}
