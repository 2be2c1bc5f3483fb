//! Memory types for the ltm engine
//!
//! Defines the entity model: agents, projects, memories and the links
//! between them, plus the classification enums stored alongside them.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LtmError;
use crate::memory::tier::assign_tier;

/// Owner of AGENT-region memories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    /// Display name used in the context header
    pub name: String,
    /// Optional path to the agent's definition file
    pub definition_path: Option<PathBuf>,
    /// Reference to the signing key (never the key itself)
    pub signing_key_ref: Option<String>,
}

impl Agent {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            definition_path: None,
            signing_key_ref: None,
        }
    }
}

/// Scope of PROJECT-region memories, unique by filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
}

/// A single memory unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier for this memory
    pub id: Uuid,
    /// Owning agent
    pub agent_id: String,
    /// AGENT (cross-project) or PROJECT (single project)
    pub region: Region,
    /// Required when `region` is PROJECT
    pub project_id: Option<String>,
    pub kind: MemoryKind,
    /// Current, possibly compacted content
    pub content: String,
    /// Content as first written; never changes
    pub original_content: String,
    pub impact: Impact,
    /// Starts at 1.0 and only decreases through decay
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    /// Back-pointer to the version this one replaced
    pub previous_memory_id: Option<Uuid>,
    /// Forward-pointer to the replacing version, `None` while current
    pub superseded_by: Option<Uuid>,
    pub version: u32,
    /// Opaque signature over `original_content`
    pub signature: Option<String>,
    /// Cached token estimate of the rendered context line
    pub token_count: usize,
    /// Provenance tag of the host platform
    pub platform: Option<String>,
    /// Vector embedding, `None` until computed
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    /// Model that produced `embedding`
    pub embedding_model: Option<String>,
    pub tier: Tier,
    /// How far decay has compacted the content
    pub compaction: CompactionLevel,
    pub session_id: Option<String>,
    pub git_commit: Option<String>,
    pub git_branch: Option<String>,
}

impl Memory {
    /// Create a new AGENT-region memory stamped with the current time.
    pub fn new(
        agent_id: impl Into<String>,
        kind: MemoryKind,
        impact: Impact,
        content: impl Into<String>,
    ) -> Self {
        Self::new_at(agent_id, kind, impact, content, Utc::now())
    }

    /// Create a new AGENT-region memory at an explicit time.
    pub fn new_at(
        agent_id: impl Into<String>,
        kind: MemoryKind,
        impact: Impact,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        // Stored timestamps carry microsecond precision
        let now = now.trunc_subsecs(6);
        let content = content.into();
        Self {
            id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            region: Region::Agent,
            project_id: None,
            kind,
            original_content: content.clone(),
            content,
            impact,
            confidence: 1.0,
            created_at: now,
            last_accessed: now,
            previous_memory_id: None,
            superseded_by: None,
            version: 1,
            signature: None,
            token_count: 0,
            platform: None,
            embedding: None,
            embedding_model: None,
            tier: assign_tier(impact, kind, 0.0, 0.0),
            compaction: CompactionLevel::Full,
            session_id: None,
            git_commit: None,
            git_branch: None,
        }
    }

    /// Scope this memory to a project (PROJECT region).
    pub fn in_project(mut self, project_id: impl Into<String>) -> Self {
        self.region = Region::Project;
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_git(mut self, commit: Option<String>, branch: Option<String>) -> Self {
        self.git_commit = commit;
        self.git_branch = branch;
        self
    }

    /// Build the next version of this memory carrying `content`.
    ///
    /// Region, kind, impact, owner and project are copied; the new row gets
    /// a fresh id, `version + 1` and a back-pointer to this memory.
    pub fn successor(&self, content: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut next = Self::new_at(self.agent_id.clone(), self.kind, self.impact, content, now);
        next.region = self.region;
        next.project_id = self.project_id.clone();
        next.previous_memory_id = Some(self.id);
        next.version = self.version + 1;
        next.platform = self.platform.clone();
        next
    }

    /// `region = PROJECT` implies a project id.
    pub fn region_is_valid(&self) -> bool {
        self.region == Region::Agent || self.project_id.is_some()
    }

    pub fn is_current(&self) -> bool {
        self.superseded_by.is_none()
    }

    pub fn is_compacted(&self) -> bool {
        self.compaction != CompactionLevel::Full
    }

    /// Days since creation, fractional.
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        days_between(self.created_at, now)
    }

    /// Days since last access, fractional.
    pub fn last_accessed_days_ago(&self, now: DateTime<Utc>) -> f64 {
        days_between(self.last_accessed, now)
    }

    /// Short id used in listings and prefix lookups.
    pub fn short_id(&self) -> String {
        self.id.to_string()[..8].to_string()
    }
}

fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / 86_400.0
}

/// Scope of a memory or curiosity item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Region {
    /// Follows the agent across projects
    Agent,
    /// Bound to a single project
    Project,
}

/// Classification of what a memory is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryKind {
    /// Relationship and preference signals
    Emotional,
    /// Design decisions
    Architectural,
    /// Lessons and gotchas
    Learnings,
    /// Milestones, usually tied to a commit
    Achievements,
    Introspect,
    Dream,
}

impl MemoryKind {
    pub const ALL: [MemoryKind; 6] = [
        MemoryKind::Emotional,
        MemoryKind::Architectural,
        MemoryKind::Learnings,
        MemoryKind::Achievements,
        MemoryKind::Introspect,
        MemoryKind::Dream,
    ];

    /// Display order inside the context block
    pub fn rank(self) -> u8 {
        match self {
            MemoryKind::Emotional => 0,
            MemoryKind::Architectural => 1,
            MemoryKind::Learnings => 2,
            MemoryKind::Achievements => 3,
            MemoryKind::Introspect => 4,
            MemoryKind::Dream => 5,
        }
    }
}

/// Importance level; drives decay horizon and CORE eligibility.
///
/// Ordered so that `Critical > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Impact {
    Low,
    Medium,
    High,
    Critical,
}

impl Impact {
    pub fn weight(self) -> i64 {
        match self {
            Impact::Low => 1,
            Impact::Medium => 2,
            Impact::High => 3,
            Impact::Critical => 4,
        }
    }
}

/// Injection eligibility class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// Always injected, never deferred
    Core,
    /// Injected first within budget
    Active,
    /// Injected with leftover budget
    Contextual,
    /// Search only
    Deep,
}

/// Level of compaction applied to memory content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompactionLevel {
    /// Content equals original_content
    Full,
    /// Summarized, technical specifics kept
    Technical,
    /// Condensed to a paragraph
    Paragraph,
    /// A single short line
    OneLine,
}

/// Relationship between two memories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkType {
    RelatesTo,
    BuildsOn,
    Contradicts,
    Supersedes,
}

/// Directed edge between two memories. A pair is stored at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryLink {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub link_type: LinkType,
    /// Set for auto-detected links
    pub similarity: Option<f32>,
    pub created_at: DateTime<Utc>,
}

impl MemoryLink {
    /// The endpoint opposite `id`, if `id` is part of this link
    pub fn other(&self, id: Uuid) -> Option<Uuid> {
        if self.source_id == id {
            Some(self.target_id)
        } else if self.target_id == id {
            Some(self.source_id)
        } else {
            None
        }
    }
}

macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal $(| $alias:literal)*),+ $(,)? }) => {
        impl $ty {
            /// Canonical upper-case name as stored in the database
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = LtmError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text $(| $alias)* => Ok($ty::$variant),)+
                    other => Err(LtmError::Serialization(format!(
                        "unknown {} '{}'",
                        stringify!($ty),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum!(Region {
    Agent => "AGENT",
    Project => "PROJECT",
});

text_enum!(MemoryKind {
    Emotional => "EMOTIONAL" | "EMOT",
    Architectural => "ARCHITECTURAL" | "ARCH",
    Learnings => "LEARNINGS" | "LEARNING" | "LEARN",
    Achievements => "ACHIEVEMENTS" | "ACHIEVEMENT" | "ACHV",
    Introspect => "INTROSPECT" | "INTRO",
    Dream => "DREAM",
});

text_enum!(Impact {
    Low => "LOW",
    Medium => "MEDIUM" | "MED",
    High => "HIGH",
    Critical => "CRITICAL" | "CRIT",
});

text_enum!(Tier {
    Core => "CORE",
    Active => "ACTIVE",
    Contextual => "CONTEXTUAL",
    Deep => "DEEP",
});

text_enum!(CompactionLevel {
    Full => "FULL",
    Technical => "TECHNICAL",
    Paragraph => "PARAGRAPH",
    OneLine => "ONE_LINE",
});

text_enum!(LinkType {
    RelatesTo => "RELATES_TO",
    BuildsOn => "BUILDS_ON",
    Contradicts => "CONTRADICTS",
    Supersedes => "SUPERSEDES",
});

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_memory_defaults() {
        let memory = Memory::new("anima", MemoryKind::Learnings, Impact::Medium, "Use WAL mode");
        assert_eq!(memory.region, Region::Agent);
        assert_eq!(memory.version, 1);
        assert_eq!(memory.confidence, 1.0);
        assert_eq!(memory.content, memory.original_content);
        assert_eq!(memory.compaction, CompactionLevel::Full);
        assert!(memory.is_current());
        assert!(memory.region_is_valid());
    }

    #[test]
    fn test_project_region_requires_project() {
        let mut memory = Memory::new("anima", MemoryKind::Learnings, Impact::Low, "x");
        memory.region = Region::Project;
        assert!(!memory.region_is_valid());

        let scoped = memory.in_project("proj-1");
        assert!(scoped.region_is_valid());
    }

    #[test]
    fn test_successor_links_back_and_bumps_version() {
        let now = Utc::now();
        let old = Memory::new_at("anima", MemoryKind::Architectural, Impact::High, "v1", now)
            .in_project("p");
        let next = old.successor("v2", now + Duration::minutes(1));

        assert_ne!(next.id, old.id);
        assert_eq!(next.version, 2);
        assert_eq!(next.previous_memory_id, Some(old.id));
        assert_eq!(next.region, Region::Project);
        assert_eq!(next.project_id.as_deref(), Some("p"));
        assert_eq!(next.original_content, "v2");
    }

    #[test]
    fn test_enum_parsing_accepts_abbreviations() {
        assert_eq!("emot".parse::<MemoryKind>().unwrap(), MemoryKind::Emotional);
        assert_eq!("ARCHITECTURAL".parse::<MemoryKind>().unwrap(), MemoryKind::Architectural);
        assert_eq!("crit".parse::<Impact>().unwrap(), Impact::Critical);
        assert_eq!("RELATES_TO".parse::<LinkType>().unwrap(), LinkType::RelatesTo);
        assert!("SOMETIMES".parse::<Impact>().is_err());
    }

    #[test]
    fn test_impact_ordering() {
        assert!(Impact::Critical > Impact::High);
        assert!(Impact::High > Impact::Medium);
        assert!(Impact::Medium > Impact::Low);
    }

    #[test]
    fn test_memory_serialization_skips_embedding() {
        let mut memory = Memory::new("anima", MemoryKind::Dream, Impact::Low, "drifting");
        memory.embedding = Some(vec![0.1; 4]);

        let json = serde_json::to_string(&memory).expect("Failed to serialize memory");
        assert!(json.contains("\"kind\":\"DREAM\""));
        assert!(!json.contains("\"embedding\":"));

        let back: Memory = serde_json::from_str(&json).expect("Failed to deserialize memory");
        assert_eq!(back.id, memory.id);
        assert!(back.embedding.is_none());
    }

    #[test]
    fn test_link_other_endpoint() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let link = MemoryLink {
            source_id: a,
            target_id: b,
            link_type: LinkType::RelatesTo,
            similarity: Some(0.8),
            created_at: Utc::now(),
        };
        assert_eq!(link.other(a), Some(b));
        assert_eq!(link.other(b), Some(a));
        assert_eq!(link.other(Uuid::new_v4()), None);
    }
}
