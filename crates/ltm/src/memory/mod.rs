//! Memory entity model, tiering and recall

pub mod infer;
pub mod retrieval;
pub mod tier;
pub mod types;

pub use infer::{infer_impact, infer_kind, infer_region};
pub use retrieval::{RecallHit, RecallMode, RecallOutcome, Retriever};
pub use tier::assign_tier;
pub use types::{
    Agent, CompactionLevel, Impact, Memory, MemoryKind, MemoryLink, LinkType, Project, Region,
    Tier,
};
