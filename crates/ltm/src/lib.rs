//! ltm - Long-term memory engine for AI agents
//!
//! This crate persists small units of memory (decisions, preferences,
//! learnings, milestones) for an agent across sessions and rebuilds a
//! token-budgeted context block for injection at session start.
//!
//! The [`Engine`] facade exposes the operations consumed by host glue:
//! remember, supersede, recall, load-context, load-deferred, end-session,
//! forget, curious, research, dissonance and backfill.

pub mod config;
pub mod curiosity;
pub mod decay;
pub mod dissonance;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod graph;
pub mod injection;
pub mod integrity;
pub mod memory;
pub mod signing;
pub mod storage;
pub mod testing;

pub use engine::Engine;
pub use error::{LtmError, Result};
