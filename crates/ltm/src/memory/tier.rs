//! Tier assignment
//!
//! A memory's tier decides whether context assembly picks it up
//! automatically. The assignment is a pure function of impact, kind and age.

use crate::memory::types::{Impact, MemoryKind, Tier};

/// HIGH memories touched within this many days stay ACTIVE
pub const ACTIVE_WINDOW_DAYS: f64 = 7.0;

/// MEDIUM memories older than this many days sink to DEEP
pub const MEDIUM_DEEP_AGE_DAYS: f64 = 30.0;

/// Assign a tier from impact, kind and age.
///
/// # Arguments
/// * `age_days` - days since the memory was created
/// * `last_accessed_days_ago` - days since the memory was last read
pub fn assign_tier(
    impact: Impact,
    kind: MemoryKind,
    age_days: f64,
    last_accessed_days_ago: f64,
) -> Tier {
    if impact == Impact::Critical {
        return Tier::Core;
    }
    if kind == MemoryKind::Emotional && matches!(impact, Impact::High | Impact::Critical) {
        return Tier::Core;
    }
    if impact == Impact::High && last_accessed_days_ago <= ACTIVE_WINDOW_DAYS {
        return Tier::Active;
    }
    if impact == Impact::Low {
        return Tier::Deep;
    }
    if age_days > MEDIUM_DEEP_AGE_DAYS && impact == Impact::Medium {
        return Tier::Deep;
    }
    Tier::Contextual
}
