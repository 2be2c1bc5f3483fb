//! Dissonance queue types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LtmError;
use crate::memory::types::Memory;

/// Two memories that contradict each other and need a human to settle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dissonance {
    pub id: Uuid,
    pub agent_id: String,
    pub memory_a: Uuid,
    pub memory_b: Uuid,
    /// Why the pair contradicts
    pub description: String,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
    pub status: DissonanceStatus,
}

impl Dissonance {
    pub fn new(
        agent_id: impl Into<String>,
        memory_a: Uuid,
        memory_b: Uuid,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            memory_a,
            memory_b,
            description: description.into(),
            detected_at: now.trunc_subsecs(6),
            resolved_at: None,
            resolution: None,
            status: DissonanceStatus::Open,
        }
    }

    pub fn short_id(&self) -> String {
        self.id.to_string()[..8].to_string()
    }

    pub fn is_open(&self) -> bool {
        self.status == DissonanceStatus::Open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DissonanceStatus {
    Open,
    /// Settled with a written resolution
    Resolved,
    /// Not a real contradiction
    Dismissed,
}

impl DissonanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DissonanceStatus::Open => "OPEN",
            DissonanceStatus::Resolved => "RESOLVED",
            DissonanceStatus::Dismissed => "DISMISSED",
        }
    }
}

impl fmt::Display for DissonanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DissonanceStatus {
    type Err = LtmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(DissonanceStatus::Open),
            "RESOLVED" => Ok(DissonanceStatus::Resolved),
            "DISMISSED" => Ok(DissonanceStatus::Dismissed),
            other => Err(LtmError::Serialization(format!(
                "unknown dissonance status '{other}'"
            ))),
        }
    }
}

/// A dissonance with both memories, `None` where a memory was forgotten
#[derive(Debug, Clone, Serialize)]
pub struct DissonanceDetail {
    pub dissonance: Dissonance,
    pub memory_a: Option<Memory>,
    pub memory_b: Option<Memory>,
}
