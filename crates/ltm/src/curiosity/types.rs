//! Curiosity queue types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LtmError;
use crate::memory::types::Region;

/// An open question awaiting research.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuriosityItem {
    pub id: Uuid,
    pub agent_id: String,
    pub region: Region,
    pub project_id: Option<String>,
    /// The question as first asked
    pub question: String,
    /// What triggered the question
    pub context: Option<String>,
    /// Times the question has come up, at least 1
    pub recurrence_count: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub status: CuriosityStatus,
    /// Manual priority adjustment
    pub priority_boost: i64,
}

impl CuriosityItem {
    pub fn new(
        agent_id: impl Into<String>,
        region: Region,
        project_id: Option<String>,
        question: impl Into<String>,
        context: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let now = now.trunc_subsecs(6);
        Self {
            id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            region,
            project_id,
            question: question.into(),
            context,
            recurrence_count: 1,
            first_seen: now,
            last_seen: now,
            status: CuriosityStatus::Open,
            priority_boost: 0,
        }
    }

    pub fn short_id(&self) -> String {
        self.id.to_string()[..8].to_string()
    }
}

/// Research state of a curiosity item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CuriosityStatus {
    Open,
    Researched,
    Dismissed,
}

impl CuriosityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CuriosityStatus::Open => "OPEN",
            CuriosityStatus::Researched => "RESEARCHED",
            CuriosityStatus::Dismissed => "DISMISSED",
        }
    }
}

impl fmt::Display for CuriosityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CuriosityStatus {
    type Err = LtmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(CuriosityStatus::Open),
            "RESEARCHED" => Ok(CuriosityStatus::Researched),
            "DISMISSED" => Ok(CuriosityStatus::Dismissed),
            other => Err(LtmError::Serialization(format!(
                "unknown curiosity status '{other}'"
            ))),
        }
    }
}

/// Filter for listing curiosity items.
#[derive(Debug, Clone, Default)]
pub struct CuriosityFilter {
    pub agent_id: Option<String>,
    /// AGENT items plus items of this project; `None` means AGENT items only
    pub project_id: Option<String>,
    /// Restrict to one region
    pub region: Option<Region>,
    /// `None` lists every status
    pub status: Option<CuriosityStatus>,
}

impl CuriosityFilter {
    /// OPEN items for an agent working in an optional project
    pub fn open(agent_id: impl Into<String>, project_id: Option<&str>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            project_id: project_id.map(str::to_string),
            region: None,
            status: Some(CuriosityStatus::Open),
        }
    }

    /// Every status, for historical listings
    pub fn all(mut self) -> Self {
        self.status = None;
        self
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }
}
