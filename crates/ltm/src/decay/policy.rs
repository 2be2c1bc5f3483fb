//! Table-driven decay policy
//!
//! One row per impact level: how long a memory may sit untouched, what it
//! is compacted to once that horizon passes, and how much confidence each
//! decay step costs. CRITICAL has no row and never decays.

use chrono::{DateTime, Duration, Utc};

use crate::config::DecayConfig;
use crate::memory::types::{CompactionLevel, Impact, Memory};

/// Decay behaviour for one impact level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayRule {
    /// Idle time after which the memory decays
    pub horizon: Duration,
    /// Representation the content is compacted to
    pub compaction: CompactionLevel,
    /// Confidence lost per decay step
    pub confidence_step: f64,
}

/// What a decay pass should do with one memory
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecayAction {
    /// Inside its horizon, CRITICAL, or already at the floor
    Keep,
    /// First crossing: compact content and lower confidence
    Compact {
        level: CompactionLevel,
        confidence: f64,
    },
    /// Already compacted: lower confidence only
    Fade { confidence: f64 },
}

/// Impact-indexed decay table
#[derive(Debug, Clone)]
pub struct DecayPolicy {
    low: DecayRule,
    medium: DecayRule,
    high: DecayRule,
    confidence_floor: f64,
}

impl Default for DecayPolicy {
    fn default() -> Self {
        Self::from_config(&DecayConfig::default())
    }
}

impl DecayPolicy {
    pub fn from_config(config: &DecayConfig) -> Self {
        Self {
            low: DecayRule {
                horizon: Duration::days(config.low_horizon_days),
                compaction: CompactionLevel::OneLine,
                confidence_step: config.low_confidence_step,
            },
            medium: DecayRule {
                horizon: Duration::days(config.medium_horizon_days),
                compaction: CompactionLevel::Paragraph,
                confidence_step: config.medium_confidence_step,
            },
            high: DecayRule {
                horizon: Duration::days(config.high_horizon_days),
                compaction: CompactionLevel::Technical,
                confidence_step: config.high_confidence_step,
            },
            confidence_floor: config.confidence_floor,
        }
    }

    /// The rule for `impact`; `None` for CRITICAL
    pub fn rule_for(&self, impact: Impact) -> Option<&DecayRule> {
        match impact {
            Impact::Low => Some(&self.low),
            Impact::Medium => Some(&self.medium),
            Impact::High => Some(&self.high),
            Impact::Critical => None,
        }
    }

    pub fn confidence_floor(&self) -> f64 {
        self.confidence_floor
    }

    /// Decide what to do with `memory` at `now`. Pure.
    pub fn plan(&self, memory: &Memory, now: DateTime<Utc>) -> DecayAction {
        let Some(rule) = self.rule_for(memory.impact) else {
            return DecayAction::Keep;
        };

        let idle_since = memory.created_at.max(memory.last_accessed);
        if now - idle_since <= rule.horizon {
            return DecayAction::Keep;
        }

        let confidence = self.lowered(memory.confidence, rule.confidence_step);
        if !memory.is_compacted() {
            return DecayAction::Compact {
                level: rule.compaction,
                confidence,
            };
        }
        if confidence < memory.confidence {
            DecayAction::Fade { confidence }
        } else {
            DecayAction::Keep
        }
    }

    /// Step confidence down, never below the floor and never upwards
    fn lowered(&self, confidence: f64, step: f64) -> f64 {
        (confidence - step).max(self.confidence_floor).min(confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::MemoryKind;

    fn aged(impact: Impact, idle_days: i64, now: DateTime<Utc>) -> Memory {
        Memory::new_at(
            "anima",
            MemoryKind::Learnings,
            impact,
            "content",
            now - Duration::days(idle_days),
        )
    }

    #[test]
    fn test_table_rows() {
        let policy = DecayPolicy::default();
        let low = policy.rule_for(Impact::Low).expect("low");
        assert_eq!(low.horizon, Duration::days(1));
        assert_eq!(low.compaction, CompactionLevel::OneLine);
        assert_eq!(low.confidence_step, 0.3);
        assert_eq!(
            policy.rule_for(Impact::Medium).expect("medium").horizon,
            Duration::days(7)
        );
        assert_eq!(
            policy.rule_for(Impact::High).expect("high").compaction,
            CompactionLevel::Technical
        );
        assert!(policy.rule_for(Impact::Critical).is_none());
    }

    #[test]
    fn test_within_horizon_is_kept() {
        let policy = DecayPolicy::default();
        let now = Utc::now();
        assert_eq!(policy.plan(&aged(Impact::Medium, 6, now), now), DecayAction::Keep);
    }

    #[test]
    fn test_first_crossing_compacts() {
        let policy = DecayPolicy::default();
        let now = Utc::now();
        match policy.plan(&aged(Impact::Low, 2, now), now) {
            DecayAction::Compact { level, confidence } => {
                assert_eq!(level, CompactionLevel::OneLine);
                assert!((confidence - 0.7).abs() < 1e-9);
            }
            other => panic!("expected Compact, got {other:?}"),
        }
    }

    #[test]
    fn test_compacted_memory_fades_to_floor() {
        let policy = DecayPolicy::default();
        let now = Utc::now();
        let mut memory = aged(Impact::Low, 5, now);
        memory.compaction = CompactionLevel::OneLine;
        memory.confidence = 0.15;
        assert_eq!(
            policy.plan(&memory, now),
            DecayAction::Fade { confidence: 0.1 }
        );

        memory.confidence = 0.1;
        assert_eq!(policy.plan(&memory, now), DecayAction::Keep);
    }

    #[test]
    fn test_recent_access_resets_idle_time() {
        let policy = DecayPolicy::default();
        let now = Utc::now();
        let mut memory = aged(Impact::Low, 10, now);
        memory.last_accessed = now - Duration::hours(2);
        assert_eq!(policy.plan(&memory, now), DecayAction::Keep);
    }

    #[test]
    fn test_critical_never_decays() {
        let policy = DecayPolicy::default();
        let now = Utc::now();
        assert_eq!(
            policy.plan(&aged(Impact::Critical, 3650, now), now),
            DecayAction::Keep
        );
    }

    #[test]
    fn test_confidence_below_floor_is_not_raised() {
        let policy = DecayPolicy::default();
        let now = Utc::now();
        let mut memory = aged(Impact::High, 60, now);
        memory.confidence = 0.05;
        match policy.plan(&memory, now) {
            DecayAction::Compact { confidence, .. } => assert_eq!(confidence, 0.05),
            other => panic!("expected Compact, got {other:?}"),
        }
    }
}
