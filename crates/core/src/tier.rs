//! The four fixed-priority context tiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A context tier. Declaration order is priority order, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// Enterprise policy. Pinned: never pruned.
    GlobalPolicy = 0,
    /// Domain playbooks. Summarized under pressure.
    DomainStrategy = 1,
    /// Session history. Oldest entries evicted first.
    TaskSession = 2,
    /// One-shot tool payloads. First to go.
    EphemeralTool = 3,
}

impl Tier {
    /// Number of tiers.
    pub const COUNT: usize = 4;

    /// All tiers in priority order (highest first).
    pub const ALL: [Tier; Tier::COUNT] = [
        Tier::GlobalPolicy,
        Tier::DomainStrategy,
        Tier::TaskSession,
        Tier::EphemeralTool,
    ];

    /// Order in which the pruner visits tiers. The pinned tier never appears.
    pub const PRUNE_ORDER: [Tier; 3] = [Tier::EphemeralTool, Tier::TaskSession, Tier::DomainStrategy];

    /// Position of this tier in enum-indexed arrays.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Share of the total budget, in percent.
    pub const fn share_pct(self) -> u8 {
        match self {
            Tier::GlobalPolicy => 25,
            Tier::DomainStrategy => 25,
            Tier::TaskSession => 40,
            Tier::EphemeralTool => 10,
        }
    }

    /// Whether the tier is exempt from pruning.
    pub const fn is_pinned(self) -> bool {
        matches!(self, Tier::GlobalPolicy)
    }

    /// Whether the critic may read this tier as validation evidence.
    pub const fn is_validation_evidence(self) -> bool {
        matches!(self, Tier::GlobalPolicy | Tier::DomainStrategy)
    }

    /// Snake-case identifier used in metadata and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Tier::GlobalPolicy => "global_policy",
            Tier::DomainStrategy => "domain_strategy",
            Tier::TaskSession => "task_session",
            Tier::EphemeralTool => "ephemeral_tool",
        }
    }

    /// Section header used when rendering a prompt.
    pub const fn header(self) -> &'static str {
        match self {
            Tier::GlobalPolicy => "[Global Policy]",
            Tier::DomainStrategy => "[Domain Strategy]",
            Tier::TaskSession => "[Task Session]",
            Tier::EphemeralTool => "[Tool Data]",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_sum_to_one_hundred() {
        let total: u32 = Tier::ALL.iter().map(|t| t.share_pct() as u32).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn only_global_policy_is_pinned() {
        let pinned: Vec<_> = Tier::ALL.into_iter().filter(|t| t.is_pinned()).collect();
        assert_eq!(pinned, vec![Tier::GlobalPolicy]);
    }

    #[test]
    fn prune_order_excludes_pinned_tier() {
        assert!(!Tier::PRUNE_ORDER.contains(&Tier::GlobalPolicy));
        assert_eq!(Tier::PRUNE_ORDER[0], Tier::EphemeralTool);
    }

    #[test]
    fn indices_follow_priority() {
        for (i, tier) in Tier::ALL.iter().enumerate() {
            assert_eq!(tier.index(), i);
        }
        assert!(Tier::GlobalPolicy < Tier::EphemeralTool);
    }

    #[test]
    fn evidence_tiers() {
        assert!(Tier::GlobalPolicy.is_validation_evidence());
        assert!(Tier::DomainStrategy.is_validation_evidence());
        assert!(!Tier::TaskSession.is_validation_evidence());
        assert!(!Tier::EphemeralTool.is_validation_evidence());
    }

    #[test]
    fn serializes_screaming_snake() {
        let json = serde_json::to_string(&Tier::TaskSession).unwrap();
        assert_eq!(json, "\"TASK_SESSION\"");
    }
}
