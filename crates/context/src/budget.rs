//! Per-tier token ceilings.

use procuresense_core::{ContextError, Tier};
use serde::ser::{Serialize, Serializer};
use std::ops::Index;

/// Token ceiling for each tier, indexed by [`Tier`].
///
/// The four ceilings always sum exactly to the requested total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierBudgets {
    ceilings: [usize; Tier::COUNT],
}

impl TierBudgets {
    pub fn get(&self, tier: Tier) -> usize {
        self.ceilings[tier.index()]
    }

    pub fn total(&self) -> usize {
        self.ceilings.iter().sum()
    }

    /// `(tier, ceiling)` pairs in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (Tier, usize)> + '_ {
        Tier::ALL.iter().map(|&tier| (tier, self.get(tier)))
    }
}

impl Index<Tier> for TierBudgets {
    type Output = usize;

    fn index(&self, tier: Tier) -> &usize {
        &self.ceilings[tier.index()]
    }
}

impl Serialize for TierBudgets {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

/// Splits a total budget 25/25/40/10 across the tiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetAllocator;

impl BudgetAllocator {
    /// Compute the ceilings for `total_budget`.
    ///
    /// Global policy, domain strategy and ephemeral tool get the floor of
    /// their share; task session takes whatever remains so nothing is lost
    /// to rounding.
    pub fn allocate(total_budget: i64) -> Result<TierBudgets, ContextError> {
        let total = u64::try_from(total_budget)
            .ok()
            .filter(|&t| t > 0)
            .and_then(|t| usize::try_from(t).ok())
            .ok_or(ContextError::InvalidBudget {
                requested: total_budget,
            })?;

        let floor_share = |tier: Tier| -> usize {
            // u128 keeps `total * pct` from overflowing near usize::MAX.
            (total as u128 * u128::from(tier.share_pct()) / 100) as usize
        };

        let mut ceilings = [0; Tier::COUNT];
        for tier in [Tier::GlobalPolicy, Tier::DomainStrategy, Tier::EphemeralTool] {
            ceilings[tier.index()] = floor_share(tier);
        }
        let assigned: usize = ceilings.iter().sum();
        ceilings[Tier::TaskSession.index()] = total - assigned;

        Ok(TierBudgets { ceilings })
    }
}
