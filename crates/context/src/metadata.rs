//! Assembly metadata: what each tier holds and what pruning removed.

use procuresense_core::Tier;
use serde::{Deserialize, Serialize};

/// Detailed metadata about a built context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMetadata {
    /// Total tokens across all tiers.
    pub total_tokens: usize,
    /// Requested total budget.
    pub total_budget: usize,
    /// Budget utilization percentage (0.0–100.0, above 100 only with warnings).
    pub utilization_pct: f32,
    /// Per-tier statistics, in priority order.
    pub per_layer: Vec<LayerStats>,
    /// Content removed by the pruner.
    pub drops: Vec<DropInfo>,
    /// Tiers accepted above their ceiling.
    pub warnings: Vec<PruneWarning>,
}

/// Statistics for a single tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerStats {
    pub tier: Tier,
    /// Tokens consumed by this tier.
    pub tokens: usize,
    /// Ceiling assigned by the allocator.
    pub budget: usize,
    /// Fragments present after pruning.
    pub items_included: usize,
    /// Fragments supplied before pruning.
    pub items_total: usize,
    pub pinned: bool,
}

/// Information about content removed from a tier under budget pressure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropInfo {
    pub tier: Tier,
    /// Number of supplied fragments no longer present verbatim.
    pub items_dropped: usize,
    /// Tokens reclaimed.
    pub tokens_dropped: usize,
    /// Reason for dropping.
    pub reason: String,
}

/// A tier left above its ceiling because a single fragment exceeds it.
///
/// Not an error: the tier is accepted at its minimum achievable size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneWarning {
    pub tier: Tier,
    pub tokens: usize,
    pub budget: usize,
    pub message: String,
}
