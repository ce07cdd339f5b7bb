//! Layered context budgeting.
//!
//! Builds a four-tier prompt context under a fixed token budget, pruning
//! lower-priority tiers first when the aggregate overflows.
//!
//! # Tiers (in priority order)
//!
//! | Tier | Share | Pressure strategy |
//! |------|-------|-------------------|
//! | Global Policy | 25% | Never pruned |
//! | Domain Strategy | 25% | Summarized to lead sentences |
//! | Task Session | 40% (+ rounding remainder) | Oldest turns dropped, newest kept |
//! | Ephemeral Tool | 10% | Cleared first |

pub mod budget;
pub mod builder;
pub mod layer;
pub mod metadata;
pub mod pruner;
pub mod token;

pub use budget::{BudgetAllocator, TierBudgets};
pub use builder::{LayeredContextBuilder, Preflight};
pub use layer::{ContextLayer, Fragment, LayeredContext, ValidationEvidence};
pub use metadata::{ContextMetadata, DropInfo, LayerStats, PruneWarning};
pub use pruner::ContextPruner;
pub use token::{ByteTokenCounter, estimate_tokens};
