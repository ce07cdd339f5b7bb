//! Policy critic.
//!
//! Validates a candidate output against the enterprise [`PolicyRuleSet`],
//! consulting only the global policy and domain strategy tiers as evidence,
//! and applies deterministic fixes where every violation has one.
//!
//! # Flow
//!
//! ```text
//! candidate ──► Scan ──► no violations ─────────────────► COMPLIANT
//!                 │
//!                 ├──► any unfixable violation ─────────► FLAGGED (original text)
//!                 │
//!                 └──► apply fixes ──► rescan clean ────► REVISED (fixed text)
//!                                          │
//!                                          └─ residual ─► FLAGGED (original text)
//! ```
//!
//! [`PolicyRuleSet`]: procuresense_rules::PolicyRuleSet

pub mod critic;
pub mod fix;
pub mod report;

pub use critic::PolicyCritic;
pub use fix::{FixRegistry, FixRule, FixTransform};
pub use report::{ComplianceReport, ComplianceStatus, Violation, ViolationKind};

use procuresense_core::PayloadError;
use procuresense_rules::RuleError;

/// Structural failures of a validation pass.
///
/// Policy violations are never errors; they are reported in a
/// [`ComplianceReport`].
#[derive(Debug, thiserror::Error)]
pub enum CriticError {
    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("ruleset unavailable: {0}")]
    Rules(#[from] RuleError),
}
