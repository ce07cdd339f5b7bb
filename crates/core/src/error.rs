//! Error types for the ProcureSense engine.
//!
//! Uses `thiserror` for ergonomic error definitions. Budget pressure and
//! policy violations are routine outcomes and never appear here; these
//! variants cover caller mistakes and misconfiguration only.

use crate::tier::Tier;
use thiserror::Error;

/// Errors raised while budgeting or building a layered context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The requested total budget was zero or negative.
    #[error("Invalid budget: total budget must be positive, got {requested}")]
    InvalidBudget { requested: i64 },

    /// The pinned tier alone exceeds its own allocation. Fatal at startup.
    #[error(
        "Policy misconfiguration: {tier} needs {required_tokens} tokens but its allocation is {allocated_tokens} (total budget {total_budget})"
    )]
    PolicyMisconfiguration {
        tier: Tier,
        required_tokens: usize,
        allocated_tokens: usize,
        total_budget: usize,
    },
}

/// Errors raised while reading a request payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("Malformed payload: field '{field}' {reason}")]
    MalformedPayload { field: String, reason: String },
}

impl PayloadError {
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_budget_displays_value() {
        let err = ContextError::InvalidBudget { requested: -5 };
        assert!(err.to_string().contains("-5"));
    }

    #[test]
    fn misconfiguration_names_tier() {
        let err = ContextError::PolicyMisconfiguration {
            tier: Tier::GlobalPolicy,
            required_tokens: 700,
            allocated_tokens: 500,
            total_budget: 2000,
        };
        let msg = err.to_string();
        assert!(msg.contains("global_policy"));
        assert!(msg.contains("700"));
        assert!(msg.contains("500"));
    }

    #[test]
    fn malformed_payload_names_field() {
        let err = PayloadError::malformed("discount_pct", "is not a number");
        assert!(err.to_string().contains("'discount_pct' is not a number"));
    }
}
