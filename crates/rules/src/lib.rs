//! Enterprise policy ruleset: the organization's non-negotiable constraints.
//!
//! A [`PolicyRuleSet`] is loaded once at process start (from TOML or the
//! built-in defaults) and is read-only afterwards. It carries three kinds of
//! rules:
//!
//! - **prohibited** patterns: presence of any is a violation
//! - **required** patterns: absence of an applicable one is a violation
//! - **thresholds**: numeric limits over request payload fields, falling back
//!   to a value stated in the candidate text
//!
//! # Example Ruleset
//!
//! ```toml
//! statements = ["Liability caps must not exceed 2x annual contract value"]
//!
//! [[prohibited]]
//! id = "no-hold-harmless"
//! pattern = "hold harmless"
//! fix = { action = "replace", with = "[REMOVED: PROHIBITED CLAUSE]" }
//!
//! [[required]]
//! id = "warranty-on-discount"
//! pattern = 'warrant(?:y|ies)'
//! regex = true
//! when = "payload.discount_pct > 15"
//! clause = "WARRANTY: Vendor provides standard warranty coverage."
//!
//! [[thresholds]]
//! id = "max-discount"
//! field = "discount_pct"
//! comparator = "lte"
//! limit = 25.0
//! ```

mod condition;
mod defaults;
mod matcher;
mod model;

pub use condition::{Condition, EvalContext, parse_condition};
pub use defaults::DEFAULT_RULES_TOML;
pub use matcher::PatternMatcher;
pub use model::{
    Comparator, Observed, PolicyRuleSet, ProhibitedPattern, ProhibitedRule, RequiredPattern,
    RequiredRule, RuleSetDocument, Severity, SpanFix, ThresholdCheck, ThresholdRule, ValueSource,
    Variance,
};

/// Re-export for convenience.
pub type RuleResult<T> = std::result::Result<T, RuleError>;

/// Errors from loading or compiling a ruleset.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("invalid rule '{id}': {reason}")]
    InvalidRule { id: String, reason: String },

    #[error("invalid pattern in rule '{id}': {detail}")]
    InvalidPattern { id: String, detail: String },

    #[error("condition parse error in rule '{id}': {detail}")]
    ConditionParse { id: String, detail: String },

    #[error("rule file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}
