//! Ruleset data model: the TOML document and its compiled form.

use crate::condition::{Condition, EvalContext, parse_condition};
use crate::matcher::PatternMatcher;
use crate::{RuleError, RuleResult};
use procuresense_core::{PayloadError, RequestPayload};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// How serious a rule breach is. Drives the compliance score.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn weight(self) -> f64 {
        match self {
            Severity::Low => 0.1,
            Severity::Medium => 0.3,
            Severity::High => 0.6,
            Severity::Critical => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic correction for a prohibited span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SpanFix {
    /// Delete the offending span.
    Remove,
    /// Replace the offending span with fixed text.
    Replace { with: String },
}

/// A phrase or pattern that must never appear in the output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProhibitedRule {
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Literal phrase, or a regular expression when `regex = true`.
    pub pattern: String,

    #[serde(default)]
    pub regex: bool,

    #[serde(default)]
    pub severity: Severity,

    /// Absent means there is no safe automatic correction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<SpanFix>,
}

/// A clause that must appear whenever its condition applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequiredRule {
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    pub pattern: String,

    #[serde(default)]
    pub regex: bool,

    /// Applicability condition; empty means always required.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub when: String,

    /// Clause template appended when the pattern is missing.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub clause: String,

    #[serde(default)]
    pub severity: Severity,
}

impl RequiredRule {
    pub fn auto_fixable(&self) -> bool {
        !self.clause.trim().is_empty()
    }
}

/// Numeric comparison a threshold value must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Lte,
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Gte,
}

impl Comparator {
    /// Whether `value` satisfies the limit. Boundaries are exact.
    pub fn holds(self, value: f64, limit: f64) -> bool {
        match self {
            Comparator::Lt => value < limit,
            Comparator::Lte => value <= limit,
            Comparator::Gt => value > limit,
            Comparator::Gte => value >= limit,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Lte => "<=",
            Comparator::Gt => ">",
            Comparator::Gte => ">=",
        }
    }
}

/// Derive a percentage variance from two payload fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variance {
    pub actual: String,
    pub baseline: String,
}

/// A numeric limit over one request payload field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Payload field (dotted path) holding the value.
    pub field: String,

    pub comparator: Comparator,

    pub limit: f64,

    /// Missing field is malformed input instead of "not applicable".
    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub severity: Severity,

    /// Applicability condition; empty means the rule always applies.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub when: String,

    /// Fallback when `field` is absent: `(actual - baseline) / baseline * 100`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variance: Option<Variance>,

    /// Last resort: a regex whose first participating capture group reads
    /// the value from the candidate text. Thousands separators are ignored.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub extract: String,
}

impl ThresholdRule {
    pub fn is_breached(&self, value: f64) -> bool {
        !self.comparator.holds(value, self.limit)
    }

    /// Human-readable form, e.g. `discount_pct <= 25`.
    pub fn describe(&self) -> String {
        format!("{} {} {}", self.field, self.comparator.symbol(), self.limit)
    }
}

/// Where an observed threshold value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Payload,
    Derived,
    Text,
}

/// A value a threshold rule checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observed {
    pub value: f64,
    pub source: ValueSource,
}

/// A threshold rule with its compiled condition and extractor.
#[derive(Debug, Clone)]
pub struct ThresholdCheck {
    rule: ThresholdRule,
    condition: Condition,
    extract: Option<Regex>,
}

impl ThresholdCheck {
    pub fn id(&self) -> &str {
        &self.rule.id
    }

    pub fn rule(&self) -> &ThresholdRule {
        &self.rule
    }

    pub fn applies(&self, ctx: &EvalContext<'_>) -> bool {
        self.condition.evaluate(ctx)
    }

    /// The value this rule checks: the payload field, then the derived
    /// variance, then the candidate text.
    ///
    /// When the text states several values, the first one that breaches the
    /// limit is returned, else the first one. `Ok(None)` means the rule does
    /// not apply to this request.
    pub fn observe(
        &self,
        payload: &RequestPayload,
        text: &str,
    ) -> Result<Option<Observed>, PayloadError> {
        let rule = &self.rule;
        if let Some(value) = payload.number(&rule.field)? {
            return Ok(Some(Observed {
                value,
                source: ValueSource::Payload,
            }));
        }

        if let Some(variance) = &rule.variance {
            let actual = payload.number(&variance.actual)?;
            let baseline = payload.number(&variance.baseline)?;
            if let (Some(actual), Some(baseline)) = (actual, baseline) {
                if baseline == 0.0 {
                    return Err(PayloadError::malformed(
                        &variance.baseline,
                        format!("must be non-zero to derive '{}'", rule.field),
                    ));
                }
                return Ok(Some(Observed {
                    value: (actual - baseline) / baseline * 100.0,
                    source: ValueSource::Derived,
                }));
            }
        }

        if let Some(value) = self.extract_from(text) {
            return Ok(Some(Observed {
                value,
                source: ValueSource::Text,
            }));
        }

        if rule.required {
            return Err(PayloadError::malformed(
                &rule.field,
                format!("is required by threshold rule '{}' but missing", rule.id),
            ));
        }
        Ok(None)
    }

    fn extract_from(&self, text: &str) -> Option<f64> {
        let regex = self.extract.as_ref()?;
        let values: Vec<f64> = regex
            .captures_iter(text)
            .filter_map(|caps| {
                caps.iter()
                    .skip(1)
                    .flatten()
                    .next()
                    .and_then(|m| m.as_str().replace(',', "").parse::<f64>().ok())
                    .filter(|n| n.is_finite())
            })
            .collect();
        values
            .iter()
            .copied()
            .find(|v| self.rule.is_breached(*v))
            .or_else(|| values.first().copied())
    }

    pub fn is_breached(&self, value: f64) -> bool {
        self.rule.is_breached(value)
    }

    pub fn describe(&self) -> String {
        self.rule.describe()
    }
}

/// The ruleset as written on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSetDocument {
    /// Free-text enterprise guardrails (OKRs, caps) rendered into the policy tier.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prohibited: Vec<ProhibitedRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<RequiredRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thresholds: Vec<ThresholdRule>,
}

/// A prohibited rule with its compiled matcher.
#[derive(Debug, Clone)]
pub struct ProhibitedPattern {
    rule: ProhibitedRule,
    matcher: PatternMatcher,
}

impl ProhibitedPattern {
    pub fn id(&self) -> &str {
        &self.rule.id
    }

    pub fn rule(&self) -> &ProhibitedRule {
        &self.rule
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }
}

/// A required rule with its compiled matcher and condition.
#[derive(Debug, Clone)]
pub struct RequiredPattern {
    rule: RequiredRule,
    matcher: PatternMatcher,
    condition: Condition,
}

impl RequiredPattern {
    pub fn id(&self) -> &str {
        &self.rule.id
    }

    pub fn rule(&self) -> &RequiredRule {
        &self.rule
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    pub fn applies(&self, ctx: &EvalContext<'_>) -> bool {
        self.condition.evaluate(ctx)
    }

    pub fn is_present(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }
}

/// The compiled, read-only enterprise ruleset.
///
/// There are no mutation methods: build one at startup and share it as
/// `Arc<PolicyRuleSet>`.
#[derive(Debug, Clone)]
pub struct PolicyRuleSet {
    document: RuleSetDocument,
    prohibited: Vec<ProhibitedPattern>,
    required: Vec<RequiredPattern>,
    thresholds: Vec<ThresholdCheck>,
}

impl PolicyRuleSet {
    /// Validate and compile a ruleset document.
    pub fn compile(document: RuleSetDocument) -> RuleResult<Self> {
        let mut seen = HashSet::new();
        let ids = document
            .prohibited
            .iter()
            .map(|r| &r.id)
            .chain(document.required.iter().map(|r| &r.id))
            .chain(document.thresholds.iter().map(|r| &r.id));
        for id in ids {
            if id.trim().is_empty() {
                return Err(RuleError::InvalidRule {
                    id: "(empty)".into(),
                    reason: "rule id cannot be empty".into(),
                });
            }
            if !seen.insert(id.as_str()) {
                return Err(RuleError::InvalidRule {
                    id: id.clone(),
                    reason: "duplicate rule id".into(),
                });
            }
        }

        let prohibited = document
            .prohibited
            .iter()
            .map(|rule| {
                let matcher = PatternMatcher::new(&rule.pattern, rule.regex).map_err(|detail| {
                    RuleError::InvalidPattern {
                        id: rule.id.clone(),
                        detail,
                    }
                })?;
                Ok(ProhibitedPattern {
                    rule: rule.clone(),
                    matcher,
                })
            })
            .collect::<RuleResult<Vec<_>>>()?;

        let required = document
            .required
            .iter()
            .map(compile_required)
            .collect::<RuleResult<Vec<_>>>()?;

        let thresholds = document
            .thresholds
            .iter()
            .map(compile_threshold)
            .collect::<RuleResult<Vec<_>>>()?;

        // Fix output must never reintroduce a prohibited pattern.
        let inserted_texts = document
            .prohibited
            .iter()
            .filter_map(|r| match &r.fix {
                Some(SpanFix::Replace { with }) => Some((&r.id, with)),
                _ => None,
            })
            .chain(document.required.iter().map(|r| (&r.id, &r.clause)));
        for (id, text) in inserted_texts {
            if let Some(hit) = prohibited.iter().find(|p| p.matcher.is_match(text)) {
                return Err(RuleError::InvalidRule {
                    id: id.clone(),
                    reason: format!("fix text trips prohibited rule '{}'", hit.id()),
                });
            }
        }

        debug!(
            prohibited = prohibited.len(),
            required = required.len(),
            thresholds = thresholds.len(),
            "Compiled policy ruleset"
        );

        Ok(Self {
            document,
            prohibited,
            required,
            thresholds,
        })
    }

    /// Parse and compile a ruleset from TOML.
    pub fn from_toml(toml_str: &str) -> RuleResult<Self> {
        let document: RuleSetDocument = toml::from_str(toml_str)?;
        Self::compile(document)
    }

    /// Load a ruleset file.
    pub fn load(path: &Path) -> RuleResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let rule_set = Self::from_toml(&content)?;
        info!(
            path = %path.display(),
            rules = rule_set.rule_count(),
            "Loaded policy ruleset"
        );
        Ok(rule_set)
    }

    /// The built-in enterprise procurement ruleset.
    pub fn default_enterprise() -> RuleResult<Self> {
        Self::from_toml(crate::DEFAULT_RULES_TOML)
    }

    pub fn to_toml(&self) -> RuleResult<String> {
        Ok(toml::to_string_pretty(&self.document)?)
    }

    pub fn document(&self) -> &RuleSetDocument {
        &self.document
    }

    pub fn statements(&self) -> &[String] {
        &self.document.statements
    }

    pub fn prohibited(&self) -> &[ProhibitedPattern] {
        &self.prohibited
    }

    pub fn required(&self) -> &[RequiredPattern] {
        &self.required
    }

    pub fn thresholds(&self) -> &[ThresholdCheck] {
        &self.thresholds
    }

    pub fn rule_count(&self) -> usize {
        self.prohibited.len() + self.required.len() + self.thresholds.len()
    }

    /// Render the ruleset as GLOBAL_POLICY fragments, one per rule.
    ///
    /// Every rule fragment cites its id in brackets so validation evidence
    /// can be traced back to the rule.
    pub fn policy_fragments(&self) -> Vec<String> {
        let mut fragments: Vec<String> = self
            .document
            .statements
            .iter()
            .map(|s| format!("POLICY: {s}"))
            .collect();

        for p in &self.prohibited {
            let rule = &p.rule;
            fragments.push(if rule.description.is_empty() {
                format!("PROHIBITED [{}]: must not contain \"{}\"", rule.id, rule.pattern)
            } else {
                format!("PROHIBITED [{}]: {}", rule.id, rule.description)
            });
        }

        for r in &self.required {
            let rule = &r.rule;
            let mut line = if rule.description.is_empty() {
                format!("REQUIRED [{}]: must include \"{}\"", rule.id, rule.pattern)
            } else {
                format!("REQUIRED [{}]: {}", rule.id, rule.description)
            };
            if !rule.when.trim().is_empty() {
                line.push_str(&format!(" (when {})", rule.when.trim()));
            }
            fragments.push(line);
        }

        for t in &self.thresholds {
            let rule = &t.rule;
            let mut line = format!("THRESHOLD [{}]: {}", rule.id, rule.describe());
            if !rule.when.trim().is_empty() {
                line.push_str(&format!(" (when {})", rule.when.trim()));
            }
            fragments.push(line);
        }

        fragments
    }
}

fn compile_required(rule: &RequiredRule) -> RuleResult<RequiredPattern> {
    let matcher =
        PatternMatcher::new(&rule.pattern, rule.regex).map_err(|detail| RuleError::InvalidPattern {
            id: rule.id.clone(),
            detail,
        })?;
    let condition = parse_condition(&rule.when).map_err(|detail| RuleError::ConditionParse {
        id: rule.id.clone(),
        detail,
    })?;
    // An inserted clause that does not satisfy its own pattern could never
    // make the output compliant.
    if rule.auto_fixable() && !matcher.is_match(&rule.clause) {
        return Err(RuleError::InvalidRule {
            id: rule.id.clone(),
            reason: "clause does not match the rule's own pattern".into(),
        });
    }
    Ok(RequiredPattern {
        rule: rule.clone(),
        matcher,
        condition,
    })
}

fn compile_threshold(rule: &ThresholdRule) -> RuleResult<ThresholdCheck> {
    let invalid = |reason: &str| RuleError::InvalidRule {
        id: rule.id.clone(),
        reason: reason.into(),
    };
    if rule.field.trim().is_empty() {
        return Err(invalid("threshold field cannot be empty"));
    }
    if !rule.limit.is_finite() {
        return Err(invalid("threshold limit must be finite"));
    }
    if let Some(v) = &rule.variance {
        if v.actual.trim().is_empty() || v.baseline.trim().is_empty() {
            return Err(invalid("variance needs both actual and baseline fields"));
        }
    }

    let condition = parse_condition(&rule.when).map_err(|detail| RuleError::ConditionParse {
        id: rule.id.clone(),
        detail,
    })?;

    let extract = if rule.extract.trim().is_empty() {
        None
    } else {
        let pattern_error = |detail: String| RuleError::InvalidPattern {
            id: rule.id.clone(),
            detail,
        };
        let regex = Regex::new(&format!("(?i){}", rule.extract))
            .map_err(|e| pattern_error(e.to_string()))?;
        if regex.captures_len() < 2 {
            return Err(pattern_error(
                "extract pattern needs a capture group for the value".into(),
            ));
        }
        Some(regex)
    };

    Ok(ThresholdCheck {
        rule: rule.clone(),
        condition,
        extract,
    })
}
