//! Auto-fix registry.
//!
//! Each auto-fixable rule is registered as a (matcher, transform) pair, so the
//! fix pass is a uniform lookup per violation rather than per-rule branching.

use procuresense_rules::{PatternMatcher, PolicyRuleSet, SpanFix};
use std::collections::HashMap;

/// A deterministic textual correction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixTransform {
    /// Delete every matched span.
    RemoveSpan,
    /// Replace every matched span with fixed text.
    ReplaceSpan(String),
    /// Append a missing clause template.
    AppendClause(String),
}

/// One registered fix.
#[derive(Debug, Clone)]
pub struct FixRule {
    rule_id: String,
    matcher: PatternMatcher,
    transform: FixTransform,
}

impl FixRule {
    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn transform(&self) -> &FixTransform {
        &self.transform
    }

    /// Apply the fix, returning the new text and a description of the change.
    pub fn apply(&self, text: &str) -> (String, String) {
        match &self.transform {
            FixTransform::RemoveSpan => {
                let count = self.matcher.spans(text).len();
                (
                    self.matcher.remove_all(text),
                    format!(
                        "[{}] removed {count} occurrence(s) of \"{}\"",
                        self.rule_id,
                        self.matcher.source()
                    ),
                )
            }
            FixTransform::ReplaceSpan(with) => {
                let count = self.matcher.spans(text).len();
                (
                    self.matcher.replace_all(text, with),
                    format!(
                        "[{}] replaced {count} occurrence(s) of \"{}\" with \"{with}\"",
                        self.rule_id,
                        self.matcher.source()
                    ),
                )
            }
            FixTransform::AppendClause(clause) => {
                let trimmed = text.trim_end();
                let revised = if trimmed.is_empty() {
                    clause.clone()
                } else {
                    format!("{trimmed}\n\n{clause}")
                };
                (
                    revised,
                    format!("[{}] appended clause: {clause}", self.rule_id),
                )
            }
        }
    }
}

/// Fixes keyed by rule id.
#[derive(Debug, Clone, Default)]
pub struct FixRegistry {
    fixes: HashMap<String, FixRule>,
}

impl FixRegistry {
    /// Register every rule in `rules` that carries a safe fix.
    pub fn from_rules(rules: &PolicyRuleSet) -> Self {
        let mut fixes = HashMap::new();

        for p in rules.prohibited() {
            let transform = match &p.rule().fix {
                Some(SpanFix::Remove) => FixTransform::RemoveSpan,
                Some(SpanFix::Replace { with }) => FixTransform::ReplaceSpan(with.clone()),
                None => continue,
            };
            fixes.insert(
                p.id().to_string(),
                FixRule {
                    rule_id: p.id().to_string(),
                    matcher: p.matcher().clone(),
                    transform,
                },
            );
        }

        for r in rules.required().iter().filter(|r| r.rule().auto_fixable()) {
            fixes.insert(
                r.id().to_string(),
                FixRule {
                    rule_id: r.id().to_string(),
                    matcher: r.matcher().clone(),
                    transform: FixTransform::AppendClause(r.rule().clause.clone()),
                },
            );
        }

        Self { fixes }
    }

    pub fn get(&self, rule_id: &str) -> Option<&FixRule> {
        self.fixes.get(rule_id)
    }

    pub fn contains(&self, rule_id: &str) -> bool {
        self.fixes.contains_key(rule_id)
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }
}
