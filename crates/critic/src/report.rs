//! Violations and the compliance report.

use chrono::{DateTime, Utc};
use procuresense_rules::Severity;
use serde::{Deserialize, Serialize};

/// What kind of rule a violation breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    ProhibitedPresent,
    RequiredMissing,
    ThresholdExceeded,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ViolationKind::ProhibitedPresent => "PROHIBITED_PRESENT",
            ViolationKind::RequiredMissing => "REQUIRED_MISSING",
            ViolationKind::ThresholdExceeded => "THRESHOLD_EXCEEDED",
        })
    }
}

/// A single rule breach found during the scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub kind: ViolationKind,
    pub detail: String,
    /// A deterministic, safe textual correction exists.
    pub auto_fixable: bool,
    pub severity: Severity,
    /// Evidence fragment citing the rule, if the context carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_reference: Option<String>,
}

/// Terminal classification of a validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    /// No violations found.
    Compliant,
    /// Every violation was fixed; the final text is the revision.
    Revised,
    /// At least one violation remains; the final text is the original.
    Flagged,
}

impl std::fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ComplianceStatus::Compliant => "COMPLIANT",
            ComplianceStatus::Revised => "REVISED",
            ComplianceStatus::Flagged => "FLAGGED",
        })
    }
}

/// Record of one validation pass. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    status: ComplianceStatus,
    violations: Vec<Violation>,
    fixes_applied: Vec<String>,
    final_text: String,
    compliance_score: f64,
    checks_performed: Vec<String>,
    unresolved: Vec<String>,
    validated_at: DateTime<Utc>,
}

impl ComplianceReport {
    pub(crate) fn new(
        status: ComplianceStatus,
        violations: Vec<Violation>,
        fixes_applied: Vec<String>,
        final_text: String,
        checks_performed: Vec<String>,
        unresolved: Vec<String>,
    ) -> Self {
        let compliance_score = compliance_score(&violations);
        Self {
            status,
            violations,
            fixes_applied,
            final_text,
            compliance_score,
            checks_performed,
            unresolved,
            validated_at: Utc::now(),
        }
    }

    pub fn status(&self) -> ComplianceStatus {
        self.status
    }

    /// Violations found by the scan of the original candidate, in rule order.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn fixes_applied(&self) -> &[String] {
        &self.fixes_applied
    }

    pub fn final_text(&self) -> &str {
        &self.final_text
    }

    /// `1 - Σweight / n` over the violations found, 1.0 when clean.
    pub fn compliance_score(&self) -> f64 {
        self.compliance_score
    }

    /// Ids of the rules evaluated in this pass.
    pub fn checks_performed(&self) -> &[String] {
        &self.checks_performed
    }

    /// Ids of the rules still violated when the pass ended FLAGGED.
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    pub fn validated_at(&self) -> DateTime<Utc> {
        self.validated_at
    }

    /// The final text may be shipped without human review.
    pub fn is_shippable(&self) -> bool {
        self.status != ComplianceStatus::Flagged
    }
}

fn compliance_score(violations: &[Violation]) -> f64 {
    if violations.is_empty() {
        return 1.0;
    }
    let total: f64 = violations.iter().map(|v| v.severity.weight()).sum();
    let score = (1.0 - total / violations.len() as f64).max(0.0);
    (score * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(severity: Severity) -> Violation {
        Violation {
            rule_id: "r".into(),
            kind: ViolationKind::ProhibitedPresent,
            detail: String::new(),
            auto_fixable: false,
            severity,
            policy_reference: None,
        }
    }

    #[test]
    fn clean_scores_one() {
        assert_eq!(compliance_score(&[]), 1.0);
    }

    #[test]
    fn score_weights_by_severity() {
        assert_eq!(compliance_score(&[violation(Severity::Critical)]), 0.0);
        assert_eq!(compliance_score(&[violation(Severity::Medium)]), 0.7);
        assert_eq!(
            compliance_score(&[violation(Severity::High), violation(Severity::Low)]),
            0.65
        );
    }

    #[test]
    fn status_serializes_screaming() {
        let json = serde_json::to_string(&ComplianceStatus::Revised).unwrap();
        assert_eq!(json, "\"REVISED\"");
        assert_eq!(ViolationKind::RequiredMissing.to_string(), "REQUIRED_MISSING");
    }

    #[test]
    fn report_serializes_fields() {
        let report = ComplianceReport::new(
            ComplianceStatus::Flagged,
            vec![violation(Severity::High)],
            vec![],
            "original".into(),
            vec!["r".into()],
            vec!["r".into()],
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "FLAGGED");
        assert_eq!(json["final_text"], "original");
        assert_eq!(json["violations"][0]["severity"], "high");
        assert!(json["validated_at"].is_string());
        assert!(!report.is_shippable());
    }
}
