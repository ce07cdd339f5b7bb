//! Built-in enterprise ruleset used when no rules file is configured.

/// The default procurement policy, in the same TOML format as a rules file.
pub const DEFAULT_RULES_TOML: &str = r#"
statements = [
    "Liability caps must not exceed 2x annual contract value.",
    "Every vendor engagement above 15% discount carries standard warranty coverage.",
    "Budget variance above 15% of the current budget requires finance approval.",
    "Spend per request is capped by category: software 50000, hardware 100000, services 25000.",
    "Vendors must pass security and compliance review before onboarding.",
]

[[prohibited]]
id = "no-unlimited-liability"
pattern = "unlimited liability"
severity = "critical"

[[prohibited]]
id = "no-indemnification"
pattern = 'indemnif(?:y|ies|ication)'
regex = true
severity = "high"
fix = { action = "replace", with = "[REMOVED: PROHIBITED CLAUSE]" }

[[prohibited]]
id = "no-hold-harmless"
pattern = "hold harmless"
severity = "high"
fix = { action = "replace", with = "[REMOVED: PROHIBITED CLAUSE]" }

[[prohibited]]
id = "no-liability-waiver"
pattern = 'waive[sd]?\s+(?:all\s+)?liabilit(?:y|ies)'
regex = true
severity = "medium"
fix = { action = "remove" }

[[prohibited]]
id = "no-rights-waiver"
pattern = 'waive[sd]?\s+(?:\w+\s+){0,3}rights'
regex = true
severity = "high"
fix = { action = "replace", with = "[REMOVED: PROHIBITED CLAUSE]" }

[[required]]
id = "warranty-on-discount"
pattern = 'warrant(?:y|ies)|guarantee'
regex = true
when = "payload.discount_pct > 15"
severity = "medium"
clause = "WARRANTY: Vendor provides standard warranty coverage for all delivered goods and services."

[[required]]
id = "data-protection"
pattern = 'data\s+protection'
regex = true
when = 'content MATCHES "(?i)personal\s+data"'
severity = "high"
clause = "DATA PROTECTION: Vendor shall process personal data only under the buyer's data protection terms."

[[required]]
id = "termination-rights"
pattern = 'terminat(?:e|es|ion)'
regex = true
when = 'content MATCHES "(?i)\b(?:contract|agreement)s?\b"'
severity = "medium"
clause = "TERMINATION: Buyer may terminate this agreement with 60 days' written notice."

[[thresholds]]
id = "max-discount"
field = "discount_pct"
comparator = "lte"
limit = 25.0
severity = "high"
extract = '(\d+(?:\.\d+)?)\s*%\s*discount|discount[^.%]*?(\d+(?:\.\d+)?)\s*%'

[[thresholds]]
id = "budget-variance"
field = "budget_variance_pct"
comparator = "lte"
limit = 15.0
severity = "high"
variance = { actual = "planned_spend", baseline = "current_budget" }

[[thresholds]]
id = "software-spend-cap"
field = "amount"
comparator = "lte"
limit = 50000.0
severity = "critical"
when = 'payload.category MATCHES "(?i)^software$"'
extract = '\$\s*(\d[\d,]*(?:\.\d+)?)'

[[thresholds]]
id = "hardware-spend-cap"
field = "amount"
comparator = "lte"
limit = 100000.0
severity = "critical"
when = 'payload.category MATCHES "(?i)^hardware$"'
extract = '\$\s*(\d[\d,]*(?:\.\d+)?)'

[[thresholds]]
id = "services-spend-cap"
field = "amount"
comparator = "lte"
limit = 25000.0
severity = "critical"
when = 'payload.category MATCHES "(?i)^services$"'
extract = '\$\s*(\d[\d,]*(?:\.\d+)?)'
"#;
