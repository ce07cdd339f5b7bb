//! `procuresense rules`: inspect the active ruleset.

use super::{BoxError, load_rules};
use procuresense_config::AppConfig;
use procuresense_context::{LayeredContextBuilder, Preflight};
use procuresense_core::Tier;
use std::path::Path;

/// List every rule in the active ruleset.
pub fn list(config: &AppConfig) -> Result<(), BoxError> {
    let rules = load_rules(config, None)?;

    println!("Policy ruleset ({} rules):\n", rules.rule_count());
    for statement in rules.statements() {
        println!("  POLICY      {statement}");
    }
    for p in rules.prohibited() {
        let rule = p.rule();
        let fix = if rule.fix.is_some() { "auto-fix" } else { "no fix" };
        println!("  PROHIBITED  {} [{}, {fix}]", rule.id, rule.severity);
        println!("              pattern: {}", rule.pattern);
    }
    for r in rules.required() {
        let rule = r.rule();
        let fix = if rule.auto_fixable() { "auto-fix" } else { "no fix" };
        println!("  REQUIRED    {} [{}, {fix}]", rule.id, rule.severity);
        println!("              pattern: {}", rule.pattern);
        if !rule.when.is_empty() {
            println!("              when: {}", rule.when);
        }
    }
    for t in rules.thresholds() {
        let rule = t.rule();
        println!("  THRESHOLD   {} [{}]", rule.id, rule.severity);
        println!("              {}", t.describe());
        if !rule.when.is_empty() {
            println!("              when: {}", rule.when);
        }
        if !rule.extract.is_empty() {
            println!("              from text: {}", rule.extract);
        }
    }
    Ok(())
}

/// Compile a ruleset and check it fits the configured policy allocation.
pub fn check(config: &AppConfig, file: Option<&Path>) -> Result<(), BoxError> {
    let rules = match load_rules(config, file) {
        Ok(rules) => rules,
        Err(e) => {
            eprintln!("Ruleset invalid: {e}");
            std::process::exit(1);
        }
    };

    match LayeredContextBuilder::default().preflight(&rules, config.context.total_budget) {
        Ok(preflight) => println!("{}", fit_summary(rules.rule_count(), &preflight)),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
    Ok(())
}

fn fit_summary(rule_count: usize, preflight: &Preflight) -> String {
    format!(
        "All {rule_count} rules are valid. Policy tier uses {} of {} tokens.",
        preflight.policy_tokens,
        preflight.budgets[Tier::GlobalPolicy]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use procuresense_rules::PolicyRuleSet;

    #[test]
    fn summary_reports_policy_usage() {
        let rules = PolicyRuleSet::default_enterprise().unwrap();
        let preflight = LayeredContextBuilder::default().preflight(&rules, 2000).unwrap();
        let summary = fit_summary(rules.rule_count(), &preflight);
        assert!(summary.starts_with("All 13 rules are valid."));
        assert!(summary.ends_with(&format!("uses {} of 500 tokens.", preflight.policy_tokens)));
        assert!(preflight.policy_tokens > 0);
    }
}
