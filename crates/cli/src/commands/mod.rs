//! Subcommand implementations and the engine they share.

pub mod allocate;
pub mod batch;
pub mod context;
pub mod init;
pub mod rules;
pub mod validate;

use procuresense_config::AppConfig;
use procuresense_context::{LayeredContext, LayeredContextBuilder};
use procuresense_critic::PolicyCritic;
use procuresense_rules::PolicyRuleSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Fragment sources for the three prunable tiers.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ContextInputs {
    /// Domain strategy fragments (JSON array of strings, or one per line)
    #[arg(long)]
    pub domain: Option<PathBuf>,

    /// Session history, oldest first
    #[arg(long)]
    pub session: Option<PathBuf>,

    /// Ephemeral tool payloads
    #[arg(long)]
    pub tools: Option<PathBuf>,
}

impl ContextInputs {
    pub fn load(&self) -> Result<Fragments, BoxError> {
        Ok(Fragments {
            domain: read_fragments(self.domain.as_deref())?,
            session: read_fragments(self.session.as_deref())?,
            tools: read_fragments(self.tools.as_deref())?,
        })
    }
}

/// Loaded fragment text per prunable tier.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Fragments {
    #[serde(default)]
    pub domain: Vec<String>,
    #[serde(default)]
    pub session: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
}

/// Ruleset, builder and critic, created once and shared by every request.
#[derive(Debug, Clone)]
pub struct Engine {
    pub total_budget: i64,
    pub rules: Arc<PolicyRuleSet>,
    pub builder: LayeredContextBuilder,
    pub critic: PolicyCritic,
}

impl Engine {
    /// Load the configured ruleset and verify it fits the policy tier.
    ///
    /// A ruleset too large for its allocation is fatal here rather than on
    /// every request.
    pub fn load(config: &AppConfig) -> Result<Self, BoxError> {
        let rules = load_rules(config, None)?;
        let builder = LayeredContextBuilder::default();
        let preflight = builder.preflight(&rules, config.context.total_budget)?;
        info!(
            rules = rules.rule_count(),
            total_budget = preflight.budgets.total(),
            policy_tokens = preflight.policy_tokens,
            auto_revision = config.critic.auto_revision,
            "Engine ready"
        );

        let rules = Arc::new(rules);
        let critic =
            PolicyCritic::new(Arc::clone(&rules)).with_auto_revision(config.critic.auto_revision);
        Ok(Self {
            total_budget: config.context.total_budget,
            rules,
            builder,
            critic,
        })
    }

    pub fn build_context(&self, fragments: &Fragments) -> Result<LayeredContext, BoxError> {
        Ok(self.builder.build(
            &self.rules,
            &fragments.domain,
            &fragments.session,
            &fragments.tools,
            self.total_budget,
        )?)
    }
}

/// `file` wins over the configured ruleset; the built-in one is the fallback.
pub fn load_rules(config: &AppConfig, file: Option<&Path>) -> Result<PolicyRuleSet, BoxError> {
    let rules = match file.or(config.policy.rules_file.as_deref()) {
        Some(path) => PolicyRuleSet::load(path)?,
        None => PolicyRuleSet::default_enterprise()?,
    };
    Ok(rules)
}

/// Read a fragment file: a JSON array of strings, or one fragment per
/// non-empty line.
pub fn read_fragments(path: Option<&Path>) -> Result<Vec<String>, BoxError> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    Ok(parse_fragments(&content)?)
}

fn parse_fragments(content: &str) -> Result<Vec<String>, serde_json::Error> {
    if content.trim_start().starts_with('[') {
        return serde_json::from_str(content);
    }
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}
