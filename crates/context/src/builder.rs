//! Composes allocation, population and pruning into one budget-compliant
//! build.

use crate::budget::{BudgetAllocator, TierBudgets};
use crate::layer::LayeredContext;
use crate::pruner::ContextPruner;
use crate::token::ByteTokenCounter;
use procuresense_core::{ContextError, Tier, TokenCounter};
use procuresense_rules::PolicyRuleSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of a successful [`LayeredContextBuilder::preflight`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preflight {
    pub budgets: TierBudgets,
    /// Tokens the rendered ruleset takes, measured by the builder's counter.
    pub policy_tokens: usize,
}

/// Builds a [`LayeredContext`] from raw request material.
///
/// Stateless apart from the shared token counter; create one at startup and
/// reuse it across requests.
#[derive(Debug, Clone)]
pub struct LayeredContextBuilder {
    counter: Arc<dyn TokenCounter>,
    pruner: ContextPruner,
}

impl Default for LayeredContextBuilder {
    fn default() -> Self {
        Self::new(Arc::new(ByteTokenCounter))
    }
}

impl LayeredContextBuilder {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            counter,
            pruner: ContextPruner::new(),
        }
    }

    pub fn counter(&self) -> &Arc<dyn TokenCounter> {
        &self.counter
    }

    /// Startup check: the rendered ruleset must fit the global policy share
    /// of `total_budget`.
    ///
    /// Run once at process start so a misconfigured ruleset halts the
    /// process instead of failing every request.
    pub fn preflight(
        &self,
        rule_set: &PolicyRuleSet,
        total_budget: i64,
    ) -> Result<Preflight, ContextError> {
        let budgets = BudgetAllocator::allocate(total_budget)?;
        let policy_tokens: usize = rule_set
            .policy_fragments()
            .iter()
            .map(|f| self.counter.estimate(f))
            .sum();
        check_policy_fits(policy_tokens, &budgets)?;
        debug!(
            policy_tokens,
            allocation = budgets[Tier::GlobalPolicy],
            "Policy tier fits its allocation"
        );
        Ok(Preflight {
            budgets,
            policy_tokens,
        })
    }

    /// Populate the four tiers and prune them to `total_budget`.
    ///
    /// The only failure besides a non-positive budget is a ruleset that
    /// alone overflows the global policy allocation; every other overflow is
    /// resolved by pruning.
    pub fn build(
        &self,
        rule_set: &PolicyRuleSet,
        domain_material: &[impl AsRef<str>],
        session_history: &[impl AsRef<str>],
        ephemeral_payloads: &[impl AsRef<str>],
        total_budget: i64,
    ) -> Result<LayeredContext, ContextError> {
        let budgets = BudgetAllocator::allocate(total_budget)?;
        let mut context = LayeredContext::new(budgets, Arc::clone(&self.counter));

        for fragment in rule_set.policy_fragments() {
            context.add(Tier::GlobalPolicy, fragment);
        }
        check_policy_fits(context.layer(Tier::GlobalPolicy).current_tokens(), &budgets)?;

        for text in domain_material {
            context.add(Tier::DomainStrategy, text.as_ref());
        }
        for text in session_history {
            context.add(Tier::TaskSession, text.as_ref());
        }
        for text in ephemeral_payloads {
            context.add(Tier::EphemeralTool, text.as_ref());
        }

        let assembled = context.total_tokens();
        if !context.within_budget() {
            context = self.pruner.prune(context);
        }

        info!(
            total_budget,
            assembled,
            final_tokens = context.total_tokens(),
            warnings = context.warnings().len(),
            "Built layered context"
        );
        Ok(context)
    }
}

fn check_policy_fits(required: usize, budgets: &TierBudgets) -> Result<(), ContextError> {
    let allocated = budgets[Tier::GlobalPolicy];
    if required > allocated {
        return Err(ContextError::PolicyMisconfiguration {
            tier: Tier::GlobalPolicy,
            required_tokens: required,
            allocated_tokens: allocated,
            total_budget: budgets.total(),
        });
    }
    Ok(())
}
