//! Priority-ordered pruning.
//!
//! Tiers are resolved in fixed order: ephemeral tool data first, then task
//! session, then domain strategy. Global policy is never entered. After each
//! tier the aggregate is re-measured and pruning stops as soon as the whole
//! context fits its total budget.

use crate::layer::{Fragment, LayeredContext};
use crate::metadata::{DropInfo, PruneWarning};
use procuresense_core::Tier;
use tracing::{debug, info, warn};

/// Removes or compresses lower-priority content until a context fits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextPruner;

impl ContextPruner {
    pub fn new() -> Self {
        Self
    }

    /// Prune `context` until it fits its total budget.
    ///
    /// Returns the context unchanged when it already fits. A tier that still
    /// exceeds its ceiling after its strategy is exhausted is accepted with a
    /// [`PruneWarning`].
    pub fn prune(&self, mut context: LayeredContext) -> LayeredContext {
        let total_budget = context.total_budget();
        let before = context.total_tokens();
        if before <= total_budget {
            return context;
        }

        for tier in Tier::PRUNE_ORDER {
            let aggregate = context.total_tokens();
            if aggregate <= total_budget {
                debug!(tier = %tier, aggregate, total_budget, "Aggregate fits, stopping early");
                break;
            }
            match tier {
                Tier::EphemeralTool => Self::clear_ephemeral(&mut context),
                Tier::TaskSession => Self::trim_session(&mut context),
                Tier::DomainStrategy => Self::summarize_domain(&mut context),
                Tier::GlobalPolicy => continue,
            }
            Self::check_residual(&mut context, tier);
        }

        info!(
            before,
            after = context.total_tokens(),
            total_budget,
            drops = context.drops().len(),
            warnings = context.warnings().len(),
            "Pruned layered context"
        );
        context
    }

    /// Ephemeral tool payloads are one-shot and re-fetchable: evict oldest
    /// first until the tier is empty.
    fn clear_ephemeral(context: &mut LayeredContext) {
        let layer = context.layer_mut(Tier::EphemeralTool);
        let mut dropped = 0;
        let mut tokens_dropped = 0;
        while let Some(fragment) = layer.remove_oldest() {
            dropped += 1;
            tokens_dropped += fragment.tokens();
        }
        if dropped > 0 {
            debug!(tier = %Tier::EphemeralTool, dropped, tokens_dropped, "Cleared tool data");
            context.record_drop(DropInfo {
                tier: Tier::EphemeralTool,
                items_dropped: dropped,
                tokens_dropped,
                reason: "Tool payloads cleared under budget pressure".into(),
            });
        }
    }

    /// Drop the oldest session turns while the tier is over its ceiling,
    /// never the newest one, and leave a marker where they were.
    fn trim_session(context: &mut LayeredContext) {
        let layer = context.layer_mut(Tier::TaskSession);
        let mut dropped = 0;
        let mut tokens_dropped = 0;
        while layer.over_budget() && layer.len() > 1 {
            if let Some(fragment) = layer.remove_oldest() {
                dropped += 1;
                tokens_dropped += fragment.tokens();
            }
        }
        if dropped == 0 {
            return;
        }

        let marker = layer.measure(session_marker(dropped));
        if layer.current_tokens() + marker.tokens() <= layer.token_budget() {
            tokens_dropped = tokens_dropped.saturating_sub(marker.tokens());
            layer.push_front(marker);
        }
        debug!(tier = %Tier::TaskSession, dropped, tokens_dropped, "Dropped oldest session turns");
        context.record_drop(DropInfo {
            tier: Tier::TaskSession,
            items_dropped: dropped,
            tokens_dropped,
            reason: "Oldest turns dropped".into(),
        });
    }

    /// Replace the playbooks with one condensed fragment built from their
    /// lead sentences, trimming trailing entries until it fits. Playbooks
    /// with no lead sentence at all are evicted instead.
    fn summarize_domain(context: &mut LayeredContext) {
        let layer = context.layer_mut(Tier::DomainStrategy);
        if !layer.over_budget() {
            return;
        }

        let before_tokens = layer.current_tokens();
        let original_count = layer.len();
        let mut leads: Vec<&str> = layer
            .texts()
            .map(lead_sentence)
            .filter(|s| !s.is_empty())
            .collect();
        if leads.is_empty() {
            Self::evict_domain(context);
            return;
        }

        let mut summary: Fragment = layer.measure(leads.join(" "));
        while summary.tokens() > layer.token_budget() && leads.len() > 1 {
            leads.pop();
            summary = layer.measure(leads.join(" "));
        }
        let kept = leads.len();
        layer.replace_fragments(vec![summary]);

        let tokens_dropped = before_tokens.saturating_sub(layer.current_tokens());
        debug!(
            tier = %Tier::DomainStrategy,
            original_count,
            kept,
            tokens_dropped,
            "Summarized domain strategy"
        );
        context.record_drop(DropInfo {
            tier: Tier::DomainStrategy,
            items_dropped: original_count,
            tokens_dropped,
            reason: format!("Condensed to lead sentences of {kept} of {original_count} entries"),
        });
    }

    /// Nothing to condense: drop the oldest playbooks until the tier fits.
    fn evict_domain(context: &mut LayeredContext) {
        let layer = context.layer_mut(Tier::DomainStrategy);
        let mut dropped = 0;
        let mut tokens_dropped = 0;
        while layer.over_budget() {
            let Some(fragment) = layer.remove_oldest() else {
                break;
            };
            dropped += 1;
            tokens_dropped += fragment.tokens();
        }
        if dropped == 0 {
            return;
        }
        debug!(tier = %Tier::DomainStrategy, dropped, tokens_dropped, "Evicted blank domain entries");
        context.record_drop(DropInfo {
            tier: Tier::DomainStrategy,
            items_dropped: dropped,
            tokens_dropped,
            reason: "No lead sentences to condense; oldest entries dropped".into(),
        });
    }

    fn check_residual(context: &mut LayeredContext, tier: Tier) {
        let layer = context.layer(tier);
        if !layer.over_budget() {
            return;
        }
        let tokens = layer.current_tokens();
        let budget = layer.token_budget();
        let largest = layer.fragments().iter().map(Fragment::tokens).max().unwrap_or(0);
        let cause = if largest > budget {
            format!("a single fragment of {largest} tokens exceeds the tier")
        } else {
            "its pruning strategy cannot reduce it further".to_string()
        };
        warn!(tier = %tier, tokens, budget, largest, "Tier remains over budget after pruning");
        context.record_warning(PruneWarning {
            tier,
            tokens,
            budget,
            message: format!("{tier} holds {tokens} tokens against a ceiling of {budget}; {cause}"),
        });
    }
}

fn session_marker(dropped: usize) -> String {
    if dropped == 1 {
        "[1 earlier session turn omitted]".into()
    } else {
        format!("[{dropped} earlier session turns omitted]")
    }
}

/// First sentence of a fragment: up to the first line break or the first
/// `.`, `!` or `?` followed by whitespace.
fn lead_sentence(text: &str) -> &str {
    let text = text.trim();
    let line = text.lines().next().unwrap_or_default();
    let mut chars = line.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?')
            && chars.peek().is_some_and(|&(_, next)| next.is_whitespace())
        {
            return &line[..i + c.len_utf8()];
        }
    }
    line.trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::BudgetAllocator;
    use crate::token::ByteTokenCounter;
    use std::sync::Arc;

    /// 4 bytes per token under the default counter.
    fn text_of(tokens: usize, fill: char) -> String {
        fill.to_string().repeat(tokens * 4)
    }

    fn context(total: i64) -> LayeredContext {
        LayeredContext::new(
            BudgetAllocator::allocate(total).unwrap(),
            Arc::new(ByteTokenCounter),
        )
    }

    #[test]
    fn fitting_context_is_untouched() {
        let mut ctx = context(1000);
        ctx.add(Tier::TaskSession, text_of(100, 's'));
        let pruned = ContextPruner::new().prune(ctx);
        assert_eq!(pruned.layer(Tier::TaskSession).len(), 1);
        assert!(pruned.drops().is_empty());
    }

    #[test]
    fn ephemeral_cleared_first_and_others_untouched() {
        // Ceilings for 1000: 250 / 250 / 400 / 100.
        let mut ctx = context(1000);
        ctx.add(Tier::GlobalPolicy, text_of(240, 'g'));
        ctx.add(Tier::DomainStrategy, text_of(250, 'd'));
        ctx.add(Tier::TaskSession, text_of(200, 's'));
        ctx.add(Tier::TaskSession, text_of(200, 't'));
        ctx.add(Tier::EphemeralTool, text_of(60, 'e'));
        ctx.add(Tier::EphemeralTool, text_of(60, 'f'));
        // 1010 in total, 890 without tool data.
        assert_eq!(ctx.total_tokens(), 1010);

        let session_before = ctx.layer(Tier::TaskSession).fragments().to_vec();
        let domain_before = ctx.layer(Tier::DomainStrategy).fragments().to_vec();

        let pruned = ContextPruner::new().prune(ctx);
        assert!(pruned.layer(Tier::EphemeralTool).is_empty());
        assert_eq!(pruned.layer(Tier::TaskSession).fragments(), &session_before[..]);
        assert_eq!(pruned.layer(Tier::DomainStrategy).fragments(), &domain_before[..]);
        assert!(pruned.within_budget());
        assert_eq!(pruned.drops().len(), 1);
        assert_eq!(pruned.drops()[0].tier, Tier::EphemeralTool);
        assert_eq!(pruned.drops()[0].items_dropped, 2);
    }

    #[test]
    fn ephemeral_cleared_even_when_within_its_own_ceiling() {
        let mut ctx = context(1000);
        ctx.add(Tier::TaskSession, text_of(380, 's'));
        ctx.add(Tier::TaskSession, text_of(380, 't'));
        ctx.add(Tier::EphemeralTool, text_of(50, 'e'));
        ctx.add(Tier::DomainStrategy, text_of(200, 'd'));
        // 1010 > 1000; without tool data 960 fits.
        let pruned = ContextPruner::new().prune(ctx);
        assert!(pruned.layer(Tier::EphemeralTool).is_empty());
        assert_eq!(pruned.layer(Tier::TaskSession).len(), 2);
    }

    #[test]
    fn global_policy_is_never_touched() {
        let mut ctx = context(400);
        for i in 0..5 {
            ctx.add(Tier::GlobalPolicy, format!("POLICY {i}: {}", text_of(15, 'g')));
        }
        for _ in 0..10 {
            ctx.add(Tier::DomainStrategy, text_of(40, 'd'));
            ctx.add(Tier::TaskSession, text_of(40, 's'));
            ctx.add(Tier::EphemeralTool, text_of(40, 'e'));
        }
        let policy_before = ctx.layer(Tier::GlobalPolicy).fragments().to_vec();

        let pruned = ContextPruner::new().prune(ctx);
        assert_eq!(pruned.layer(Tier::GlobalPolicy).fragments(), &policy_before[..]);
        assert!(pruned.within_budget());
    }

    #[test]
    fn session_keeps_newest_and_leaves_marker() {
        // Ceilings for 500: session 200. Each turn is 62 tokens.
        let mut ctx = context(500);
        ctx.add(Tier::GlobalPolicy, text_of(120, 'g'));
        ctx.add(Tier::DomainStrategy, text_of(20, 'd'));
        for i in 0..6 {
            ctx.add(Tier::TaskSession, format!("turn {i}: {}", text_of(60, 's')));
        }
        let pruned = ContextPruner::new().prune(ctx);
        let session = pruned.layer(Tier::TaskSession);
        assert!(session.current_tokens() <= session.token_budget());
        let last = session.fragments().last().unwrap().text();
        assert!(last.starts_with("turn 5:"));
        assert!(session.fragments()[0].text().contains("earlier session turns omitted"));

        let drop = pruned.drops().iter().find(|d| d.tier == Tier::TaskSession).unwrap();
        assert_eq!(drop.items_dropped, 3);
    }

    #[test]
    fn oversized_newest_turn_is_soft_warning() {
        let mut ctx = context(100);
        ctx.add(Tier::TaskSession, text_of(10, 'a'));
        ctx.add(Tier::TaskSession, text_of(120, 'b'));

        let pruned = ContextPruner::new().prune(ctx);
        let session = pruned.layer(Tier::TaskSession);
        assert_eq!(session.len(), 1);
        assert!(session.fragments()[0].text().starts_with('b'));
        assert_eq!(pruned.warnings().len(), 1);
        assert_eq!(pruned.warnings()[0].tier, Tier::TaskSession);
    }

    #[test]
    fn domain_is_summarized_to_lead_sentences() {
        // Ceilings for 200: domain 50, session 80.
        let mut ctx = context(200);
        ctx.add(Tier::TaskSession, text_of(80, 's'));
        ctx.add(
            Tier::DomainStrategy,
            format!("Prefer preferred vendors. {}", text_of(40, 'x')),
        );
        ctx.add(
            Tier::DomainStrategy,
            format!("Consolidate SaaS spend! {}", text_of(40, 'y')),
        );
        ctx.add(Tier::GlobalPolicy, text_of(30, 'g'));

        let pruned = ContextPruner::new().prune(ctx);
        let domain = pruned.layer(Tier::DomainStrategy);
        assert_eq!(domain.len(), 1);
        assert_eq!(
            domain.fragments()[0].text(),
            "Prefer preferred vendors. Consolidate SaaS spend!"
        );
        assert!(pruned.within_budget());
        assert!(pruned.drops().iter().any(|d| d.tier == Tier::DomainStrategy));
    }

    #[test]
    fn domain_summary_trims_trailing_entries() {
        // Ceilings for 40: domain 10.
        let mut ctx = context(40);
        ctx.add(Tier::DomainStrategy, "Alpha rule holds for every region.");
        ctx.add(Tier::DomainStrategy, "Beta applies in the north.");
        ctx.add(Tier::DomainStrategy, "Gamma covers the rest of the world.");
        ctx.add(Tier::TaskSession, text_of(16, 's'));
        ctx.add(Tier::GlobalPolicy, text_of(10, 'g'));

        let pruned = ContextPruner::new().prune(ctx);
        let domain = pruned.layer(Tier::DomainStrategy);
        assert_eq!(domain.len(), 1);
        assert_eq!(domain.fragments()[0].text(), "Alpha rule holds for every region.");
        assert!(domain.current_tokens() <= domain.token_budget());
    }

    #[test]
    fn blank_domain_entries_are_evicted() {
        // Ceilings for 200: policy 50, domain 50, session 80.
        let mut ctx = context(200);
        ctx.add(Tier::GlobalPolicy, text_of(50, 'g'));
        for _ in 0..3 {
            ctx.add(Tier::DomainStrategy, text_of(30, ' '));
        }
        ctx.add(Tier::TaskSession, text_of(80, 's'));
        assert_eq!(ctx.total_tokens(), 220);

        let pruned = ContextPruner::new().prune(ctx);
        let domain = pruned.layer(Tier::DomainStrategy);
        assert!(domain.current_tokens() <= domain.token_budget());
        assert_eq!(domain.len(), 1);
        assert!(pruned.within_budget());
        assert!(pruned.warnings().is_empty());

        let drop = pruned.drops().iter().find(|d| d.tier == Tier::DomainStrategy).unwrap();
        assert_eq!(drop.items_dropped, 2);
        assert_eq!(drop.tokens_dropped, 60);
    }

    #[test]
    fn residual_warning_names_its_cause() {
        // Ceilings for 100: domain 25. One lead sentence alone is 31 tokens.
        let mut ctx = context(100);
        for _ in 0..2 {
            ctx.add(Tier::DomainStrategy, format!("{}. More detail.", text_of(30, 'd')));
        }
        ctx.add(Tier::TaskSession, text_of(40, 's'));
        ctx.add(Tier::GlobalPolicy, text_of(25, 'g'));

        let pruned = ContextPruner::new().prune(ctx);
        let warning = pruned
            .warnings()
            .iter()
            .find(|w| w.tier == Tier::DomainStrategy)
            .unwrap();
        assert!(warning.message.contains("a single fragment of 31 tokens exceeds the tier"));
    }

    #[test]
    fn lead_sentence_rules() {
        assert_eq!(lead_sentence("One. Two."), "One.");
        assert_eq!(lead_sentence("v1.2 is current. Next"), "v1.2 is current.");
        assert_eq!(lead_sentence("first line\nsecond line"), "first line");
        assert_eq!(lead_sentence("no terminator"), "no terminator");
        assert_eq!(lead_sentence("   "), "");
    }
}
