//! Budgeted fragment collections and the four-tier context that owns them.

use crate::budget::TierBudgets;
use crate::metadata::{ContextMetadata, DropInfo, LayerStats, PruneWarning};
use procuresense_core::{Tier, TokenCounter};
use serde::Serialize;
use std::sync::Arc;

/// A text fragment with its token estimate cached at insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fragment {
    text: String,
    tokens: usize,
}

impl Fragment {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> usize {
        self.tokens
    }
}

/// One tier's fragments and ceiling.
///
/// `add` never drops content; overflow is resolved only by
/// [`ContextPruner`](crate::ContextPruner).
#[derive(Debug, Clone)]
pub struct ContextLayer {
    tier: Tier,
    fragments: Vec<Fragment>,
    token_budget: usize,
    counter: Arc<dyn TokenCounter>,
}

impl ContextLayer {
    pub fn new(tier: Tier, token_budget: usize, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            tier,
            fragments: Vec::new(),
            token_budget,
            counter,
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    /// Only the global policy tier is pinned.
    pub fn pinned(&self) -> bool {
        self.tier.is_pinned()
    }

    /// Append a fragment. No size check happens here.
    pub fn add(&mut self, text: impl Into<String>) {
        let fragment = self.measure(text.into());
        self.fragments.push(fragment);
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.fragments.iter().map(Fragment::text)
    }

    pub fn current_tokens(&self) -> usize {
        self.fragments.iter().map(Fragment::tokens).sum()
    }

    pub fn over_budget(&self) -> bool {
        self.current_tokens() > self.token_budget
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub(crate) fn measure(&self, text: String) -> Fragment {
        let tokens = self.counter.estimate(&text);
        Fragment { text, tokens }
    }

    pub(crate) fn remove_oldest(&mut self) -> Option<Fragment> {
        if self.fragments.is_empty() {
            None
        } else {
            Some(self.fragments.remove(0))
        }
    }

    pub(crate) fn push_front(&mut self, fragment: Fragment) {
        self.fragments.insert(0, fragment);
    }

    pub(crate) fn replace_fragments(&mut self, fragments: Vec<Fragment>) {
        self.fragments = fragments;
    }
}

/// The four-tier context for a single request.
///
/// Owns exactly one [`ContextLayer`] per tier. Built fresh per request by
/// [`LayeredContextBuilder`](crate::LayeredContextBuilder) and discarded
/// afterwards.
#[derive(Debug, Clone)]
pub struct LayeredContext {
    layers: [ContextLayer; Tier::COUNT],
    budgets: TierBudgets,
    supplied: [usize; Tier::COUNT],
    drops: Vec<DropInfo>,
    warnings: Vec<PruneWarning>,
}

impl LayeredContext {
    pub(crate) fn new(budgets: TierBudgets, counter: Arc<dyn TokenCounter>) -> Self {
        let layers =
            Tier::ALL.map(|tier| ContextLayer::new(tier, budgets[tier], Arc::clone(&counter)));
        Self {
            layers,
            budgets,
            supplied: [0; Tier::COUNT],
            drops: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn layer(&self, tier: Tier) -> &ContextLayer {
        &self.layers[tier.index()]
    }

    pub(crate) fn layer_mut(&mut self, tier: Tier) -> &mut ContextLayer {
        &mut self.layers[tier.index()]
    }

    /// Add a raw input fragment, counting it as supplied material.
    pub(crate) fn add(&mut self, tier: Tier, text: impl Into<String>) {
        self.supplied[tier.index()] += 1;
        self.layer_mut(tier).add(text);
    }

    pub fn layers(&self) -> impl Iterator<Item = &ContextLayer> {
        self.layers.iter()
    }

    pub fn budgets(&self) -> &TierBudgets {
        &self.budgets
    }

    /// Sum of the four ceilings; equals the requested budget.
    pub fn total_budget(&self) -> usize {
        self.budgets.total()
    }

    pub fn total_tokens(&self) -> usize {
        self.layers.iter().map(ContextLayer::current_tokens).sum()
    }

    pub fn within_budget(&self) -> bool {
        self.total_tokens() <= self.total_budget()
    }

    pub fn drops(&self) -> &[DropInfo] {
        &self.drops
    }

    pub fn warnings(&self) -> &[PruneWarning] {
        &self.warnings
    }

    pub(crate) fn record_drop(&mut self, drop: DropInfo) {
        self.drops.push(drop);
    }

    pub(crate) fn record_warning(&mut self, warning: PruneWarning) {
        self.warnings.push(warning);
    }

    /// The only tiers the policy critic may consult.
    pub fn validation_evidence(&self) -> ValidationEvidence<'_> {
        ValidationEvidence::from_fragments(
            Tier::ALL
                .into_iter()
                .filter(|tier| tier.is_validation_evidence())
                .flat_map(move |tier| self.layer(tier).texts().map(move |text| (tier, text))),
        )
    }

    /// Render the prompt sections in priority order, one header per
    /// non-empty tier.
    pub fn render(&self) -> String {
        self.layers
            .iter()
            .filter(|layer| !layer.is_empty())
            .map(|layer| {
                let lines: String = layer.texts().map(|t| format!("- {t}\n")).collect();
                format!("{}\n{}", layer.tier().header(), lines)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn metadata(&self) -> ContextMetadata {
        let per_layer = self
            .layers
            .iter()
            .map(|layer| LayerStats {
                tier: layer.tier(),
                tokens: layer.current_tokens(),
                budget: layer.token_budget(),
                items_included: layer.len(),
                items_total: self.supplied[layer.tier().index()],
                pinned: layer.pinned(),
            })
            .collect();
        let total_tokens = self.total_tokens();
        let total_budget = self.total_budget();
        ContextMetadata {
            total_tokens,
            total_budget,
            utilization_pct: (total_tokens as f32 / total_budget as f32) * 100.0,
            per_layer,
            drops: self.drops.clone(),
            warnings: self.warnings.clone(),
        }
    }
}

/// Read-only view of the global policy and domain strategy tiers.
///
/// Session history and tool payloads are unreachable through this type,
/// so they cannot influence a compliance verdict.
#[derive(Debug, Clone, Default)]
pub struct ValidationEvidence<'a> {
    fragments: Vec<(Tier, &'a str)>,
}

impl<'a> ValidationEvidence<'a> {
    /// Build evidence from `(tier, text)` pairs; non-evidence tiers are
    /// discarded.
    pub fn from_fragments(fragments: impl IntoIterator<Item = (Tier, &'a str)>) -> Self {
        Self {
            fragments: fragments
                .into_iter()
                .filter(|(tier, _)| tier.is_validation_evidence())
                .collect(),
        }
    }

    pub fn fragments(&self) -> &[(Tier, &'a str)] {
        &self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// First fragment citing `[rule_id]`, global policy before domain
    /// strategy.
    pub fn cite(&self, rule_id: &str) -> Option<&'a str> {
        let tag = format!("[{rule_id}]");
        Tier::ALL.into_iter().find_map(|tier| {
            self.fragments
                .iter()
                .find(|(t, text)| *t == tier && text.contains(&tag))
                .map(|(_, text)| *text)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::BudgetAllocator;
    use crate::token::ByteTokenCounter;

    fn context(total: i64) -> LayeredContext {
        LayeredContext::new(
            BudgetAllocator::allocate(total).unwrap(),
            Arc::new(ByteTokenCounter),
        )
    }

    #[test]
    fn add_never_drops() {
        let mut layer = ContextLayer::new(Tier::TaskSession, 2, Arc::new(ByteTokenCounter));
        layer.add("a".repeat(40));
        layer.add("b".repeat(40));
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.current_tokens(), 20);
        assert!(layer.over_budget());
        assert!(!layer.pinned());
    }

    #[test]
    fn only_global_policy_is_pinned() {
        let ctx = context(100);
        let pinned: Vec<Tier> = ctx.layers().filter(|l| l.pinned()).map(|l| l.tier()).collect();
        assert_eq!(pinned, vec![Tier::GlobalPolicy]);
    }

    #[test]
    fn total_budget_matches_request() {
        let ctx = context(2000);
        assert_eq!(ctx.total_budget(), 2000);
        assert_eq!(ctx.layer(Tier::TaskSession).token_budget(), 800);
    }

    #[test]
    fn evidence_excludes_session_and_tools() {
        let mut ctx = context(2000);
        ctx.add(Tier::GlobalPolicy, "PROHIBITED [no-x]: must not contain x");
        ctx.add(Tier::DomainStrategy, "Prefer vendors citing [no-x] compliance.");
        ctx.add(Tier::TaskSession, "user asked about [no-x]");
        ctx.add(Tier::EphemeralTool, "tool result [no-x]");

        let evidence = ctx.validation_evidence();
        assert_eq!(evidence.fragments().len(), 2);
        assert!(
            evidence
                .fragments()
                .iter()
                .all(|(tier, _)| tier.is_validation_evidence())
        );
        assert_eq!(
            evidence.cite("no-x"),
            Some("PROHIBITED [no-x]: must not contain x")
        );
        assert_eq!(evidence.cite("missing"), None);
    }

    #[test]
    fn evidence_prefers_global_policy() {
        let evidence = ValidationEvidence::from_fragments([
            (Tier::DomainStrategy, "domain [r1]"),
            (Tier::TaskSession, "session [r1]"),
            (Tier::GlobalPolicy, "policy [r1]"),
        ]);
        assert_eq!(evidence.fragments().len(), 2);
        assert_eq!(evidence.cite("r1"), Some("policy [r1]"));
    }

    #[test]
    fn render_orders_tiers_with_headers() {
        let mut ctx = context(2000);
        ctx.add(Tier::EphemeralTool, "quote: $10");
        ctx.add(Tier::GlobalPolicy, "POLICY: cap liability");
        let rendered = ctx.render();
        assert_eq!(
            rendered,
            "[Global Policy]\n- POLICY: cap liability\n\n[Tool Data]\n- quote: $10\n"
        );
    }

    #[test]
    fn metadata_reports_each_tier() {
        let mut ctx = context(2000);
        ctx.add(Tier::GlobalPolicy, "a".repeat(400));
        ctx.add(Tier::TaskSession, "b".repeat(400));
        let meta = ctx.metadata();
        assert_eq!(meta.total_tokens, 200);
        assert_eq!(meta.total_budget, 2000);
        assert!((meta.utilization_pct - 10.0).abs() < 0.01);
        assert_eq!(meta.per_layer.len(), 4);
        assert!(meta.per_layer[0].pinned);
        assert_eq!(meta.per_layer[2].items_total, 1);
        assert!(meta.drops.is_empty());
    }
}
