//! `procuresense allocate`: show the per-tier split of a budget.

use super::BoxError;
use procuresense_context::BudgetAllocator;

pub fn run(total: i64) -> Result<(), BoxError> {
    let budgets = BudgetAllocator::allocate(total)?;

    println!("Token budget: {total}\n");
    for (tier, ceiling) in budgets.iter() {
        let pinned = if tier.is_pinned() { " (pinned)" } else { "" };
        println!("  {:<16} {:>3}%  {ceiling:>8}{pinned}", tier.as_str(), tier.share_pct());
    }
    Ok(())
}
