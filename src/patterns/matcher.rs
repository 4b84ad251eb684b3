//! Finds the pattern rules applicable to a lane.

use std::sync::Arc;
use tracing::debug;

use super::{PatternBook, PatternRule, RuleContext};
use crate::types::Lane;

#[derive(Debug, Clone)]
pub struct PatternMatcher {
    book: Arc<PatternBook>,
}

impl PatternMatcher {
    pub fn new(book: Arc<PatternBook>) -> Self {
        Self { book }
    }

    /// Every rule whose predicate and target rank match, in book order.
    /// Each rule appears at most once.
    pub fn find_matches(&self, lane: Lane, ctx: &RuleContext) -> Vec<&PatternRule> {
        let matches: Vec<&PatternRule> = self
            .book
            .rules()
            .iter()
            .filter(|r| r.target_rank == ctx.rank && r.condition.matches(ctx))
            .collect();
        if !matches.is_empty() {
            debug!(
                lane,
                rank = ctx.rank,
                rules = ?matches.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
                "Pattern rules matched"
            );
        }
        matches
    }
}
