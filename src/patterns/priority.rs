//! Resolves overlapping pattern rules to a single multiplier.
//!
//! Overlapping rules are mined from the same historical races and are
//! strongly correlated, so exactly one rule is applied. A closed allowlist of
//! compatible pairs may add a small fixed bonus on top of the chosen rule.

use std::cmp::Ordering;
use tracing::debug;

use super::PatternRule;
use crate::types::ConfidenceTier;

/// Known-compatible rule pairs and the bonus they earn when both match.
/// Every bonus is at most 1.05.
pub const SYNERGY_SET: &[(&str, &str, f64)] = &[
    ("inner_a1_calm", "night_inner_advantage", 1.05),
    ("exhibition_top_inner", "motor_strong_inner", 1.03),
    ("headwind_dash_outer", "strong_wind_outer", 1.04),
    ("inner_a1_calm", "exhibition_top_inner", 1.02),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Synergy {
    pub rule_ids: (String, String),
    pub bonus: f64,
}

/// The rule chosen for one lane.
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
    pub chosen: &'a PatternRule,
    pub priority: f64,
    pub synergy: Option<Synergy>,
    /// Number of matching rules considered.
    pub considered: usize,
}

impl Resolution<'_> {
    /// Chosen factor times the synergy bonus, if any.
    pub fn multiplier(&self) -> f64 {
        self.chosen.factor * self.synergy.as_ref().map_or(1.0, |s| s.bonus)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PriorityOptimizer;

impl PriorityOptimizer {
    pub fn new() -> Self {
        Self
    }

    /// 0–20 by sample count.
    pub fn sample_bonus(sample_count: u32) -> f64 {
        match sample_count {
            n if n >= 1000 => 20.0,
            n if n >= 500 => 15.0,
            n if n >= 200 => 10.0,
            n if n >= 100 => 5.0,
            _ => 0.0,
        }
    }

    /// 0–10, linear in the factor above 1.0.
    pub fn multiplier_bonus(factor: f64) -> f64 {
        ((factor - 1.0) * 50.0).clamp(0.0, 10.0)
    }

    /// +10 at the highest tier down to -10 at the lowest.
    pub fn tier_bias(tier: ConfidenceTier) -> f64 {
        match tier {
            ConfidenceTier::VeryHigh => 10.0,
            ConfidenceTier::High => 5.0,
            ConfidenceTier::Medium => 0.0,
            ConfidenceTier::Low => -5.0,
            ConfidenceTier::VeryLow => -10.0,
        }
    }

    pub fn priority(&self, rule: &PatternRule, tier: ConfidenceTier) -> f64 {
        100.0 * rule.hit_rate
            + Self::sample_bonus(rule.sample_count)
            + Self::multiplier_bonus(rule.factor)
            + Self::tier_bias(tier)
    }

    /// Pick one rule from `matches`. Equal priorities go to the smaller id so
    /// the choice does not depend on book order.
    pub fn resolve<'a>(
        &self,
        matches: &[&'a PatternRule],
        tier: ConfidenceTier,
    ) -> Option<Resolution<'a>> {
        let (chosen, priority) = matches
            .iter()
            .map(|r| (*r, self.priority(r, tier)))
            .max_by(|(ra, pa), (rb, pb)| match pa.total_cmp(pb) {
                Ordering::Equal => rb.id.cmp(&ra.id),
                other => other,
            })?;

        let synergy = if matches.len() > 1 {
            find_synergy(chosen, matches)
        } else {
            None
        };

        if matches.len() > 1 {
            debug!(
                chosen = %chosen.id,
                priority = format!("{priority:.1}"),
                discarded = matches.len() - 1,
                synergy = ?synergy.as_ref().map(|s| s.bonus),
                "Overlapping rules resolved"
            );
        }

        Some(Resolution {
            chosen,
            priority,
            synergy,
            considered: matches.len(),
        })
    }
}

/// Largest allowlisted bonus pairing the chosen rule with another match.
fn find_synergy(chosen: &PatternRule, matches: &[&PatternRule]) -> Option<Synergy> {
    let matched = |id: &str| matches.iter().any(|r| r.id == id);
    SYNERGY_SET
        .iter()
        .filter(|&&(a, b, _)| (chosen.id == a && matched(b)) || (chosen.id == b && matched(a)))
        .max_by(|x, y| x.2.total_cmp(&y.2))
        .map(|(a, b, bonus)| Synergy {
            rule_ids: (a.to_string(), b.to_string()),
            bonus: *bonus,
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
