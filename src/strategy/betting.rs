//! Betting decision engine.
//!
//! Looks up the configured strategy table by (tier, class, odds bracket),
//! computes expected value from the tier's probability proxy, and sizes an
//! accepted bet with fractional Kelly. Several strategy variants can be
//! evaluated against the same entrant; each has its own gates.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

use super::environment::TierConfig;
use super::kelly::KellyCalculator;
use crate::types::{
    BetDecision, Combination, ConfidenceTier, DecisionReason, KeelError, Lane, RaceId, RacerClass,
    StrategyVariant,
};

/// Strategy id reported when no configured bucket matched.
pub const UNMATCHED_STRATEGY: &str = "unmatched";

// ---------------------------------------------------------------------------
// Strategy table
// ---------------------------------------------------------------------------

/// Half-open odds range `[min, max)`; `max = None` is unbounded.
#[derive(Debug, Clone, Deserialize)]
pub struct OddsBracket {
    pub name: String,
    pub min: f64,
    #[serde(default)]
    pub max: Option<f64>,
}

impl OddsBracket {
    pub fn contains(&self, odds: f64) -> bool {
        odds >= self.min && self.max.map_or(true, |max| odds < max)
    }
}

pub fn default_odds_brackets() -> Vec<OddsBracket> {
    [
        ("short", 1.0, Some(1.5)),
        ("favourite", 1.5, Some(2.5)),
        ("mid", 2.5, Some(5.0)),
        ("long", 5.0, Some(15.0)),
        ("outsider", 15.0, None),
    ]
    .into_iter()
    .map(|(name, min, max)| OddsBracket {
        name: name.to_string(),
        min,
        max,
    })
    .collect()
}

/// One strategy-table key. `class = None` matches any class.
#[derive(Debug, Clone, Deserialize)]
pub struct BucketKey {
    pub tier: ConfidenceTier,
    #[serde(default)]
    pub class: Option<RacerClass>,
    pub bracket: String,
}

/// A configured strategy variant with its acceptance gates.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    pub id: String,
    pub variant: StrategyVariant,
    pub min_probability: f64,
    pub min_expected_value: f64,
    pub buckets: Vec<BucketKey>,
}

/// Check brackets and strategies against each other.
pub fn validate_strategy_table(
    brackets: &[OddsBracket],
    strategies: &[StrategyConfig],
) -> Result<(), KeelError> {
    let mut names = HashSet::new();
    for b in brackets {
        if !names.insert(b.name.as_str()) {
            return Err(KeelError::Configuration(format!("duplicate odds bracket '{}'", b.name)));
        }
        if !b.min.is_finite() || b.max.is_some_and(|max| !(max > b.min)) {
            return Err(KeelError::Configuration(format!("odds bracket '{}' is inverted or empty", b.name)));
        }
    }
    let mut sorted: Vec<&OddsBracket> = brackets.iter().collect();
    sorted.sort_by(|a, b| a.min.total_cmp(&b.min));
    for pair in sorted.windows(2) {
        match pair[0].max {
            Some(max) if max <= pair[1].min => {}
            _ => {
                return Err(KeelError::Configuration(format!(
                    "odds brackets '{}' and '{}' overlap",
                    pair[0].name, pair[1].name
                )))
            }
        }
    }

    let mut ids = HashSet::new();
    for s in strategies {
        if !ids.insert(s.id.as_str()) || s.id == UNMATCHED_STRATEGY {
            return Err(KeelError::Configuration(format!("duplicate or reserved strategy id '{}'", s.id)));
        }
        if !(0.0..=1.0).contains(&s.min_probability) || !s.min_expected_value.is_finite() {
            return Err(KeelError::Configuration(format!("strategy '{}' has invalid gates", s.id)));
        }
        if let Some(key) = s.buckets.iter().find(|k| !names.contains(k.bracket.as_str())) {
            return Err(KeelError::Configuration(format!(
                "strategy '{}' references unknown bracket '{}'",
                s.id, key.bracket
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Everything the engine needs to know about the candidate.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub race_id: &'a RaceId,
    pub lane: Lane,
    pub tier: ConfidenceTier,
    pub class: RacerClass,
    pub odds: f64,
}

/// Verdicts of every matching variant; `bet` if any accepted.
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub decisions: Vec<BetDecision>,
    pub bet: bool,
}

pub struct BettingDecisionEngine {
    strategies: Vec<StrategyConfig>,
    brackets: Vec<OddsBracket>,
    tiers: TierConfig,
    kelly: KellyCalculator,
    bankroll: Decimal,
}

impl BettingDecisionEngine {
    pub fn new(
        strategies: Vec<StrategyConfig>,
        brackets: Vec<OddsBracket>,
        tiers: TierConfig,
        kelly: KellyCalculator,
        bankroll: Decimal,
    ) -> Result<Self, KeelError> {
        validate_strategy_table(&brackets, &strategies)?;
        Ok(Self {
            strategies,
            brackets,
            tiers,
            kelly,
            bankroll,
        })
    }

    pub fn bankroll(&self) -> Decimal {
        self.bankroll
    }

    pub fn probability_proxy(&self, tier: ConfidenceTier) -> f64 {
        self.tiers.probability_for(tier)
    }

    fn bucket_matches(&self, key: &BucketKey, candidate: &Candidate<'_>) -> bool {
        key.tier == candidate.tier
            && key.class.map_or(true, |c| c == candidate.class)
            && self
                .brackets
                .iter()
                .find(|b| b.name == key.bracket)
                .is_some_and(|b| b.contains(candidate.odds))
    }

    /// Evaluate every strategy variant whose table has a bucket for the candidate.
    pub fn evaluate_variants(&self, candidate: &Candidate<'_>) -> Recommendation {
        let decisions: Vec<BetDecision> = self
            .strategies
            .iter()
            .filter(|s| s.buckets.iter().any(|k| self.bucket_matches(k, candidate)))
            .map(|s| self.decide(s, candidate))
            .collect();
        let bet = decisions.iter().any(|d| d.accepted);
        Recommendation { decisions, bet }
    }

    /// Single recommendation for a win ticket on `lane`.
    ///
    /// The accepted decision with the largest stake wins (config order breaks
    /// ties); otherwise the first matching rejection; otherwise a
    /// no-matching-strategy reject with its expected value still reported.
    pub fn get_recommendation(
        &self,
        tier: ConfidenceTier,
        class: RacerClass,
        odds: f64,
        lane: Lane,
        race_id: &RaceId,
    ) -> BetDecision {
        let candidate = Candidate {
            race_id,
            lane,
            tier,
            class,
            odds,
        };
        let recommendation = self.evaluate_variants(&candidate);

        let best_accepted = recommendation
            .decisions
            .iter()
            .filter(|d| d.accepted)
            .fold(None::<&BetDecision>, |best, d| match best {
                Some(b) if b.stake >= d.stake => Some(b),
                _ => Some(d),
            });

        if let Some(d) = best_accepted {
            return d.clone();
        }
        if let Some(d) = recommendation.decisions.into_iter().next() {
            return d;
        }
        self.unmatched(&candidate)
    }

    fn decide(&self, strategy: &StrategyConfig, candidate: &Candidate<'_>) -> BetDecision {
        let p = self.probability_proxy(candidate.tier);
        let expected_value = p * candidate.odds - 1.0;
        let sizing = self.kelly.size(p, candidate.odds, self.bankroll);

        let reason = if candidate.odds <= 1.0 {
            DecisionReason::InvalidOdds
        } else if p < strategy.min_probability {
            DecisionReason::BelowMinProbability
        } else if expected_value < strategy.min_expected_value {
            DecisionReason::BelowMinExpectedValue
        } else if sizing.kelly_fraction <= 0.0 {
            DecisionReason::NonPositiveKelly
        } else if sizing.stake <= Decimal::ZERO || sizing.stake < self.kelly.config().min_stake {
            DecisionReason::BelowMinStake
        } else {
            DecisionReason::Accepted
        };
        let accepted = reason == DecisionReason::Accepted;

        debug!(
            strategy = %strategy.id,
            race = %candidate.race_id,
            lane = candidate.lane,
            tier = %candidate.tier,
            odds = candidate.odds,
            ev = format!("{expected_value:+.3}"),
            reason = %reason,
            "Strategy evaluated"
        );

        BetDecision {
            strategy_id: strategy.id.clone(),
            variant: Some(strategy.variant),
            race_id: candidate.race_id.clone(),
            combination: Combination::Win(candidate.lane),
            tier: candidate.tier,
            odds: candidate.odds,
            probability: p,
            expected_value,
            kelly_fraction: sizing.kelly_fraction,
            stake: if accepted { sizing.stake } else { Decimal::ZERO },
            accepted,
            reason,
        }
    }

    fn unmatched(&self, candidate: &Candidate<'_>) -> BetDecision {
        let p = self.probability_proxy(candidate.tier);
        let sizing = self.kelly.size(p, candidate.odds, self.bankroll);
        BetDecision {
            strategy_id: UNMATCHED_STRATEGY.to_string(),
            variant: None,
            race_id: candidate.race_id.clone(),
            combination: Combination::Win(candidate.lane),
            tier: candidate.tier,
            odds: candidate.odds,
            probability: p,
            expected_value: p * candidate.odds - 1.0,
            kelly_fraction: sizing.kelly_fraction,
            stake: Decimal::ZERO,
            accepted: false,
            reason: DecisionReason::NoMatchingStrategy,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::kelly::KellyConfig;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn race_id() -> RaceId {
        RaceId::new(12, NaiveDate::from_ymd_opt(2025, 5, 10).unwrap(), 3)
    }

    fn make_strategy(id: &str, variant: StrategyVariant, min_p: f64, min_ev: f64, buckets: Vec<BucketKey>) -> StrategyConfig {
        StrategyConfig {
            id: id.to_string(),
            variant,
            min_probability: min_p,
            min_expected_value: min_ev,
            buckets,
        }
    }

    fn key(tier: ConfidenceTier, class: Option<RacerClass>, bracket: &str) -> BucketKey {
        BucketKey {
            tier,
            class,
            bracket: bracket.to_string(),
        }
    }

    fn make_engine(strategies: Vec<StrategyConfig>) -> BettingDecisionEngine {
        BettingDecisionEngine::new(
            strategies,
            default_odds_brackets(),
            TierConfig::default(),
            KellyCalculator::new(KellyConfig::default()),
            dec!(10000),
        )
        .unwrap()
    }

    #[test]
    fn test_very_high_favourite_accepted() {
        let engine = make_engine(vec![make_strategy(
            "iron",
            StrategyVariant::Conservative,
            0.8,
            0.0,
            vec![key(ConfidenceTier::VeryHigh, Some(RacerClass::A1), "favourite")],
        )]);
        let d = engine.get_recommendation(ConfidenceTier::VeryHigh, RacerClass::A1, 1.8, 1, &race_id());
        assert!(d.accepted);
        assert_eq!(d.reason, DecisionReason::Accepted);
        assert!((d.expected_value - 0.53).abs() < 1e-9);
        assert!(d.stake > Decimal::ZERO);
        assert!(d.stake <= dec!(500));
        assert_eq!(d.combination, Combination::Win(1));
    }

    #[test]
    fn test_no_bucket_is_reject_with_ev() {
        let engine = make_engine(vec![make_strategy(
            "iron",
            StrategyVariant::Conservative,
            0.8,
            0.0,
            vec![key(ConfidenceTier::VeryHigh, Some(RacerClass::A1), "favourite")],
        )]);
        // B1 class is not in the table.
        let d = engine.get_recommendation(ConfidenceTier::VeryHigh, RacerClass::B1, 1.8, 1, &race_id());
        assert!(!d.accepted);
        assert_eq!(d.reason, DecisionReason::NoMatchingStrategy);
        assert_eq!(d.strategy_id, UNMATCHED_STRATEGY);
        assert!((d.expected_value - 0.53).abs() < 1e-9);
        assert_eq!(d.stake, Decimal::ZERO);
    }

    #[test]
    fn test_min_probability_gate() {
        let engine = make_engine(vec![make_strategy(
            "strict",
            StrategyVariant::Conservative,
            0.9,
            0.0,
            vec![key(ConfidenceTier::VeryHigh, None, "favourite")],
        )]);
        let d = engine.get_recommendation(ConfidenceTier::VeryHigh, RacerClass::A2, 2.0, 1, &race_id());
        assert_eq!(d.reason, DecisionReason::BelowMinProbability);
        assert_eq!(d.stake, Decimal::ZERO);
    }

    #[test]
    fn test_min_expected_value_gate() {
        let engine = make_engine(vec![make_strategy(
            "value",
            StrategyVariant::ValueSeeking,
            0.0,
            0.5,
            vec![key(ConfidenceTier::Medium, None, "mid")],
        )]);
        // p = 0.45, odds 3.0 → EV 0.35 < 0.5
        let d = engine.get_recommendation(ConfidenceTier::Medium, RacerClass::B1, 3.0, 4, &race_id());
        assert_eq!(d.reason, DecisionReason::BelowMinExpectedValue);
        assert!(!d.accepted);
    }

    #[test]
    fn test_negative_ev_rejected_even_with_loose_gates() {
        let engine = make_engine(vec![make_strategy(
            "loose",
            StrategyVariant::Balanced,
            0.0,
            -1.0,
            vec![key(ConfidenceTier::Low, None, "mid")],
        )]);
        // p = 0.30, odds 3.0 → EV -0.1, Kelly negative
        let d = engine.get_recommendation(ConfidenceTier::Low, RacerClass::B2, 3.0, 5, &race_id());
        assert_eq!(d.reason, DecisionReason::NonPositiveKelly);
        assert_eq!(d.stake, Decimal::ZERO);
    }

    #[test]
    fn test_any_variant_accepting_means_bet() {
        let engine = make_engine(vec![
            make_strategy(
                "conservative",
                StrategyVariant::Conservative,
                0.8,
                0.2,
                vec![key(ConfidenceTier::High, None, "mid")],
            ),
            make_strategy(
                "value",
                StrategyVariant::ValueSeeking,
                0.5,
                0.3,
                vec![key(ConfidenceTier::High, None, "mid")],
            ),
        ]);
        let race = race_id();
        let candidate = Candidate {
            race_id: &race,
            lane: 2,
            tier: ConfidenceTier::High,
            class: RacerClass::A1,
            odds: 3.0,
        };
        let rec = engine.evaluate_variants(&candidate);
        assert_eq!(rec.decisions.len(), 2);
        assert!(rec.bet);
        assert!(!rec.decisions[0].accepted);
        assert!(rec.decisions[1].accepted);

        let single = engine.get_recommendation(ConfidenceTier::High, RacerClass::A1, 3.0, 2, &race);
        assert_eq!(single.strategy_id, "value");
    }

    #[test]
    fn test_bracket_half_open() {
        let brackets = default_odds_brackets();
        let fav = brackets.iter().find(|b| b.name == "favourite").unwrap();
        assert!(fav.contains(1.5));
        assert!(!fav.contains(2.5));
        let out = brackets.iter().find(|b| b.name == "outsider").unwrap();
        assert!(out.contains(250.0));
    }

    #[test]
    fn test_unknown_bracket_rejected_at_construction() {
        let result = BettingDecisionEngine::new(
            vec![make_strategy(
                "bad",
                StrategyVariant::Balanced,
                0.5,
                0.0,
                vec![key(ConfidenceTier::High, None, "nonexistent")],
            )],
            default_odds_brackets(),
            TierConfig::default(),
            KellyCalculator::new(KellyConfig::default()),
            dec!(1000),
        );
        assert!(matches!(result, Err(KeelError::Configuration(_))));
    }

    #[test]
    fn test_overlapping_brackets_rejected() {
        let brackets = vec![
            OddsBracket { name: "a".into(), min: 1.0, max: Some(2.0) },
            OddsBracket { name: "b".into(), min: 1.8, max: None },
        ];
        assert!(validate_strategy_table(&brackets, &[]).is_err());
    }
}
