//! Per-race evaluation pipeline.
//!
//! Runs one race through every stage in order:
//! raw scoring, pattern adjustment, negative check, environmental penalty and
//! classification, then hands the classified field to the betting engine.
//! Evaluation of a single race is synchronous and deterministic; only the
//! store reads around it are async.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::features::FeatureRepository;
use crate::patterns::{
    FieldRank, NegativePatternChecker, PatternBook, PatternMatcher, PriorityOptimizer, RuleContext,
};
use crate::scoring::composite::rank_by_final_score;
use crate::scoring::{CompositeScorer, ScoringContext};
use crate::store::RaceDataStore;
use crate::strategy::{
    BettingDecisionEngine, ConfidenceClassifier, EnvironmentalPenalty, KellyCalculator,
};
use crate::types::{
    AdjustmentSource, BetDecision, Combination, CompositeScoreResult, DecisionReason,
    EvaluationStage, KeelError, Lane, OddsQuote, RaceEvent, RaceId, ScorerKind,
};

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Classified field for one race.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceEvaluation {
    pub race_id: RaceId,
    /// One result per lane, sorted by final rank.
    pub results: Vec<CompositeScoreResult>,
    pub skipped_scorers: Vec<ScorerKind>,
    /// Environmental rules that fired for this race.
    pub environment_rules: Vec<String>,
    /// Any entrant incomplete, or the feature batch failed to load.
    pub incomplete: bool,
}

impl RaceEvaluation {
    /// The top-ranked entrant.
    pub fn top(&self) -> Option<&CompositeScoreResult> {
        self.results.first()
    }

    /// Lanes in predicted finishing order.
    pub fn predicted_order(&self) -> Vec<Lane> {
        self.results.iter().map(|r| r.lane).collect()
    }

    pub fn result(&self, lane: Lane) -> Option<&CompositeScoreResult> {
        self.results.iter().find(|r| r.lane == lane)
    }
}

/// Evaluation plus every staking decision for the race.
#[derive(Debug, Clone, PartialEq)]
pub struct RacePrediction {
    pub evaluation: RaceEvaluation,
    pub decisions: Vec<BetDecision>,
}

impl RacePrediction {
    pub fn race_id(&self) -> &RaceId {
        &self.evaluation.race_id
    }

    pub fn accepted(&self) -> impl Iterator<Item = &BetDecision> {
        self.decisions.iter().filter(|d| d.accepted)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Lanes that received a rank on each measure the negative check reads.
#[derive(Debug, Clone, Copy)]
struct RankedFields {
    exhibition: u8,
    timing: u8,
}

impl RankedFields {
    fn count(results: &[CompositeScoreResult]) -> Self {
        let ranked = |kind: ScorerKind| {
            results
                .iter()
                .filter(|r| r.sub_score(kind).is_some_and(|s| s.rank.is_some()))
                .count() as u8
        };
        Self {
            exhibition: ranked(ScorerKind::ExhibitionTime),
            timing: ranked(ScorerKind::StartTiming),
        }
    }
}

/// Immutable once built; shared by every worker through `Arc`.
pub struct RacePipeline {
    scorer: CompositeScorer,
    matcher: PatternMatcher,
    optimizer: PriorityOptimizer,
    negative: NegativePatternChecker,
    environment: EnvironmentalPenalty,
    betting: BettingDecisionEngine,
}

impl RacePipeline {
    pub fn from_config(config: &AppConfig, book: Arc<PatternBook>) -> Result<Self, KeelError> {
        config.validate()?;
        let classifier = ConfidenceClassifier::new(config.tiers.clone());
        let environment = EnvironmentalPenalty::new(config.environment.clone(), classifier)?;
        let betting = BettingDecisionEngine::new(
            config.strategies.clone(),
            config.odds_brackets.clone(),
            config.tiers.clone(),
            KellyCalculator::new(config.staking.kelly()),
            config.staking.bankroll,
        )?;

        Ok(Self {
            scorer: CompositeScorer::from_config(&config.scoring),
            matcher: PatternMatcher::new(book),
            optimizer: PriorityOptimizer::new(),
            negative: NegativePatternChecker::new(),
            environment,
            betting,
        })
    }

    pub fn classifier(&self) -> &ConfidenceClassifier {
        self.environment.classifier()
    }

    pub fn betting(&self) -> &BettingDecisionEngine {
        &self.betting
    }

    /// Score, adjust and classify every entrant of `race`.
    pub fn evaluate(&self, race: &RaceEvent, features: &FeatureRepository) -> RaceEvaluation {
        let ctx = ScoringContext::new(race, features);
        let composite = self.scorer.evaluate(&ctx);
        let mut results = composite.results;
        let mut environment_rules = Vec::new();
        let fields = RankedFields::count(&results);

        for result in results.iter_mut() {
            self.apply_patterns(race, features, result);
            self.apply_negative(race, features, fields, result);
            let rules = self.apply_environment(race, result);
            if environment_rules.is_empty() {
                environment_rules = rules;
            }
        }

        rank_by_final_score(&mut results);
        let incomplete = results.iter().any(|r| r.incomplete);

        RaceEvaluation {
            race_id: race.id.clone(),
            results,
            skipped_scorers: composite.skipped,
            environment_rules,
            incomplete,
        }
    }

    fn rule_context(&self, race: &RaceEvent, features: &FeatureRepository, result: &CompositeScoreResult) -> RuleContext {
        let conditions = race.conditions.as_ref();
        RuleContext {
            venue: race.id.venue,
            course: features
                .get(&race.id, result.lane)
                .detail()
                .and_then(|d| d.course)
                .unwrap_or(result.lane),
            wind_direction: conditions.map(|c| c.wind_direction),
            wind_bucket: conditions.map(|c| c.wind_bucket()),
            time_of_day: race.time_of_day(),
            class: result.class,
            weather: conditions.map(|c| c.weather),
            rank: result.initial_rank,
        }
    }

    /// RAW_SCORED → PATTERN_ADJUSTED. Exactly one rule factor is applied,
    /// plus at most one synergy bonus.
    fn apply_patterns(&self, race: &RaceEvent, features: &FeatureRepository, result: &mut CompositeScoreResult) {
        let ctx = self.rule_context(race, features, result);
        let matches = self.matcher.find_matches(result.lane, &ctx);
        let provisional = self.classifier().classify(result.raw_score);

        if let Some(resolution) = self.optimizer.resolve(&matches, provisional) {
            let after = result.final_score * resolution.chosen.factor;
            result.apply(
                AdjustmentSource::Pattern {
                    rule_id: resolution.chosen.id.clone(),
                    priority: resolution.priority,
                },
                after,
            );
            if let Some(synergy) = resolution.synergy {
                let after = result.final_score * synergy.bonus;
                result.apply(
                    AdjustmentSource::Synergy {
                        rule_ids: synergy.rule_ids,
                        bonus: synergy.bonus,
                    },
                    after,
                );
            }
            debug!(
                race = %race.id,
                lane = result.lane,
                rule = %resolution.chosen.id,
                considered = resolution.considered,
                score = format!("{:.2}", result.final_score),
                "Pattern applied"
            );
        }
        result.advance(EvaluationStage::PatternAdjusted);
    }

    /// PATTERN_ADJUSTED → NEGATIVE_CHECKED, skipped when the exhibition or
    /// timing measurement is missing.
    fn apply_negative(
        &self,
        race: &RaceEvent,
        features: &FeatureRepository,
        fields: RankedFields,
        result: &mut CompositeScoreResult,
    ) {
        let ex_rank = result
            .sub_score(ScorerKind::ExhibitionTime)
            .and_then(|s| s.rank)
            .map(|r| FieldRank::new(r, fields.exhibition));
        let timing_rank = result
            .sub_score(ScorerKind::StartTiming)
            .and_then(|s| s.rank)
            .map(|r| FieldRank::new(r, fields.timing));
        let offset = features.get(&race.id, result.lane).detail().and_then(|d| d.start_timing);

        let Some(check) = self
            .negative
            .check(result.lane, ex_rank, timing_rank, offset, result.initial_rank)
        else {
            debug!(race = %race.id, lane = result.lane, "Negative check skipped, measurements missing");
            return;
        };

        if check.has_negative {
            let after = result.final_score * check.multiplier;
            result.apply(
                AdjustmentSource::Negative {
                    patterns: check.matched_patterns.clone(),
                },
                after,
            );
        }
        result.negative = Some(check);
        result.advance(EvaluationStage::NegativeChecked);
    }

    /// → ENVIRONMENT_ADJUSTED → CLASSIFIED. The tier is always derived from
    /// the adjusted score.
    fn apply_environment(&self, race: &RaceEvent, result: &mut CompositeScoreResult) -> Vec<String> {
        let assessment = self.environment.should_accept_bet(
            race.id.venue,
            race.race_time,
            race.conditions.as_ref(),
            result.final_score,
        );
        if assessment.penalty > 0.0 {
            result.apply(
                AdjustmentSource::Environment {
                    rules: assessment.applied_rules.clone(),
                },
                assessment.adjusted_score,
            );
        }
        result.environment_penalty = assessment.penalty;
        result.environment_accept = assessment.accept;
        result.advance(EvaluationStage::EnvironmentAdjusted);

        result.tier = Some(assessment.adjusted_tier);
        result.advance(EvaluationStage::Classified);
        assessment.applied_rules
    }

    /// One decision per entrant with a quoted win price, in final-rank order.
    pub fn decide(&self, evaluation: &RaceEvaluation, odds: &[OddsQuote]) -> Vec<BetDecision> {
        evaluation
            .results
            .iter()
            .filter_map(|r| {
                let tier = r.tier?;
                let quote = odds
                    .iter()
                    .find(|q| q.combination == Combination::Win(r.lane))?;
                let mut decision =
                    self.betting
                        .get_recommendation(tier, r.class, quote.odds, r.lane, &evaluation.race_id);
                if !r.environment_accept && decision.accepted {
                    decision.accepted = false;
                    decision.stake = Decimal::ZERO;
                    decision.reason = DecisionReason::EnvironmentRejected;
                }
                Some(decision)
            })
            .collect()
    }

    /// Load, evaluate and decide one race from the store.
    ///
    /// A missing card or an invalid lane permutation is an error for this
    /// race. Missing measurements and odds only degrade the result.
    pub async fn evaluate_race(&self, store: &dyn RaceDataStore, race_id: &RaceId) -> Result<RacePrediction> {
        let race = store
            .race(race_id)
            .await
            .with_context(|| format!("Failed to load race {race_id}"))?
            .ok_or_else(|| KeelError::RaceNotFound(race_id.to_string()))?;
        race.validate()?;

        let mut features = FeatureRepository::new();
        let feature_failed = match features.load(store, race_id).await {
            Ok(_) => false,
            Err(e) => {
                warn!(race = %race_id, error = %format!("{e:#}"), "Feature batch failed, scoring without measurements");
                true
            }
        };

        let mut evaluation = self.evaluate(&race, &features);
        evaluation.incomplete |= feature_failed;

        let odds = match store.odds(race_id).await {
            Ok(odds) => odds,
            Err(e) => {
                warn!(race = %race_id, error = %format!("{e:#}"), "Odds unavailable, no decisions");
                Vec::new()
            }
        };
        let decisions = self.decide(&evaluation, &odds);

        if let Some(top) = evaluation.top() {
            info!(
                race = %race_id,
                leader = top.lane,
                score = format!("{:.1}", top.final_score),
                tier = %top.tier.map_or("-".to_string(), |t| t.to_string()),
                bets = decisions.iter().filter(|d| d.accepted).count(),
                incomplete = evaluation.incomplete,
                "Race evaluated"
            );
        }

        Ok(RacePrediction {
            evaluation,
            decisions,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{PatternRule, RuleCondition};
    use crate::scoring::ScoringConfig;
    use crate::store::MockRaceDataStore;
    use crate::strategy::betting::BucketKey;
    use crate::strategy::StrategyConfig;
    use crate::strategy::environment::EnvironmentConfig;
    use crate::types::{
        ConfidenceTier, Entrant, MeasuredDetail, NegativePattern, RaceConditions, RacerClass,
        StrategyVariant, Weather, WindDirection, LANES,
    };
    use chrono::{NaiveDate, NaiveTime};
    use std::collections::BTreeMap;

    fn make_entrant(lane: Lane) -> Entrant {
        Entrant {
            lane,
            racer_id: 4100 + lane as u32,
            name: format!("Racer {lane}"),
            class: if lane == 1 { RacerClass::A1 } else { RacerClass::B1 },
            win_rate: Some(8.0 - lane as f64),
            place_rate: Some(50.0 - lane as f64 * 5.0),
            motor_no: Some(lane as u16 + 10),
            motor_place_rate: Some(45.0 - lane as f64 * 3.0),
            boat_no: Some(lane as u16 + 40),
            boat_place_rate: Some(35.0),
        }
    }

    fn make_race(venue: u8) -> RaceEvent {
        RaceEvent {
            id: RaceId::new(venue, NaiveDate::from_ymd_opt(2025, 8, 10).unwrap(), 5),
            race_time: NaiveTime::from_hms_opt(13, 10, 0).unwrap(),
            entrants: LANES.iter().map(|&l| make_entrant(l)).collect(),
            conditions: Some(RaceConditions {
                wind_direction: WindDirection::Calm,
                wind_speed: 0.0,
                wave_height: 1.0,
                weather: Weather::Clear,
            }),
        }
    }

    /// Lane 1 leads every measure, lane 6 trails every measure.
    fn make_details() -> Vec<MeasuredDetail> {
        LANES
            .iter()
            .map(|&lane| MeasuredDetail {
                lane,
                exhibition_time: Some(6.60 + lane as f64 * 0.03),
                tilt: Some(if lane <= 3 { -0.5 } else { 0.5 }),
                course: Some(lane),
                start_timing: Some(0.08 + lane as f64 * 0.02),
            })
            .collect()
    }

    fn make_config() -> AppConfig {
        let mut config = AppConfig::default();
        // No venue risk anywhere so environment penalties are zero in calm daytime.
        config.environment = EnvironmentConfig {
            venue_risk: BTreeMap::new(),
            ..Default::default()
        };
        config.strategies = vec![StrategyConfig {
            id: "conservative".into(),
            variant: StrategyVariant::Conservative,
            min_probability: 0.8,
            min_expected_value: 0.0,
            buckets: vec![BucketKey {
                tier: ConfidenceTier::VeryHigh,
                class: Some(RacerClass::A1),
                bracket: "favourite".into(),
            }],
        }];
        config
    }

    fn make_rule(id: &str, factor: f64, hit_rate: f64, sample_count: u32) -> PatternRule {
        PatternRule {
            id: id.into(),
            description: String::new(),
            condition: RuleCondition {
                course: Some(1),
                ..Default::default()
            },
            target_rank: 1,
            factor,
            hit_rate,
            sample_count,
        }
    }

    fn make_pipeline(rules: Vec<PatternRule>) -> RacePipeline {
        let book = Arc::new(PatternBook::new(rules).unwrap());
        RacePipeline::from_config(&make_config(), book).unwrap()
    }

    #[test]
    fn test_clean_favourite_is_highest_tier_and_bet() {
        let pipeline = make_pipeline(Vec::new());
        let race = make_race(12);
        let features = FeatureRepository::from_details(&race.id, make_details());
        let eval = pipeline.evaluate(&race, &features);

        let top = eval.top().unwrap();
        assert_eq!(top.lane, 1);
        assert_eq!(top.raw_score, 100.0);
        assert_eq!(top.tier, Some(ConfidenceTier::VeryHigh));
        assert_eq!(top.stage, EvaluationStage::Classified);
        assert!(top.trail.is_empty());
        assert!(!eval.incomplete);

        let odds = vec![OddsQuote {
            race_id: race.id.clone(),
            combination: Combination::Win(1),
            odds: 1.8,
        }];
        let decisions = pipeline.decide(&eval, &odds);
        assert_eq!(decisions.len(), 1);
        let d = &decisions[0];
        assert!(d.accepted);
        assert!((d.expected_value - 0.53).abs() < 1e-9);
        assert!(d.stake > Decimal::ZERO);
        assert!(d.stake <= rust_decimal_macros::dec!(5000));
    }

    #[test]
    fn test_lanes_form_permutation_sorted_by_final_rank() {
        let pipeline = make_pipeline(Vec::new());
        let race = make_race(12);
        let features = FeatureRepository::from_details(&race.id, make_details());
        let eval = pipeline.evaluate(&race, &features);

        let mut lanes = eval.predicted_order();
        let ranks: Vec<u8> = eval.results.iter().map(|r| r.final_rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5, 6]);
        lanes.sort();
        assert_eq!(lanes, LANES.to_vec());
        assert!(eval.results.iter().all(|r| r.tier.is_some()));
    }

    #[test]
    fn test_three_overlapping_rules_apply_single_factor() {
        let pipeline = make_pipeline(vec![
            make_rule("course1_a", 1.30, 0.20, 50),
            make_rule("course1_b", 1.10, 0.60, 900),
            make_rule("course1_c", 1.20, 0.35, 300),
        ]);
        let race = make_race(12);
        let features = FeatureRepository::from_details(&race.id, make_details());
        let eval = pipeline.evaluate(&race, &features);

        let top = eval.result(1).unwrap();
        assert!((top.final_score - top.raw_score * 1.10).abs() < 1e-9);
        assert_eq!(top.trail.len(), 1);
        assert!(matches!(
            &top.trail[0].source,
            AdjustmentSource::Pattern { rule_id, .. } if rule_id == "course1_b"
        ));
    }

    #[test]
    fn test_negative_and_environment_recorded_in_trail() {
        let pipeline = make_pipeline(Vec::new());
        let mut race = make_race(12);
        race.conditions = Some(RaceConditions {
            wind_direction: WindDirection::Headwind,
            wind_speed: 2.0,
            wave_height: 1.0,
            weather: Weather::Rain,
        });
        let mut details = make_details();
        // Lane 6: worst exhibition and a late start.
        details[5].start_timing = Some(0.30);
        let features = FeatureRepository::from_details(&race.id, details);
        let eval = pipeline.evaluate(&race, &features);

        let lane6 = eval.result(6).unwrap();
        let negative = lane6.negative.as_ref().unwrap();
        assert!(negative.matched_patterns.contains(&NegativePattern::BothWorstTwo));
        assert!(negative.matched_patterns.contains(&NegativePattern::TimingOutOfWindow));
        assert_eq!(negative.multiplier, 0.80);
        assert_eq!(lane6.environment_penalty, 2.0);
        assert_eq!(eval.environment_rules, vec!["weather:rain".to_string()]);

        let expected = lane6.raw_score * 0.80 - 2.0;
        assert!((lane6.final_score - expected).abs() < 1e-9);
        assert_eq!(lane6.trail.len(), 2);
        assert_eq!(lane6.tier, Some(pipeline.classifier().classify(lane6.final_score)));
    }

    #[test]
    fn test_missing_measurements_flag_incomplete() {
        let pipeline = make_pipeline(Vec::new());
        let race = make_race(12);
        let mut details = make_details();
        details[2].exhibition_time = None;
        details[2].start_timing = None;
        let features = FeatureRepository::from_details(&race.id, details);
        let eval = pipeline.evaluate(&race, &features);

        let lane3 = eval.result(3).unwrap();
        assert!(lane3.incomplete);
        assert!(lane3.negative.is_none());
        assert_eq!(lane3.sub_score(ScorerKind::ExhibitionTime).map(|s| s.value), Some(0.0));
        assert_eq!(lane3.sub_score(ScorerKind::StartTiming).map(|s| s.value), Some(0.0));
        assert_eq!(lane3.stage, EvaluationStage::Classified);
        assert_eq!(eval.results.len(), 6);
        assert!(eval.incomplete);
    }

    #[test]
    fn test_environment_rejection_blocks_bet() {
        let mut config = make_config();
        config.environment.min_accept_score = Some(200.0);
        let book = Arc::new(PatternBook::default());
        let pipeline = RacePipeline::from_config(&config, book).unwrap();
        let race = make_race(12);
        let features = FeatureRepository::from_details(&race.id, make_details());
        let eval = pipeline.evaluate(&race, &features);

        let odds = vec![OddsQuote {
            race_id: race.id.clone(),
            combination: Combination::Win(1),
            odds: 1.8,
        }];
        let decisions = pipeline.decide(&eval, &odds);
        assert!(!decisions[0].accepted);
        assert_eq!(decisions[0].reason, DecisionReason::EnvironmentRejected);
        assert_eq!(decisions[0].stake, Decimal::ZERO);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let pipeline = make_pipeline(vec![make_rule("course1", 1.1, 0.5, 500)]);
        let race = make_race(3);
        let features = FeatureRepository::from_details(&race.id, make_details());
        let first = pipeline.evaluate(&race, &features);
        let second = pipeline.evaluate(&race, &features);
        assert_eq!(first, second);

        let odds: Vec<OddsQuote> = LANES
            .iter()
            .map(|&lane| OddsQuote {
                race_id: race.id.clone(),
                combination: Combination::Win(lane),
                odds: 1.6 + lane as f64,
            })
            .collect();
        let decisions = pipeline.decide(&first, &odds);
        assert_eq!(decisions.len(), 6);
        assert_eq!(decisions, pipeline.decide(&second, &odds));
        assert_eq!(decisions, pipeline.decide(&first, &odds));
    }

    #[test]
    fn test_worst_two_judged_on_measured_lanes_only() {
        let pipeline = make_pipeline(Vec::new());
        let race = make_race(12);
        let mut details = make_details();
        for d in details.iter_mut().filter(|d| d.lane > 4) {
            d.exhibition_time = None;
            d.start_timing = None;
        }
        let features = FeatureRepository::from_details(&race.id, details);
        let eval = pipeline.evaluate(&race, &features);

        let lane4 = eval.result(4).unwrap();
        assert_eq!(lane4.sub_score(ScorerKind::ExhibitionTime).and_then(|s| s.rank), Some(4));
        assert_eq!(lane4.sub_score(ScorerKind::StartTiming).and_then(|s| s.rank), Some(4));
        let negative = lane4.negative.as_ref().unwrap();
        assert!(negative.matched_patterns.contains(&NegativePattern::BothWorstTwo));
        assert_eq!(negative.multiplier, 0.80);
        assert!(eval.result(1).unwrap().negative.as_ref().is_some_and(|n| !n.has_negative));
        assert!(eval.result(5).unwrap().negative.is_none());
    }

    #[tokio::test]
    async fn test_evaluate_race_missing_card() {
        let pipeline = make_pipeline(Vec::new());
        let mut store = MockRaceDataStore::new();
        store.expect_race().returning(|_| Ok(None));
        let id = make_race(12).id;
        let err = pipeline.evaluate_race(&store, &id).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<KeelError>(), Some(KeelError::RaceNotFound(_))));
    }

    #[tokio::test]
    async fn test_evaluate_race_degrades_on_feature_failure() {
        let pipeline = make_pipeline(Vec::new());
        let race = make_race(12);
        let id = race.id.clone();

        let mut store = MockRaceDataStore::new();
        store.expect_race().returning(move |_| Ok(Some(race.clone())));
        store
            .expect_measured_details()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("timeout")));
        store.expect_odds().returning(|_| Ok(Vec::new()));

        let prediction = pipeline.evaluate_race(&store, &id).await.unwrap();
        assert!(prediction.evaluation.incomplete);
        assert_eq!(prediction.evaluation.results.len(), 6);
        assert!(prediction.decisions.is_empty());
    }
}
