//! End-to-end runs over a simulated race day.
//!
//! Drives the shipped `config.toml` and `patterns.toml` through batch
//! prediction and backtesting against the mock store.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::Arc;

use keel::backtest::BacktestEvaluator;
use keel::config::AppConfig;
use keel::engine::{BatchEvaluator, RacePipeline};
use keel::patterns::{PatternBook, SYNERGY_SET};
use keel::store::{InMemoryStore, RaceDataStore};
use keel::types::*;

use crate::mock_store::*;

const CONFIG: &str = include_str!("../../config.toml");
const PATTERNS: &str = include_str!("../../patterns.toml");

fn make_config() -> AppConfig {
    AppConfig::from_toml_str(CONFIG).unwrap()
}

fn make_pipeline(cfg: &AppConfig) -> Arc<RacePipeline> {
    let book = Arc::new(PatternBook::from_toml_str(PATTERNS).unwrap());
    Arc::new(RacePipeline::from_config(cfg, book).unwrap())
}

fn make_batch(store: Arc<dyn RaceDataStore>, workers: usize) -> BatchEvaluator {
    let cfg = make_config();
    BatchEvaluator::new(make_pipeline(&cfg), store, workers)
}

fn day_ids(races: u8) -> Vec<RaceId> {
    (1..=races).map(make_id).collect()
}

#[test]
fn test_shipped_files_validate() {
    let cfg = make_config();
    assert_eq!(cfg.strategies.len(), 3);
    assert_eq!(cfg.backtest.len(), 4);

    let book = PatternBook::from_toml_str(PATTERNS).unwrap();
    for (a, b, _) in SYNERGY_SET {
        assert!(book.get(a).is_some(), "synergy rule {a} missing from patterns.toml");
        assert!(book.get(b).is_some(), "synergy rule {b} missing from patterns.toml");
    }
}

#[tokio::test]
async fn test_full_day_prediction() {
    let store: Arc<dyn RaceDataStore> = Arc::new(MockStore::new(make_day(6)));
    let report = make_batch(store, 3).run(day_ids(6)).await;

    assert_eq!(report.predictions.len(), 6);
    assert!(report.failed.is_empty());
    assert_eq!(report.incomplete_count(), 0);

    let cap = dec!(100000) * dec!(0.05);
    for prediction in &report.predictions {
        let eval = &prediction.evaluation;
        let lanes: HashSet<Lane> = eval.predicted_order().into_iter().collect();
        assert_eq!(lanes.len(), 6);

        let top = eval.top().unwrap();
        assert_eq!(top.lane, 1);
        assert_eq!(top.tier, Some(ConfidenceTier::VeryHigh));
        assert!((top.raw_score - 100.0).abs() < 1e-9);
        assert!(eval
            .results
            .iter()
            .all(|r| r.stage == EvaluationStage::Classified));

        let favourite = prediction
            .decisions
            .iter()
            .find(|d| d.combination == Combination::Win(1))
            .unwrap();
        assert!(favourite.accepted);
        assert_eq!(favourite.stake, cap);
        assert!((favourite.expected_value - 0.53).abs() < 1e-9);

        for d in &prediction.decisions {
            assert!(d.stake >= Decimal::ZERO && d.stake <= cap);
            assert_eq!(d.accepted, d.stake > Decimal::ZERO);
        }
    }
}

#[tokio::test]
async fn test_night_calm_race_applies_one_rule_and_synergy() {
    let mut inner = InMemoryStore::new();
    let race = make_race(11, 20, Some(make_conditions(0.5)));
    inner.insert_details(race.id.clone(), make_details());
    inner.insert_race(race);
    let store: Arc<dyn RaceDataStore> = Arc::new(MockStore::new(inner));

    let report = make_batch(store, 1).run(vec![make_id(11)]).await;
    let eval = &report.predictions[0].evaluation;
    let lane1 = eval.result(1).unwrap();

    let patterns: Vec<&str> = lane1
        .trail
        .iter()
        .filter_map(|a| match &a.source {
            AdjustmentSource::Pattern { rule_id, .. } => Some(rule_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(patterns, vec!["inner_a1_calm"]);

    assert!(matches!(
        &lane1.trail[1].source,
        AdjustmentSource::Synergy { bonus, .. } if (*bonus - 1.05).abs() < 1e-12
    ));
    // 100 × 1.12 × 1.05, then the night penalty.
    assert!((lane1.trail[1].after - 117.6).abs() < 1e-9);
    assert!((lane1.environment_penalty - 2.0).abs() < 1e-12);
    assert!((lane1.final_score - 115.6).abs() < 1e-9);
    assert!(eval.environment_rules.iter().any(|r| r.contains("night")));
}

#[tokio::test]
async fn test_failures_stay_with_their_race() {
    let mut inner = make_day(4);
    inner.insert_race(RaceEvent {
        entrants: make_race(5, 14, None)
            .entrants
            .into_iter()
            .map(|mut e| {
                if e.lane == 6 {
                    e.lane = 5;
                }
                e
            })
            .collect(),
        ..make_race(5, 14, None)
    });
    let mock = Arc::new(MockStore::new(inner));
    mock.fail_details_for(&make_id(3));

    let store: Arc<dyn RaceDataStore> = mock.clone();
    // Race 9 was never collected.
    let mut ids = day_ids(5);
    ids.push(make_id(9));
    let report = make_batch(store, 4).run(ids).await;

    assert_eq!(report.predictions.len(), 4);
    assert_eq!(report.failed.len(), 2);
    assert!(report.failed[0].1.contains("assigned twice"));
    assert!(report.failed[1].1.contains("Race not found"));

    let race3 = report
        .predictions
        .iter()
        .find(|p| p.race_id() == &make_id(3))
        .unwrap();
    assert!(race3.evaluation.incomplete);
    assert_eq!(race3.evaluation.results.len(), 6);
    assert_eq!(report.incomplete_count(), 1);
}

#[tokio::test]
async fn test_feature_batch_fetched_once_per_race() {
    let mock = Arc::new(MockStore::new(make_day(6)));
    let store: Arc<dyn RaceDataStore> = mock.clone();
    make_batch(store, 2).run(day_ids(6)).await;

    for id in day_ids(6) {
        assert_eq!(mock.detail_calls(&id), 1, "race {id}");
    }
}

#[tokio::test]
async fn test_store_outage_fails_every_race_without_panicking() {
    let mock = Arc::new(MockStore::new(make_day(3)));
    mock.set_error("connection reset");
    let store: Arc<dyn RaceDataStore> = mock.clone();
    let report = make_batch(store, 2).run(day_ids(3)).await;

    assert!(report.predictions.is_empty());
    assert_eq!(report.failed.len(), 3);
    assert!(report.failed.iter().all(|(_, e)| e.contains("connection reset")));
}

#[tokio::test]
async fn test_backtest_over_settled_day() {
    let mut inner = make_day(6);
    settle(&mut inner, 1, vec![1, 2, 3, 4, 5, 6], 1.8);
    settle(&mut inner, 2, vec![1, 3, 2, 4, 5, 6], 1.8);
    settle(&mut inner, 3, vec![2, 1, 3, 4, 5, 6], 4.5);
    // Race 4 settled but the payout table never arrived.
    inner.insert_result(RaceResult {
        race_id: make_id(4),
        finish_order: vec![1, 2, 3, 4, 5, 6],
    });
    let store: Arc<dyn RaceDataStore> = Arc::new(MockStore::new(inner));

    let cfg = make_config();
    let batch = BatchEvaluator::new(make_pipeline(&cfg), store, 3);
    let evaluator = BacktestEvaluator::new(batch, cfg.backtest.clone(), cfg.odds_brackets.clone());
    let report = evaluator.run(make_date(), make_date()).await.unwrap();

    assert_eq!(report.races_evaluated, 6);
    assert_eq!(report.races_excluded, 3);
    assert_eq!(report.races_failed, 0);

    let fav = report.bucket("vh_a1_win_fav").unwrap();
    assert_eq!(fav.targeted, 3);
    assert_eq!(fav.hits, 2);
    assert_eq!(fav.staked, dec!(300));
    assert_eq!(fav.returned, dec!(360));
    assert!((fav.roi().unwrap() - 120.0).abs() < 1e-9);

    // 1-2-3 is priced at 18.0, an outsider, so the long bucket never fires.
    let trifecta = report.bucket("vh_trifecta_long").unwrap();
    assert_eq!(trifecta.targeted, 0);
    assert_eq!(trifecta.roi(), None);

    assert_eq!(report.bucket("high_exacta_long").unwrap().targeted, 0);

    assert_eq!(report.calibration.total, 3);
    let vh = &report.calibration.tiers[0];
    assert_eq!(vh.tier, ConfidenceTier::VeryHigh);
    assert!((vh.realised - 2.0 / 3.0).abs() < 1e-12);
}
