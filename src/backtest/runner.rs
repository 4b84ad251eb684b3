//! Historical backtesting.
//!
//! Replays settled races through the live pipeline and accumulates, per
//! configured strategy bucket, how often the predicted top combination was
//! targeted and hit and what it staked and returned.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::calibration::{CalibrationPoint, CalibrationReport, Calibrator};
use crate::engine::{BatchEvaluator, RacePrediction};
use crate::strategy::OddsBracket;
use crate::types::{
    BacktestResult, BetKind, Combination, ConfidenceTier, KeelError, OddsQuote, PayoutRecord,
    RaceResult, RacerClass,
};

// ---------------------------------------------------------------------------
// Strategy definitions
// ---------------------------------------------------------------------------

/// A fixed-stake bucket replayed over history.
#[derive(Debug, Clone, Deserialize)]
pub struct BacktestStrategy {
    pub id: String,
    /// Tier of the top-ranked entrant.
    pub tier: ConfidenceTier,
    /// Class of the top-ranked entrant; `None` matches any.
    #[serde(default)]
    pub class: Option<RacerClass>,
    /// Odds bracket of the predicted combination's quote.
    pub bracket: String,
    pub bet_kind: BetKind,
    pub stake: Decimal,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Races the pipeline produced a prediction for.
    pub races_evaluated: usize,
    /// Predicted races left out of every bucket (no result, bad settlement).
    pub races_excluded: usize,
    /// Races that failed evaluation or were never submitted.
    pub races_failed: usize,
    /// One entry per configured strategy, in configuration order.
    pub buckets: Vec<BacktestResult>,
    pub calibration: CalibrationReport,
}

impl BacktestReport {
    pub fn bucket(&self, strategy_id: &str) -> Option<&BacktestResult> {
        self.buckets.iter().find(|b| b.strategy_id == strategy_id)
    }

    /// All buckets summed into one line.
    pub fn total(&self) -> BacktestResult {
        let mut total = BacktestResult::new("total", self.from, self.to);
        for b in &self.buckets {
            total.targeted += b.targeted;
            total.hits += b.hits;
            total.staked += b.staked;
            total.returned += b.returned;
        }
        total
    }
}

/// How one predicted race fed into the aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Settled; offered to every bucket.
    Counted,
    /// No official result yet.
    Unsettled,
    /// A result exists but the payout table is empty.
    Inconsistent,
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

pub struct BacktestEvaluator {
    batch: BatchEvaluator,
    strategies: Vec<BacktestStrategy>,
    brackets: Vec<OddsBracket>,
}

impl BacktestEvaluator {
    pub fn new(batch: BatchEvaluator, strategies: Vec<BacktestStrategy>, brackets: Vec<OddsBracket>) -> Self {
        Self {
            batch,
            strategies,
            brackets,
        }
    }

    /// Replay every stored race held between `from` and `to` inclusive.
    pub async fn run(&self, from: NaiveDate, to: NaiveDate) -> Result<BacktestReport> {
        let store = self.batch.store();
        let race_ids = store
            .races_between(from, to)
            .await
            .with_context(|| format!("Failed to list races {from}..{to}"))?;
        info!(%from, %to, races = race_ids.len(), strategies = self.strategies.len(), "Backtest starting");

        let batch = self.batch.run(race_ids).await;

        let mut buckets: Vec<BacktestResult> = self
            .strategies
            .iter()
            .map(|s| BacktestResult::new(&s.id, from, to))
            .collect();
        let mut calibrator = Calibrator::new();
        let mut excluded = 0;

        for prediction in &batch.predictions {
            let race_id = prediction.race_id();
            let settled = async {
                let result = store.result(race_id).await?;
                let payouts = store.payouts(race_id).await?;
                let odds = store.odds(race_id).await?;
                anyhow::Ok((result, payouts, odds))
            }
            .await;

            let (result, payouts, odds) = match settled {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(race = %race_id, error = %format!("{e:#}"), "Settlement lookup failed, race excluded");
                    excluded += 1;
                    continue;
                }
            };

            match self.accumulate(&mut buckets, prediction, result.as_ref(), &payouts, &odds) {
                Settlement::Counted => {
                    if let (Some(top), Some(result)) = (prediction.evaluation.top(), result.as_ref()) {
                        if let Some(tier) = top.tier {
                            calibrator.add_point(CalibrationPoint {
                                race_id: race_id.clone(),
                                tier,
                                predicted: self.batch.pipeline().betting().probability_proxy(tier),
                                won: result.finish_order.first() == Some(&top.lane),
                            });
                        }
                    }
                }
                Settlement::Unsettled | Settlement::Inconsistent => excluded += 1,
            }
        }

        let report = BacktestReport {
            from,
            to,
            races_evaluated: batch.predictions.len(),
            races_excluded: excluded,
            races_failed: batch.failed.len() + batch.skipped.len(),
            buckets,
            calibration: calibrator.report(),
        };
        let total = report.total();
        info!(
            evaluated = report.races_evaluated,
            excluded = report.races_excluded,
            failed = report.races_failed,
            targeted = total.targeted,
            hits = total.hits,
            roi = ?total.roi(),
            "Backtest complete"
        );
        Ok(report)
    }

    /// Offer one predicted race to every bucket.
    pub fn accumulate(
        &self,
        buckets: &mut [BacktestResult],
        prediction: &RacePrediction,
        result: Option<&RaceResult>,
        payouts: &[PayoutRecord],
        odds: &[OddsQuote],
    ) -> Settlement {
        let race_id = prediction.race_id();
        let Some(result) = result else {
            debug!(race = %race_id, "No result, race excluded");
            return Settlement::Unsettled;
        };
        if payouts.is_empty() {
            let e = KeelError::DataInconsistency {
                race: race_id.to_string(),
                message: "result recorded with no payout rows".into(),
            };
            warn!(race = %race_id, error = %e, "Race excluded from backtest");
            return Settlement::Inconsistent;
        }
        let Some(top) = prediction.evaluation.top() else {
            return Settlement::Unsettled;
        };
        let Some(tier) = top.tier else {
            return Settlement::Unsettled;
        };
        let order = prediction.evaluation.predicted_order();

        for (strategy, bucket) in self.strategies.iter().zip(buckets.iter_mut()) {
            if strategy.tier != tier || strategy.class.is_some_and(|c| c != top.class) {
                continue;
            }
            let Some(predicted) = Combination::from_order(strategy.bet_kind, &order) else {
                continue;
            };
            let Some(quote) = odds.iter().find(|q| q.combination == predicted) else {
                continue;
            };
            let in_bracket = self
                .brackets
                .iter()
                .find(|b| b.name == strategy.bracket)
                .is_some_and(|b| b.contains(quote.odds));
            if !in_bracket {
                continue;
            }
            let Some(winner) = result.settled(strategy.bet_kind) else {
                continue;
            };

            bucket.targeted += 1;
            bucket.staked += strategy.stake;
            if winner != predicted {
                continue;
            }
            bucket.hits += 1;
            match payouts.iter().find(|p| p.combination == winner) {
                Some(p) => {
                    let multiplier = Decimal::from_f64(p.payout).unwrap_or(Decimal::ZERO);
                    bucket.returned += (strategy.stake * multiplier).round_dp(2);
                }
                None => {
                    warn!(
                        race = %race_id,
                        strategy = %strategy.id,
                        combination = %winner,
                        "Hit with no payout row, counted as zero payout"
                    );
                }
            }
        }
        Settlement::Counted
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
