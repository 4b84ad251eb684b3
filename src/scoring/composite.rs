//! Composite scorer: sums sub-scores per lane and ranks the field.

use tracing::{debug, warn};

use super::scorers::{
    CourseEntryScorer, ExhibitionTimeScorer, MotorPerformanceScorer, RacerAbilityScorer,
    StartTimingScorer, TiltScorer,
};
use super::{order_by_score, Scorer, ScoringConfig, ScoringContext};
use crate::types::{
    CompositeScoreResult, EvaluationStage, KeelError, Lane, ScorerKind, SubScore, LANES,
};

/// Raw scoring output for one race.
#[derive(Debug, Clone)]
pub struct CompositeEvaluation {
    /// One result per entrant, in lane order.
    pub results: Vec<CompositeScoreResult>,
    /// Scorers with no data for any lane.
    pub skipped: Vec<ScorerKind>,
}

pub struct CompositeScorer {
    scorers: Vec<Box<dyn Scorer>>,
}

impl CompositeScorer {
    pub fn new(scorers: Vec<Box<dyn Scorer>>) -> Self {
        Self { scorers }
    }

    /// Build the standard scorer list, leaving out zero-weight scorers.
    pub fn from_config(config: &ScoringConfig) -> Self {
        let candidates: Vec<Box<dyn Scorer>> = vec![
            Box::new(ExhibitionTimeScorer::new(config.exhibition_time)),
            Box::new(TiltScorer::new(config.tilt)),
            Box::new(MotorPerformanceScorer::new(config.motor_performance)),
            Box::new(CourseEntryScorer::new(config.course_entry)),
            Box::new(StartTimingScorer::new(config.start_timing)),
            Box::new(RacerAbilityScorer::new(config.racer_ability)),
        ];
        Self::new(candidates.into_iter().filter(|s| s.max_score() > 0.0).collect())
    }

    pub fn kinds(&self) -> Vec<ScorerKind> {
        self.scorers.iter().map(|s| s.kind()).collect()
    }

    /// Score every entrant and assign the initial ranking.
    ///
    /// Missing measurements never fail the race: the lane's sub-score is zero
    /// and the result is flagged incomplete.
    pub fn evaluate(&self, ctx: &ScoringContext<'_>) -> CompositeEvaluation {
        let race_id = &ctx.race.id;
        let mut skipped = Vec::new();
        let mut per_scorer: Vec<Vec<SubScore>> = Vec::with_capacity(self.scorers.len());

        for scorer in &self.scorers {
            match scorer.score_race(ctx) {
                Some(scores) => per_scorer.push(scores),
                None => {
                    warn!(race = %race_id, scorer = %scorer.kind(), "No lane has data, scorer skipped");
                    skipped.push(scorer.kind());
                }
            }
        }

        let mut results: Vec<CompositeScoreResult> = LANES
            .iter()
            .filter_map(|&lane| ctx.race.entrant(lane))
            .map(|entrant| {
                let lane = entrant.lane;
                let sub_scores: Vec<SubScore> = per_scorer
                    .iter()
                    .filter_map(|scores| scores.iter().find(|s| s.lane == lane).cloned())
                    .collect();
                let raw_score: f64 = sub_scores.iter().map(|s| s.value).sum();

                let detail_absent = ctx.detail(lane).is_none();
                if detail_absent {
                    let missing = KeelError::MissingData {
                        race: race_id.to_string(),
                        lane,
                        what: "measured details".into(),
                    };
                    warn!(race = %race_id, lane, "{missing}");
                }
                for s in sub_scores.iter().filter(|s| s.missing) {
                    debug!(race = %race_id, lane, scorer = %s.scorer, "Missing measurement scored zero");
                }
                let incomplete =
                    detail_absent || !skipped.is_empty() || sub_scores.iter().any(|s| s.missing);

                CompositeScoreResult {
                    lane,
                    racer_id: entrant.racer_id,
                    class: entrant.class,
                    raw_score,
                    final_score: raw_score,
                    initial_rank: 0,
                    final_rank: 0,
                    sub_scores,
                    trail: Vec::new(),
                    negative: None,
                    environment_penalty: 0.0,
                    environment_accept: true,
                    tier: None,
                    stage: EvaluationStage::RawScored,
                    incomplete,
                }
            })
            .collect();

        let order = order_by_score(
            &results
                .iter()
                .map(|r| (r.lane, r.raw_score))
                .collect::<Vec<(Lane, f64)>>(),
        );
        for r in results.iter_mut() {
            r.initial_rank = rank_of(&order, r.lane);
            r.final_rank = r.initial_rank;
        }

        debug!(
            race = %race_id,
            scorers = per_scorer.len(),
            skipped = skipped.len(),
            leader = order.first().copied().unwrap_or(0),
            "Composite scores computed"
        );

        CompositeEvaluation { results, skipped }
    }
}

/// Re-rank by final score and sort the results into final order.
pub fn rank_by_final_score(results: &mut Vec<CompositeScoreResult>) {
    let order = order_by_score(
        &results
            .iter()
            .map(|r| (r.lane, r.final_score))
            .collect::<Vec<(Lane, f64)>>(),
    );
    for r in results.iter_mut() {
        r.final_rank = rank_of(&order, r.lane);
    }
    results.sort_by_key(|r| r.final_rank);
}

fn rank_of(order: &[Lane], lane: Lane) -> u8 {
    order
        .iter()
        .position(|l| *l == lane)
        .map_or(0, |p| (p + 1) as u8)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
