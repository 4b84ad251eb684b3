//! Sub-scorers and the composite scorer.
//!
//! Each scorer ranks the six lanes by one measured quantity and converts the
//! rank into a fraction of its maximum score. The composite scorer sums the
//! sub-scores per lane and produces the initial ranking.

pub mod composite;
pub mod scorers;

use serde::Deserialize;
use std::cmp::Ordering;

use crate::features::FeatureRepository;
use crate::types::{KeelError, Lane, MeasuredDetail, RaceEvent, ScorerKind, SubScore, LANES};

pub use composite::{CompositeEvaluation, CompositeScorer};
pub use scorers::{
    CourseEntryScorer, ExhibitionTimeScorer, MotorPerformanceScorer, RacerAbilityScorer,
    StartTimingScorer, TiltScorer,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Maximum score per sub-scorer. A zero weight disables that scorer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub exhibition_time: f64,
    pub tilt: f64,
    pub motor_performance: f64,
    pub course_entry: f64,
    pub start_timing: f64,
    pub racer_ability: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            exhibition_time: 25.0,
            tilt: 5.0,
            motor_performance: 15.0,
            course_entry: 25.0,
            start_timing: 15.0,
            racer_ability: 15.0,
        }
    }
}

impl ScoringConfig {
    pub fn weight(&self, kind: ScorerKind) -> f64 {
        match kind {
            ScorerKind::ExhibitionTime => self.exhibition_time,
            ScorerKind::Tilt => self.tilt,
            ScorerKind::MotorPerformance => self.motor_performance,
            ScorerKind::CourseEntry => self.course_entry,
            ScorerKind::StartTiming => self.start_timing,
            ScorerKind::RacerAbility => self.racer_ability,
        }
    }

    /// Sum of all enabled maxima; the best possible raw score.
    pub fn total(&self) -> f64 {
        ALL_SCORERS.iter().map(|k| self.weight(*k)).sum()
    }

    pub fn validate(&self) -> Result<(), KeelError> {
        for kind in ALL_SCORERS {
            let w = self.weight(*kind);
            if !w.is_finite() || w < 0.0 {
                return Err(KeelError::Configuration(format!(
                    "scoring.{kind} must be a non-negative number, got {w}"
                )));
            }
        }
        if self.total() <= 0.0 {
            return Err(KeelError::Configuration("every scorer is disabled".into()));
        }
        Ok(())
    }
}

/// Scorers in evaluation order.
pub const ALL_SCORERS: &[ScorerKind] = &[
    ScorerKind::ExhibitionTime,
    ScorerKind::Tilt,
    ScorerKind::MotorPerformance,
    ScorerKind::CourseEntry,
    ScorerKind::StartTiming,
    ScorerKind::RacerAbility,
];

// ---------------------------------------------------------------------------
// Scoring context
// ---------------------------------------------------------------------------

/// Everything a scorer may read for one race.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    pub race: &'a RaceEvent,
    pub features: &'a FeatureRepository,
}

impl<'a> ScoringContext<'a> {
    pub fn new(race: &'a RaceEvent, features: &'a FeatureRepository) -> Self {
        Self { race, features }
    }

    pub fn detail(&self, lane: Lane) -> Option<&'a MeasuredDetail> {
        self.features.get(&self.race.id, lane).detail()
    }
}

// ---------------------------------------------------------------------------
// Ranking helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    /// Smaller measurement is better (times).
    Ascending,
    /// Larger measurement is better (rates).
    Descending,
}

/// Competition ranking over lanes with a measurement: equal values share a
/// rank and the next rank skips (1, 1, 3).
pub fn rank_lanes(values: &[(Lane, f64)], order: RankOrder) -> Vec<(Lane, u8)> {
    values
        .iter()
        .map(|&(lane, v)| {
            let better = values
                .iter()
                .filter(|(_, other)| match order {
                    RankOrder::Ascending => *other < v,
                    RankOrder::Descending => *other > v,
                })
                .count();
            (lane, (better + 1) as u8)
        })
        .collect()
}

/// Best rank gets 1.0, worst among `present` gets 0.0.
pub fn linear_fraction(rank: u8, present: usize) -> f64 {
    if present <= 1 {
        return 1.0;
    }
    let k = present as f64;
    ((k - rank as f64) / (k - 1.0)).clamp(0.0, 1.0)
}

/// Lanes ordered by score, highest first; equal scores by ascending lane.
pub fn order_by_score(scores: &[(Lane, f64)]) -> Vec<Lane> {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| match b.1.total_cmp(&a.1) {
        Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    });
    sorted.into_iter().map(|(lane, _)| lane).collect()
}

// ---------------------------------------------------------------------------
// Scorer capability
// ---------------------------------------------------------------------------

/// One independent per-lane signal.
///
/// Implementors supply the measurement and its direction; ranking, fraction
/// conversion and the missing-data policy are shared.
pub trait Scorer: Send + Sync {
    fn kind(&self) -> ScorerKind;

    fn max_score(&self) -> f64;

    fn order(&self) -> RankOrder;

    /// The quantity ranked for `lane`, `None` when unmeasured.
    fn measure(&self, ctx: &ScoringContext<'_>, lane: Lane) -> Option<f64>;

    /// Share of `max_score` awarded to a lane at `rank` among `present` lanes.
    fn fraction(&self, rank: u8, present: usize, _measured: f64) -> f64 {
        linear_fraction(rank, present)
    }

    fn describe(&self, measured: f64, rank: u8, present: usize) -> String {
        format!("{}: {measured:.3} ranked {rank}/{present}", self.kind())
    }

    /// Score all six lanes, or `None` when no lane has the measurement.
    fn score_race(&self, ctx: &ScoringContext<'_>) -> Option<Vec<SubScore>> {
        let measured: Vec<(Lane, f64)> = LANES
            .iter()
            .filter_map(|&lane| self.measure(ctx, lane).map(|v| (lane, v)))
            .filter(|(_, v)| v.is_finite())
            .collect();
        if measured.is_empty() {
            return None;
        }

        let present = measured.len();
        let ranks = rank_lanes(&measured, self.order());
        let max = self.max_score();

        let scores = LANES
            .iter()
            .map(|&lane| {
                let hit = measured
                    .iter()
                    .zip(&ranks)
                    .find(|((l, _), _)| *l == lane)
                    .map(|((_, v), (_, r))| (*v, *r));
                match hit {
                    Some((value, rank)) => SubScore {
                        lane,
                        scorer: self.kind(),
                        value: (max * self.fraction(rank, present, value)).clamp(0.0, max),
                        max_score: max,
                        rank: Some(rank),
                        measured: Some(value),
                        missing: false,
                        rationale: self.describe(value, rank, present),
                    },
                    None => SubScore::missing(lane, self.kind(), max),
                }
            })
            .collect();
        Some(scores)
    }

    /// Score a single lane. Missing data yields a zero flagged score.
    fn score(&self, ctx: &ScoringContext<'_>, lane: Lane) -> SubScore {
        self.score_race(ctx)
            .and_then(|all| all.into_iter().find(|s| s.lane == lane))
            .unwrap_or_else(|| SubScore::missing(lane, self.kind(), self.max_score()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
