//! The six built-in sub-scorers.

use super::{RankOrder, Scorer, ScoringContext};
use crate::types::{Lane, ScorerKind};

/// Stepped fractions by rank for scorers whose signal is coarse.
const STEPPED: [f64; 6] = [1.0, 0.8, 0.6, 0.4, 0.2, 0.0];

/// Historical first-place share by course actually taken, relative to course 1.
const COURSE_FRACTION: [f64; 6] = [1.0, 0.45, 0.40, 0.32, 0.20, 0.10];

/// Added to a flying start's magnitude before ranking.
pub const FLYING_PENALTY: f64 = 0.20;

fn stepped(rank: u8) -> f64 {
    STEPPED
        .get(rank.saturating_sub(1) as usize)
        .copied()
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Exhibition time
// ---------------------------------------------------------------------------

/// Exhibition lap time; the fastest lane scores full marks.
pub struct ExhibitionTimeScorer {
    max_score: f64,
}

impl ExhibitionTimeScorer {
    pub fn new(max_score: f64) -> Self {
        Self { max_score }
    }
}

impl Scorer for ExhibitionTimeScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::ExhibitionTime
    }

    fn max_score(&self) -> f64 {
        self.max_score
    }

    fn order(&self) -> RankOrder {
        RankOrder::Ascending
    }

    fn measure(&self, ctx: &ScoringContext<'_>, lane: Lane) -> Option<f64> {
        ctx.detail(lane)?.exhibition_time
    }

    fn describe(&self, measured: f64, rank: u8, present: usize) -> String {
        format!("exhibition {measured:.2}s, rank {rank}/{present}")
    }
}

// ---------------------------------------------------------------------------
// Tilt
// ---------------------------------------------------------------------------

/// Engine tilt suited to the lane: trimmed down (negative) helps the inner
/// three lanes hold the turn, trimmed up helps the outer three run wide.
pub struct TiltScorer {
    max_score: f64,
}

impl TiltScorer {
    pub fn new(max_score: f64) -> Self {
        Self { max_score }
    }
}

impl Scorer for TiltScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::Tilt
    }

    fn max_score(&self) -> f64 {
        self.max_score
    }

    fn order(&self) -> RankOrder {
        RankOrder::Descending
    }

    fn measure(&self, ctx: &ScoringContext<'_>, lane: Lane) -> Option<f64> {
        let tilt = ctx.detail(lane)?.tilt?;
        Some(if lane <= 3 { -tilt } else { tilt })
    }

    fn fraction(&self, rank: u8, _present: usize, _measured: f64) -> f64 {
        stepped(rank)
    }

    fn describe(&self, measured: f64, rank: u8, present: usize) -> String {
        format!("tilt suitability {measured:+.1}, rank {rank}/{present}")
    }
}

// ---------------------------------------------------------------------------
// Motor / boat
// ---------------------------------------------------------------------------

/// Recent top-two rate of the assigned motor, blended with the boat's when known.
pub struct MotorPerformanceScorer {
    max_score: f64,
}

impl MotorPerformanceScorer {
    pub const MOTOR_WEIGHT: f64 = 0.7;
    pub const BOAT_WEIGHT: f64 = 0.3;

    pub fn new(max_score: f64) -> Self {
        Self { max_score }
    }
}

impl Scorer for MotorPerformanceScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::MotorPerformance
    }

    fn max_score(&self) -> f64 {
        self.max_score
    }

    fn order(&self) -> RankOrder {
        RankOrder::Descending
    }

    fn measure(&self, ctx: &ScoringContext<'_>, lane: Lane) -> Option<f64> {
        let entrant = ctx.race.entrant(lane)?;
        let motor = entrant.motor_place_rate?;
        Some(match entrant.boat_place_rate {
            Some(boat) => motor * Self::MOTOR_WEIGHT + boat * Self::BOAT_WEIGHT,
            None => motor,
        })
    }

    fn describe(&self, measured: f64, rank: u8, present: usize) -> String {
        format!("equipment rate {measured:.1}%, rank {rank}/{present}")
    }
}

// ---------------------------------------------------------------------------
// Course entry
// ---------------------------------------------------------------------------

/// Course actually taken in the exhibition start. Scored by the course
/// itself rather than by rank, so a lane that steals an inner course gains
/// and one pushed outward loses.
pub struct CourseEntryScorer {
    max_score: f64,
}

impl CourseEntryScorer {
    pub fn new(max_score: f64) -> Self {
        Self { max_score }
    }
}

impl Scorer for CourseEntryScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::CourseEntry
    }

    fn max_score(&self) -> f64 {
        self.max_score
    }

    fn order(&self) -> RankOrder {
        RankOrder::Ascending
    }

    fn measure(&self, ctx: &ScoringContext<'_>, lane: Lane) -> Option<f64> {
        ctx.detail(lane)?.course.map(f64::from)
    }

    fn fraction(&self, _rank: u8, _present: usize, measured: f64) -> f64 {
        let course = measured.round() as usize;
        course
            .checked_sub(1)
            .and_then(|i| COURSE_FRACTION.get(i))
            .copied()
            .unwrap_or(0.0)
    }

    fn describe(&self, measured: f64, _rank: u8, _present: usize) -> String {
        format!("entered course {}", measured.round() as u8)
    }
}

// ---------------------------------------------------------------------------
// Start timing
// ---------------------------------------------------------------------------

/// Exhibition start timing; closest to the line without flying is best.
pub struct StartTimingScorer {
    max_score: f64,
}

impl StartTimingScorer {
    pub fn new(max_score: f64) -> Self {
        Self { max_score }
    }

    /// Ranked quantity: flying starts count as late by their magnitude plus a penalty.
    pub fn effective(timing: f64) -> f64 {
        if timing < 0.0 {
            timing.abs() + FLYING_PENALTY
        } else {
            timing
        }
    }
}

impl Scorer for StartTimingScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::StartTiming
    }

    fn max_score(&self) -> f64 {
        self.max_score
    }

    fn order(&self) -> RankOrder {
        RankOrder::Ascending
    }

    fn measure(&self, ctx: &ScoringContext<'_>, lane: Lane) -> Option<f64> {
        ctx.detail(lane)?.start_timing.map(Self::effective)
    }

    fn describe(&self, measured: f64, rank: u8, present: usize) -> String {
        format!("effective start {measured:.2}, rank {rank}/{present}")
    }
}

// ---------------------------------------------------------------------------
// Racer ability
// ---------------------------------------------------------------------------

/// Registry win rate, with the top-two rate breaking near-ties.
pub struct RacerAbilityScorer {
    max_score: f64,
}

impl RacerAbilityScorer {
    /// Place rate is a percentage; this brings it to a tenth of the win-rate scale.
    pub const PLACE_WEIGHT: f64 = 0.01;

    pub fn new(max_score: f64) -> Self {
        Self { max_score }
    }
}

impl Scorer for RacerAbilityScorer {
    fn kind(&self) -> ScorerKind {
        ScorerKind::RacerAbility
    }

    fn max_score(&self) -> f64 {
        self.max_score
    }

    fn order(&self) -> RankOrder {
        RankOrder::Descending
    }

    fn measure(&self, ctx: &ScoringContext<'_>, lane: Lane) -> Option<f64> {
        let entrant = ctx.race.entrant(lane)?;
        let win = entrant.win_rate?;
        Some(win + entrant.place_rate.unwrap_or(0.0) * Self::PLACE_WEIGHT)
    }

    fn describe(&self, measured: f64, rank: u8, present: usize) -> String {
        format!("ability index {measured:.2}, rank {rank}/{present}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
