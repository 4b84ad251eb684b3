//! Negative pattern checks on measured ranks.
//!
//! Each predicate is independent. When several match, the lowest multiplier
//! and the highest severity are kept; multipliers never compound.
//!
//! Ranks are read against the number of lanes that were actually ranked on
//! that measure, so a partially measured field is judged on its own size.

use tracing::debug;

use crate::types::{Lane, NegativeCheck, NegativePattern, Severity};

/// Smallest ranked field in which "worst two" means anything.
const MIN_FIELD_WORST_TWO: u8 = 3;
/// Smallest ranked field for the divergence check.
const MIN_FIELD_DIVERGENCE: u8 = 4;
/// Divergent when the rank gap is at least the field size less this.
const DIVERGENCE_SLACK: u8 = 2;
/// Acceptable exhibition start timing window in seconds.
const TIMING_WINDOW: (f64, f64) = (0.0, 0.25);

/// A rank together with the number of lanes ranked alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRank {
    pub rank: u8,
    pub field: u8,
}

impl FieldRank {
    pub fn new(rank: u8, field: u8) -> Self {
        Self { rank, field }
    }

    /// Rank 5 or 6 of six, 3 or 4 of four.
    pub fn in_worst_two(&self) -> bool {
        self.field >= MIN_FIELD_WORST_TWO && self.rank + 2 > self.field
    }

    /// Behind the middle of the field: rank 4+ of six, 3+ of four.
    pub fn in_back_half(&self) -> bool {
        self.field >= MIN_FIELD_WORST_TWO && self.rank > self.field / 2
    }
}

fn divergent(a: FieldRank, b: FieldRank) -> bool {
    let field = a.field.min(b.field);
    field >= MIN_FIELD_DIVERGENCE && a.rank.abs_diff(b.rank) >= field - DIVERGENCE_SLACK
}

struct Predicate {
    pattern: NegativePattern,
    multiplier: f64,
    severity: Severity,
    test: fn(&NegativeInput) -> bool,
}

const PREDICATES: &[Predicate] = &[
    Predicate {
        pattern: NegativePattern::BothWorstTwo,
        multiplier: 0.80,
        severity: Severity::High,
        test: |i| i.ex.in_worst_two() && i.timing.in_worst_two(),
    },
    Predicate {
        pattern: NegativePattern::RankDivergence,
        multiplier: 0.90,
        severity: Severity::Medium,
        test: |i| divergent(i.ex, i.timing),
    },
    Predicate {
        pattern: NegativePattern::TimingOutOfWindow,
        multiplier: 0.85,
        severity: Severity::Medium,
        test: |i| i.timing_offset < TIMING_WINDOW.0 || i.timing_offset > TIMING_WINDOW.1,
    },
    Predicate {
        pattern: NegativePattern::FavoriteSlowExhibition,
        multiplier: 0.88,
        severity: Severity::Medium,
        test: |i| i.predicted_rank == 1 && i.ex.in_back_half(),
    },
    Predicate {
        pattern: NegativePattern::ExhibitionWorstTwo,
        multiplier: 0.92,
        severity: Severity::Low,
        test: |i| i.ex.in_worst_two(),
    },
];

struct NegativeInput {
    ex: FieldRank,
    timing: FieldRank,
    timing_offset: f64,
    predicted_rank: u8,
}

#[derive(Debug, Clone, Default)]
pub struct NegativePatternChecker;

impl NegativePatternChecker {
    pub fn new() -> Self {
        Self
    }

    /// Run every predicate for one lane.
    ///
    /// Returns `None` when the exhibition rank, the timing rank or the raw
    /// timing offset is missing; no check is possible without them.
    pub fn check(
        &self,
        lane: Lane,
        ex: Option<FieldRank>,
        timing: Option<FieldRank>,
        timing_offset: Option<f64>,
        predicted_rank: u8,
    ) -> Option<NegativeCheck> {
        let input = NegativeInput {
            ex: ex?,
            timing: timing?,
            timing_offset: timing_offset?,
            predicted_rank,
        };

        let matched: Vec<&Predicate> = PREDICATES.iter().filter(|p| (p.test)(&input)).collect();
        if matched.is_empty() {
            return Some(NegativeCheck::clean());
        }

        let multiplier = matched
            .iter()
            .map(|p| p.multiplier)
            .fold(1.0_f64, f64::min);
        let severity = matched.iter().map(|p| p.severity).max();
        let matched_patterns: Vec<NegativePattern> = matched.iter().map(|p| p.pattern).collect();

        debug!(
            lane,
            patterns = ?matched_patterns,
            multiplier,
            "Negative patterns matched"
        );

        Some(NegativeCheck {
            has_negative: true,
            matched_patterns,
            severity,
            multiplier,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
