//! Tier calibration.
//!
//! Measures how well each confidence tier's probability proxy matches the
//! realised win rate of the top pick in that tier. Computes Brier scores per
//! tier and overall, and a coarse diagnosis.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{ConfidenceTier, RaceId};

// ---------------------------------------------------------------------------
// Calibration data
// ---------------------------------------------------------------------------

/// One settled top pick.
#[derive(Debug, Clone)]
pub struct CalibrationPoint {
    pub race_id: RaceId,
    pub tier: ConfidenceTier,
    /// Probability proxy of the tier at prediction time.
    pub predicted: f64,
    /// The top pick won.
    pub won: bool,
}

/// Predicted versus realised for one tier.
#[derive(Debug, Clone, Serialize)]
pub struct TierCalibration {
    pub tier: ConfidenceTier,
    pub count: usize,
    pub mean_predicted: f64,
    pub realised: f64,
    pub brier: f64,
    /// |mean_predicted - realised|
    pub deviation: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationReport {
    pub total: usize,
    pub overall_brier: f64,
    /// Highest tier first; tiers with no points are left out.
    pub tiers: Vec<TierCalibration>,
    pub diagnosis: CalibrationDiagnosis,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum CalibrationDiagnosis {
    WellCalibrated,
    /// High tiers win less often than their proxy claims.
    OverConfident,
    /// High tiers win more often than their proxy claims.
    UnderConfident,
    InsufficientData,
}

impl fmt::Display for CalibrationDiagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationDiagnosis::WellCalibrated => write!(f, "well calibrated"),
            CalibrationDiagnosis::OverConfident => write!(f, "over-confident, lower the upper tier proxies"),
            CalibrationDiagnosis::UnderConfident => write!(f, "under-confident, raise the upper tier proxies"),
            CalibrationDiagnosis::InsufficientData => write!(f, "not enough settled races"),
        }
    }
}

// ---------------------------------------------------------------------------
// Calibrator
// ---------------------------------------------------------------------------

/// Tiers need this many points to count towards the diagnosis.
const MIN_TIER_POINTS: usize = 5;
/// And the whole sample at least this many.
const MIN_TOTAL_POINTS: usize = 20;
/// Deviation below this is treated as calibrated.
const TOLERANCE: f64 = 0.05;

#[derive(Debug, Default)]
pub struct Calibrator {
    points: Vec<CalibrationPoint>,
}

impl Calibrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_point(&mut self, point: CalibrationPoint) {
        self.points.push(point);
    }

    pub fn count(&self) -> usize {
        self.points.len()
    }

    pub fn report(&self) -> CalibrationReport {
        if self.points.is_empty() {
            return CalibrationReport {
                total: 0,
                overall_brier: 0.0,
                tiers: Vec::new(),
                diagnosis: CalibrationDiagnosis::InsufficientData,
            };
        }

        let mut by_tier: BTreeMap<ConfidenceTier, Vec<&CalibrationPoint>> = BTreeMap::new();
        for p in &self.points {
            by_tier.entry(p.tier).or_default().push(p);
        }

        let tiers: Vec<TierCalibration> = by_tier
            .into_iter()
            .rev()
            .map(|(tier, points)| {
                let count = points.len();
                let mean_predicted = points.iter().map(|p| p.predicted).sum::<f64>() / count as f64;
                let realised = points.iter().filter(|p| p.won).count() as f64 / count as f64;
                TierCalibration {
                    tier,
                    count,
                    mean_predicted,
                    realised,
                    brier: brier(&points),
                    deviation: (mean_predicted - realised).abs(),
                }
            })
            .collect();

        let all: Vec<&CalibrationPoint> = self.points.iter().collect();
        let diagnosis = self.diagnose(&tiers);
        CalibrationReport {
            total: self.points.len(),
            overall_brier: brier(&all),
            tiers,
            diagnosis,
        }
    }

    fn diagnose(&self, tiers: &[TierCalibration]) -> CalibrationDiagnosis {
        let populated: Vec<&TierCalibration> =
            tiers.iter().filter(|t| t.count >= MIN_TIER_POINTS).collect();
        if populated.len() < 2 || self.points.len() < MIN_TOTAL_POINTS {
            return CalibrationDiagnosis::InsufficientData;
        }

        let mut over = 0;
        let mut under = 0;
        for t in populated.iter().filter(|t| t.deviation >= TOLERANCE) {
            if t.realised < t.mean_predicted {
                over += 1;
            } else {
                under += 1;
            }
        }

        if over > under {
            CalibrationDiagnosis::OverConfident
        } else if under > over {
            CalibrationDiagnosis::UnderConfident
        } else {
            CalibrationDiagnosis::WellCalibrated
        }
    }
}

/// Brier = (1/N) * Σ(predicted - outcome)². 0 is perfect.
fn brier(points: &[&CalibrationPoint]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let sum: f64 = points
        .iter()
        .map(|p| {
            let outcome = if p.won { 1.0 } else { 0.0 };
            (p.predicted - outcome).powi(2)
        })
        .sum();
    sum / points.len() as f64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
