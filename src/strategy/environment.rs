//! Environmental risk penalty and confidence tiering.
//!
//! The environmental penalty is the sum of independently triggered context
//! rules (venue, time of day, weather, wind, waves). Those are independent
//! external hazards, so unlike pattern rules they do add up. The adjusted
//! score is then mapped onto five ordered confidence tiers by fixed
//! thresholds.

use chrono::NaiveTime;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::types::{
    ConfidenceTier, KeelError, RaceConditions, TimeOfDay, Venue, Weather, WindBucket, WindDirection,
};

// ---------------------------------------------------------------------------
// Tier thresholds
// ---------------------------------------------------------------------------

/// Score thresholds (inclusive lower bounds) and the win probability each
/// tier stands for.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub very_high: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
    pub probability: TierProbabilities,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            very_high: 80.0,
            high: 65.0,
            medium: 50.0,
            low: 35.0,
            probability: TierProbabilities::default(),
        }
    }
}

/// Probability proxy per tier, used for EV and Kelly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TierProbabilities {
    pub very_high: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
    pub very_low: f64,
}

impl Default for TierProbabilities {
    fn default() -> Self {
        Self {
            very_high: 0.85,
            high: 0.65,
            medium: 0.45,
            low: 0.30,
            very_low: 0.15,
        }
    }
}

impl TierConfig {
    pub fn probability_for(&self, tier: ConfidenceTier) -> f64 {
        match tier {
            ConfidenceTier::VeryHigh => self.probability.very_high,
            ConfidenceTier::High => self.probability.high,
            ConfidenceTier::Medium => self.probability.medium,
            ConfidenceTier::Low => self.probability.low,
            ConfidenceTier::VeryLow => self.probability.very_low,
        }
    }

    pub fn validate(&self) -> Result<(), KeelError> {
        let thresholds = [self.very_high, self.high, self.medium, self.low];
        if thresholds.iter().any(|t| !t.is_finite()) {
            return Err(KeelError::Configuration("tier thresholds must be finite".into()));
        }
        if !thresholds.windows(2).all(|w| w[0] > w[1]) {
            return Err(KeelError::Configuration(format!(
                "tier thresholds must be strictly descending, got {thresholds:?}"
            )));
        }
        for tier in ConfidenceTier::ALL {
            let p = self.probability_for(*tier);
            if !(0.0..=1.0).contains(&p) {
                return Err(KeelError::Configuration(format!(
                    "probability for tier {tier} must be within [0, 1], got {p}"
                )));
            }
        }
        Ok(())
    }
}

/// Maps a score to a confidence tier. Pure function of the score.
#[derive(Debug, Clone)]
pub struct ConfidenceClassifier {
    config: TierConfig,
}

impl ConfidenceClassifier {
    pub fn new(config: TierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TierConfig {
        &self.config
    }

    pub fn classify(&self, score: f64) -> ConfidenceTier {
        let c = &self.config;
        if score >= c.very_high {
            ConfidenceTier::VeryHigh
        } else if score >= c.high {
            ConfidenceTier::High
        } else if score >= c.medium {
            ConfidenceTier::Medium
        } else if score >= c.low {
            ConfidenceTier::Low
        } else {
            ConfidenceTier::VeryLow
        }
    }
}

// ---------------------------------------------------------------------------
// Penalty tables
// ---------------------------------------------------------------------------

/// A stepped threshold: the highest step reached applies.
#[derive(Debug, Clone, Deserialize)]
pub struct PenaltyStep {
    pub at_least: f64,
    pub penalty: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeOfDayPenalties {
    pub morning: f64,
    pub day: f64,
    pub evening: f64,
    pub night: f64,
}

impl Default for TimeOfDayPenalties {
    fn default() -> Self {
        Self {
            morning: 0.0,
            day: 0.0,
            evening: 1.0,
            night: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeatherPenalties {
    pub rain: f64,
    pub snow: f64,
    pub fog: f64,
}

impl Default for WeatherPenalties {
    fn default() -> Self {
        Self {
            rain: 2.0,
            snow: 4.0,
            fog: 3.0,
        }
    }
}

/// Environmental penalty tables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Venue id (as a string key) → penalty.
    pub venue_risk: BTreeMap<String, f64>,
    pub time_of_day: TimeOfDayPenalties,
    pub weather: WeatherPenalties,
    /// Wind speed steps (m/s).
    pub wind_steps: Vec<PenaltyStep>,
    /// Extra penalty for a crosswind of moderate strength or more.
    pub crosswind_extra: f64,
    /// Wave height steps (cm).
    pub wave_steps: Vec<PenaltyStep>,
    /// When set, adjusted scores below this are not accepted.
    pub min_accept_score: Option<f64>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        let venue_risk = [("2", 3.0), ("3", 6.0), ("4", 2.0), ("14", 3.0), ("20", 2.0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self {
            venue_risk,
            time_of_day: TimeOfDayPenalties::default(),
            weather: WeatherPenalties::default(),
            wind_steps: vec![
                PenaltyStep { at_least: 4.0, penalty: 3.0 },
                PenaltyStep { at_least: 6.0, penalty: 6.0 },
                PenaltyStep { at_least: 8.0, penalty: 10.0 },
            ],
            crosswind_extra: 1.5,
            wave_steps: vec![
                PenaltyStep { at_least: 5.0, penalty: 2.0 },
                PenaltyStep { at_least: 10.0, penalty: 5.0 },
            ],
            min_accept_score: None,
        }
    }
}

impl EnvironmentConfig {
    /// Parse the venue table keys. Fails on anything but a venue id 1..=24.
    pub fn venue_table(&self) -> Result<HashMap<Venue, f64>, KeelError> {
        self.venue_risk
            .iter()
            .map(|(key, penalty)| {
                let id: u8 = key.trim().parse().map_err(|_| {
                    KeelError::Configuration(format!("venue_risk key '{key}' is not a venue id"))
                })?;
                if !(1..=24).contains(&id) {
                    return Err(KeelError::Configuration(format!("venue id {id} out of range 1..=24")));
                }
                Ok((Venue(id), *penalty))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), KeelError> {
        self.venue_table()?;
        let mut all = vec![
            self.time_of_day.morning,
            self.time_of_day.day,
            self.time_of_day.evening,
            self.time_of_day.night,
            self.weather.rain,
            self.weather.snow,
            self.weather.fog,
            self.crosswind_extra,
        ];
        all.extend(self.venue_risk.values());
        all.extend(self.wind_steps.iter().map(|s| s.penalty));
        all.extend(self.wave_steps.iter().map(|s| s.penalty));
        if all.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(KeelError::Configuration(
                "environmental penalties must be finite and non-negative".into(),
            ));
        }
        for (name, steps) in [("wind_steps", &self.wind_steps), ("wave_steps", &self.wave_steps)] {
            if !steps.windows(2).all(|w| w[0].at_least < w[1].at_least) {
                return Err(KeelError::Configuration(format!("{name} must be strictly ascending")));
            }
        }
        if let Some(min) = self.min_accept_score {
            if !min.is_finite() {
                return Err(KeelError::Configuration(format!(
                    "environment.min_accept_score must be finite, got {min}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Assessment
// ---------------------------------------------------------------------------

/// Result of the environmental check for one score.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentAssessment {
    pub accept: bool,
    pub penalty: f64,
    pub adjusted_score: f64,
    pub adjusted_tier: ConfidenceTier,
    pub reason: String,
    pub applied_rules: Vec<String>,
}

pub struct EnvironmentalPenalty {
    venues: HashMap<Venue, f64>,
    config: EnvironmentConfig,
    classifier: ConfidenceClassifier,
}

impl EnvironmentalPenalty {
    pub fn new(config: EnvironmentConfig, classifier: ConfidenceClassifier) -> Result<Self, KeelError> {
        config.validate()?;
        Ok(Self {
            venues: config.venue_table()?,
            config,
            classifier,
        })
    }

    pub fn classifier(&self) -> &ConfidenceClassifier {
        &self.classifier
    }

    /// Sum every triggered context rule. Conditions may be absent, in which
    /// case only venue and time-of-day rules can fire.
    pub fn penalty(
        &self,
        venue: Venue,
        race_time: NaiveTime,
        conditions: Option<&RaceConditions>,
    ) -> (f64, Vec<String>) {
        let mut total = 0.0;
        let mut rules = Vec::new();
        let mut add = |amount: f64, rule: String| {
            if amount > 0.0 {
                total += amount;
                rules.push(rule);
            }
        };

        if let Some(p) = self.venues.get(&venue) {
            add(*p, format!("venue:{venue}"));
        }

        let tod = TimeOfDay::from_time(race_time);
        let tod_penalty = match tod {
            TimeOfDay::Morning => self.config.time_of_day.morning,
            TimeOfDay::Day => self.config.time_of_day.day,
            TimeOfDay::Evening => self.config.time_of_day.evening,
            TimeOfDay::Night => self.config.time_of_day.night,
        };
        add(tod_penalty, format!("time:{tod}"));

        if let Some(c) = conditions {
            let weather_penalty = match c.weather {
                Weather::Rain => self.config.weather.rain,
                Weather::Snow => self.config.weather.snow,
                Weather::Fog => self.config.weather.fog,
                Weather::Clear | Weather::Cloudy => 0.0,
            };
            add(weather_penalty, format!("weather:{}", c.weather));

            if let Some(step) = highest_step(&self.config.wind_steps, c.wind_speed) {
                add(step.penalty, format!("wind>={}", step.at_least));
            }
            if c.wind_direction == WindDirection::Crosswind && c.wind_bucket() >= WindBucket::Moderate {
                add(self.config.crosswind_extra, "crosswind".to_string());
            }
            if let Some(step) = highest_step(&self.config.wave_steps, c.wave_height) {
                add(step.penalty, format!("wave>={}", step.at_least));
            }
        }

        (total, rules)
    }

    /// Apply the context penalty to `original_score` and classify the result.
    ///
    /// `accept` is only false when a minimum score is configured and the
    /// adjusted score falls below it.
    pub fn should_accept_bet(
        &self,
        venue: Venue,
        race_time: NaiveTime,
        conditions: Option<&RaceConditions>,
        original_score: f64,
    ) -> EnvironmentAssessment {
        let (penalty, applied_rules) = self.penalty(venue, race_time, conditions);
        let adjusted_score = original_score - penalty;
        let adjusted_tier = self.classifier.classify(adjusted_score);

        let (accept, reason) = match self.config.min_accept_score {
            Some(min) if adjusted_score < min => (
                false,
                format!("adjusted score {adjusted_score:.1} below minimum {min:.1}"),
            ),
            _ if applied_rules.is_empty() => (true, "no environmental risk".to_string()),
            _ => (true, format!("penalty {penalty:.1} from {}", applied_rules.join(", "))),
        };

        debug!(
            venue = %venue,
            penalty,
            original_score,
            adjusted_score,
            tier = %adjusted_tier,
            accept,
            "Environment assessed"
        );

        EnvironmentAssessment {
            accept,
            penalty,
            adjusted_score,
            adjusted_tier,
            reason,
            applied_rules,
        }
    }
}

fn highest_step(steps: &[PenaltyStep], value: f64) -> Option<&PenaltyStep> {
    steps.iter().rev().find(|s| value >= s.at_least)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
