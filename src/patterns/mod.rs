//! Historically mined pattern rules and their resolution.
//!
//! A `PatternBook` is loaded once at start-up from a TOML file and shared
//! read-only through `Arc`. The matcher finds every rule applicable to a lane,
//! the priority optimizer picks the one that is applied, and the negative
//! checker penalises failure-correlated measurements.

pub mod matcher;
pub mod negative;
pub mod priority;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::types::{
    KeelError, Lane, RacerClass, TimeOfDay, Venue, Weather, WindBucket, WindDirection, FIELD_SIZE,
};

pub use matcher::PatternMatcher;
pub use negative::{FieldRank, NegativePatternChecker};
pub use priority::{PriorityOptimizer, Resolution, Synergy, SYNERGY_SET};

// ---------------------------------------------------------------------------
// Rule model
// ---------------------------------------------------------------------------

/// Context predicate. Every field that is set must equal the race context.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleCondition {
    pub venue: Option<Venue>,
    /// Course actually taken.
    pub course: Option<Lane>,
    pub wind_direction: Option<WindDirection>,
    pub wind_bucket: Option<WindBucket>,
    pub time_of_day: Option<TimeOfDay>,
    pub class: Option<RacerClass>,
    pub weather: Option<Weather>,
}

impl RuleCondition {
    pub fn matches(&self, ctx: &RuleContext) -> bool {
        fn field<T: PartialEq>(want: &Option<T>, have: Option<T>) -> bool {
            match want {
                None => true,
                Some(w) => have.as_ref() == Some(w),
            }
        }

        field(&self.venue, Some(ctx.venue))
            && field(&self.course, Some(ctx.course))
            && field(&self.wind_direction, ctx.wind_direction)
            && field(&self.wind_bucket, ctx.wind_bucket)
            && field(&self.time_of_day, Some(ctx.time_of_day))
            && field(&self.class, Some(ctx.class))
            && field(&self.weather, ctx.weather)
    }
}

/// A conditional multiplier mined from historical results.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PatternRule {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "when", default)]
    pub condition: RuleCondition,
    /// Rank the lane must hold in the initial ranking.
    pub target_rank: u8,
    pub factor: f64,
    pub hit_rate: f64,
    pub sample_count: u32,
}

/// Race context for one lane, as seen by the rule predicates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleContext {
    pub venue: Venue,
    pub course: Lane,
    pub wind_direction: Option<WindDirection>,
    pub wind_bucket: Option<WindBucket>,
    pub time_of_day: TimeOfDay,
    pub class: RacerClass,
    pub weather: Option<Weather>,
    /// Lane's rank in the initial ranking.
    pub rank: u8,
}

// ---------------------------------------------------------------------------
// Pattern book
// ---------------------------------------------------------------------------

/// Immutable rule table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatternBook {
    #[serde(rename = "rule", default)]
    rules: Vec<PatternRule>,
}

impl PatternBook {
    pub fn new(rules: Vec<PatternRule>) -> Result<Self, KeelError> {
        let book = Self { rules };
        book.validate()?;
        Ok(book)
    }

    /// Load and validate a rule file.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            anyhow::bail!("Pattern file not found: {path}");
        }
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read pattern file: {path}"))?;
        let book = Self::from_toml_str(&contents).with_context(|| format!("Invalid pattern file: {path}"))?;
        info!(path, rules = book.len(), "Pattern rules loaded");
        Ok(book)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let book: PatternBook = toml::from_str(contents).context("Failed to parse pattern rules")?;
        book.validate()?;
        Ok(book)
    }

    pub fn validate(&self) -> Result<(), KeelError> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(KeelError::Configuration(format!("duplicate pattern rule id '{}'", rule.id)));
            }
            if !(rule.factor.is_finite() && rule.factor > 0.0) {
                return Err(KeelError::Configuration(format!(
                    "rule '{}': factor must be positive, got {}",
                    rule.id, rule.factor
                )));
            }
            if !(0.0..=1.0).contains(&rule.hit_rate) {
                return Err(KeelError::Configuration(format!(
                    "rule '{}': hit_rate must be within [0, 1], got {}",
                    rule.id, rule.hit_rate
                )));
            }
            if rule.target_rank == 0 || rule.target_rank as usize > FIELD_SIZE {
                return Err(KeelError::Configuration(format!(
                    "rule '{}': target_rank must be 1..=6, got {}",
                    rule.id, rule.target_rank
                )));
            }
            if let Some(course) = rule.condition.course {
                if course == 0 || course as usize > FIELD_SIZE {
                    return Err(KeelError::Configuration(format!(
                        "rule '{}': course must be 1..=6, got {course}",
                        rule.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&PatternRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
