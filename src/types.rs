//! Shared types for the KEEL engine.
//!
//! These types form the data model used across all modules. Race data is
//! produced by the external collection layer and is read-only here; the
//! scoring and decision records are recomputed on every evaluation.

use chrono::{NaiveDate, NaiveTime, Timelike};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Lanes & identifiers
// ---------------------------------------------------------------------------

/// Starting position 1..=6.
pub type Lane = u8;

/// Every race has exactly this many entrants.
pub const FIELD_SIZE: usize = 6;

/// All lanes in ascending order.
pub const LANES: [Lane; FIELD_SIZE] = [1, 2, 3, 4, 5, 6];

/// Zero-based slot for a lane, `None` outside 1..=6.
pub fn lane_index(lane: Lane) -> Option<usize> {
    if (1..=FIELD_SIZE as u8).contains(&lane) {
        Some((lane - 1) as usize)
    } else {
        None
    }
}

/// Venue (stadium) identifier, 1..=24.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Venue(pub u8);

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// Unique race key: venue, day and race number on that day's card.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RaceId {
    pub venue: Venue,
    pub date: NaiveDate,
    pub race_no: u8,
}

impl RaceId {
    pub fn new(venue: u8, date: NaiveDate, race_no: u8) -> Self {
        Self {
            venue: Venue(venue),
            date,
            race_no,
        }
    }
}

impl fmt::Display for RaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-R{:02}", self.venue, self.date.format("%Y%m%d"), self.race_no)
    }
}

// ---------------------------------------------------------------------------
// Context enums
// ---------------------------------------------------------------------------

/// Racer class. Declared best-first, so `A1 < B2` in `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RacerClass {
    A1,
    A2,
    B1,
    B2,
}

impl fmt::Display for RacerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RacerClass::A1 => write!(f, "A1"),
            RacerClass::A2 => write!(f, "A2"),
            RacerClass::B1 => write!(f, "B1"),
            RacerClass::B2 => write!(f, "B2"),
        }
    }
}

impl std::str::FromStr for RacerClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A1" => Ok(RacerClass::A1),
            "A2" => Ok(RacerClass::A2),
            "B1" => Ok(RacerClass::B1),
            "B2" => Ok(RacerClass::B2),
            _ => Err(anyhow::anyhow!("Unknown racer class: {s}")),
        }
    }
}

/// Wind direction relative to the first turn mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindDirection {
    Calm,
    Headwind,
    Tailwind,
    Crosswind,
}

impl fmt::Display for WindDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindDirection::Calm => write!(f, "calm"),
            WindDirection::Headwind => write!(f, "headwind"),
            WindDirection::Tailwind => write!(f, "tailwind"),
            WindDirection::Crosswind => write!(f, "crosswind"),
        }
    }
}

/// Wind speed bucket (m/s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindBucket {
    Calm,
    Light,
    Moderate,
    Strong,
}

impl WindBucket {
    pub fn from_speed(speed: f64) -> Self {
        if speed < 1.0 {
            WindBucket::Calm
        } else if speed < 4.0 {
            WindBucket::Light
        } else if speed < 6.0 {
            WindBucket::Moderate
        } else {
            WindBucket::Strong
        }
    }
}

/// Time-of-day bucket for the scheduled start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Day,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn from_time(time: NaiveTime) -> Self {
        match time.hour() {
            0..=11 => TimeOfDay::Morning,
            12..=15 => TimeOfDay::Day,
            16..=18 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeOfDay::Morning => write!(f, "morning"),
            TimeOfDay::Day => write!(f, "day"),
            TimeOfDay::Evening => write!(f, "evening"),
            TimeOfDay::Night => write!(f, "night"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    Clear,
    Cloudy,
    Rain,
    Snow,
    Fog,
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Weather::Clear => write!(f, "clear"),
            Weather::Cloudy => write!(f, "cloudy"),
            Weather::Rain => write!(f, "rain"),
            Weather::Snow => write!(f, "snow"),
            Weather::Fog => write!(f, "fog"),
        }
    }
}

// ---------------------------------------------------------------------------
// Race data (read-only, produced by the collection layer)
// ---------------------------------------------------------------------------

/// Water and weather reading taken shortly before the start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceConditions {
    pub wind_direction: WindDirection,
    /// m/s
    pub wind_speed: f64,
    /// cm
    pub wave_height: f64,
    pub weather: Weather,
}

impl RaceConditions {
    pub fn wind_bucket(&self) -> WindBucket {
        WindBucket::from_speed(self.wind_speed)
    }
}

/// One competitor on the race card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entrant {
    pub lane: Lane,
    pub racer_id: u32,
    pub name: String,
    pub class: RacerClass,
    /// National win rate (points per start, 0–10 scale).
    pub win_rate: Option<f64>,
    /// National top-two rate (0–100).
    pub place_rate: Option<f64>,
    pub motor_no: Option<u16>,
    /// Motor top-two rate over its recent service (0–100).
    pub motor_place_rate: Option<f64>,
    pub boat_no: Option<u16>,
    pub boat_place_rate: Option<f64>,
}

/// A race card with its six entrants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceEvent {
    pub id: RaceId,
    pub race_time: NaiveTime,
    pub entrants: Vec<Entrant>,
    pub conditions: Option<RaceConditions>,
}

impl RaceEvent {
    /// Check that the card has six entrants whose lanes are a permutation of 1..=6.
    pub fn validate(&self) -> Result<(), KeelError> {
        if self.entrants.len() != FIELD_SIZE {
            return Err(KeelError::DataInconsistency {
                race: self.id.to_string(),
                message: format!("expected {FIELD_SIZE} entrants, found {}", self.entrants.len()),
            });
        }
        let mut seen = [false; FIELD_SIZE];
        for entrant in &self.entrants {
            match lane_index(entrant.lane) {
                Some(i) if !seen[i] => seen[i] = true,
                Some(_) => {
                    return Err(KeelError::DataInconsistency {
                        race: self.id.to_string(),
                        message: format!("lane {} assigned twice", entrant.lane),
                    })
                }
                None => {
                    return Err(KeelError::DataInconsistency {
                        race: self.id.to_string(),
                        message: format!("lane {} out of range", entrant.lane),
                    })
                }
            }
        }
        Ok(())
    }

    pub fn entrant(&self, lane: Lane) -> Option<&Entrant> {
        self.entrants.iter().find(|e| e.lane == lane)
    }

    pub fn time_of_day(&self) -> TimeOfDay {
        TimeOfDay::from_time(self.race_time)
    }
}

/// Same-day measurements for one entrant. Any field may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuredDetail {
    pub lane: Lane,
    /// Exhibition (practice-run) lap time in seconds; lower is better.
    pub exhibition_time: Option<f64>,
    /// Engine tilt angle in degrees (-0.5 ..= 3.0).
    pub tilt: Option<f64>,
    /// Starting course actually taken in the exhibition start.
    pub course: Option<Lane>,
    /// Exhibition start timing in seconds; negative means a flying start.
    pub start_timing: Option<f64>,
}

impl MeasuredDetail {
    pub fn empty(lane: Lane) -> Self {
        Self {
            lane,
            exhibition_time: None,
            tilt: None,
            course: None,
            start_timing: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Betting combinations, odds & settlement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetKind {
    Win,
    Exacta,
    Trifecta,
}

impl fmt::Display for BetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetKind::Win => write!(f, "win"),
            BetKind::Exacta => write!(f, "exacta"),
            BetKind::Trifecta => write!(f, "trifecta"),
        }
    }
}

/// An ordered set of lanes a ticket is written on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Combination {
    Win(Lane),
    Exacta(Lane, Lane),
    Trifecta(Lane, Lane, Lane),
}

impl Combination {
    pub fn kind(&self) -> BetKind {
        match self {
            Combination::Win(_) => BetKind::Win,
            Combination::Exacta(..) => BetKind::Exacta,
            Combination::Trifecta(..) => BetKind::Trifecta,
        }
    }

    /// Build a combination of `kind` from the leading lanes of a finish order.
    pub fn from_order(kind: BetKind, order: &[Lane]) -> Option<Self> {
        match (kind, order) {
            (BetKind::Win, [a, ..]) => Some(Combination::Win(*a)),
            (BetKind::Exacta, [a, b, ..]) => Some(Combination::Exacta(*a, *b)),
            (BetKind::Trifecta, [a, b, c, ..]) => Some(Combination::Trifecta(*a, *b, *c)),
            _ => None,
        }
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combination::Win(a) => write!(f, "{a}"),
            Combination::Exacta(a, b) => write!(f, "{a}-{b}"),
            Combination::Trifecta(a, b, c) => write!(f, "{a}-{b}-{c}"),
        }
    }
}

/// Quoted payout multiplier for a combination at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsQuote {
    pub race_id: RaceId,
    pub combination: Combination,
    pub odds: f64,
}

/// Official finish order (may be shorter than six after disqualifications).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceResult {
    pub race_id: RaceId,
    pub finish_order: Vec<Lane>,
}

impl RaceResult {
    /// The winning combination of the given kind, if the finish order covers it.
    pub fn settled(&self, kind: BetKind) -> Option<Combination> {
        Combination::from_order(kind, &self.finish_order)
    }
}

/// Settled payout per unit staked on a winning combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutRecord {
    pub race_id: RaceId,
    pub combination: Combination,
    pub payout: f64,
}

// ---------------------------------------------------------------------------
// Scoring records
// ---------------------------------------------------------------------------

/// Confidence tier. Declared lowest-first so `VeryHigh > VeryLow` in `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceTier {
    /// All tiers, highest first.
    pub const ALL: &'static [ConfidenceTier] = &[
        ConfidenceTier::VeryHigh,
        ConfidenceTier::High,
        ConfidenceTier::Medium,
        ConfidenceTier::Low,
        ConfidenceTier::VeryLow,
    ];
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceTier::VeryHigh => write!(f, "very_high"),
            ConfidenceTier::High => write!(f, "high"),
            ConfidenceTier::Medium => write!(f, "medium"),
            ConfidenceTier::Low => write!(f, "low"),
            ConfidenceTier::VeryLow => write!(f, "very_low"),
        }
    }
}

impl std::str::FromStr for ConfidenceTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "very_high" | "veryhigh" => Ok(ConfidenceTier::VeryHigh),
            "high" => Ok(ConfidenceTier::High),
            "medium" | "mid" => Ok(ConfidenceTier::Medium),
            "low" => Ok(ConfidenceTier::Low),
            "very_low" | "verylow" => Ok(ConfidenceTier::VeryLow),
            _ => Err(anyhow::anyhow!("Unknown confidence tier: {s}")),
        }
    }
}

/// Per-entrant evaluation stage. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EvaluationStage {
    RawScored,
    PatternAdjusted,
    NegativeChecked,
    EnvironmentAdjusted,
    Classified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    ExhibitionTime,
    Tilt,
    MotorPerformance,
    CourseEntry,
    StartTiming,
    RacerAbility,
}

impl fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScorerKind::ExhibitionTime => write!(f, "exhibition_time"),
            ScorerKind::Tilt => write!(f, "tilt"),
            ScorerKind::MotorPerformance => write!(f, "motor_performance"),
            ScorerKind::CourseEntry => write!(f, "course_entry"),
            ScorerKind::StartTiming => write!(f, "start_timing"),
            ScorerKind::RacerAbility => write!(f, "racer_ability"),
        }
    }
}

/// One scorer's verdict on one lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub lane: Lane,
    pub scorer: ScorerKind,
    /// Always within `[0, max_score]`.
    pub value: f64,
    pub max_score: f64,
    /// Rank among lanes that had the measurement (1 = best).
    pub rank: Option<u8>,
    /// The raw quantity the rank was taken over.
    pub measured: Option<f64>,
    /// Set when this lane had no measurement; value is then 0.
    pub missing: bool,
    pub rationale: String,
}

impl SubScore {
    pub fn missing(lane: Lane, scorer: ScorerKind, max_score: f64) -> Self {
        Self {
            lane,
            scorer,
            value: 0.0,
            max_score,
            rank: None,
            measured: None,
            missing: true,
            rationale: format!("{scorer}: no measurement"),
        }
    }

    pub fn in_range(&self) -> bool {
        self.value >= 0.0 && self.value <= self.max_score
    }
}

/// Known failure-correlated conditions on a predicted contender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativePattern {
    /// Exhibition and start-timing ranks both in the worst two.
    BothWorstTwo,
    /// Exhibition and start-timing ranks at least four apart.
    RankDivergence,
    /// Exhibition start timing was flying or too late.
    TimingOutOfWindow,
    /// A predicted winner posted a mid-field or worse exhibition time.
    FavoriteSlowExhibition,
    /// Exhibition rank alone in the worst two.
    ExhibitionWorstTwo,
}

impl fmt::Display for NegativePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegativePattern::BothWorstTwo => write!(f, "both_worst_two"),
            NegativePattern::RankDivergence => write!(f, "rank_divergence"),
            NegativePattern::TimingOutOfWindow => write!(f, "timing_out_of_window"),
            NegativePattern::FavoriteSlowExhibition => write!(f, "favorite_slow_exhibition"),
            NegativePattern::ExhibitionWorstTwo => write!(f, "exhibition_worst_two"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Outcome of the negative-pattern check for one lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegativeCheck {
    pub has_negative: bool,
    pub matched_patterns: Vec<NegativePattern>,
    pub severity: Option<Severity>,
    /// Lowest multiplier among matches; 1.0 when nothing matched.
    pub multiplier: f64,
}

impl NegativeCheck {
    pub fn clean() -> Self {
        Self {
            has_negative: false,
            matched_patterns: Vec::new(),
            severity: None,
            multiplier: 1.0,
        }
    }
}

/// What changed a score during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AdjustmentSource {
    Pattern { rule_id: String, priority: f64 },
    Synergy { rule_ids: (String, String), bonus: f64 },
    Negative { patterns: Vec<NegativePattern> },
    Environment { rules: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub source: AdjustmentSource,
    pub before: f64,
    pub after: f64,
}

/// Final per-entrant record for one race evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScoreResult {
    pub lane: Lane,
    pub racer_id: u32,
    pub class: RacerClass,
    /// Sum of sub-scores.
    pub raw_score: f64,
    /// Score after every adjustment in `trail`.
    pub final_score: f64,
    /// Rank by raw score (ties by ascending lane).
    pub initial_rank: u8,
    /// Rank by final score (ties by ascending lane).
    pub final_rank: u8,
    pub sub_scores: Vec<SubScore>,
    pub trail: Vec<Adjustment>,
    pub negative: Option<NegativeCheck>,
    pub environment_penalty: f64,
    /// False when the adjusted score fell below the configured minimum.
    pub environment_accept: bool,
    /// Only ever set by the classifier.
    pub tier: Option<ConfidenceTier>,
    pub stage: EvaluationStage,
    /// Some measurement for this entrant was missing.
    pub incomplete: bool,
}

impl CompositeScoreResult {
    /// Advance to `next`. Backward or repeated transitions are refused.
    pub fn advance(&mut self, next: EvaluationStage) -> bool {
        if next > self.stage {
            self.stage = next;
            true
        } else {
            false
        }
    }

    pub fn sub_score(&self, kind: ScorerKind) -> Option<&SubScore> {
        self.sub_scores.iter().find(|s| s.scorer == kind)
    }

    /// Record a multiplicative or subtractive adjustment and apply it.
    pub fn apply(&mut self, source: AdjustmentSource, after: f64) {
        self.trail.push(Adjustment {
            source,
            before: self.final_score,
            after,
        });
        self.final_score = after;
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyVariant {
    Conservative,
    Balanced,
    ValueSeeking,
}

impl fmt::Display for StrategyVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyVariant::Conservative => write!(f, "conservative"),
            StrategyVariant::Balanced => write!(f, "balanced"),
            StrategyVariant::ValueSeeking => write!(f, "value_seeking"),
        }
    }
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Accepted,
    NoMatchingStrategy,
    InvalidOdds,
    BelowMinProbability,
    BelowMinExpectedValue,
    NonPositiveKelly,
    BelowMinStake,
    /// Environment-adjusted score below the configured minimum.
    EnvironmentRejected,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionReason::Accepted => write!(f, "accepted"),
            DecisionReason::NoMatchingStrategy => write!(f, "no matching strategy"),
            DecisionReason::InvalidOdds => write!(f, "odds at or below 1.0"),
            DecisionReason::BelowMinProbability => write!(f, "below minimum probability"),
            DecisionReason::BelowMinExpectedValue => write!(f, "below minimum expected value"),
            DecisionReason::NonPositiveKelly => write!(f, "non-positive Kelly fraction"),
            DecisionReason::BelowMinStake => write!(f, "stake below minimum"),
            DecisionReason::EnvironmentRejected => write!(f, "rejected on environmental risk"),
        }
    }
}

/// A staking verdict for one entrant under one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetDecision {
    pub strategy_id: String,
    pub variant: Option<StrategyVariant>,
    pub race_id: RaceId,
    pub combination: Combination,
    pub tier: ConfidenceTier,
    pub odds: f64,
    /// Tier probability proxy used for EV and Kelly.
    pub probability: f64,
    pub expected_value: f64,
    pub kelly_fraction: f64,
    /// Zero unless `accepted`.
    pub stake: Decimal,
    pub accepted: bool,
    pub reason: DecisionReason,
}

impl fmt::Display for BetDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} | tier={} odds={:.1} p={:.0}% ev={:+.2} kelly={:.1}% stake={} | {}",
            self.strategy_id,
            self.race_id,
            self.combination,
            self.tier,
            self.odds,
            self.probability * 100.0,
            self.expected_value,
            self.kelly_fraction * 100.0,
            self.stake,
            self.reason,
        )
    }
}

// ---------------------------------------------------------------------------
// Backtest aggregates
// ---------------------------------------------------------------------------

/// Per-strategy-bucket aggregate over a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy_id: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub targeted: u64,
    pub hits: u64,
    pub staked: Decimal,
    pub returned: Decimal,
}

impl BacktestResult {
    pub fn new(strategy_id: impl Into<String>, from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            from,
            to,
            targeted: 0,
            hits: 0,
            staked: Decimal::ZERO,
            returned: Decimal::ZERO,
        }
    }

    /// Returned / staked × 100. `None` when nothing was staked.
    pub fn roi(&self) -> Option<f64> {
        if self.staked <= Decimal::ZERO {
            return None;
        }
        (self.returned / self.staked * Decimal::ONE_HUNDRED).to_f64()
    }

    /// Hits / targeted as a fraction. `None` when nothing was targeted.
    pub fn hit_rate(&self) -> Option<f64> {
        if self.targeted == 0 {
            None
        } else {
            Some(self.hits as f64 / self.targeted as f64)
        }
    }
}

impl fmt::Display for BacktestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let roi = self
            .roi()
            .map(|r| format!("{r:.1}%"))
            .unwrap_or_else(|| "n/a".to_string());
        let hit = self
            .hit_rate()
            .map(|h| format!("{:.1}%", h * 100.0))
            .unwrap_or_else(|| "n/a".to_string());
        write!(
            f,
            "{} [{}..{}] targeted={} hits={} ({hit}) staked={} returned={} roi={roi}",
            self.strategy_id, self.from, self.to, self.targeted, self.hits, self.staked, self.returned,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for KEEL.
#[derive(Debug, thiserror::Error)]
pub enum KeelError {
    #[error("Missing data for {race} lane {lane}: {what}")]
    MissingData { race: String, lane: Lane, what: String },

    #[error("No matching strategy for {0}")]
    NoMatchingStrategy(String),

    #[error("Data inconsistency in {race}: {message}")]
    DataInconsistency { race: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Race not found: {0}")]
    RaceNotFound(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
