//! Decision layer: environmental tiering, Kelly sizing and strategy table
//! lookups.

pub mod betting;
pub mod environment;
pub mod kelly;

pub use betting::{BettingDecisionEngine, Candidate, OddsBracket, Recommendation, StrategyConfig};
pub use environment::{ConfidenceClassifier, EnvironmentAssessment, EnvironmentalPenalty, TierConfig};
pub use kelly::{KellyCalculator, KellyConfig, KellySizing};
