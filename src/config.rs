//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section has defaults; `validate` fails fast on anything malformed before a
//! single race is evaluated.

use anyhow::{Context, Result};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;

use crate::backtest::BacktestStrategy;
use crate::scoring::ScoringConfig;
use crate::strategy::betting::{default_odds_brackets, validate_strategy_table};
use crate::strategy::environment::EnvironmentConfig;
use crate::strategy::{KellyConfig, OddsBracket, StrategyConfig, TierConfig};
use crate::types::KeelError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub staking: StakingConfig,
    pub scoring: ScoringConfig,
    pub tiers: TierConfig,
    pub environment: EnvironmentConfig,
    pub odds_brackets: Vec<OddsBracket>,
    pub strategies: Vec<StrategyConfig>,
    pub backtest: Vec<BacktestStrategy>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            staking: StakingConfig::default(),
            scoring: ScoringConfig::default(),
            tiers: TierConfig::default(),
            environment: EnvironmentConfig::default(),
            odds_brackets: default_odds_brackets(),
            strategies: Vec::new(),
            backtest: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub name: String,
    /// Races evaluated concurrently in a batch.
    pub workers: usize,
    /// Stop submitting new races after this many seconds.
    pub batch_timeout_secs: Option<u64>,
    pub patterns_file: String,
    pub data_file: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "KEEL".to_string(),
            workers: 4,
            batch_timeout_secs: None,
            patterns_file: "patterns.toml".to_string(),
            data_file: "data/snapshot.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StakingConfig {
    pub bankroll: Decimal,
    pub kelly_fraction: f64,
    pub max_stake_pct: f64,
    pub min_stake: Decimal,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            bankroll: dec!(100000),
            kelly_fraction: 0.25,
            max_stake_pct: 0.05,
            min_stake: dec!(1),
        }
    }
}

impl StakingConfig {
    pub fn kelly(&self) -> KellyConfig {
        KellyConfig {
            fraction: self.kelly_fraction,
            max_stake_pct: self.max_stake_pct,
            min_stake: self.min_stake,
        }
    }
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), KeelError> {
        if self.engine.workers == 0 {
            return Err(KeelError::Configuration("engine.workers must be at least 1".into()));
        }

        let s = &self.staking;
        if s.bankroll <= Decimal::ZERO {
            return Err(KeelError::Configuration(format!(
                "staking.bankroll must be positive, got {}",
                s.bankroll
            )));
        }
        if !(s.kelly_fraction > 0.0 && s.kelly_fraction <= 1.0) {
            return Err(KeelError::Configuration(format!(
                "staking.kelly_fraction must be within (0, 1], got {}",
                s.kelly_fraction
            )));
        }
        if !(s.max_stake_pct > 0.0 && s.max_stake_pct <= 1.0) {
            return Err(KeelError::Configuration(format!(
                "staking.max_stake_pct must be within (0, 1], got {}",
                s.max_stake_pct
            )));
        }
        if s.min_stake < Decimal::ZERO {
            return Err(KeelError::Configuration("staking.min_stake must not be negative".into()));
        }

        self.scoring.validate()?;
        self.tiers.validate()?;
        self.environment.validate()?;
        validate_strategy_table(&self.odds_brackets, &self.strategies)?;

        let brackets: HashSet<&str> = self.odds_brackets.iter().map(|b| b.name.as_str()).collect();
        let mut ids = HashSet::new();
        for b in &self.backtest {
            if !ids.insert(b.id.as_str()) {
                return Err(KeelError::Configuration(format!("duplicate backtest strategy '{}'", b.id)));
            }
            if !brackets.contains(b.bracket.as_str()) {
                return Err(KeelError::Configuration(format!(
                    "backtest strategy '{}' references unknown bracket '{}'",
                    b.id, b.bracket
                )));
            }
            if b.stake <= Decimal::ZERO {
                return Err(KeelError::Configuration(format!(
                    "backtest strategy '{}' needs a positive stake",
                    b.id
                )));
            }
        }
        Ok(())
    }

    /// Bankroll as a float, for log lines only.
    pub fn bankroll_f64(&self) -> f64 {
        self.staking.bankroll.to_f64().unwrap_or(0.0)
    }
}
