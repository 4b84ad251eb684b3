//! Kelly criterion stake sizing.
//!
//! Computes stakes using fractional Kelly on decimal payout odds, clamped to
//! a bankroll-fraction cap.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::debug;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Kelly sizing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct KellyConfig {
    /// Fractional Kelly multiplier (0.25 = quarter-Kelly). Lower = more conservative.
    pub fraction: f64,
    /// Maximum stake as a fraction of bankroll.
    pub max_stake_pct: f64,
    /// Minimum stake worth placing.
    pub min_stake: Decimal,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            fraction: 0.25,      // Quarter-Kelly
            max_stake_pct: 0.05, // Max 5% of bankroll per ticket
            min_stake: dec!(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Kelly calculator
// ---------------------------------------------------------------------------

/// Sizing recommendation for one ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct KellySizing {
    /// Raw Kelly fraction (may be negative).
    pub kelly_fraction: f64,
    /// After multiplier and cap; zero when Kelly is non-positive.
    pub stake_fraction: f64,
    pub stake: Decimal,
}

impl KellySizing {
    fn none(kelly_fraction: f64) -> Self {
        Self {
            kelly_fraction,
            stake_fraction: 0.0,
            stake: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KellyCalculator {
    config: KellyConfig,
}

impl KellyCalculator {
    pub fn new(config: KellyConfig) -> Self {
        Self { config }
    }

    /// Access the Kelly configuration.
    pub fn config(&self) -> &KellyConfig {
        &self.config
    }

    /// Largest stake allowed for the bankroll.
    pub fn stake_cap(&self, bankroll: Decimal) -> Decimal {
        let pct = Decimal::from_f64(self.config.max_stake_pct).unwrap_or(Decimal::ZERO);
        (bankroll * pct).max(Decimal::ZERO)
    }

    /// Size a stake for win probability `probability` at decimal `odds`.
    ///
    /// Kelly formula: f* = (bp - q) / b
    /// where:
    ///   b = odds - 1 (net payout per unit)
    ///   p = win probability
    ///   q = 1 - p
    pub fn size(&self, probability: f64, odds: f64, bankroll: Decimal) -> KellySizing {
        if !probability.is_finite() || !odds.is_finite() || odds <= 1.0 {
            return KellySizing::none(0.0);
        }

        let b = odds - 1.0;
        let p = probability.clamp(0.0, 1.0);
        let q = 1.0 - p;
        let kelly = (b * p - q) / b;

        if kelly <= 0.0 || bankroll <= Decimal::ZERO {
            debug!(kelly, odds, probability, "Non-positive Kelly, no stake");
            return KellySizing::none(kelly);
        }

        let fractional = kelly * self.config.fraction;
        let capped = fractional.min(self.config.max_stake_pct).max(0.0);

        let stake = (Decimal::from_f64(capped).unwrap_or(Decimal::ZERO) * bankroll)
            .round_dp_with_strategy(2, RoundingStrategy::ToZero)
            .min(self.stake_cap(bankroll))
            .max(Decimal::ZERO);

        debug!(
            raw_kelly = format!("{:.2}%", kelly * 100.0),
            fractional = format!("{:.2}%", capped * 100.0),
            stake = %stake,
            "Stake sized"
        );

        KellySizing {
            kelly_fraction: kelly,
            stake_fraction: capped,
            stake,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
