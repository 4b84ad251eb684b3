//! JSON snapshot of the external race store.
//!
//! The collection layer exports races, measurements, odds and settlements
//! to a single JSON document; this module loads it for offline runs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::types::{MeasuredDetail, OddsQuote, PayoutRecord, RaceEvent, RaceId, RaceResult};

/// Measured-detail rows for one race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceDetails {
    pub race_id: RaceId,
    pub rows: Vec<MeasuredDetail>,
}

/// Everything the engine reads, as exported by the collection layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSnapshot {
    pub races: Vec<RaceEvent>,
    pub details: Vec<RaceDetails>,
    pub odds: Vec<OddsQuote>,
    pub results: Vec<RaceResult>,
    pub payouts: Vec<PayoutRecord>,
}

impl DataSnapshot {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse data snapshot")
    }

    /// Load a snapshot from a JSON file.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            anyhow::bail!("Data snapshot not found: {path}");
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read data snapshot from {path}"))?;
        let snapshot = Self::from_json(&json).with_context(|| format!("Invalid snapshot in {path}"))?;

        info!(
            path,
            races = snapshot.races.len(),
            results = snapshot.results.len(),
            odds = snapshot.odds.len(),
            "Data snapshot loaded"
        );
        Ok(snapshot)
    }
}
