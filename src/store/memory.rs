//! In-memory race data store.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use super::snapshot::DataSnapshot;
use super::RaceDataStore;
use crate::types::{MeasuredDetail, OddsQuote, PayoutRecord, RaceEvent, RaceId, RaceResult};

/// A fully in-memory store. Cheap to clone into tests; populated once and
/// then only read.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    races: BTreeMap<RaceId, RaceEvent>,
    details: HashMap<RaceId, Vec<MeasuredDetail>>,
    odds: HashMap<RaceId, Vec<OddsQuote>>,
    results: HashMap<RaceId, RaceResult>,
    payouts: HashMap<RaceId, Vec<PayoutRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_race(&mut self, race: RaceEvent) {
        self.races.insert(race.id.clone(), race);
    }

    pub fn insert_details(&mut self, race_id: RaceId, details: Vec<MeasuredDetail>) {
        self.details.insert(race_id, details);
    }

    pub fn insert_odds(&mut self, quote: OddsQuote) {
        self.odds.entry(quote.race_id.clone()).or_default().push(quote);
    }

    pub fn insert_result(&mut self, result: RaceResult) {
        self.results.insert(result.race_id.clone(), result);
    }

    pub fn insert_payout(&mut self, payout: PayoutRecord) {
        self.payouts.entry(payout.race_id.clone()).or_default().push(payout);
    }

    pub fn race_count(&self) -> usize {
        self.races.len()
    }
}

impl From<DataSnapshot> for InMemoryStore {
    fn from(snapshot: DataSnapshot) -> Self {
        let mut store = InMemoryStore::new();
        for race in snapshot.races {
            store.insert_race(race);
        }
        for batch in snapshot.details {
            store.insert_details(batch.race_id, batch.rows);
        }
        for quote in snapshot.odds {
            store.insert_odds(quote);
        }
        for result in snapshot.results {
            store.insert_result(result);
        }
        for payout in snapshot.payouts {
            store.insert_payout(payout);
        }
        store
    }
}

#[async_trait]
impl RaceDataStore for InMemoryStore {
    async fn race(&self, race_id: &RaceId) -> Result<Option<RaceEvent>> {
        Ok(self.races.get(race_id).cloned())
    }

    async fn races_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<RaceId>> {
        Ok(self
            .races
            .keys()
            .filter(|id| id.date >= from && id.date <= to)
            .cloned()
            .collect())
    }

    async fn measured_details(&self, race_id: &RaceId) -> Result<Vec<MeasuredDetail>> {
        Ok(self.details.get(race_id).cloned().unwrap_or_default())
    }

    async fn odds(&self, race_id: &RaceId) -> Result<Vec<OddsQuote>> {
        Ok(self.odds.get(race_id).cloned().unwrap_or_default())
    }

    async fn result(&self, race_id: &RaceId) -> Result<Option<RaceResult>> {
        Ok(self.results.get(race_id).cloned())
    }

    async fn payouts(&self, race_id: &RaceId) -> Result<Vec<PayoutRecord>> {
        Ok(self.payouts.get(race_id).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
