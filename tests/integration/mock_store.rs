//! Mock race store for integration testing.
//!
//! Wraps an `InMemoryStore` seeded with a deterministic race card and adds
//! call counting and forced failures, all in-memory.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use keel::store::{InMemoryStore, RaceDataStore};
use keel::types::*;

/// A controllable race data store.
pub struct MockStore {
    inner: InMemoryStore,
    /// Races whose measured-detail fetch fails.
    failing_details: Arc<Mutex<HashSet<RaceId>>>,
    detail_calls: Arc<Mutex<HashMap<RaceId, usize>>>,
    /// If set, every race card lookup returns this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            failing_details: Arc::new(Mutex::new(HashSet::new())),
            detail_calls: Arc::new(Mutex::new(HashMap::new())),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn fail_details_for(&self, race_id: &RaceId) {
        self.failing_details.lock().unwrap().insert(race_id.clone());
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn detail_calls(&self, race_id: &RaceId) -> usize {
        self.detail_calls.lock().unwrap().get(race_id).copied().unwrap_or(0)
    }

    fn check_error(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RaceDataStore for MockStore {
    async fn race(&self, race_id: &RaceId) -> Result<Option<RaceEvent>> {
        self.check_error()?;
        self.inner.race(race_id).await
    }

    async fn races_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<RaceId>> {
        self.inner.races_between(from, to).await
    }

    async fn measured_details(&self, race_id: &RaceId) -> Result<Vec<MeasuredDetail>> {
        *self.detail_calls.lock().unwrap().entry(race_id.clone()).or_default() += 1;
        if self.failing_details.lock().unwrap().contains(race_id) {
            return Err(anyhow!("detail table unavailable for {race_id}"));
        }
        self.inner.measured_details(race_id).await
    }

    async fn odds(&self, race_id: &RaceId) -> Result<Vec<OddsQuote>> {
        self.inner.odds(race_id).await
    }

    async fn result(&self, race_id: &RaceId) -> Result<Option<RaceResult>> {
        self.inner.result(race_id).await
    }

    async fn payouts(&self, race_id: &RaceId) -> Result<Vec<PayoutRecord>> {
        self.inner.payouts(race_id).await
    }
}

// ---------------------------------------------------------------------------
// Race card builders
// ---------------------------------------------------------------------------

pub const VENUE: u8 = 12;

pub fn make_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, 14).unwrap()
}

pub fn make_id(race_no: u8) -> RaceId {
    RaceId::new(VENUE, make_date(), race_no)
}

pub fn make_conditions(wind_speed: f64) -> RaceConditions {
    RaceConditions {
        wind_direction: WindDirection::Tailwind,
        wind_speed,
        wave_height: 2.0,
        weather: Weather::Clear,
    }
}

/// Lane 1 is strongest on every signal, lane 6 weakest.
pub fn make_race(race_no: u8, hour: u32, conditions: Option<RaceConditions>) -> RaceEvent {
    let classes = [
        RacerClass::A1,
        RacerClass::A2,
        RacerClass::B1,
        RacerClass::B1,
        RacerClass::B2,
        RacerClass::B2,
    ];
    RaceEvent {
        id: make_id(race_no),
        race_time: NaiveTime::from_hms_opt(hour, 30, 0).unwrap(),
        entrants: LANES
            .iter()
            .map(|&lane| Entrant {
                lane,
                racer_id: 4000 + race_no as u32 * 10 + lane as u32,
                name: format!("Racer {race_no}-{lane}"),
                class: classes[lane as usize - 1],
                win_rate: Some(8.0 - lane as f64 * 0.8),
                place_rate: Some(60.0 - lane as f64 * 6.0),
                motor_no: Some(10 + lane as u16),
                motor_place_rate: Some(48.0 - lane as f64 * 3.0),
                boat_no: Some(50 + lane as u16),
                boat_place_rate: Some(40.0 - lane as f64 * 2.0),
            })
            .collect(),
        conditions,
    }
}

pub fn make_details() -> Vec<MeasuredDetail> {
    LANES
        .iter()
        .map(|&lane| MeasuredDetail {
            lane,
            exhibition_time: Some(6.62 + lane as f64 * 0.03),
            tilt: Some(-0.5),
            course: Some(lane),
            start_timing: Some(0.08 + lane as f64 * 0.02),
        })
        .collect()
}

/// Win prices by lane, plus the favourite exacta and trifecta.
pub fn add_odds(store: &mut InMemoryStore, race_id: &RaceId) {
    let win = [1.8, 4.5, 7.0, 12.0, 20.0, 35.0];
    for (&lane, &odds) in LANES.iter().zip(win.iter()) {
        store.insert_odds(OddsQuote {
            race_id: race_id.clone(),
            combination: Combination::Win(lane),
            odds,
        });
    }
    store.insert_odds(OddsQuote {
        race_id: race_id.clone(),
        combination: Combination::Exacta(1, 2),
        odds: 6.0,
    });
    store.insert_odds(OddsQuote {
        race_id: race_id.clone(),
        combination: Combination::Trifecta(1, 2, 3),
        odds: 18.0,
    });
}

/// `races` afternoon races in light wind, fully measured and priced.
pub fn make_day(races: u8) -> InMemoryStore {
    let mut store = InMemoryStore::new();
    for race_no in 1..=races {
        let race = make_race(race_no, 14, Some(make_conditions(2.0)));
        store.insert_details(race.id.clone(), make_details());
        add_odds(&mut store, &race.id);
        store.insert_race(race);
    }
    store
}

/// Record a finish order and a single payout row for its winner.
pub fn settle(store: &mut InMemoryStore, race_no: u8, finish_order: Vec<Lane>, win_payout: f64) {
    let race_id = make_id(race_no);
    let winner = finish_order[0];
    store.insert_result(RaceResult {
        race_id: race_id.clone(),
        finish_order,
    });
    store.insert_payout(PayoutRecord {
        race_id,
        combination: Combination::Win(winner),
        payout: win_payout,
    });
}
