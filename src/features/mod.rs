//! Per-race feature repository.
//!
//! Loads every lane's measured details for one race in a single store call
//! and serves the scorers and checkers from memory. One repository is built
//! per race evaluation and dropped with it; nothing is shared across races
//! or workers.

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::store::RaceDataStore;
use crate::types::{lane_index, Lane, MeasuredDetail, RaceId, FIELD_SIZE};

/// Result of a cached lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    Present(&'a MeasuredDetail),
    /// No measurement row for that lane (or the repository holds another race).
    Absent,
}

impl<'a> Lookup<'a> {
    pub fn detail(self) -> Option<&'a MeasuredDetail> {
        match self {
            Lookup::Present(d) => Some(d),
            Lookup::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Lookup::Absent)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeatureRepository {
    race_id: Option<RaceId>,
    details: [Option<MeasuredDetail>; FIELD_SIZE],
}

impl FeatureRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a repository from rows already in hand.
    pub fn from_details(race_id: &RaceId, rows: Vec<MeasuredDetail>) -> Self {
        let mut repo = Self::new();
        repo.fill(race_id, rows);
        repo
    }

    /// Fetch all six lanes' details for `race_id` in one batch.
    ///
    /// A repository already holding `race_id` does not refetch. Returns the
    /// number of lanes with a measurement row.
    pub async fn load(&mut self, store: &dyn RaceDataStore, race_id: &RaceId) -> Result<usize> {
        if self.is_loaded(race_id) {
            return Ok(self.present_count());
        }
        let rows = store
            .measured_details(race_id)
            .await
            .with_context(|| format!("Failed to load measured details for {race_id}"))?;
        self.fill(race_id, rows);
        Ok(self.present_count())
    }

    fn fill(&mut self, race_id: &RaceId, rows: Vec<MeasuredDetail>) {
        self.details = Default::default();
        for row in rows {
            match lane_index(row.lane) {
                Some(i) => {
                    if self.details[i].is_some() {
                        warn!(race = %race_id, lane = row.lane, "Duplicate measurement row, keeping the last");
                    }
                    self.details[i] = Some(row);
                }
                None => warn!(race = %race_id, lane = row.lane, "Measurement row for invalid lane ignored"),
            }
        }
        self.race_id = Some(race_id.clone());
        debug!(race = %race_id, lanes = self.present_count(), "Feature batch cached");
    }

    /// Whether this repository holds `race_id`.
    pub fn is_loaded(&self, race_id: &RaceId) -> bool {
        self.race_id.as_ref() == Some(race_id)
    }

    pub fn race_id(&self) -> Option<&RaceId> {
        self.race_id.as_ref()
    }

    /// Cached detail for a lane. Never fails.
    pub fn get(&self, race_id: &RaceId, lane: Lane) -> Lookup<'_> {
        if !self.is_loaded(race_id) {
            return Lookup::Absent;
        }
        self.detail(lane).map_or(Lookup::Absent, Lookup::Present)
    }

    /// Cached detail for a lane of the loaded race.
    pub fn detail(&self, lane: Lane) -> Option<&MeasuredDetail> {
        lane_index(lane).and_then(|i| self.details[i].as_ref())
    }

    /// Lookup that falls back to a per-call store fetch when the batch for
    /// `race_id` is not cached here.
    pub async fn lookup(
        &self,
        store: &dyn RaceDataStore,
        race_id: &RaceId,
        lane: Lane,
    ) -> Result<Option<MeasuredDetail>> {
        if self.is_loaded(race_id) {
            return Ok(self.detail(lane).cloned());
        }
        let rows = store
            .measured_details(race_id)
            .await
            .with_context(|| format!("Failed to look up {race_id} lane {lane}"))?;
        Ok(rows.into_iter().find(|r| r.lane == lane))
    }

    /// Number of lanes with a measurement row.
    pub fn present_count(&self) -> usize {
        self.details.iter().filter(|d| d.is_some()).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockRaceDataStore;
    use chrono::NaiveDate;

    fn race_id(no: u8) -> RaceId {
        RaceId::new(1, NaiveDate::from_ymd_opt(2025, 2, 2).unwrap(), no)
    }

    fn make_detail(lane: Lane) -> MeasuredDetail {
        MeasuredDetail {
            lane,
            exhibition_time: Some(6.70 + lane as f64 * 0.01),
            tilt: Some(0.0),
            course: Some(lane),
            start_timing: Some(0.15),
        }
    }

    #[test]
    fn test_get_present_and_absent() {
        let id = race_id(1);
        let repo = FeatureRepository::from_details(&id, vec![make_detail(1), make_detail(3)]);
        assert!(matches!(repo.get(&id, 1), Lookup::Present(d) if d.lane == 1));
        assert!(repo.get(&id, 2).is_absent());
        assert!(repo.get(&id, 9).is_absent());
        assert_eq!(repo.present_count(), 2);
    }

    #[test]
    fn test_other_race_is_absent() {
        let repo = FeatureRepository::from_details(&race_id(1), vec![make_detail(1)]);
        assert!(repo.is_loaded(&race_id(1)));
        assert!(!repo.is_loaded(&race_id(2)));
        assert!(repo.get(&race_id(2), 1).is_absent());
    }

    #[test]
    fn test_invalid_lane_rows_dropped() {
        let id = race_id(1);
        let repo = FeatureRepository::from_details(&id, vec![make_detail(0), make_detail(7), make_detail(6)]);
        assert_eq!(repo.present_count(), 1);
        assert!(repo.detail(6).is_some());
    }

    #[tokio::test]
    async fn test_load_fetches_once_per_race() {
        let mut store = MockRaceDataStore::new();
        store
            .expect_measured_details()
            .times(1)
            .returning(|_| Ok((1..=6).map(make_detail).collect()));

        let id = race_id(1);
        let mut repo = FeatureRepository::new();
        assert_eq!(repo.load(&store, &id).await.unwrap(), 6);
        // Second load and every lookup are served from memory.
        assert_eq!(repo.load(&store, &id).await.unwrap(), 6);
        for lane in 1..=6 {
            assert!(repo.lookup(&store, &id, lane).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_lookup_falls_back_when_not_loaded() {
        let mut store = MockRaceDataStore::new();
        store
            .expect_measured_details()
            .times(1)
            .returning(|_| Ok(vec![make_detail(4)]));

        let repo = FeatureRepository::new();
        let detail = repo.lookup(&store, &race_id(3), 4).await.unwrap();
        assert_eq!(detail.map(|d| d.lane), Some(4));
    }

    #[test]
    fn test_load_error_propagates() {
        let mut store = MockRaceDataStore::new();
        store
            .expect_measured_details()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));

        let mut repo = FeatureRepository::new();
        let result = tokio_test::block_on(repo.load(&store, &race_id(1)));
        assert!(result.is_err());
        assert!(!repo.is_loaded(&race_id(1)));
    }
}
