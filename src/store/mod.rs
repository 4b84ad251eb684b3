//! Race data store boundary.
//!
//! Defines the `RaceDataStore` read trait the engine consumes and provides
//! an in-memory implementation that can be populated from a JSON snapshot
//! exported by the collection layer. The engine never writes race rows.

pub mod memory;
pub mod snapshot;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::{MeasuredDetail, OddsQuote, PayoutRecord, RaceEvent, RaceId, RaceResult};

pub use memory::InMemoryStore;
pub use snapshot::DataSnapshot;

/// Read-only access to stored race data.
///
/// Implementors return `Ok(None)` / an empty vector for data that simply
/// has not been collected; `Err` is reserved for store failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RaceDataStore: Send + Sync {
    /// The race card, if known.
    async fn race(&self, race_id: &RaceId) -> Result<Option<RaceEvent>>;

    /// Ids of all races held between `from` and `to` inclusive, sorted.
    async fn races_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<RaceId>>;

    /// All measured-detail rows for one race in a single batch.
    async fn measured_details(&self, race_id: &RaceId) -> Result<Vec<MeasuredDetail>>;

    /// Latest odds snapshot for a race.
    async fn odds(&self, race_id: &RaceId) -> Result<Vec<OddsQuote>>;

    /// Official result, once settled.
    async fn result(&self, race_id: &RaceId) -> Result<Option<RaceResult>>;

    /// Settled payouts for a race.
    async fn payouts(&self, race_id: &RaceId) -> Result<Vec<PayoutRecord>>;
}
