//! Bounded parallel evaluation of many races.
//!
//! Each race runs as its own task with its own feature repository; the
//! pipeline and the store are shared read-only. A failed race is recorded and
//! the batch carries on. The optional timeout only stops new submissions;
//! races already in flight finish.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use super::pipeline::{RacePipeline, RacePrediction};
use crate::store::RaceDataStore;
use crate::types::RaceId;

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Successful predictions, sorted by race id.
    pub predictions: Vec<RacePrediction>,
    /// Races that could not be evaluated, with the reason.
    pub failed: Vec<(RaceId, String)>,
    /// Races never submitted because the batch timed out.
    pub skipped: Vec<RaceId>,
}

impl BatchReport {
    pub fn incomplete_count(&self) -> usize {
        self.predictions.iter().filter(|p| p.evaluation.incomplete).count()
    }

    pub fn accepted_count(&self) -> usize {
        self.predictions.iter().map(|p| p.accepted().count()).sum()
    }
}

pub struct BatchEvaluator {
    pipeline: Arc<RacePipeline>,
    store: Arc<dyn RaceDataStore>,
    workers: usize,
    timeout: Option<Duration>,
}

impl BatchEvaluator {
    pub fn new(pipeline: Arc<RacePipeline>, store: Arc<dyn RaceDataStore>, workers: usize) -> Self {
        Self {
            pipeline,
            store,
            workers: workers.max(1),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn pipeline(&self) -> &Arc<RacePipeline> {
        &self.pipeline
    }

    pub fn store(&self) -> &Arc<dyn RaceDataStore> {
        &self.store
    }

    /// Evaluate every race in `race_ids` with at most `workers` in flight.
    pub async fn run(&self, race_ids: Vec<RaceId>) -> BatchReport {
        let started = Instant::now();
        let deadline = self.timeout.map(|t| started + t);
        let total = race_ids.len();

        let outcomes: Vec<_> = stream::iter(race_ids.iter().cloned())
            .take_while(|_| {
                let open = deadline.map_or(true, |d| Instant::now() < d);
                futures::future::ready(open)
            })
            .map(|race_id| {
                let pipeline = Arc::clone(&self.pipeline);
                let store = Arc::clone(&self.store);
                async move {
                    let id = race_id.clone();
                    let handle = tokio::spawn(async move {
                        pipeline.evaluate_race(store.as_ref(), &id).await
                    });
                    (race_id, handle.await)
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut report = BatchReport::default();
        for (race_id, outcome) in outcomes {
            match outcome {
                Ok(Ok(prediction)) => report.predictions.push(prediction),
                Ok(Err(e)) => {
                    warn!(race = %race_id, error = %format!("{e:#}"), "Race evaluation failed");
                    report.failed.push((race_id, format!("{e:#}")));
                }
                Err(join) => {
                    warn!(race = %race_id, error = %join, "Race task aborted");
                    report.failed.push((race_id, join.to_string()));
                }
            }
        }

        report
            .predictions
            .sort_by(|a, b| a.race_id().cmp(b.race_id()));
        report.failed.sort_by(|a, b| a.0.cmp(&b.0));

        let done = report.predictions.len() + report.failed.len();
        if done < total {
            let evaluated: std::collections::HashSet<&RaceId> = report
                .predictions
                .iter()
                .map(|p| p.race_id())
                .chain(report.failed.iter().map(|(id, _)| id))
                .collect();
            let skipped: Vec<RaceId> = race_ids
                .iter()
                .filter(|id| !evaluated.contains(id))
                .cloned()
                .collect();
            warn!(skipped = skipped.len(), "Batch timeout reached, remaining races not submitted");
            report.skipped = skipped;
        }

        info!(
            races = total,
            evaluated = report.predictions.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            incomplete = report.incomplete_count(),
            bets = report.accepted_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch complete"
        );
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
