//! Core engine: the per-race pipeline and the batch worker pool.

pub mod batch;
pub mod pipeline;

pub use batch::{BatchEvaluator, BatchReport};
pub use pipeline::{RaceEvaluation, RacePipeline, RacePrediction};
