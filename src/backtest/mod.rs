//! Historical replay of the pipeline over settled races.

pub mod calibration;
pub mod runner;

pub use calibration::{CalibrationDiagnosis, CalibrationReport, Calibrator};
pub use runner::{BacktestEvaluator, BacktestReport, BacktestStrategy, Settlement};
