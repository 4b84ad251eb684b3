//! KEEL: boat race scoring, confidence tiering and staking engine.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod store;
pub mod features;
pub mod scoring;
pub mod patterns;
pub mod strategy;
pub mod engine;
pub mod backtest;
