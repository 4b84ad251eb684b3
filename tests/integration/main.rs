//! Integration tests: full pipeline, batch and backtest over a store double.

mod mock_store;
mod simulation;
