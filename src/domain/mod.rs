//! Core domain types and simulation logic.

pub mod ohlcv;
pub mod market;
pub mod indicators;
pub mod signal;
pub mod aggregator;
pub mod order;
pub mod position;
pub mod portfolio;
pub mod execution;
pub mod exit;
pub mod engine;
pub mod performance;
pub mod universe;
pub mod config_validation;
pub mod error;
