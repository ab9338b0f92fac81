//! VALUESIM: fundamentals-driven buy/sell backtester
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod provider;
pub mod strategy;
pub mod engine;
pub mod backtest;
pub mod storage;
