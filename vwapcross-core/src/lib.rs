//! vwapcross core: the signal/risk engine.
//!
//! This crate holds everything that decides, and nothing that talks to a venue:
//! - Domain types (bars, sides, timeframes, positions)
//! - Streaming indicator pipeline (VWAP, EMA, MACD, RSI, ATR)
//! - Crossover and RSI-divergence detectors
//! - Ordered entry conditions and the ATR risk manager
//! - Two-phase position state machine and the per-timeframe engine
//! - Bar source and execution interfaces, with simulated implementations
//!
//! Backtest and live runs share every line below the [`feed::BarSource`] and
//! [`execution::ExecutionClient`] seams.

pub mod conditions;
pub mod config;
pub mod detectors;
pub mod domain;
pub mod engine;
pub mod error;
pub mod execution;
pub mod feed;
pub mod indicators;
pub mod order;
pub mod risk;
pub mod rng;
pub mod state_machine;

pub use config::StrategyConfig;
pub use engine::{BarStep, ProcessedBar, TimeframeEngine};
pub use error::CoreError;
