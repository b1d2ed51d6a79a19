//! vwapcross runner: run orchestration for the signal/risk core.
//!
//! This crate handles:
//! - Run configuration (TOML)
//! - Bar loading from CSV, with a seeded synthetic fallback
//! - One worker per timeframe, over a historical or live feed
//! - Trade ledger and performance summary

pub mod config;
pub mod data;
pub mod orchestrator;
pub mod report;
pub mod worker;

pub use config::{BacktestConfig, LiveConfig, RunConfig, RunConfigError};
pub use data::{load_bars, DataSource, LoadError, LoadedBars, SimulatedVenue, SyntheticBars};
pub use orchestrator::{run_backtest, run_backtest_with, run_live, run_live_from, RunError};
pub use report::{PerformanceSummary, RunMode, RunReport, TimeframeReport, TradeRecord, WorkerStats};
pub use worker::TimeframeWorker;
