//! Serializable run configuration.
//!
//! A run file wraps the strategy configuration with the settings only the
//! runner cares about:
//!
//! ```toml
//! [strategy]
//! symbol = "BTCUSDT"
//! timeframes = ["5m", "15m"]
//!
//! [backtest]
//! initial_capital = 10000.0
//! position_fraction = 0.1
//! synthetic_bars = 2000
//!
//! [backtest.csv]
//! 5m = "data/btc_5m.csv"
//!
//! [live]
//! window_hours = 24
//! noise_sigma = 0.0001
//! poll_interval_ms = 60000
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vwapcross_core::config::ConfigError;
use vwapcross_core::domain::Timeframe;
use vwapcross_core::feed::default_live_window;
use vwapcross_core::StrategyConfig;

#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Strategy(#[from] ConfigError),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> RunConfigError {
    RunConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Everything needed to reproduce a backtest or simulated live run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub strategy: StrategyConfig,
    pub backtest: BacktestConfig,
    pub live: LiveConfig,
}

impl RunConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, RunConfigError> {
        let config: RunConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RunConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| RunConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), RunConfigError> {
        self.strategy.validate()?;
        self.backtest.validate()?;
        self.live.validate()
    }
}

/// Backtest settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Quote-currency equity the ledger starts from. Live runs start from it too.
    pub initial_capital: f64,

    /// Share of a worker's current equity committed per entry, converted to
    /// base units at the entry price. `None` trades `strategy.order_size`.
    pub position_fraction: Option<f64>,

    /// Historical bars per timeframe, keyed by exchange notation (`5m`).
    /// Timeframes without a file fall back to synthetic bars.
    pub csv: BTreeMap<String, PathBuf>,

    /// Synthetic bars generated per timeframe when no file is configured.
    pub synthetic_bars: usize,

    /// First synthetic bar timestamp (RFC 3339).
    pub synthetic_start: DateTime<Utc>,

    /// Master seed for synthetic data.
    pub seed: u64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            position_fraction: Some(0.1),
            csv: BTreeMap::new(),
            synthetic_bars: 2_000,
            synthetic_start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default(),
            seed: 42,
        }
    }
}

impl BacktestConfig {
    pub fn csv_path(&self, timeframe: Timeframe) -> Option<&Path> {
        self.csv.get(timeframe.as_str()).map(PathBuf::as_path)
    }

    pub fn validate(&self) -> Result<(), RunConfigError> {
        if !(self.initial_capital > 0.0) || !self.initial_capital.is_finite() {
            return Err(invalid(
                "backtest.initial_capital",
                format!("must be a positive number, got {}", self.initial_capital),
            ));
        }
        if let Some(fraction) = self.position_fraction {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(invalid(
                    "backtest.position_fraction",
                    format!("must be in (0, 1], got {fraction}"),
                ));
            }
        }
        for key in self.csv.keys() {
            key.parse::<Timeframe>()
                .map_err(|e| invalid("backtest.csv", e.to_string()))?;
        }
        Ok(())
    }
}

/// Simulated live/testnet settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Bars older than this behind the newest bar are dropped.
    pub window_hours: u32,

    /// Relative σ of the price noise on each poll's newest bar. Zero disables it.
    pub noise_sigma: f64,

    pub seed: u64,

    /// New bars per poll.
    pub bars_per_poll: usize,

    /// Already delivered bars repeated at the start of every poll.
    pub overlap: usize,

    /// Stop after this many polls. `None` runs until stopped.
    pub max_polls: Option<u64>,

    /// Sleep between polls. Zero is only allowed with `max_polls`.
    pub poll_interval_ms: u64,

    /// Trades and signals each worker retains; older entries are dropped.
    pub ledger_capacity: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            window_hours: u32::try_from(default_live_window().num_hours()).unwrap_or(24),
            noise_sigma: 0.0001,
            seed: 7,
            bars_per_poll: 5,
            overlap: 2,
            max_polls: None,
            poll_interval_ms: 60_000,
            ledger_capacity: 10_000,
        }
    }
}

impl LiveConfig {
    pub fn window(&self) -> Duration {
        Duration::hours(i64::from(self.window_hours))
    }

    pub fn poll_interval(&self) -> StdDuration {
        StdDuration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), RunConfigError> {
        if self.window_hours == 0 {
            return Err(invalid("live.window_hours", "must be >= 1"));
        }
        if !(self.noise_sigma >= 0.0) || !self.noise_sigma.is_finite() {
            return Err(invalid(
                "live.noise_sigma",
                format!("must be a non-negative number, got {}", self.noise_sigma),
            ));
        }
        if self.bars_per_poll == 0 {
            return Err(invalid("live.bars_per_poll", "must be >= 1"));
        }
        if self.poll_interval_ms == 0 && self.max_polls.is_none() {
            return Err(invalid(
                "live.poll_interval_ms",
                "must be > 0 unless max_polls bounds the run",
            ));
        }
        if self.ledger_capacity == 0 {
            return Err(invalid("live.ledger_capacity", "must be >= 1"));
        }
        Ok(())
    }
}
