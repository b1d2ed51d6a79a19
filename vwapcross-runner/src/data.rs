//! Bar loading for the runner.
//!
//! Each timeframe resolves to one of two sources:
//! 1. A CSV file configured under `[backtest.csv]`
//! 2. Otherwise a seeded synthetic random walk
//!
//! CSV files carry a `timestamp,open,high,low,close,volume` header. Timestamps
//! are RFC 3339 or integer epoch milliseconds. Rows are returned sorted by
//! timestamp; duplicates and malformed bars are left in place for the engine
//! to reject.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vwapcross_core::domain::{Bar, Timeframe};
use vwapcross_core::rng::{RngHierarchy, SeedStream};

use crate::config::RunConfig;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} row {row}: unparseable timestamp '{value}'")]
    Timestamp {
        path: PathBuf,
        row: usize,
        value: String,
    },

    #[error("{path} contains no bars")]
    Empty { path: PathBuf },
}

/// Where a timeframe's bars came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSource {
    Csv { path: PathBuf },
    Synthetic { seed: u64 },
}

#[derive(Debug, Clone)]
pub struct LoadedBars {
    pub bars: Vec<Bar>,
    pub source: DataSource,
}

/// Resolve the backtest bars for one timeframe.
pub fn load_bars(config: &RunConfig, timeframe: Timeframe) -> Result<LoadedBars, LoadError> {
    if let Some(path) = config.backtest.csv_path(timeframe) {
        let bars = read_csv(path)?;
        tracing::info!(
            timeframe = %timeframe,
            path = %path.display(),
            bars = bars.len(),
            "loaded bars from CSV"
        );
        return Ok(LoadedBars {
            bars,
            source: DataSource::Csv {
                path: path.to_path_buf(),
            },
        });
    }

    let hierarchy = RngHierarchy::new(config.backtest.seed);
    let bars = SyntheticBars::from_hierarchy(
        &hierarchy,
        &config.strategy.symbol,
        timeframe,
        config.backtest.synthetic_start,
    )
    .take(config.backtest.synthetic_bars)
    .collect::<Vec<_>>();
    tracing::info!(
        timeframe = %timeframe,
        seed = config.backtest.seed,
        bars = bars.len(),
        "generated synthetic bars"
    );
    Ok(LoadedBars {
        bars,
        source: DataSource::Synthetic {
            seed: config.backtest.seed,
        },
    })
}

// ─── CSV ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Read a CSV of bars, sorted by timestamp.
pub fn read_csv(path: &Path) -> Result<Vec<Bar>, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let mut bars = Vec::new();
    for (row, record) in reader.deserialize::<CsvRow>().enumerate() {
        let record = record.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let timestamp = parse_timestamp(&record.timestamp).ok_or_else(|| LoadError::Timestamp {
            path: path.to_path_buf(),
            row: row + 1,
            value: record.timestamp.clone(),
        })?;
        bars.push(Bar {
            timestamp,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        });
    }

    if bars.is_empty() {
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
        });
    }
    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

/// RFC 3339 or integer epoch milliseconds.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(millis) = value.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis);
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ─── Synthetic bars ─────────────────────────────────────────────────

pub const SYNTHETIC_BASE_PRICE: f64 = 83_000.0;
const RETURN_SIGMA: f64 = 0.015;
const WICK_SIGMA: f64 = 0.005;
const VOLUME_MEAN: f64 = 5.0;
const VOLUME_SIGMA: f64 = 2.0;

/// Endless seeded random walk of OHLCV bars, one timeframe apart.
///
/// Per-bar return ~ N(0, 1.5%), wicks ~ |N(0, 0.5%)|, volume ~ |N(5, 2)|.
#[derive(Debug, Clone)]
pub struct SyntheticBars {
    rng: StdRng,
    price: f64,
    next_timestamp: DateTime<Utc>,
    step: Duration,
}

impl SyntheticBars {
    pub fn new(rng: StdRng, start: DateTime<Utc>, timeframe: Timeframe) -> Self {
        Self {
            rng,
            price: SYNTHETIC_BASE_PRICE,
            next_timestamp: start,
            step: timeframe.duration(),
        }
    }

    /// Seeded from the `Bars` stream of `(symbol, timeframe)`.
    pub fn from_hierarchy(
        hierarchy: &RngHierarchy,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
    ) -> Self {
        Self::new(
            hierarchy.rng_for(symbol, timeframe, SeedStream::Bars),
            start,
            timeframe,
        )
    }

    fn normal(&mut self, sigma: f64) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        z * sigma
    }
}

impl Iterator for SyntheticBars {
    type Item = Bar;

    fn next(&mut self) -> Option<Bar> {
        let open = self.price;
        let mut close = open * (1.0 + self.normal(RETURN_SIGMA));
        if !(close > 0.0) {
            close = open;
        }
        let high = open.max(close) * (1.0 + self.normal(WICK_SIGMA).abs());
        let low = open.min(close) * (1.0 - self.normal(WICK_SIGMA).abs());
        let volume = (VOLUME_MEAN + self.normal(VOLUME_SIGMA)).abs();

        let bar = Bar {
            timestamp: self.next_timestamp,
            open,
            high,
            low: low.max(0.0),
            close,
            volume,
        };
        self.price = close;
        self.next_timestamp += self.step;
        Some(bar)
    }
}

// ─── Simulated live venue ───────────────────────────────────────────

/// Polling venue over an endless synthetic walk.
///
/// Each poll returns the newest `bars_per_poll` bars plus the last `overlap`
/// bars of the previous poll, newest first, the way a REST kline endpoint
/// re-serves recent candles.
#[derive(Debug, Clone)]
pub struct SimulatedVenue {
    bars: SyntheticBars,
    bars_per_poll: usize,
    overlap: usize,
    recent: VecDeque<Bar>,
}

impl SimulatedVenue {
    pub fn new(bars: SyntheticBars, bars_per_poll: usize, overlap: usize) -> Self {
        Self {
            bars,
            bars_per_poll,
            overlap,
            recent: VecDeque::with_capacity(overlap),
        }
    }

    pub fn poll(&mut self) -> Vec<Bar> {
        let mut batch: Vec<Bar> = self.recent.iter().cloned().collect();
        batch.extend(self.bars.by_ref().take(self.bars_per_poll));

        self.recent.clear();
        let keep = batch.len().saturating_sub(self.overlap);
        self.recent.extend(batch[keep..].iter().cloned());

        batch.reverse();
        batch
    }
}
