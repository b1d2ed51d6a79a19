//! Bar sources.
//!
//! [`HistoricalFeed`] replays a stored series. [`LiveFeed`] sits behind a
//! polling or streaming collaborator and guarantees the core sees each
//! timestamp once, in chronological order, within a bounded window. Price
//! noise for simulated venues is a swappable [`NoiseModel`].

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::domain::Bar;

/// `None` means end of stream (or, for a live feed, nothing buffered yet).
pub trait BarSource {
    fn next_bar(&mut self) -> Option<Bar>;
}

impl<S: BarSource + ?Sized> BarSource for Box<S> {
    fn next_bar(&mut self) -> Option<Bar> {
        (**self).next_bar()
    }
}

/// Replays bars in stored order.
#[derive(Debug, Clone, Default)]
pub struct HistoricalFeed {
    bars: VecDeque<Bar>,
}

impl HistoricalFeed {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self { bars: bars.into() }
    }

    pub fn remaining(&self) -> usize {
        self.bars.len()
    }
}

impl BarSource for HistoricalFeed {
    fn next_bar(&mut self) -> Option<Bar> {
        self.bars.pop_front()
    }
}

/// Perturbation applied to the newest bar of each live batch.
pub trait NoiseModel: Send {
    fn perturb(&mut self, bar: &mut Bar);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoNoise;

impl NoiseModel for NoNoise {
    fn perturb(&mut self, _bar: &mut Bar) {}
}

/// Gaussian close perturbation with σ proportional to price.
///
/// High/low widen to contain the perturbed close. Seeded, so a simulated live
/// run reproduces from its master seed.
#[derive(Debug, Clone)]
pub struct GaussianNoise {
    relative_sigma: f64,
    rng: StdRng,
}

impl GaussianNoise {
    /// σ = 0.01% of price.
    pub const DEFAULT_RELATIVE_SIGMA: f64 = 0.0001;

    pub fn new(relative_sigma: f64, rng: StdRng) -> Self {
        Self {
            relative_sigma,
            rng,
        }
    }
}

impl NoiseModel for GaussianNoise {
    fn perturb(&mut self, bar: &mut Bar) {
        let sigma = bar.close * self.relative_sigma;
        let Ok(normal) = Normal::new(0.0, sigma) else {
            return;
        };
        let close = bar.close + normal.sample(&mut self.rng);
        if close <= 0.0 || !close.is_finite() {
            return;
        }
        bar.close = close;
        bar.high = bar.high.max(close);
        bar.low = bar.low.min(close);
    }
}

/// Retention window for live feeds unless configured otherwise.
pub fn default_live_window() -> Duration {
    Duration::hours(24)
}

/// Counters for bars the live feed accepted or refused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub accepted: u64,
    pub duplicates: u64,
    pub stale: u64,
    pub expired: u64,
}

/// Reorders, deduplicates and windows batches from a live or testnet venue.
#[derive(Debug)]
pub struct LiveFeed<N> {
    window: Duration,
    buffer: BTreeMap<DateTime<Utc>, Bar>,
    last_delivered: Option<DateTime<Utc>>,
    newest: Option<DateTime<Utc>>,
    noise: N,
    stats: FeedStats,
}

impl LiveFeed<NoNoise> {
    pub fn without_noise(window: Duration) -> Self {
        Self::new(window, NoNoise)
    }
}

impl<N: NoiseModel> LiveFeed<N> {
    pub fn new(window: Duration, noise: N) -> Self {
        Self {
            window,
            buffer: BTreeMap::new(),
            last_delivered: None,
            newest: None,
            noise,
            stats: FeedStats::default(),
        }
    }

    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Accept one batch in any order. Returns how many bars passed deduplication.
    ///
    /// Already delivered or already buffered timestamps are dropped, never
    /// overwritten. Bars older than `window` behind the newest seen bar expire.
    pub fn ingest(&mut self, batch: impl IntoIterator<Item = Bar>) -> usize {
        let mut accepted = Vec::new();
        for bar in batch {
            if self.last_delivered.is_some_and(|last| bar.timestamp <= last) {
                self.stats.stale += 1;
                continue;
            }
            if self.buffer.contains_key(&bar.timestamp)
                || accepted.iter().any(|b: &Bar| b.timestamp == bar.timestamp)
            {
                self.stats.duplicates += 1;
                continue;
            }
            accepted.push(bar);
        }

        if let Some(newest) = accepted.iter_mut().max_by_key(|b| b.timestamp) {
            if self.newest.map_or(true, |n| newest.timestamp > n) {
                self.noise.perturb(newest);
                self.newest = Some(newest.timestamp);
            }
        }

        let count = accepted.len();
        for bar in accepted {
            self.buffer.insert(bar.timestamp, bar);
        }
        self.expire();

        self.stats.accepted += count as u64;
        tracing::trace!(count, buffered = self.buffer.len(), "live batch ingested");
        count
    }

    fn expire(&mut self) {
        let Some(newest) = self.newest else {
            return;
        };
        let cutoff = newest - self.window;
        let fresh = self.buffer.split_off(&cutoff);
        self.stats.expired += self.buffer.len() as u64;
        self.buffer = fresh;
    }
}

impl<N: NoiseModel> BarSource for LiveFeed<N> {
    fn next_bar(&mut self) -> Option<Bar> {
        let (timestamp, bar) = self.buffer.pop_first()?;
        self.last_delivered = Some(timestamp);
        Some(bar)
    }
}
