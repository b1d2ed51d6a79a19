//! RSI divergence against confirmed local price extrema.
//!
//! A bar is a confirmed price low when its close is strictly below every other
//! close within `extremum_radius` bars on both sides, so confirmation lags the
//! extremum by `extremum_radius` bars. The paired RSI extreme is the lowest RSI
//! reading inside that same window. Highs mirror this.
//!
//! Bullish divergence: the newest confirmed low is a lower price low than the
//! previous one, while its RSI low is higher, and the two lows are at most
//! `max_distance` bars apart. Bearish divergence mirrors this on highs.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DivergenceConfig;
use crate::domain::Side;
use crate::indicators::IndicatorSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DivergenceKind {
    RsiBullDiv,
    RsiBearDiv,
}

impl DivergenceKind {
    pub fn side(&self) -> Side {
        match self {
            DivergenceKind::RsiBullDiv => Side::Long,
            DivergenceKind::RsiBearDiv => Side::Short,
        }
    }

    pub fn for_side(side: Side) -> Self {
        match side {
            Side::Long => DivergenceKind::RsiBullDiv,
            Side::Short => DivergenceKind::RsiBearDiv,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DivergenceEvent {
    pub kind: DivergenceKind,
    pub price_extreme_timestamp: DateTime<Utc>,
    pub rsi_extreme_timestamp: DateTime<Utc>,
    /// Bar on which the second extremum was confirmed.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    index: u64,
    timestamp: DateTime<Utc>,
    close: f64,
    rsi: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Extremum {
    index: u64,
    timestamp: DateTime<Utc>,
    price: f64,
    rsi: f64,
    rsi_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DivergenceDetector {
    radius: usize,
    max_distance: u64,
    capacity: usize,
    window: VecDeque<Sample>,
    lows: VecDeque<Extremum>,
    highs: VecDeque<Extremum>,
    next_index: u64,
}

impl DivergenceDetector {
    pub fn new(config: &DivergenceConfig) -> Self {
        assert!(config.extremum_radius >= 1, "extremum radius must be >= 1");
        assert!(config.ring_capacity >= 2, "extrema ring must hold two points");
        Self {
            radius: config.extremum_radius,
            max_distance: config.max_distance as u64,
            capacity: config.ring_capacity,
            window: VecDeque::with_capacity(2 * config.extremum_radius + 1),
            lows: VecDeque::with_capacity(config.ring_capacity),
            highs: VecDeque::with_capacity(config.ring_capacity),
            next_index: 0,
        }
    }

    /// Confirmed lows currently held, oldest first.
    pub fn confirmed_lows(&self) -> usize {
        self.lows.len()
    }

    pub fn confirmed_highs(&self) -> usize {
        self.highs.len()
    }

    /// Feed one warm snapshot and return any divergence confirmed on it.
    pub fn on_snapshot(&mut self, snapshot: &IndicatorSnapshot) -> Vec<DivergenceEvent> {
        let span = 2 * self.radius + 1;
        self.window.push_back(Sample {
            index: self.next_index,
            timestamp: snapshot.timestamp,
            close: snapshot.close,
            rsi: snapshot.rsi,
        });
        self.next_index += 1;
        if self.window.len() > span {
            self.window.pop_front();
        }
        if self.window.len() < span {
            return Vec::new();
        }

        let mut events = Vec::new();
        if let Some(low) = self.window_extremum(Side::Long) {
            if let Some(event) = self.confirm(low, Side::Long, snapshot.timestamp) {
                events.push(event);
            }
        }
        if let Some(high) = self.window_extremum(Side::Short) {
            if let Some(event) = self.confirm(high, Side::Short, snapshot.timestamp) {
                events.push(event);
            }
        }
        events
    }

    /// The window's center as a price low (`Long`) or high (`Short`), if it is one.
    fn window_extremum(&self, side: Side) -> Option<Extremum> {
        let center = self.window[self.radius];
        // Lows become highs under negation, so one comparison covers both sides.
        let key = |v: f64| match side {
            Side::Long => v,
            Side::Short => -v,
        };

        let strict = self
            .window
            .iter()
            .filter(|s| s.index != center.index)
            .all(|s| key(center.close) < key(s.close));
        if !strict {
            return None;
        }

        let rsi_extreme = self
            .window
            .iter()
            .copied()
            .reduce(|best, s| if key(s.rsi) < key(best.rsi) { s } else { best })?;

        Some(Extremum {
            index: center.index,
            timestamp: center.timestamp,
            price: center.close,
            rsi: rsi_extreme.rsi,
            rsi_timestamp: rsi_extreme.timestamp,
        })
    }

    fn confirm(
        &mut self,
        current: Extremum,
        side: Side,
        now: DateTime<Utc>,
    ) -> Option<DivergenceEvent> {
        let ring = match side {
            Side::Long => &mut self.lows,
            Side::Short => &mut self.highs,
        };
        let prior = ring.back().copied();
        ring.push_back(current);
        if ring.len() > self.capacity {
            ring.pop_front();
        }

        let prior = prior?;
        if current.index - prior.index > self.max_distance {
            return None;
        }
        let diverges = match side {
            Side::Long => current.price < prior.price && current.rsi > prior.rsi,
            Side::Short => current.price > prior.price && current.rsi < prior.rsi,
        };
        diverges.then(|| DivergenceEvent {
            kind: DivergenceKind::for_side(side),
            price_extreme_timestamp: current.timestamp,
            rsi_extreme_timestamp: current.rsi_timestamp,
            timestamp: now,
        })
    }

    /// Drop all history. Not called on position boundaries.
    pub fn reset(&mut self) {
        self.window.clear();
        self.lows.clear();
        self.highs.clear();
        self.next_index = 0;
    }
}
