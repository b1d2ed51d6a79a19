//! Sign-change detection on EMA_fast − EMA_slow and MACD line − signal.
//!
//! A zero spread is a touch, not a cross. Each tracker remembers the last
//! nonzero spread, so `-, 0, +` emits exactly once and `-, 0, -` never does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Side;
use crate::indicators::IndicatorSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrossoverKind {
    EmaBull,
    EmaBear,
    MacdBull,
    MacdBear,
}

impl CrossoverKind {
    /// Direction the cross points to.
    pub fn side(&self) -> Side {
        match self {
            CrossoverKind::EmaBull | CrossoverKind::MacdBull => Side::Long,
            CrossoverKind::EmaBear | CrossoverKind::MacdBear => Side::Short,
        }
    }

    pub fn is_ema(&self) -> bool {
        matches!(self, CrossoverKind::EmaBull | CrossoverKind::EmaBear)
    }

    pub fn ema(side: Side) -> Self {
        match side {
            Side::Long => CrossoverKind::EmaBull,
            Side::Short => CrossoverKind::EmaBear,
        }
    }

    pub fn macd(side: Side) -> Self {
        match side {
            Side::Long => CrossoverKind::MacdBull,
            Side::Short => CrossoverKind::MacdBear,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossoverEvent {
    pub kind: CrossoverKind,
    pub timestamp: DateTime<Utc>,
}

/// Direction of a sign change in a spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cross {
    Up,
    Down,
}

/// Compare two consecutive spreads. Equality on either side is no event.
pub fn detect(prev: f64, curr: f64) -> Option<Cross> {
    if prev < 0.0 && curr > 0.0 {
        Some(Cross::Up)
    } else if prev > 0.0 && curr < 0.0 {
        Some(Cross::Down)
    } else {
        None
    }
}

/// Last nonzero spread of one compared pair.
#[derive(Debug, Clone, Default)]
struct SpreadTracker {
    last_nonzero: Option<f64>,
}

impl SpreadTracker {
    fn observe(&mut self, spread: f64) -> Option<Cross> {
        if spread == 0.0 || spread.is_nan() {
            return None;
        }
        let cross = self.last_nonzero.and_then(|prev| detect(prev, spread));
        self.last_nonzero = Some(spread);
        cross
    }
}

/// Stateful crossover detector for one (symbol, timeframe) stream.
#[derive(Debug, Clone, Default)]
pub struct CrossoverDetector {
    ema: SpreadTracker,
    macd: SpreadTracker,
}

impl CrossoverDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one warm snapshot. Returns at most one EMA and one MACD event.
    pub fn on_snapshot(&mut self, snapshot: &IndicatorSnapshot) -> Vec<CrossoverEvent> {
        let mut events = Vec::new();
        if let Some(cross) = self.ema.observe(snapshot.ema_spread()) {
            let kind = match cross {
                Cross::Up => CrossoverKind::EmaBull,
                Cross::Down => CrossoverKind::EmaBear,
            };
            events.push(CrossoverEvent {
                kind,
                timestamp: snapshot.timestamp,
            });
        }
        if let Some(cross) = self.macd.observe(snapshot.macd_spread()) {
            let kind = match cross {
                Cross::Up => CrossoverKind::MacdBull,
                Cross::Down => CrossoverKind::MacdBear,
            };
            events.push(CrossoverEvent {
                kind,
                timestamp: snapshot.timestamp,
            });
        }
        events
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
