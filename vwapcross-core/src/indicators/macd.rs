//! Moving Average Convergence Divergence (MACD).
//!
//! line = EMA(fast) - EMA(slow), signal = EMA(line, signal_period),
//! histogram = line - signal.
//! Warm-up: slow + signal - 1 bars.

use super::ema::Ema;
use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValue {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
    name: String,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(slow > fast, "MACD slow period must be > fast period");
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
            name: format!("macd_{fast}_{slow}_{signal}"),
        }
    }

    pub fn next(&mut self, close: f64) -> Option<MacdValue> {
        let fast = self.fast.next(close);
        let slow = self.slow.next(close);
        let line = fast? - slow?;
        let signal = self.signal.next(line)?;
        Some(MacdValue {
            line,
            signal,
            histogram: line - signal,
        })
    }
}

impl Indicator for Macd {
    type Output = MacdValue;

    fn name(&self) -> &str {
        &self.name
    }

    fn warmup_bars(&self) -> usize {
        self.slow.period() + self.signal.period() - 1
    }

    fn update(&mut self, bar: &Bar) -> Option<MacdValue> {
        self.next(bar.close)
    }
}
