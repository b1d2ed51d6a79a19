//! Streaming indicators.
//!
//! Each indicator is fed one bar at a time and updates in O(1). An indicator
//! returns `None` until its own window is full; the [`IndicatorPipeline`]
//! waits for the longest window before it produces a snapshot.

pub mod atr;
pub mod ema;
pub mod macd;
pub mod pipeline;
pub mod rsi;
pub mod vwap;
pub mod warmup;

pub use atr::Atr;
pub use ema::Ema;
pub use macd::{Macd, MacdValue};
pub use pipeline::{IndicatorPipeline, IndicatorSnapshot};
pub use rsi::Rsi;
pub use vwap::Vwap;
pub use warmup::WarmupGate;

use crate::domain::Bar;

/// Trait for streaming indicators.
///
/// # Look-ahead contamination guard
/// `update` only ever sees bars up to and including the current one, so no
/// value at bar t can depend on bar t+1 or later.
pub trait Indicator: Send + Sync {
    type Output;

    /// Human-readable name (e.g., "ema_9", "atr_14").
    fn name(&self) -> &str;

    /// Number of bars needed before `update` returns `Some`.
    fn warmup_bars(&self) -> usize;

    /// Fold one bar into the indicator state.
    fn update(&mut self, bar: &Bar) -> Option<Self::Output>;
}

/// Create synthetic five-minute bars from close prices for testing.
///
/// Generates plausible OHLV: open = prev_close (or close for first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 10.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: base + chrono::Duration::minutes(5 * i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 10.0,
            }
        })
        .collect()
}

/// Create bars from explicit (open, high, low, close) tuples.
#[cfg(test)]
pub fn make_ohlc_bars(ohlc: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    ohlc.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Bar {
            timestamp: base + chrono::Duration::minutes(5 * i as i64),
            open,
            high,
            low,
            close,
            volume: 10.0,
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
