//! Pattern detectors fed by warm indicator snapshots.
//!
//! Both detectors are owned by a single (symbol, timeframe) engine and hold no
//! state shared with other streams.

pub mod crossover;
pub mod divergence;

pub use crossover::{detect, Cross, CrossoverDetector, CrossoverEvent, CrossoverKind};
pub use divergence::{DivergenceDetector, DivergenceEvent, DivergenceKind};

/// Snapshot at five-minute step `i` with flat EMA/MACD spreads.
#[cfg(test)]
pub fn test_snapshot(i: usize, close: f64, rsi: f64) -> crate::indicators::IndicatorSnapshot {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    crate::indicators::IndicatorSnapshot {
        timestamp: base + chrono::Duration::minutes(5 * i as i64),
        close,
        high: close + 1.0,
        low: close - 1.0,
        vwap: close,
        ema_fast: close,
        ema_slow: close,
        macd_line: 0.0,
        macd_signal: 0.0,
        macd_hist: 0.0,
        rsi,
        atr: 2.0,
    }
}
