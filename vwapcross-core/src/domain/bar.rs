//! Bar: one OHLCV candle from an exchange kline stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar for a single symbol on a single timeframe.
///
/// Timestamps are bar open times and must be strictly increasing within one
/// (symbol, timeframe) stream. Volume is in base-asset units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// True when every price and the volume is a finite number.
    pub fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Finite, positive prices with open and close inside `[low, high]`,
    /// and non-negative volume.
    pub fn is_sane(&self) -> bool {
        if !self.is_finite() {
            return false;
        }
        let body_top = self.open.max(self.close);
        let body_bottom = self.open.min(self.close);
        self.low <= body_bottom
            && self.high >= body_top
            && body_bottom > 0.0
            && self.volume >= 0.0
    }

    /// (high + low + close) / 3, the VWAP price input.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 5.0,
        }
    }

    #[test]
    fn well_formed_candle() {
        assert!(candle(100.0, 105.0, 98.0, 103.0).is_sane());
        // Doji with no wicks.
        assert!(candle(100.0, 100.0, 100.0, 100.0).is_sane());
    }

    #[test]
    fn rejects_non_finite_fields() {
        let mut bar = candle(100.0, 105.0, 98.0, 103.0);
        bar.open = f64::NAN;
        assert!(!bar.is_finite());
        assert!(!bar.is_sane());

        let mut bar = candle(100.0, 105.0, 98.0, 103.0);
        bar.volume = f64::INFINITY;
        assert!(!bar.is_sane());
    }

    #[test]
    fn rejects_body_outside_range() {
        assert!(!candle(100.0, 97.0, 98.0, 103.0).is_sane());
        assert!(!candle(100.0, 102.0, 98.0, 103.0).is_sane());
        assert!(!candle(100.0, 105.0, 101.0, 103.0).is_sane());
    }

    #[test]
    fn rejects_non_positive_prices_and_negative_volume() {
        assert!(!candle(0.0, 1.0, 0.0, 0.5).is_sane());
        let mut bar = candle(100.0, 105.0, 98.0, 103.0);
        bar.volume = -1.0;
        assert!(!bar.is_sane());
    }

    #[test]
    fn typical_price_is_hlc_mean() {
        let bar = candle(100.0, 105.0, 98.0, 103.0);
        assert!((bar.typical_price() - 102.0).abs() < 1e-12);
    }
}
