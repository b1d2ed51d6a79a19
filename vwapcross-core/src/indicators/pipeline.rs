//! Indicator pipeline: one bar in, one immutable snapshot out.
//!
//! Every indicator updates in O(1) per bar (the rolling VWAP window is bounded
//! by its configured length). The pipeline enforces strictly increasing bar
//! timestamps and reports `InsufficientHistory` until the longest window is
//! full; callers must not evaluate signals against partial state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Atr, Ema, Indicator, Macd, Rsi, Vwap, WarmupGate};
use crate::config::IndicatorConfig;
use crate::domain::Bar;
use crate::error::CoreError;

/// Indicator state derived from one bar. Never mutated once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub vwap: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub macd_line: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
    pub rsi: f64,
    pub atr: f64,
}

impl IndicatorSnapshot {
    /// EMA_fast − EMA_slow.
    pub fn ema_spread(&self) -> f64 {
        self.ema_fast - self.ema_slow
    }

    /// MACD line − MACD signal.
    pub fn macd_spread(&self) -> f64 {
        self.macd_line - self.macd_signal
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorPipeline {
    ema_fast: Ema,
    ema_slow: Ema,
    macd: Macd,
    rsi: Rsi,
    atr: Atr,
    vwap: Vwap,
    warmup: WarmupGate,
    last_timestamp: Option<DateTime<Utc>>,
}

impl IndicatorPipeline {
    pub fn new(config: &IndicatorConfig) -> Self {
        let ema_fast = Ema::new(config.ema_fast);
        let ema_slow = Ema::new(config.ema_slow);
        let macd = Macd::new(config.macd_fast, config.macd_slow, config.macd_signal);
        let rsi = Rsi::new(config.rsi_period);
        let atr = Atr::new(config.atr_period);
        let vwap = Vwap::new(config.vwap_session);

        let warmup = WarmupGate::for_windows([
            ema_fast.warmup_bars(),
            ema_slow.warmup_bars(),
            macd.warmup_bars(),
            rsi.warmup_bars(),
            atr.warmup_bars(),
            vwap.warmup_bars(),
        ]);

        Self {
            ema_fast,
            ema_slow,
            macd,
            rsi,
            atr,
            vwap,
            warmup,
            last_timestamp: None,
        }
    }

    /// Bars needed before the first snapshot.
    pub fn warmup_bars(&self) -> usize {
        self.warmup.required()
    }

    pub fn bars_processed(&self) -> usize {
        self.warmup.seen()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp
    }

    /// Check ordering and sanity without touching any state.
    pub fn check_bar(&self, bar: &Bar) -> Result<(), CoreError> {
        if let Some(last) = self.last_timestamp {
            if bar.timestamp == last {
                return Err(CoreError::DuplicateBar {
                    timestamp: bar.timestamp,
                });
            }
            if bar.timestamp < last {
                return Err(CoreError::InvalidBarOrder {
                    last,
                    got: bar.timestamp,
                });
            }
        }
        if !bar.is_sane() {
            return Err(CoreError::InvalidBar {
                timestamp: bar.timestamp,
                reason: format!(
                    "o={} h={} l={} c={} v={}",
                    bar.open, bar.high, bar.low, bar.close, bar.volume
                ),
            });
        }
        Ok(())
    }

    /// Accept one bar. Rejected bars leave every indicator untouched.
    pub fn update(&mut self, bar: &Bar) -> Result<IndicatorSnapshot, CoreError> {
        self.check_bar(bar)?;
        self.last_timestamp = Some(bar.timestamp);
        self.warmup.record_bar();

        // Every indicator sees every accepted bar, warm or not.
        let ema_fast = self.ema_fast.update(bar);
        let ema_slow = self.ema_slow.update(bar);
        let macd = self.macd.update(bar);
        let rsi = self.rsi.update(bar);
        let atr = self.atr.update(bar);
        let vwap = self.vwap.update(bar);

        self.warmup.check()?;
        match (ema_fast, ema_slow, macd, rsi, atr, vwap) {
            (Some(ema_fast), Some(ema_slow), Some(macd), Some(rsi), Some(atr), Some(vwap)) => {
                Ok(IndicatorSnapshot {
                    timestamp: bar.timestamp,
                    close: bar.close,
                    high: bar.high,
                    low: bar.low,
                    vwap,
                    ema_fast,
                    ema_slow,
                    macd_line: macd.line,
                    macd_signal: macd.signal,
                    macd_hist: macd.histogram,
                    rsi,
                    atr,
                })
            }
            _ => Err(CoreError::InsufficientHistory {
                seen: self.warmup.seen(),
                required: self.warmup.required(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VwapSession;
    use crate::indicators::make_bars;

    fn closes(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + (i as f64 * 0.3).sin() * 4.0).collect()
    }

    #[test]
    fn default_warmup_is_macd_bound() {
        let pipeline = IndicatorPipeline::new(&IndicatorConfig::default());
        assert_eq!(pipeline.warmup_bars(), 34);
    }

    #[test]
    fn rolling_vwap_can_dominate_warmup() {
        let config = IndicatorConfig {
            vwap_session: VwapSession::Rolling { bars: 50 },
            ..IndicatorConfig::default()
        };
        assert_eq!(IndicatorPipeline::new(&config).warmup_bars(), 50);
    }

    #[test]
    fn insufficient_history_until_warm() {
        let mut pipeline = IndicatorPipeline::new(&IndicatorConfig::default());
        let bars = make_bars(&closes(40));
        for (i, bar) in bars.iter().enumerate() {
            let out = pipeline.update(bar);
            if i < 33 {
                assert!(
                    matches!(out, Err(CoreError::InsufficientHistory { seen, required: 34 }) if seen == i + 1),
                    "bar {i}: {out:?}"
                );
            } else {
                let snap = out.unwrap();
                assert_eq!(snap.timestamp, bar.timestamp);
                assert_eq!(snap.close, bar.close);
                assert!(snap.atr > 0.0);
                assert!((0.0..=100.0).contains(&snap.rsi));
            }
        }
    }

    #[test]
    fn duplicate_and_out_of_order_rejected_without_side_effects() {
        let mut pipeline = IndicatorPipeline::new(&IndicatorConfig::default());
        let bars = make_bars(&closes(40));
        let mut reference = IndicatorPipeline::new(&IndicatorConfig::default());

        for bar in &bars[..36] {
            let _ = pipeline.update(bar);
            let _ = reference.update(bar);
        }

        let dup = pipeline.update(&bars[35]);
        assert!(matches!(dup, Err(CoreError::DuplicateBar { .. })));
        let stale = pipeline.update(&bars[10]);
        assert!(matches!(stale, Err(CoreError::InvalidBarOrder { .. })));
        assert_eq!(pipeline.bars_processed(), 36);

        let a = pipeline.update(&bars[36]).unwrap();
        let b = reference.update(&bars[36]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn malformed_bar_rejected() {
        let mut pipeline = IndicatorPipeline::new(&IndicatorConfig::default());
        let mut bar = make_bars(&[100.0])[0].clone();
        bar.high = bar.low - 1.0;
        assert!(matches!(pipeline.update(&bar), Err(CoreError::InvalidBar { .. })));
        assert_eq!(pipeline.bars_processed(), 0);
        assert!(pipeline.last_timestamp().is_none());
    }
}
