//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1], alpha = 2 / (period + 1).
//! Seed: EMA[period-1] = SMA of the first `period` values.
//! Warm-up: `period` values.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    alpha: f64,
    seen: usize,
    seed_sum: f64,
    value: Option<f64>,
    name: String,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            seen: 0,
            seed_sum: 0.0,
            value: None,
            name: format!("ema_{period}"),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Feed one value; returns the EMA once the seed window is full.
    pub fn next(&mut self, x: f64) -> Option<f64> {
        self.seen += 1;
        match self.value {
            Some(prev) => {
                let ema = self.alpha * x + (1.0 - self.alpha) * prev;
                self.value = Some(ema);
            }
            None => {
                self.seed_sum += x;
                if self.seen == self.period {
                    self.value = Some(self.seed_sum / self.period as f64);
                }
            }
        }
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

impl Indicator for Ema {
    type Output = f64;

    fn name(&self) -> &str {
        &self.name
    }

    fn warmup_bars(&self) -> usize {
        self.period
    }

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        self.next(bar.close)
    }
}

/// Compute EMA values over a whole series in one pass.
///
/// Same seed and recurrence as [`Ema`]; entries before the seed are NaN.
pub fn ema_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if n < period || period == 0 {
        return result;
    }

    let alpha = 2.0 / (period as f64 + 1.0);

    // Seed: SMA of first `period` values
    let mut sum = 0.0;
    for &v in values.iter().take(period) {
        sum += v;
    }
    let seed = sum / period as f64;
    result[period - 1] = seed;

    let mut prev = seed;
    for i in period..n {
        let ema = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = ema;
        prev = ema;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn ema_period_1_equals_close() {
        let mut ema = Ema::new(1);
        for bar in make_bars(&[100.0, 200.0, 300.0]) {
            assert_approx(ema.update(&bar).unwrap(), bar.close, DEFAULT_EPSILON);
        }
    }

    #[test]
    fn ema_3_known_values() {
        // Closes: 10, 11, 12, 13, 14
        // alpha = 2/(3+1) = 0.5
        // Seed at index 2: SMA(10,11,12) = 11.0
        // EMA[3] = 0.5*13 + 0.5*11.0 = 12.0
        // EMA[4] = 0.5*14 + 0.5*12.0 = 13.0
        let mut ema = Ema::new(3);
        let out: Vec<Option<f64>> = [10.0, 11.0, 12.0, 13.0, 14.0]
            .iter()
            .map(|&x| ema.next(x))
            .collect();

        assert!(out[0].is_none());
        assert!(out[1].is_none());
        assert_approx(out[2].unwrap(), 11.0, DEFAULT_EPSILON);
        assert_approx(out[3].unwrap(), 12.0, DEFAULT_EPSILON);
        assert_approx(out[4].unwrap(), 13.0, DEFAULT_EPSILON);
    }

    #[test]
    fn incremental_matches_series() {
        let closes = [10.0, 11.5, 12.0, 9.0, 14.0, 15.5, 13.25, 12.0];
        let series = ema_of_series(&closes, 3);
        let mut ema = Ema::new(3);
        for (i, &x) in closes.iter().enumerate() {
            match ema.next(x) {
                Some(v) => assert_eq!(v, series[i]),
                None => assert!(series[i].is_nan()),
            }
        }
    }

    #[test]
    fn ema_warmup() {
        assert_eq!(Ema::new(21).warmup_bars(), 21);
        assert_eq!(Ema::new(1).warmup_bars(), 1);
        assert_eq!(Ema::new(9).name(), "ema_9");
    }

    #[test]
    #[should_panic(expected = "EMA period must be >= 1")]
    fn rejects_zero_period() {
        Ema::new(0);
    }
}
