//! Volume-Weighted Average Price over a session window.
//!
//! VWAP = sum(typical_price * volume) / sum(volume), typical = (h + l + c) / 3.
//! The session boundary is a [`VwapSession`] policy. A session with zero
//! traded volume reports the latest typical price.

use std::collections::VecDeque;

use chrono::NaiveDate;

use super::Indicator;
use crate::config::VwapSession;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Vwap {
    session: VwapSession,
    session_date: Option<NaiveDate>,
    pv_sum: f64,
    volume_sum: f64,
    window: VecDeque<(f64, f64)>,
    name: String,
}

impl Vwap {
    pub fn new(session: VwapSession) -> Self {
        let name = match session {
            VwapSession::Daily => "vwap_daily".to_string(),
            VwapSession::Rolling { bars } => {
                assert!(bars >= 1, "VWAP rolling window must be >= 1");
                format!("vwap_{bars}")
            }
            VwapSession::Continuous => "vwap".to_string(),
        };
        Self {
            session,
            session_date: None,
            pv_sum: 0.0,
            volume_sum: 0.0,
            window: VecDeque::new(),
            name,
        }
    }
}

impl Indicator for Vwap {
    type Output = f64;

    fn name(&self) -> &str {
        &self.name
    }

    fn warmup_bars(&self) -> usize {
        match self.session {
            VwapSession::Rolling { bars } => bars,
            VwapSession::Daily | VwapSession::Continuous => 1,
        }
    }

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        let typical = bar.typical_price();
        let pv = typical * bar.volume;

        match self.session {
            VwapSession::Daily | VwapSession::Continuous => {
                if self.session == VwapSession::Daily {
                    let date = bar.timestamp.date_naive();
                    if self.session_date != Some(date) {
                        self.session_date = Some(date);
                        self.pv_sum = 0.0;
                        self.volume_sum = 0.0;
                    }
                }
                self.pv_sum += pv;
                self.volume_sum += bar.volume;
            }
            VwapSession::Rolling { bars } => {
                self.window.push_back((pv, bar.volume));
                if self.window.len() > bars {
                    self.window.pop_front();
                }
                if self.window.len() < bars {
                    return None;
                }
                // Summed afresh each bar so the window carries no subtraction drift.
                self.pv_sum = self.window.iter().map(|(pv, _)| pv).sum();
                self.volume_sum = self.window.iter().map(|(_, v)| v).sum();
            }
        }

        if self.volume_sum > 0.0 {
            Some(self.pv_sum / self.volume_sum)
        } else {
            Some(typical)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};
    use chrono::{TimeZone, Utc};

    fn bar_at(day: u32, hour: u32, price: f64, volume: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap(),
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    #[test]
    fn volume_weighting() {
        let mut vwap = Vwap::new(VwapSession::Continuous);
        vwap.update(&bar_at(1, 0, 100.0, 1.0));
        let v = vwap.update(&bar_at(1, 1, 110.0, 3.0)).unwrap();
        assert_approx(v, (100.0 + 330.0) / 4.0, DEFAULT_EPSILON);
    }

    #[test]
    fn daily_session_resets_at_midnight() {
        let mut vwap = Vwap::new(VwapSession::Daily);
        vwap.update(&bar_at(1, 22, 100.0, 5.0));
        vwap.update(&bar_at(1, 23, 120.0, 5.0));
        let next_day = vwap.update(&bar_at(2, 0, 90.0, 1.0)).unwrap();
        assert_approx(next_day, 90.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rolling_window_warms_and_slides() {
        let mut vwap = Vwap::new(VwapSession::Rolling { bars: 2 });
        assert_eq!(vwap.warmup_bars(), 2);
        assert!(vwap.update(&bar_at(1, 0, 100.0, 1.0)).is_none());
        assert_approx(vwap.update(&bar_at(1, 1, 110.0, 1.0)).unwrap(), 105.0, DEFAULT_EPSILON);
        assert_approx(vwap.update(&bar_at(1, 2, 130.0, 1.0)).unwrap(), 120.0, DEFAULT_EPSILON);
    }

    #[test]
    fn zero_volume_falls_back_to_typical_price() {
        let mut vwap = Vwap::new(VwapSession::Daily);
        assert_approx(vwap.update(&bar_at(1, 0, 101.0, 0.0)).unwrap(), 101.0, DEFAULT_EPSILON);
    }
}
