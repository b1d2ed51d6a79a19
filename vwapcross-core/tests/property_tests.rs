//! Property tests for indicator and detector invariants.
//!
//! Uses proptest to verify:
//! 1. Incremental EMA matches the batch recurrence
//! 2. One crossover event per sign change, none on constant-sign runs
//! 3. RSI stays in [0, 100]
//! 4. Stop-loss wins whenever a bar touches both stop and first target

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use vwapcross_core::conditions::{EventContext, Signal};
use vwapcross_core::config::RiskConfig;
use vwapcross_core::detectors::CrossoverDetector;
use vwapcross_core::domain::{Side, Timeframe};
use vwapcross_core::indicators::ema::ema_of_series;
use vwapcross_core::indicators::{Ema, IndicatorSnapshot, Rsi};
use vwapcross_core::order::IntentReason;
use vwapcross_core::risk::RiskManager;
use vwapcross_core::state_machine::PositionMachine;

// ── Helpers ──────────────────────────────────────────────────────────

fn snapshot(i: usize, close: f64, ema_spread: f64) -> IndicatorSnapshot {
    IndicatorSnapshot {
        timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap() + Duration::minutes(5 * i as i64),
        close,
        high: close + 1.0,
        low: close - 1.0,
        vwap: close,
        ema_fast: 100.0 + ema_spread,
        ema_slow: 100.0,
        macd_line: 0.0,
        macd_signal: 0.0,
        macd_hist: 0.0,
        rsi: 50.0,
        atr: 2.0,
    }
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_closes() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(10.0..100_000.0_f64, 1..200)
}

fn arb_spread() -> impl Strategy<Value = f64> {
    prop_oneof![
        1 => Just(0.0),
        4 => -5.0..-0.001_f64,
        4 => 0.001..5.0_f64,
    ]
}

// ── 1. EMA determinism ───────────────────────────────────────────────

proptest! {
    #[test]
    fn incremental_ema_matches_batch(closes in arb_closes(), period in prop::sample::select(vec![9usize, 21])) {
        let batch = ema_of_series(&closes, period);
        let mut ema = Ema::new(period);
        for (i, &c) in closes.iter().enumerate() {
            match ema.next(c) {
                Some(v) => prop_assert!((v - batch[i]).abs() <= 1e-9 * batch[i].abs().max(1.0)),
                None => prop_assert!(batch[i].is_nan()),
            }
        }
    }
}

// ── 2. Crossover count ───────────────────────────────────────────────

proptest! {
    #[test]
    fn one_event_per_sign_change(spreads in prop::collection::vec(arb_spread(), 1..300)) {
        let mut detector = CrossoverDetector::new();
        let events: usize = spreads
            .iter()
            .enumerate()
            .map(|(i, &s)| detector.on_snapshot(&snapshot(i, 100.0, s)).len())
            .sum();

        let signs: Vec<bool> = spreads.iter().filter(|s| **s != 0.0).map(|s| *s > 0.0).collect();
        let changes = signs.windows(2).filter(|w| w[0] != w[1]).count();
        prop_assert_eq!(events, changes);
    }

    #[test]
    fn constant_sign_run_is_silent(spread in 0.001..5.0_f64, n in 2usize..100, negative in any::<bool>()) {
        let s = if negative { -spread } else { spread };
        let mut detector = CrossoverDetector::new();
        for i in 0..n {
            prop_assert!(detector.on_snapshot(&snapshot(i, 100.0, s)).is_empty());
        }
    }
}

// ── 3. RSI bounds ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn rsi_is_bounded(closes in arb_closes()) {
        let mut rsi = Rsi::new(14);
        for c in closes {
            if let Some(v) = rsi.next(c) {
                prop_assert!((0.0..=100.0).contains(&v));
            }
        }
    }
}

// ── 4. Stop priority ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn stop_beats_target_on_same_bar(
        entry in 100.0..50_000.0_f64,
        atr_frac in 0.001..0.05_f64,
        short in any::<bool>(),
    ) {
        let side = if short { Side::Short } else { Side::Long };
        let atr = entry * atr_frac;
        let risk = RiskManager::new(&RiskConfig::default());
        let mut machine = PositionMachine::new("BTCUSDT", Timeframe::M15);

        let mut snap = snapshot(0, entry, 0.0);
        snap.atr = atr;
        let signal = Signal { side, condition_id: 3, timestamp: snap.timestamp, snapshot: snap };
        let levels = risk.on_entry(&signal, 0.001).unwrap();
        let entry_t = machine.propose_entry(&signal, &levels).unwrap();
        machine.commit(entry_t).unwrap();

        // One bar spanning both the stop and the first target.
        let mut wide = snapshot(1, entry, 0.0);
        wide.high = entry + 10.0 * atr;
        wide.low = entry - 10.0 * atr;
        let t = machine
            .propose_exit(&wide, &EventContext::default(), &risk)
            .unwrap()
            .unwrap();
        prop_assert_eq!(t.intent.reason, IntentReason::StopLoss);
        prop_assert_eq!(t.intent.price_basis, levels.stop_loss);
    }
}
