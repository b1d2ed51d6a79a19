//! Entry conditions as an ordered list of named predicates.
//!
//! Predicates see only the current snapshot and the events recorded for this
//! bar, never position state. The evaluator walks the list in priority order
//! and returns the first match, so a bar yields at most one [`Signal`]. The
//! caller reports whether a position is open; open positions suppress entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::detectors::{CrossoverEvent, CrossoverKind, DivergenceEvent, DivergenceKind};
use crate::domain::Side;
use crate::indicators::IndicatorSnapshot;

/// An immutable entry decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub side: Side,
    /// 1, 2 or 3. Lower numbers are more corroborated setups.
    pub condition_id: u8,
    pub timestamp: DateTime<Utc>,
    pub snapshot: IndicatorSnapshot,
}

impl Signal {
    pub fn label(&self) -> String {
        format!("{}-{}", self.side, self.condition_id)
    }
}

/// Divergences stay actionable for a fixed number of warm bars.
#[derive(Debug, Clone)]
pub struct PendingDivergences {
    validity_bars: u64,
    bull_at: Option<u64>,
    bear_at: Option<u64>,
}

impl PendingDivergences {
    pub fn new(validity_bars: usize) -> Self {
        Self {
            validity_bars: validity_bars as u64,
            bull_at: None,
            bear_at: None,
        }
    }

    pub fn record(&mut self, event: &DivergenceEvent, bar_index: u64) {
        match event.kind {
            DivergenceKind::RsiBullDiv => self.bull_at = Some(bar_index),
            DivergenceKind::RsiBearDiv => self.bear_at = Some(bar_index),
        }
    }

    /// True on the confirmation bar and the `validity_bars - 1` bars after it.
    pub fn is_pending(&self, kind: DivergenceKind, bar_index: u64) -> bool {
        let at = match kind {
            DivergenceKind::RsiBullDiv => self.bull_at,
            DivergenceKind::RsiBearDiv => self.bear_at,
        };
        at.is_some_and(|at| bar_index >= at && bar_index - at < self.validity_bars)
    }
}

/// Events visible to the predicates on one bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventContext {
    pub ema_bull: bool,
    pub ema_bear: bool,
    pub macd_bull: bool,
    pub macd_bear: bool,
    pub bull_divergence: bool,
    pub bear_divergence: bool,
}

impl EventContext {
    pub fn new(crossovers: &[CrossoverEvent], pending: &PendingDivergences, bar_index: u64) -> Self {
        let has = |kind: CrossoverKind| crossovers.iter().any(|e| e.kind == kind);
        Self {
            ema_bull: has(CrossoverKind::EmaBull),
            ema_bear: has(CrossoverKind::EmaBear),
            macd_bull: has(CrossoverKind::MacdBull),
            macd_bear: has(CrossoverKind::MacdBear),
            bull_divergence: pending.is_pending(DivergenceKind::RsiBullDiv, bar_index),
            bear_divergence: pending.is_pending(DivergenceKind::RsiBearDiv, bar_index),
        }
    }

    pub fn ema_cross(&self, side: Side) -> bool {
        match side {
            Side::Long => self.ema_bull,
            Side::Short => self.ema_bear,
        }
    }

    pub fn macd_cross(&self, side: Side) -> bool {
        match side {
            Side::Long => self.macd_bull,
            Side::Short => self.macd_bear,
        }
    }

    pub fn divergence(&self, side: Side) -> bool {
        match side {
            Side::Long => self.bull_divergence,
            Side::Short => self.bear_divergence,
        }
    }
}

type Predicate = fn(&IndicatorSnapshot, &EventContext) -> bool;

/// One named entry rule.
#[derive(Clone, Copy)]
pub struct EntryCondition {
    pub side: Side,
    pub id: u8,
    predicate: Predicate,
}

impl EntryCondition {
    pub fn is_satisfied(&self, snapshot: &IndicatorSnapshot, ctx: &EventContext) -> bool {
        (self.predicate)(snapshot, ctx)
    }
}

impl fmt::Debug for EntryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryCondition({}-{})", self.side, self.id)
    }
}

fn long_1(s: &IndicatorSnapshot, ctx: &EventContext) -> bool {
    s.close > s.vwap && ctx.ema_bull && ctx.macd_bull
}

fn long_2(_: &IndicatorSnapshot, ctx: &EventContext) -> bool {
    ctx.bull_divergence && ctx.macd_bull
}

fn long_3(_: &IndicatorSnapshot, ctx: &EventContext) -> bool {
    ctx.ema_bull && ctx.macd_bull
}

fn short_1(s: &IndicatorSnapshot, ctx: &EventContext) -> bool {
    s.close < s.vwap && ctx.ema_bear && ctx.macd_bear && s.macd_hist < 0.0
}

fn short_2(_: &IndicatorSnapshot, ctx: &EventContext) -> bool {
    ctx.bear_divergence && ctx.macd_bear
}

fn short_3(_: &IndicatorSnapshot, ctx: &EventContext) -> bool {
    ctx.ema_bear && ctx.macd_bear
}

#[derive(Debug, Clone)]
pub struct ConditionEvaluator {
    conditions: Vec<EntryCondition>,
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        let c = |side: Side, id: u8, predicate: Predicate| EntryCondition {
            side,
            id,
            predicate,
        };
        Self {
            conditions: vec![
                c(Side::Long, 1, long_1),
                c(Side::Long, 2, long_2),
                c(Side::Long, 3, long_3),
                c(Side::Short, 1, short_1),
                c(Side::Short, 2, short_2),
                c(Side::Short, 3, short_3),
            ],
        }
    }
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conditions(&self) -> &[EntryCondition] {
        &self.conditions
    }

    /// First satisfied condition in priority order, unless a position is open.
    pub fn evaluate(
        &self,
        snapshot: &IndicatorSnapshot,
        ctx: &EventContext,
        position_open: bool,
    ) -> Option<Signal> {
        if position_open {
            return None;
        }
        self.conditions
            .iter()
            .find(|c| c.is_satisfied(snapshot, ctx))
            .map(|c| Signal {
                side: c.side,
                condition_id: c.id,
                timestamp: snapshot.timestamp,
                snapshot: *snapshot,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_snapshot;

    fn bullish_snapshot() -> IndicatorSnapshot {
        let mut s = test_snapshot(0, 105.0, 55.0);
        s.vwap = 100.0;
        s.macd_hist = 0.2;
        s
    }

    fn bearish_snapshot() -> IndicatorSnapshot {
        let mut s = test_snapshot(0, 95.0, 45.0);
        s.vwap = 100.0;
        s.macd_hist = -0.2;
        s
    }

    #[test]
    fn long_1_wins_over_long_3() {
        let ctx = EventContext {
            ema_bull: true,
            macd_bull: true,
            ..Default::default()
        };
        let signal = ConditionEvaluator::new()
            .evaluate(&bullish_snapshot(), &ctx, false)
            .unwrap();
        assert_eq!(signal.side, Side::Long);
        assert_eq!(signal.condition_id, 1);
        assert_eq!(signal.label(), "LONG-1");
    }

    #[test]
    fn long_3_without_vwap_bias() {
        let ctx = EventContext {
            ema_bull: true,
            macd_bull: true,
            ..Default::default()
        };
        let signal = ConditionEvaluator::new()
            .evaluate(&bearish_snapshot(), &ctx, false)
            .unwrap();
        assert_eq!(signal.condition_id, 3);
    }

    #[test]
    fn long_2_needs_pending_divergence_and_macd_cross() {
        let eval = ConditionEvaluator::new();
        let snap = bearish_snapshot();
        let only_div = EventContext {
            bull_divergence: true,
            ..Default::default()
        };
        assert!(eval.evaluate(&snap, &only_div, false).is_none());

        let both = EventContext {
            macd_bull: true,
            ..only_div
        };
        assert_eq!(eval.evaluate(&snap, &both, false).unwrap().condition_id, 2);
    }

    #[test]
    fn short_1_requires_negative_histogram() {
        let eval = ConditionEvaluator::new();
        let ctx = EventContext {
            ema_bear: true,
            macd_bear: true,
            ..Default::default()
        };
        let signal = eval.evaluate(&bearish_snapshot(), &ctx, false).unwrap();
        assert_eq!((signal.side, signal.condition_id), (Side::Short, 1));

        let mut flat_hist = bearish_snapshot();
        flat_hist.macd_hist = 0.0;
        let signal = eval.evaluate(&flat_hist, &ctx, false).unwrap();
        assert_eq!((signal.side, signal.condition_id), (Side::Short, 3));
    }

    #[test]
    fn open_position_suppresses_entries() {
        let ctx = EventContext {
            ema_bull: true,
            macd_bull: true,
            ..Default::default()
        };
        assert!(ConditionEvaluator::new()
            .evaluate(&bullish_snapshot(), &ctx, true)
            .is_none());
    }

    #[test]
    fn ema_cross_alone_is_not_enough() {
        let ctx = EventContext {
            ema_bull: true,
            ..Default::default()
        };
        assert!(ConditionEvaluator::new()
            .evaluate(&bullish_snapshot(), &ctx, false)
            .is_none());
    }

    #[test]
    fn divergence_validity_window() {
        let mut pending = PendingDivergences::new(3);
        let snap = test_snapshot(0, 1.0, 1.0);
        pending.record(
            &DivergenceEvent {
                kind: DivergenceKind::RsiBullDiv,
                price_extreme_timestamp: snap.timestamp,
                rsi_extreme_timestamp: snap.timestamp,
                timestamp: snap.timestamp,
            },
            10,
        );
        assert!(!pending.is_pending(DivergenceKind::RsiBullDiv, 9));
        assert!(pending.is_pending(DivergenceKind::RsiBullDiv, 10));
        assert!(pending.is_pending(DivergenceKind::RsiBullDiv, 12));
        assert!(!pending.is_pending(DivergenceKind::RsiBullDiv, 13));
        assert!(!pending.is_pending(DivergenceKind::RsiBearDiv, 10));
    }

    #[test]
    fn context_from_events() {
        let snap = test_snapshot(0, 1.0, 1.0);
        let events = [CrossoverEvent {
            kind: CrossoverKind::MacdBear,
            timestamp: snap.timestamp,
        }];
        let ctx = EventContext::new(&events, &PendingDivergences::new(5), 0);
        assert!(ctx.macd_cross(Side::Short));
        assert!(!ctx.ema_cross(Side::Short));
        assert!(!ctx.divergence(Side::Long));
    }

    #[test]
    fn priority_order_is_long_then_short() {
        let ids: Vec<String> = ConditionEvaluator::new()
            .conditions()
            .iter()
            .map(|c| format!("{}-{}", c.side, c.id))
            .collect();
        assert_eq!(ids, ["LONG-1", "LONG-2", "LONG-3", "SHORT-1", "SHORT-2", "SHORT-3"]);
    }
}
