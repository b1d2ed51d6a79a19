//! Trade ledger and performance summary.
//!
//! One [`TradeRecord`] per acknowledged exit fill. A position that takes
//! profit at the first target and is stopped out on the rest produces two
//! records. Summary statistics are pure functions over the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vwapcross_core::domain::{PositionState, Side, Timeframe};
use vwapcross_core::execution::OrderAck;
use vwapcross_core::order::IntentReason;
use vwapcross_core::state_machine::Transition;

use crate::data::DataSource;

/// A single realised exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub side: Side,
    pub entry_timestamp: DateTime<Utc>,
    pub exit_timestamp: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub reason: IntentReason,
    pub pnl: f64,
}

impl TradeRecord {
    /// Build a record from an acknowledged exit. Entries return `None`.
    pub fn from_exit(transition: &Transition, ack: &OrderAck) -> Option<Self> {
        if transition.intent.reason.is_entry() {
            return None;
        }
        let position = &transition.position;
        let pnl = position.side.sign() * ack.size * (ack.fill_price - position.entry_price);
        Some(Self {
            symbol: position.symbol.clone(),
            timeframe: position.timeframe,
            side: position.side,
            entry_timestamp: position.entry_timestamp,
            exit_timestamp: transition.intent.timestamp,
            entry_price: position.entry_price,
            exit_price: ack.fill_price,
            size: ack.size,
            reason: transition.intent.reason,
            pnl,
        })
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}

/// Aggregate statistics for a ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub initial_capital: f64,
    pub total_pnl: f64,
    pub final_equity: f64,
    pub return_pct: f64,
    pub trade_count: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_factor: f64,
    pub max_drawdown_pct: f64,
}

impl PerformanceSummary {
    /// Trades are replayed in exit order to build the equity curve.
    pub fn compute(trades: &[TradeRecord], initial_capital: f64) -> Self {
        let mut ordered: Vec<&TradeRecord> = trades.iter().collect();
        ordered.sort_by_key(|t| (t.exit_timestamp, t.timeframe));
        let curve = equity_curve(ordered.iter().map(|t| t.pnl), initial_capital);

        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
        let final_equity = initial_capital + total_pnl;
        Self {
            initial_capital,
            total_pnl,
            final_equity,
            return_pct: if initial_capital > 0.0 {
                total_pnl / initial_capital * 100.0
            } else {
                0.0
            },
            trade_count: trades.len(),
            winning_trades: trades.iter().filter(|t| t.pnl > 0.0).count(),
            losing_trades: trades.iter().filter(|t| t.pnl < 0.0).count(),
            win_rate: win_rate(trades),
            avg_win: average(trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl)),
            avg_loss: average(trades.iter().filter(|t| t.pnl < 0.0).map(|t| t.pnl)),
            profit_factor: profit_factor(trades),
            max_drawdown_pct: max_drawdown(&curve) * 100.0,
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Equity after each trade, starting with `initial_capital`.
pub fn equity_curve(pnls: impl IntoIterator<Item = f64>, initial_capital: f64) -> Vec<f64> {
    let mut equity = initial_capital;
    let mut curve = vec![equity];
    for pnl in pnls {
        equity += pnl;
        curve.push(equity);
    }
    curve
}

/// Maximum peak-to-trough decline as a fraction (0.25 = 25% drawdown).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        peak = peak.max(eq);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - eq) / peak);
        }
    }
    max_dd
}

pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

/// Gross profits / gross losses, capped at 100.0 when nothing was lost.
pub fn profit_factor(trades: &[TradeRecord]) -> f64 {
    let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades.iter().filter(|t| t.pnl < 0.0).map(|t| -t.pnl).sum();
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

fn average(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

// ─── Run report ─────────────────────────────────────────────────────

/// Counters kept by one timeframe worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub bars_received: u64,
    pub snapshots: u64,
    pub warmup_skipped: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub risk_discarded: u64,
    pub execution_failures: u64,
    pub signals: u64,
    pub entries: u64,
    pub exits: u64,
    /// Signals and trades dropped from a capped live ledger.
    pub ledger_evicted: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeReport {
    pub timeframe: Timeframe,
    pub source: Option<DataSource>,
    pub stats: WorkerStats,
    pub final_state: PositionState,
    pub halted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Backtest,
    Live,
}

/// Everything a run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: RunMode,
    pub symbol: String,
    pub timeframes: Vec<TimeframeReport>,
    /// Sorted by exit time, then timeframe.
    pub trades: Vec<TradeRecord>,
    pub summary: PerformanceSummary,
}

impl RunReport {
    pub fn new(
        mode: RunMode,
        symbol: impl Into<String>,
        timeframes: Vec<TimeframeReport>,
        mut trades: Vec<TradeRecord>,
        initial_capital: f64,
    ) -> Self {
        trades.sort_by_key(|t| (t.exit_timestamp, t.timeframe));
        let summary = PerformanceSummary::compute(&trades, initial_capital);
        Self {
            mode,
            symbol: symbol.into(),
            timeframes,
            trades,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use vwapcross_core::domain::{OrderSide, Position};
    use vwapcross_core::order::OrderIntent;

    const EPS: f64 = 1e-9;

    fn ts(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn trade(pnl: f64, minute: i64) -> TradeRecord {
        TradeRecord {
            symbol: "BTCUSDT".into(),
            timeframe: Timeframe::M5,
            side: Side::Long,
            entry_timestamp: ts(0),
            exit_timestamp: ts(minute),
            entry_price: 100.0,
            exit_price: 100.0 + pnl,
            size: 1.0,
            reason: IntentReason::StopLoss,
            pnl,
        }
    }

    fn exit_transition(side: Side, reason: IntentReason, size: f64, basis: f64) -> Transition {
        let position = Position {
            symbol: "BTCUSDT".into(),
            timeframe: Timeframe::M15,
            side,
            entry_price: 100.0,
            entry_timestamp: ts(0),
            initial_size: 2.0,
            remaining_size: 1.0,
            stop_loss: 97.0,
            take_profit_1: 107.0,
            take_profit_2: Some(107.0),
            tp1_size: 1.0,
            state: PositionState::PartiallyClosed,
        };
        Transition {
            from: PositionState::Entered,
            to: PositionState::PartiallyClosed,
            intent: OrderIntent {
                symbol: "BTCUSDT".into(),
                timeframe: Timeframe::M15,
                side: side.exit_order(),
                size,
                price_basis: basis,
                reason,
                timestamp: ts(15),
            },
            position,
        }
    }

    fn ack(size: f64, price: f64, side: OrderSide) -> OrderAck {
        OrderAck {
            order_id: 1,
            symbol: "BTCUSDT".into(),
            side,
            size,
            fill_price: price,
            timestamp: ts(15),
        }
    }

    #[test]
    fn long_exit_pnl() {
        let t = exit_transition(Side::Long, IntentReason::TakeProfit1, 1.0, 107.0);
        let record = TradeRecord::from_exit(&t, &ack(1.0, 107.0, OrderSide::Sell)).unwrap();
        assert!((record.pnl - 7.0).abs() < EPS);
        assert_eq!(record.exit_timestamp, ts(15));
        assert_eq!(record.timeframe, Timeframe::M15);
    }

    #[test]
    fn short_exit_pnl_is_mirrored() {
        let t = exit_transition(Side::Short, IntentReason::TakeProfit1, 1.0, 93.0);
        let record = TradeRecord::from_exit(&t, &ack(1.0, 93.0, OrderSide::Buy)).unwrap();
        assert!((record.pnl - 7.0).abs() < EPS);

        let t = exit_transition(Side::Short, IntentReason::StopLoss, 0.5, 103.0);
        let record = TradeRecord::from_exit(&t, &ack(0.5, 103.0, OrderSide::Buy)).unwrap();
        assert!((record.pnl + 1.5).abs() < EPS);
    }

    #[test]
    fn entries_are_not_trades() {
        let t = exit_transition(Side::Long, IntentReason::Entry { condition_id: 2 }, 1.0, 100.0);
        assert!(TradeRecord::from_exit(&t, &ack(1.0, 100.0, OrderSide::Buy)).is_none());
    }

    #[test]
    fn summary_of_mixed_ledger() {
        let trades = vec![trade(30.0, 5), trade(-10.0, 10), trade(-20.0, 15), trade(50.0, 20)];
        let s = PerformanceSummary::compute(&trades, 1_000.0);
        assert!((s.total_pnl - 50.0).abs() < EPS);
        assert!((s.final_equity - 1_050.0).abs() < EPS);
        assert!((s.return_pct - 5.0).abs() < EPS);
        assert_eq!(s.trade_count, 4);
        assert_eq!((s.winning_trades, s.losing_trades), (2, 2));
        assert!((s.win_rate - 0.5).abs() < EPS);
        assert!((s.avg_win - 40.0).abs() < EPS);
        assert!((s.avg_loss + 15.0).abs() < EPS);
        assert!((s.profit_factor - 80.0 / 30.0).abs() < EPS);
        // Peak 1030, trough 1000.
        assert!((s.max_drawdown_pct - 30.0 / 1_030.0 * 100.0).abs() < EPS);
    }

    #[test]
    fn drawdown_follows_exit_order_not_ledger_order() {
        let trades = vec![trade(50.0, 20), trade(-100.0, 5)];
        let s = PerformanceSummary::compute(&trades, 1_000.0);
        // Loss first: 1000 -> 900 -> 950.
        assert!((s.max_drawdown_pct - 10.0).abs() < EPS);
    }

    #[test]
    fn empty_ledger() {
        let s = PerformanceSummary::compute(&[], 1_000.0);
        assert_eq!(s.trade_count, 0);
        assert_eq!(s.win_rate, 0.0);
        assert_eq!(s.profit_factor, 0.0);
        assert_eq!(s.max_drawdown_pct, 0.0);
        assert_eq!(s.final_equity, 1_000.0);
    }

    #[test]
    fn profit_factor_caps_without_losses() {
        assert_eq!(profit_factor(&[trade(5.0, 5)]), 100.0);
    }

    #[test]
    fn max_drawdown_of_monotone_curve_is_zero() {
        assert_eq!(max_drawdown(&[100.0, 101.0, 105.0]), 0.0);
        assert!((max_drawdown(&[100.0, 50.0, 120.0, 60.0]) - 0.5).abs() < EPS);
    }

    proptest::proptest! {
        #[test]
        fn curve_ends_at_total_pnl(pnls in proptest::collection::vec(-500.0..500.0_f64, 0..60)) {
            let curve = equity_curve(pnls.iter().copied(), 1_000.0);
            let dd = max_drawdown(&curve);
            proptest::prop_assert!(dd >= 0.0 && dd.is_finite());
            let last = curve[curve.len() - 1];
            proptest::prop_assert!((last - 1_000.0 - pnls.iter().sum::<f64>()).abs() < 1e-6);
        }
    }
}
