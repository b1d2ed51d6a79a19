//! One worker per (symbol, timeframe).
//!
//! A worker owns its engine and drains a [`BarSource`] into it, submitting
//! intents through whichever [`ExecutionClient`] the orchestrator hands it.
//! Every core error is classified and logged here; only an invariant
//! violation stops the worker.
//!
//! With equity sizing, each entry commits a fraction of the worker's own
//! equity (starting capital plus its realised P&L), converted at the bar
//! close the entry fills at.

use tracing::Span;
use vwapcross_core::conditions::Signal;
use vwapcross_core::domain::{Bar, PositionState, Timeframe};
use vwapcross_core::execution::ExecutionClient;
use vwapcross_core::feed::BarSource;
use vwapcross_core::{CoreError, ProcessedBar, StrategyConfig, TimeframeEngine};

use crate::data::DataSource;
use crate::report::{TimeframeReport, TradeRecord, WorkerStats};

#[derive(Debug, Clone, Copy)]
struct EquitySizing {
    fraction: f64,
    equity: f64,
}

#[derive(Debug)]
pub struct TimeframeWorker {
    engine: TimeframeEngine,
    span: Span,
    stats: WorkerStats,
    signals: Vec<Signal>,
    trades: Vec<TradeRecord>,
    sizing: Option<EquitySizing>,
    ledger_capacity: Option<usize>,
}

/// Drop the oldest entries beyond `capacity`. Returns how many went.
fn trim_front<T>(items: &mut Vec<T>, capacity: Option<usize>) -> u64 {
    match capacity {
        Some(cap) if items.len() > cap => {
            let excess = items.len() - cap;
            items.drain(..excess);
            excess as u64
        }
        _ => 0,
    }
}

impl TimeframeWorker {
    pub fn new(symbol: &str, timeframe: Timeframe, config: &StrategyConfig) -> Self {
        Self {
            engine: TimeframeEngine::new(symbol, timeframe, config),
            span: tracing::info_span!("worker", symbol = %symbol, timeframe = %timeframe),
            stats: WorkerStats::default(),
            signals: Vec::new(),
            trades: Vec::new(),
            sizing: None,
            ledger_capacity: None,
        }
    }

    /// Size entries at `fraction` of current equity, starting from `capital`.
    pub fn with_equity_sizing(mut self, fraction: f64, capital: f64) -> Self {
        self.sizing = Some(EquitySizing {
            fraction,
            equity: capital,
        });
        self
    }

    /// Keep only the newest `capacity` signals and trades.
    pub fn with_ledger_capacity(mut self, capacity: usize) -> Self {
        self.ledger_capacity = Some(capacity);
        self
    }

    /// Running equity when sizing from equity.
    pub fn equity(&self) -> Option<f64> {
        self.sizing.map(|s| s.equity)
    }

    pub fn timeframe(&self) -> Timeframe {
        self.engine.timeframe()
    }

    pub fn is_halted(&self) -> bool {
        self.engine.is_halted()
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    /// Feed every bar the source has right now. Returns the number pulled.
    ///
    /// Stops early if the engine halts.
    pub fn drain<S, E>(&mut self, source: &mut S, execution: &mut E) -> usize
    where
        S: BarSource + ?Sized,
        E: ExecutionClient + ?Sized,
    {
        let span = self.span.clone();
        let _guard = span.enter();

        let mut pulled = 0;
        while !self.engine.is_halted() {
            let Some(bar) = source.next_bar() else {
                break;
            };
            pulled += 1;
            self.on_bar(&bar, execution);
        }
        pulled
    }

    fn on_bar<E: ExecutionClient + ?Sized>(&mut self, bar: &Bar, execution: &mut E) {
        self.stats.bars_received += 1;
        if let Some(sizing) = self.sizing {
            if self.engine.state() == PositionState::Flat {
                self.engine
                    .set_order_size(sizing.fraction * sizing.equity / bar.close);
            }
        }
        match self.engine.process_bar(bar, execution) {
            Ok(processed) => self.on_processed(processed),
            Err(CoreError::InsufficientHistory { seen, required }) => {
                self.stats.warmup_skipped += 1;
                tracing::trace!(seen, required, "warming up");
            }
            Err(CoreError::DuplicateBar { timestamp }) => {
                self.stats.duplicates += 1;
                tracing::debug!(%timestamp, "duplicate bar dropped");
            }
            Err(err @ (CoreError::InvalidBarOrder { .. } | CoreError::InvalidBar { .. })) => {
                self.stats.rejected += 1;
                tracing::warn!(error = %err, "bar rejected");
            }
            Err(CoreError::RiskComputation { atr }) => {
                self.stats.risk_discarded += 1;
                tracing::warn!(atr, timestamp = %bar.timestamp, "signal discarded: degenerate ATR");
            }
            Err(CoreError::InvalidOrderSize { size }) => {
                self.stats.risk_discarded += 1;
                tracing::warn!(
                    size,
                    equity = ?self.equity(),
                    timestamp = %bar.timestamp,
                    "signal discarded: no equity to size the entry"
                );
            }
            Err(CoreError::Execution(err)) => {
                self.stats.execution_failures += 1;
                tracing::warn!(error = %err, timestamp = %bar.timestamp, "order not acknowledged; position unchanged");
            }
            Err(err) => {
                tracing::error!(error = %err, timestamp = %bar.timestamp, "engine halted");
            }
        }
    }

    fn on_processed(&mut self, processed: ProcessedBar) {
        self.stats.snapshots += 1;
        let ProcessedBar { step, ack } = processed;

        if let Some(signal) = step.signal {
            self.stats.signals += 1;
            tracing::info!(
                signal = %signal.label(),
                close = signal.snapshot.close,
                vwap = signal.snapshot.vwap,
                rsi = signal.snapshot.rsi,
                "entry signal"
            );
            self.signals.push(signal);
            self.stats.ledger_evicted += trim_front(&mut self.signals, self.ledger_capacity);
        }

        let (Some(transition), Some(ack)) = (step.transition, ack) else {
            return;
        };
        let intent = &transition.intent;
        if intent.reason.is_entry() {
            self.stats.entries += 1;
            let p = &transition.position;
            tracing::info!(
                side = %p.side,
                size = p.initial_size,
                entry = p.entry_price,
                stop = p.stop_loss,
                tp1 = p.take_profit_1,
                tp2 = ?p.take_profit_2,
                order_id = ack.order_id,
                "position opened"
            );
            return;
        }

        self.stats.exits += 1;
        if let Some(trade) = TradeRecord::from_exit(&transition, &ack) {
            tracing::info!(
                reason = %trade.reason,
                size = trade.size,
                price = trade.exit_price,
                pnl = trade.pnl,
                state = ?transition.to,
                order_id = ack.order_id,
                "position reduced"
            );
            if let Some(sizing) = self.sizing.as_mut() {
                sizing.equity += trade.pnl;
            }
            self.trades.push(trade);
            self.stats.ledger_evicted += trim_front(&mut self.trades, self.ledger_capacity);
        }
    }

    /// Consume the worker into its report and ledger.
    pub fn finish(self, source: Option<DataSource>) -> (TimeframeReport, Vec<TradeRecord>) {
        let report = TimeframeReport {
            timeframe: self.engine.timeframe(),
            source,
            stats: self.stats,
            final_state: self.engine.state(),
            halted: self.engine.is_halted(),
        };
        (report, self.trades)
    }
}
