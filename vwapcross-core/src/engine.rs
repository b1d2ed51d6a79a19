//! Per-(symbol, timeframe) engine.
//!
//! One call per bar, in this order:
//!
//! 1. **Pipeline**: reject out-of-order, duplicate or malformed bars, then
//!    update every indicator. Nothing below runs before warm-up completes.
//! 2. **Detectors**: crossover and divergence events for this snapshot.
//! 3. **Exits**: if a position was open at the start of the bar, evaluate stop,
//!    targets and reversal.
//! 4. **Entries**: only if flat at the start of the bar; a position closed on
//!    this bar is not re-entered until the next one.
//!
//! The engine never calls out. [`TimeframeEngine::on_bar`] returns the
//! proposed transition; [`TimeframeEngine::process_bar`] additionally submits
//! it to an [`ExecutionClient`] and commits on acknowledgement. Backtest and
//! live runs both go through `process_bar`.

use serde::{Deserialize, Serialize};

use crate::conditions::{ConditionEvaluator, EventContext, PendingDivergences, Signal};
use crate::config::{ConfigError, StrategyConfig};
use crate::detectors::{CrossoverDetector, CrossoverEvent, DivergenceDetector, DivergenceEvent};
use crate::domain::{Bar, Position, PositionState, Timeframe};
use crate::error::CoreError;
use crate::execution::{ExecutionClient, OrderAck};
use crate::indicators::{IndicatorPipeline, IndicatorSnapshot};
use crate::risk::RiskManager;
use crate::state_machine::{PositionMachine, Transition};

/// Everything derived from one accepted, warm bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarStep {
    pub snapshot: IndicatorSnapshot,
    pub crossovers: Vec<CrossoverEvent>,
    pub divergences: Vec<DivergenceEvent>,
    pub signal: Option<Signal>,
    /// Not yet applied. Commit only after the order is acknowledged.
    pub transition: Option<Transition>,
}

/// A bar step whose transition (if any) was executed and committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedBar {
    pub step: BarStep,
    pub ack: Option<OrderAck>,
}

#[derive(Debug, Clone)]
pub struct TimeframeEngine {
    symbol: String,
    timeframe: Timeframe,
    order_size: f64,
    pipeline: IndicatorPipeline,
    crossovers: CrossoverDetector,
    divergences: DivergenceDetector,
    pending: PendingDivergences,
    evaluator: ConditionEvaluator,
    risk: RiskManager,
    machine: PositionMachine,
    warm_bars: u64,
}

impl TimeframeEngine {
    /// Build an engine from a validated config.
    ///
    /// # Panics
    ///
    /// If `config` would fail [`StrategyConfig::validate`], for example a
    /// zero indicator period. Use [`TimeframeEngine::try_new`] for configs
    /// that have not been validated.
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, config: &StrategyConfig) -> Self {
        let symbol = symbol.into();
        Self {
            machine: PositionMachine::new(symbol.clone(), timeframe),
            symbol,
            timeframe,
            order_size: config.order_size,
            pipeline: IndicatorPipeline::new(&config.indicators),
            crossovers: CrossoverDetector::new(),
            divergences: DivergenceDetector::new(&config.divergence),
            pending: PendingDivergences::new(config.divergence.validity_bars),
            evaluator: ConditionEvaluator::new(),
            risk: RiskManager::new(&config.risk),
            warm_bars: 0,
        }
    }

    /// Validate `config`, then build the engine.
    pub fn try_new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        config: &StrategyConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(symbol, timeframe, config))
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Base-asset quantity the next entry opens.
    pub fn order_size(&self) -> f64 {
        self.order_size
    }

    /// Quantity for entries from the next evaluated bar on. An open position
    /// keeps the size it was opened with.
    pub fn set_order_size(&mut self, size: f64) {
        self.order_size = size;
    }

    pub fn warmup_bars(&self) -> usize {
        self.pipeline.warmup_bars()
    }

    pub fn position(&self) -> Option<&Position> {
        self.machine.position()
    }

    pub fn state(&self) -> PositionState {
        self.machine.state()
    }

    pub fn is_halted(&self) -> bool {
        self.machine.is_halted()
    }

    /// Derive this bar's snapshot, events, signal and proposed transition.
    pub fn on_bar(&mut self, bar: &Bar) -> Result<BarStep, CoreError> {
        if self.machine.is_halted() {
            return Err(CoreError::Halted);
        }

        let snapshot = self.pipeline.update(bar)?;
        let bar_index = self.warm_bars;
        self.warm_bars += 1;

        let crossovers = self.crossovers.on_snapshot(&snapshot);
        let divergences = self.divergences.on_snapshot(&snapshot);
        for event in &divergences {
            self.pending.record(event, bar_index);
        }
        let ctx = EventContext::new(&crossovers, &self.pending, bar_index);

        let (signal, transition) = if self.machine.is_open() {
            let exit = self.machine.propose_exit(&snapshot, &ctx, &self.risk)?;
            (None, exit)
        } else {
            match self.evaluator.evaluate(&snapshot, &ctx, false) {
                Some(signal) => {
                    if !(self.order_size.is_finite() && self.order_size > 0.0) {
                        return Err(CoreError::InvalidOrderSize {
                            size: self.order_size,
                        });
                    }
                    let levels = self.risk.on_entry(&signal, self.order_size)?;
                    let entry = self.machine.propose_entry(&signal, &levels)?;
                    (Some(signal), Some(entry))
                }
                None => (None, None),
            }
        };

        Ok(BarStep {
            snapshot,
            crossovers,
            divergences,
            signal,
            transition,
        })
    }

    /// Apply an acknowledged transition.
    pub fn commit(&mut self, transition: Transition) -> Result<(), CoreError> {
        self.machine.commit(transition)
    }

    /// `on_bar`, then submit and commit the proposed transition.
    ///
    /// On an execution failure the position keeps its prior state and the error
    /// is returned; indicator and detector state still advanced with the bar.
    pub fn process_bar<E>(&mut self, bar: &Bar, execution: &mut E) -> Result<ProcessedBar, CoreError>
    where
        E: ExecutionClient + ?Sized,
    {
        let step = self.on_bar(bar)?;
        let Some(transition) = step.transition.clone() else {
            return Ok(ProcessedBar { step, ack: None });
        };

        let ack = execution.submit_order(&transition.intent)?;
        self.machine.commit(transition)?;
        Ok(ProcessedBar {
            step,
            ack: Some(ack),
        })
    }
}
