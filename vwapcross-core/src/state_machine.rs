//! Position lifecycle for one (symbol, timeframe) pair.
//!
//! `Flat → Entered → PartiallyClosed → Closed`, plus `Entered → Closed` on a
//! stop. Transitions are two-phase: `propose_*` builds a [`Transition`]
//! carrying the order intent, and [`PositionMachine::commit`] applies it only
//! after the execution client acknowledged the order. A rejected order leaves
//! the position exactly as it was.
//!
//! Exit checks use the bar's high/low. Per bar, the stop is checked before any
//! target, and at most one transition happens.
//!
//! Stop and target exits are priced at the level itself, including when the
//! bar gaps through it: the level is the order's price basis, and any gap
//! slippage is the execution client's to report in its fill price. Reversal
//! exits are priced at the bar close.

use serde::{Deserialize, Serialize};

use crate::conditions::{EventContext, Signal};
use crate::domain::{Position, PositionState, Side, Timeframe};
use crate::error::CoreError;
use crate::indicators::IndicatorSnapshot;
use crate::order::{IntentReason, OrderIntent};
use crate::risk::{RiskLevels, RiskManager};

/// Residual size treated as fully closed.
const SIZE_EPSILON: f64 = 1e-12;

/// A proposed state change. Applied with [`PositionMachine::commit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: PositionState,
    pub to: PositionState,
    pub intent: OrderIntent,
    /// The position as it will be once committed.
    pub position: Position,
}

#[derive(Debug, Clone)]
pub struct PositionMachine {
    symbol: String,
    timeframe: Timeframe,
    position: Option<Position>,
    last_closed: Option<Position>,
    halted: bool,
}

impl PositionMachine {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            position: None,
            last_closed: None,
            halted: false,
        }
    }

    /// `Flat` between position instances.
    pub fn state(&self) -> PositionState {
        self.position
            .as_ref()
            .map_or(PositionState::Flat, |p| p.state)
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn last_closed(&self) -> Option<&Position> {
        self.last_closed.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    fn halt(&mut self, reason: String) -> CoreError {
        tracing::error!(
            symbol = %self.symbol,
            timeframe = %self.timeframe,
            %reason,
            "position machine halted"
        );
        self.halted = true;
        CoreError::InvariantViolation(reason)
    }

    fn ensure_running(&self) -> Result<(), CoreError> {
        if self.halted {
            Err(CoreError::Halted)
        } else {
            Ok(())
        }
    }

    /// Open a position from a signal. Only valid while flat.
    pub fn propose_entry(
        &mut self,
        signal: &Signal,
        levels: &RiskLevels,
    ) -> Result<Transition, CoreError> {
        self.ensure_running()?;
        if self.position.is_some() {
            return Err(self.halt(format!(
                "entry proposed while position is {:?}",
                self.state()
            )));
        }

        let size = levels.tp1_size + levels.tp2_size;
        let position = Position {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            side: signal.side,
            entry_price: levels.entry_price,
            entry_timestamp: signal.timestamp,
            initial_size: size,
            remaining_size: size,
            stop_loss: levels.stop_loss,
            take_profit_1: levels.tp1,
            take_profit_2: Some(levels.tp2),
            tp1_size: levels.tp1_size,
            state: PositionState::Entered,
        };

        Ok(Transition {
            from: PositionState::Flat,
            to: PositionState::Entered,
            intent: OrderIntent {
                symbol: self.symbol.clone(),
                timeframe: self.timeframe,
                side: signal.side.entry_order(),
                size,
                price_basis: levels.entry_price,
                reason: IntentReason::Entry {
                    condition_id: signal.condition_id,
                },
                timestamp: signal.timestamp,
            },
            position,
        })
    }

    /// Evaluate stop, target and reversal rules for the open position, if any.
    pub fn propose_exit(
        &mut self,
        bar: &IndicatorSnapshot,
        ctx: &EventContext,
        risk: &RiskManager,
    ) -> Result<Option<Transition>, CoreError> {
        self.ensure_running()?;
        let Some(position) = self.position.clone() else {
            return Ok(None);
        };

        let side = position.side;
        if stop_hit(side, bar, position.stop_loss) {
            let (size, basis) = (position.remaining_size, position.stop_loss);
            return Ok(Some(self.exit(position, bar, size, basis, IntentReason::StopLoss)));
        }

        let reversal = risk.reversal_exit(side, ctx);
        match position.state {
            PositionState::Entered => {
                let size = position.tp1_size.min(position.remaining_size);
                if target_hit(side, bar, position.take_profit_1) {
                    let basis = position.take_profit_1;
                    Ok(Some(self.exit(position, bar, size, basis, IntentReason::TakeProfit1)))
                } else if reversal {
                    Ok(Some(self.exit(
                        position,
                        bar,
                        size,
                        bar.close,
                        IntentReason::Reversal { stage: 1 },
                    )))
                } else {
                    Ok(None)
                }
            }
            PositionState::PartiallyClosed => {
                let Some(tp2) = position.take_profit_2 else {
                    return Err(self.halt("partially closed position has no second target".into()));
                };
                let size = position.remaining_size;
                if target_hit(side, bar, tp2) {
                    Ok(Some(self.exit(position, bar, size, tp2, IntentReason::TakeProfit2)))
                } else if reversal {
                    Ok(Some(self.exit(
                        position,
                        bar,
                        size,
                        bar.close,
                        IntentReason::Reversal { stage: 2 },
                    )))
                } else {
                    Ok(None)
                }
            }
            state => Err(self.halt(format!("held position in state {state:?}"))),
        }
    }

    fn exit(
        &self,
        position: Position,
        bar: &IndicatorSnapshot,
        size: f64,
        price_basis: f64,
        reason: IntentReason,
    ) -> Transition {
        let from = position.state;
        let remaining = position.remaining_size - size;
        let to = if remaining <= SIZE_EPSILON {
            PositionState::Closed
        } else {
            PositionState::PartiallyClosed
        };

        let intent = OrderIntent {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            side: position.side.exit_order(),
            size,
            price_basis,
            reason,
            timestamp: bar.timestamp,
        };
        let position = Position {
            remaining_size: if to == PositionState::Closed { 0.0 } else { remaining },
            state: to,
            ..position
        };
        Transition {
            from,
            to,
            intent,
            position,
        }
    }

    /// Apply an acknowledged transition.
    pub fn commit(&mut self, transition: Transition) -> Result<(), CoreError> {
        self.ensure_running()?;
        let current = self.state();
        if transition.from != current {
            return Err(self.halt(format!(
                "transition {:?} -> {:?} committed while {:?}",
                transition.from, transition.to, current
            )));
        }

        let position = transition.position;
        if position.state == PositionState::PartiallyClosed && position.take_profit_2.is_none() {
            return Err(self.halt("partially closed position has no second target".into()));
        }

        if position.state == PositionState::Closed {
            self.position = None;
            self.last_closed = Some(position);
        } else {
            self.position = Some(position);
        }
        Ok(())
    }
}

fn stop_hit(side: Side, bar: &IndicatorSnapshot, stop: f64) -> bool {
    match side {
        Side::Long => bar.low <= stop,
        Side::Short => bar.high >= stop,
    }
}

fn target_hit(side: Side, bar: &IndicatorSnapshot, target: f64) -> bool {
    match side {
        Side::Long => bar.high >= target,
        Side::Short => bar.low <= target,
    }
}
