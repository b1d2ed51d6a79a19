use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Side, Timeframe};

/// Lifecycle state of a position instance.
///
/// `Flat → Entered → PartiallyClosed → Closed`, plus `Entered → Closed` on a
/// full stop-loss hit. `Closed` is terminal for the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionState {
    Flat,
    Entered,
    PartiallyClosed,
    Closed,
}

impl PositionState {
    pub fn is_open(&self) -> bool {
        matches!(self, PositionState::Entered | PositionState::PartiallyClosed)
    }
}

/// An open or closed position for one (symbol, timeframe) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub side: Side,
    pub entry_price: f64,
    pub entry_timestamp: DateTime<Utc>,
    pub initial_size: f64,
    pub remaining_size: f64,
    pub stop_loss: f64,
    pub take_profit_1: f64,
    /// Present on every open position. A `PartiallyClosed` position without a
    /// second target is an invariant violation.
    pub take_profit_2: Option<f64>,
    /// Size the first target closes.
    pub tp1_size: f64,
    pub state: PositionState,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Unrealized P&L of the remaining size at `price`.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.side.sign() * self.remaining_size * (price - self.entry_price)
    }
}
