//! Order intents emitted by the position state machine.
//!
//! An intent is a request, not a fill. The engine hands it to an
//! [`ExecutionClient`](crate::execution::ExecutionClient) and only commits the
//! position transition once the client acknowledges it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{OrderSide, Timeframe};

/// Why an intent was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntentReason {
    Entry { condition_id: u8 },
    StopLoss,
    TakeProfit1,
    TakeProfit2,
    /// Opposite EMA cross closing target stage 1 or 2 before its price level.
    Reversal { stage: u8 },
}

impl IntentReason {
    pub fn is_entry(&self) -> bool {
        matches!(self, IntentReason::Entry { .. })
    }
}

impl fmt::Display for IntentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentReason::Entry { condition_id } => write!(f, "entry(condition {condition_id})"),
            IntentReason::StopLoss => f.write_str("stop_loss"),
            IntentReason::TakeProfit1 => f.write_str("take_profit_1"),
            IntentReason::TakeProfit2 => f.write_str("take_profit_2"),
            IntentReason::Reversal { stage } => write!(f, "reversal(stage {stage})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub side: OrderSide,
    pub size: f64,
    /// Level price for stop/target exits, bar close for entries and reversals.
    pub price_basis: f64,
    pub reason: IntentReason,
    /// Bar that produced the intent.
    pub timestamp: DateTime<Utc>,
}
