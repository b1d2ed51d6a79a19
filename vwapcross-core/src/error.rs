//! Error taxonomy for the signal/risk core.
//!
//! Every failure is reported to the caller as a value. Only
//! `InsufficientHistory` and `DuplicateBar` are expected in steady state; an
//! `InvariantViolation` halts the affected (symbol, timeframe) engine.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::execution::ExecutionError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("insufficient history: {seen} of {required} warm-up bars seen")]
    InsufficientHistory { seen: usize, required: usize },

    #[error("bar at {got} rejected: not after last accepted bar at {last}")]
    InvalidBarOrder {
        last: DateTime<Utc>,
        got: DateTime<Utc>,
    },

    #[error("duplicate bar at {timestamp}")]
    DuplicateBar { timestamp: DateTime<Utc> },

    #[error("malformed bar at {timestamp}: {reason}")]
    InvalidBar {
        timestamp: DateTime<Utc>,
        reason: String,
    },

    #[error("degenerate volatility at signal time (atr = {atr})")]
    RiskComputation { atr: f64 },

    #[error("entry discarded: order size {size} is not a positive quantity")]
    InvalidOrderSize { size: f64 },

    #[error("order submission failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("core invariant violated: {0}")]
    InvariantViolation(String),

    #[error("engine halted after an invariant violation")]
    Halted,
}

impl CoreError {
    /// True for conditions the caller should skip silently.
    pub fn is_steady_state(&self) -> bool {
        matches!(
            self,
            CoreError::InsufficientHistory { .. } | CoreError::DuplicateBar { .. }
        )
    }

    /// True when processing for the stream must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::InvariantViolation(_) | CoreError::Halted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_state_classification() {
        assert!(CoreError::InsufficientHistory { seen: 1, required: 34 }.is_steady_state());
        assert!(CoreError::DuplicateBar { timestamp: Utc::now() }.is_steady_state());
        assert!(!CoreError::RiskComputation { atr: 0.0 }.is_steady_state());
    }

    #[test]
    fn fatal_classification() {
        assert!(CoreError::InvariantViolation("x".into()).is_fatal());
        assert!(CoreError::Halted.is_fatal());
        assert!(!CoreError::RiskComputation { atr: 0.0 }.is_fatal());
    }
}
