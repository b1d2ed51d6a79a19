//! ATR-based exit levels and the trend-reversal early exit.

use serde::{Deserialize, Serialize};

use crate::conditions::{EventContext, Signal};
use crate::config::RiskConfig;
use crate::domain::Side;
use crate::error::CoreError;

/// Exit plan fixed at entry time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskLevels {
    pub entry_price: f64,
    pub stop_loss: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub tp1_size: f64,
    pub tp2_size: f64,
}

#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Levels for an entry at the signal bar's close, sized `size`.
    ///
    /// A non-positive or non-finite ATR discards the signal instead of producing a
    /// zero-width stop.
    pub fn on_entry(&self, signal: &Signal, size: f64) -> Result<RiskLevels, CoreError> {
        let atr = signal.snapshot.atr;
        if !(atr.is_finite() && atr > 0.0) {
            return Err(CoreError::RiskComputation { atr });
        }

        let entry = signal.snapshot.close;
        let dir = signal.side.sign();
        let tp1_size = size * self.config.tp1_fraction;

        Ok(RiskLevels {
            entry_price: entry,
            stop_loss: entry - dir * self.config.stop_loss_atr_mult * atr,
            tp1: entry + dir * self.config.tp1_atr_mult * atr,
            tp2: entry + dir * self.config.tp2_atr_mult * atr,
            tp1_size,
            tp2_size: size - tp1_size,
        })
    }

    /// An EMA cross against the position closes the current target stage early.
    pub fn reversal_exit(&self, side: Side, ctx: &EventContext) -> bool {
        ctx.ema_cross(side.opposite())
    }
}
