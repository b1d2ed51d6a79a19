//! Strategy configuration.
//!
//! Loaded by the caller (TOML, CLI flags, environment) and handed to each
//! component by reference at construction. Components never read global
//! state; each timeframe worker owns its own mutable state and shares this
//! read-only configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Timeframe;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Whether order intents are simulated or dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    #[default]
    Backtest,
    Testnet,
    Live,
}

impl TradingMode {
    pub fn is_simulated(&self) -> bool {
        !matches!(self, TradingMode::Live)
    }
}

/// Top-level strategy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub symbol: String,
    pub timeframes: Vec<Timeframe>,
    /// Base-asset quantity opened per entry.
    pub order_size: f64,
    pub mode: TradingMode,
    pub indicators: IndicatorConfig,
    pub risk: RiskConfig,
    pub divergence: DivergenceConfig,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            timeframes: vec![Timeframe::M5, Timeframe::M15],
            order_size: 0.001,
            mode: TradingMode::Backtest,
            indicators: IndicatorConfig::default(),
            risk: RiskConfig::default(),
            divergence: DivergenceConfig::default(),
        }
    }
}

impl StrategyConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: StrategyConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(invalid("symbol", "must not be empty"));
        }
        if self.timeframes.is_empty() {
            return Err(invalid("timeframes", "at least one timeframe required"));
        }
        if !(self.order_size > 0.0) {
            return Err(invalid("order_size", format!("must be > 0, got {}", self.order_size)));
        }
        self.indicators.validate()?;
        self.risk.validate()?;
        self.divergence.validate()
    }
}

/// VWAP session boundary policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VwapSession {
    /// Reset at every UTC day boundary.
    #[default]
    Daily,
    /// Sliding window of the last `bars` bars.
    Rolling { bars: usize },
    /// Never reset.
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub vwap_session: VwapSession,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_fast: 9,
            ema_slow: 21,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            rsi_period: 14,
            atr_period: 14,
            vwap_session: VwapSession::Daily,
        }
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("indicators.ema_fast", self.ema_fast),
            ("indicators.ema_slow", self.ema_slow),
            ("indicators.macd_fast", self.macd_fast),
            ("indicators.macd_slow", self.macd_slow),
            ("indicators.macd_signal", self.macd_signal),
            ("indicators.rsi_period", self.rsi_period),
            ("indicators.atr_period", self.atr_period),
        ];
        for (field, period) in periods {
            if period == 0 {
                return Err(invalid(field, "period must be >= 1"));
            }
        }
        if self.ema_fast >= self.ema_slow {
            return Err(invalid(
                "indicators.ema_slow",
                format!("must exceed ema_fast ({} >= {})", self.ema_fast, self.ema_slow),
            ));
        }
        if self.macd_fast >= self.macd_slow {
            return Err(invalid(
                "indicators.macd_slow",
                format!("must exceed macd_fast ({} >= {})", self.macd_fast, self.macd_slow),
            ));
        }
        if let VwapSession::Rolling { bars: 0 } = self.vwap_session {
            return Err(invalid("indicators.vwap_session", "rolling window must be >= 1 bar"));
        }
        Ok(())
    }
}

/// ATR multiples and take-profit sizing.
///
/// The two take-profit multiples are independent and default to the same
/// value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub stop_loss_atr_mult: f64,
    pub tp1_atr_mult: f64,
    pub tp2_atr_mult: f64,
    /// Fraction of the initial size closed at the first target. The second
    /// target closes whatever remains.
    pub tp1_fraction: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_atr_mult: 1.5,
            tp1_atr_mult: 3.5,
            tp2_atr_mult: 3.5,
            tp1_fraction: 0.5,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mults = [
            ("risk.stop_loss_atr_mult", self.stop_loss_atr_mult),
            ("risk.tp1_atr_mult", self.tp1_atr_mult),
            ("risk.tp2_atr_mult", self.tp2_atr_mult),
        ];
        for (field, m) in mults {
            if !(m > 0.0) || !m.is_finite() {
                return Err(invalid(field, format!("must be a positive number, got {m}")));
            }
        }
        if !(self.tp1_fraction > 0.0 && self.tp1_fraction <= 1.0) {
            return Err(invalid(
                "risk.tp1_fraction",
                format!("must be in (0, 1], got {}", self.tp1_fraction),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DivergenceConfig {
    /// Bars on each side a point must beat to count as a local extremum.
    pub extremum_radius: usize,
    /// Maximum bar distance between the two extrema compared.
    pub max_distance: usize,
    /// Bars a divergence stays pending for the entry conditions.
    pub validity_bars: usize,
    /// Confirmed extrema retained per direction.
    pub ring_capacity: usize,
}

impl Default for DivergenceConfig {
    fn default() -> Self {
        Self {
            extremum_radius: 5,
            max_distance: 30,
            validity_bars: 5,
            ring_capacity: 16,
        }
    }
}

impl DivergenceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extremum_radius == 0 {
            return Err(invalid("divergence.extremum_radius", "must be >= 1"));
        }
        if self.max_distance <= self.extremum_radius {
            return Err(invalid(
                "divergence.max_distance",
                "must exceed extremum_radius",
            ));
        }
        if self.validity_bars == 0 {
            return Err(invalid("divergence.validity_bars", "must be >= 1"));
        }
        if self.ring_capacity < 2 {
            return Err(invalid("divergence.ring_capacity", "must hold at least 2 extrema"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        StrategyConfig::default().validate().unwrap();
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let toml = r#"
symbol = "ETHUSDT"
timeframes = ["1h"]

[risk]
tp1_atr_mult = 2.0

[indicators]
vwap_session = { type = "rolling", bars = 14 }
"#;
        let config = StrategyConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.symbol, "ETHUSDT");
        assert_eq!(config.timeframes, vec![Timeframe::H1]);
        assert_eq!(config.risk.tp1_atr_mult, 2.0);
        assert_eq!(config.risk.tp2_atr_mult, 3.5);
        assert_eq!(config.indicators.vwap_session, VwapSession::Rolling { bars: 14 });
        assert_eq!(config.indicators.ema_fast, 9);
    }

    #[test]
    fn rejects_fast_not_below_slow() {
        let mut config = StrategyConfig::default();
        config.indicators.ema_fast = 21;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ema_slow"));
    }

    #[test]
    fn rejects_bad_fraction() {
        let mut config = StrategyConfig::default();
        config.risk.tp1_fraction = 1.5;
        assert!(config.validate().is_err());
        config.risk.tp1_fraction = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_validity_window() {
        let mut config = StrategyConfig::default();
        config.divergence.validity_bars = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("divergence.validity_bars"));
    }

    #[test]
    fn rejects_empty_timeframes() {
        let mut config = StrategyConfig::default();
        config.timeframes.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_timeframe() {
        let err = StrategyConfig::from_toml_str(r#"timeframes = ["7m"]"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn live_mode_is_not_simulated() {
        assert!(TradingMode::Backtest.is_simulated());
        assert!(TradingMode::Testnet.is_simulated());
        assert!(!TradingMode::Live.is_simulated());
    }
}
