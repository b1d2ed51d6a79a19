//! Domain types: bars, sides, timeframes, positions.

pub mod bar;
pub mod position;
pub mod side;
pub mod timeframe;

pub use bar::Bar;
pub use position::{Position, PositionState};
pub use side::{OrderSide, Side};
pub use timeframe::{ParseTimeframeError, Timeframe};
