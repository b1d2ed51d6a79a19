//! Warm-up gate shared by every indicator in a pipeline.

use crate::error::CoreError;

/// Counts accepted bars against the longest indicator window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupGate {
    required: usize,
    seen: usize,
}

impl WarmupGate {
    /// Gate sized for the longest of `windows`. An empty set is warm at once.
    pub fn for_windows(windows: impl IntoIterator<Item = usize>) -> Self {
        Self {
            required: windows.into_iter().max().unwrap_or(0),
            seen: 0,
        }
    }

    pub fn record_bar(&mut self) {
        self.seen += 1;
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn seen(&self) -> usize {
        self.seen
    }

    /// `InsufficientHistory` until `required` bars have been recorded.
    pub fn check(&self) -> Result<(), CoreError> {
        if self.seen >= self.required {
            Ok(())
        } else {
            Err(CoreError::InsufficientHistory {
                seen: self.seen,
                required: self.required,
            })
        }
    }
}
