//! OHLCV bar representation.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub code: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl OhlcvBar {
    /// A zero-volume day models a trading suspension.
    pub fn is_suspended(&self) -> bool {
        self.volume == 0
    }

    /// OHLC consistency and non-negativity. Bad rows are unusable for
    /// execution and get the order deferred instead of filled.
    pub fn is_valid(&self) -> bool {
        if self.open < 0.0 || self.high < 0.0 || self.low < 0.0 || self.close < 0.0 {
            return false;
        }
        if self.volume < 0 {
            return false;
        }
        if !(self.low <= self.open && self.open <= self.high) {
            return false;
        }
        if !(self.low <= self.close && self.close <= self.high) {
            return false;
        }
        true
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}
