//! Per-stock history storage and date-truncated market views.
//!
//! `MarketSnapshot` is the only surface selectors and exit rules see, and it
//! never exposes a bar dated after the simulation date.

use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

/// Date-sorted bars for one stock.
#[derive(Debug, Clone)]
pub struct StockHistory {
    pub code: String,
    /// Date-sorted; `new` enforces the ordering.
    pub bars: Vec<OhlcvBar>,
}

impl StockHistory {
    pub fn new(code: String, mut bars: Vec<OhlcvBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        Self { code, bars }
    }

    pub fn bars(&self) -> &[OhlcvBar] {
        &self.bars
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    /// Prefix of bars dated `<= date`.
    pub fn history_to(&self, date: NaiveDate) -> &[OhlcvBar] {
        let end = self.bars.partition_point(|b| b.date <= date);
        &self.bars[..end]
    }

    /// Bar exactly on `date`, if the stock traded a session that day.
    pub fn bar_on(&self, date: NaiveDate) -> Option<&OhlcvBar> {
        let idx = self.bars.binary_search_by_key(&date, |b| b.date).ok()?;
        Some(&self.bars[idx])
    }

    /// Close of the last session strictly before `date`.
    pub fn close_before(&self, date: NaiveDate) -> Option<f64> {
        let end = self.bars.partition_point(|b| b.date < date);
        if end == 0 {
            return None;
        }
        Some(self.bars[end - 1].close)
    }

    /// Close of the last session on or before `date`. Used to mark
    /// suspended positions at their last traded price.
    pub fn close_at_or_before(&self, date: NaiveDate) -> Option<f64> {
        let hist = self.history_to(date);
        hist.last().map(|b| b.close)
    }
}

/// All loaded histories, keyed by stock code.
pub type MarketData = HashMap<String, StockHistory>;

/// Read-only view of the market truncated at a simulation date.
#[derive(Clone, Copy)]
pub struct MarketSnapshot<'a> {
    date: NaiveDate,
    data: &'a MarketData,
}

impl<'a> MarketSnapshot<'a> {
    pub fn new(date: NaiveDate, data: &'a MarketData) -> Self {
        Self { date, data }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn codes(&self) -> impl Iterator<Item = &'a String> {
        self.data.keys()
    }

    pub fn history(&self, code: &str) -> Option<&'a [OhlcvBar]> {
        let hist = self.data.get(code)?.history_to(self.date);
        if hist.is_empty() { None } else { Some(hist) }
    }

    pub fn bar(&self, code: &str) -> Option<&'a OhlcvBar> {
        self.data.get(code)?.bar_on(self.date)
    }

    pub fn prev_close(&self, code: &str) -> Option<f64> {
        self.data.get(code)?.close_before(self.date)
    }

    pub fn last_close(&self, code: &str) -> Option<f64> {
        self.data.get(code)?.close_at_or_before(self.date)
    }
}

/// Union of all session dates within the simulated range, sorted.
pub fn build_trading_dates(data: &MarketData, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let dates: BTreeSet<NaiveDate> = data
        .values()
        .flat_map(|h| h.bars().iter().map(|b| b.date))
        .filter(|d| *d >= start && *d <= end)
        .collect();
    dates.into_iter().collect()
}
