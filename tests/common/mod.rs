#![allow(dead_code)]

use chrono::{Duration, NaiveDate};

use ashback::domain::market::{MarketData, MarketSnapshot, StockHistory};
pub use ashback::domain::ohlcv::OhlcvBar;
use ashback::domain::signal::Selector;
use std::fs;
use std::path::Path;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn bar(
    code: &str,
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
) -> OhlcvBar {
    OhlcvBar {
        code: code.to_string(),
        date,
        open,
        high,
        low,
        close,
        volume,
    }
}

/// A bar whose open, high, low and close are all the same price.
pub fn flat_bar(code: &str, date: NaiveDate, price: f64) -> OhlcvBar {
    bar(code, date, price, price, price, price, 1_000_000)
}

/// Consecutive calendar-day bars walking from `start_price` by `step`
/// per day. Steps stay well inside the daily price limit bands.
pub fn ramp_bars(
    code: &str,
    start: NaiveDate,
    days: usize,
    start_price: f64,
    step: f64,
) -> Vec<OhlcvBar> {
    (0..days)
        .map(|i| {
            let price = start_price + step * i as f64;
            flat_bar(code, start + Duration::days(i as i64), price)
        })
        .collect()
}

pub fn history(code: &str, bars: Vec<OhlcvBar>) -> StockHistory {
    StockHistory::new(code.to_string(), bars)
}

pub fn market_of(histories: Vec<StockHistory>) -> MarketData {
    let mut data = MarketData::new();
    for h in histories {
        data.insert(h.code.clone(), h);
    }
    data
}

/// Writes `{code}.csv` in the layout CsvAdapter reads.
pub fn write_stock_csv(dir: &Path, code: &str, bars: &[OhlcvBar]) {
    let mut content = String::from("date,open,high,low,close,volume\n");
    for b in bars {
        content.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.date, b.open, b.high, b.low, b.close, b.volume
        ));
    }
    fs::write(dir.join(format!("{code}.csv")), content).unwrap();
}

/// Signals every code with a bar on every day. Useful for exercising
/// sizing, settlement and exit mechanics without selector noise.
pub struct AlwaysBuy {
    pub alias: String,
}

impl AlwaysBuy {
    pub fn new(alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
        }
    }

    pub fn boxed(alias: &str) -> Box<dyn Selector> {
        Box::new(Self::new(alias))
    }
}

impl Selector for AlwaysBuy {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn select(&self, market: &MarketSnapshot<'_>) -> Vec<String> {
        let mut codes: Vec<String> = market
            .codes()
            .filter(|c| market.bar(c).is_some())
            .cloned()
            .collect();
        codes.sort();
        codes
    }
}
