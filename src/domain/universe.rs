//! Data-quality screening of the tradable universe.
//!
//! Stocks with too little history cannot feed indicator warm-up, and bars
//! with inconsistent prices poison every calculation downstream, so both
//! are screened out before the simulation starts.

use super::market::MarketData;

pub const DEFAULT_MIN_BARS: usize = 140;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniverseReport {
    pub accepted: Vec<String>,
    /// Excluded codes with the reason, in code order.
    pub excluded: Vec<(String, String)>,
}

impl UniverseReport {
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}

pub fn screen_universe(data: &MarketData, min_bars: usize) -> UniverseReport {
    let mut accepted = Vec::new();
    let mut excluded = Vec::new();

    let mut codes: Vec<&String> = data.keys().collect();
    codes.sort();

    for code in codes {
        let history = &data[code.as_str()];
        let invalid = history.bars.iter().filter(|b| !b.is_valid()).count();
        if invalid > 0 {
            excluded.push((code.clone(), format!("{invalid} invalid bars")));
            continue;
        }
        if history.bars.len() < min_bars {
            excluded.push((
                code.clone(),
                format!("{} bars, minimum {min_bars}", history.bars.len()),
            ));
            continue;
        }
        accepted.push(code.clone());
    }

    UniverseReport { accepted, excluded }
}

/// Drop every stock the screen rejects, returning log lines for the
/// audit trail.
pub fn filter_universe(mut data: MarketData, min_bars: usize) -> (MarketData, Vec<String>) {
    let report = screen_universe(&data, min_bars);
    let mut log = Vec::new();
    for (code, reason) in &report.excluded {
        data.remove(code);
        log.push(format!("EXCLUDE {code}: {reason}"));
    }
    (data, log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::StockHistory;
    use crate::domain::ohlcv::OhlcvBar;
    use chrono::NaiveDate;

    fn bars(code: &str, count: usize) -> StockHistory {
        let bars = (0..count)
            .map(|i| OhlcvBar {
                code: code.to_string(),
                date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                open: 10.0,
                high: 10.5,
                low: 9.5,
                close: 10.0,
                volume: 1_000_000,
            })
            .collect();
        StockHistory::new(code.to_string(), bars)
    }

    #[test]
    fn short_history_is_excluded() {
        let mut data = MarketData::new();
        data.insert("000001".into(), bars("000001", 150));
        data.insert("000002".into(), bars("000002", 50));

        let report = screen_universe(&data, 140);
        assert_eq!(report.accepted, vec!["000001"]);
        assert_eq!(report.excluded.len(), 1);
        assert_eq!(report.excluded[0].0, "000002");
    }

    #[test]
    fn inconsistent_bar_is_excluded() {
        let mut history = bars("000001", 150);
        history.bars[10].high = 5.0;
        let mut data = MarketData::new();
        data.insert("000001".into(), history);

        let report = screen_universe(&data, 140);
        assert!(report.is_empty());
        assert!(report.excluded[0].1.contains("invalid"));
    }

    #[test]
    fn filter_removes_and_logs() {
        let mut data = MarketData::new();
        data.insert("000001".into(), bars("000001", 150));
        data.insert("000002".into(), bars("000002", 10));

        let (filtered, log) = filter_universe(data, 140);
        assert!(filtered.contains_key("000001"));
        assert!(!filtered.contains_key("000002"));
        assert_eq!(log.len(), 1);
        assert!(log[0].starts_with("EXCLUDE 000002"));
    }
}
