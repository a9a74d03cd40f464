//! CSV file data adapter.
//!
//! One `{code}.csv` file per stock under a base directory, with a
//! `date,open,high,low,close,volume` header row.

use crate::domain::error::AshbackError;
use crate::domain::market::{MarketData, StockHistory};
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::{Duration, NaiveDate};
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, code: &str) -> PathBuf {
        self.base_path.join(format!("{code}.csv"))
    }

    fn parse_field<T: std::str::FromStr>(
        record: &csv::StringRecord,
        index: usize,
        name: &str,
    ) -> Result<T, AshbackError>
    where
        T::Err: std::fmt::Display,
    {
        let raw = record.get(index).ok_or_else(|| AshbackError::Data {
            reason: format!("missing {name} column"),
        })?;
        raw.parse().map_err(|e| AshbackError::Data {
            reason: format!("invalid {name} value {raw:?}: {e}"),
        })
    }
}

impl DataPort for CsvAdapter {
    fn load_market_data(
        &self,
        codes: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
        lookback_days: i64,
    ) -> Result<MarketData, AshbackError> {
        let load_start = start_date - Duration::days(lookback_days);
        let mut data = MarketData::new();
        for code in codes {
            let history = self.load_history(code, load_start, end_date)?;
            if history.bars().is_empty() {
                return Err(AshbackError::NoData { code: code.clone() });
            }
            data.insert(code.clone(), history);
        }
        Ok(data)
    }

    fn load_history(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<StockHistory, AshbackError> {
        let path = self.csv_path(code);
        let content = fs::read_to_string(&path).map_err(|e| AshbackError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| AshbackError::Data {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;

            let date_str = record.get(0).ok_or_else(|| AshbackError::Data {
                reason: "missing date column".into(),
            })?;
            let date =
                NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| AshbackError::Data {
                    reason: format!("invalid date {date_str:?}: {e}"),
                })?;

            if date < start_date || date > end_date {
                continue;
            }

            bars.push(OhlcvBar {
                code: code.to_string(),
                date,
                open: Self::parse_field(&record, 1, "open")?,
                high: Self::parse_field(&record, 2, "high")?,
                low: Self::parse_field(&record, 3, "low")?,
                close: Self::parse_field(&record, 4, "close")?,
                volume: Self::parse_field(&record, 5, "volume")?,
            });
        }

        Ok(StockHistory::new(code.to_string(), bars))
    }

    fn list_codes(&self) -> Result<Vec<String>, AshbackError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| AshbackError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut codes = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| AshbackError::Data {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(code) = name_str.strip_suffix(".csv") {
                codes.push(code.to_string());
            }
        }

        codes.sort();
        Ok(codes)
    }
}
