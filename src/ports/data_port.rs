//! Market data access port trait.

use crate::domain::error::AshbackError;
use crate::domain::market::MarketData;
use crate::domain::market::StockHistory;
use chrono::NaiveDate;

pub trait DataPort {
    /// Load histories for the requested codes, extended backwards by
    /// `lookback_days` calendar days of warm-up before `start_date`.
    fn load_market_data(
        &self,
        codes: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
        lookback_days: i64,
    ) -> Result<MarketData, AshbackError>;

    fn load_history(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<StockHistory, AshbackError>;

    fn list_codes(&self) -> Result<Vec<String>, AshbackError>;
}
