//! Open position tracking and completed trade records.

use chrono::NaiveDate;

#[derive(Debug, Clone)]
pub struct Position {
    pub code: String,
    pub quantity: i64,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    /// Total cash cost of entry including commission and slippage.
    pub entry_cost: f64,
    /// Alias of the selector that produced the entry signal.
    pub selector: String,
    /// Highest close observed since entry, for trailing exits.
    pub high_water_close: f64,
    /// Highest unrealized gain fraction observed since entry.
    pub max_unrealized_pnl_pct: f64,
    /// Set once a sell order is pending so exits are not re-issued.
    pub pending_exit: bool,
}

impl Position {
    pub fn new(
        code: String,
        quantity: i64,
        entry_price: f64,
        entry_date: NaiveDate,
        entry_cost: f64,
        selector: String,
    ) -> Self {
        Self {
            code,
            quantity,
            entry_price,
            entry_date,
            entry_cost,
            selector,
            high_water_close: entry_price,
            max_unrealized_pnl_pct: 0.0,
            pending_exit: false,
        }
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity as f64 * (price - self.entry_price)
    }

    pub fn unrealized_pnl_pct(&self, price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price
    }

    /// Update the running high-water marks from the day's close.
    pub fn observe_close(&mut self, close: f64) {
        if close > self.high_water_close {
            self.high_water_close = close;
        }
        let pnl_pct = self.unrealized_pnl_pct(close);
        if pnl_pct > self.max_unrealized_pnl_pct {
            self.max_unrealized_pnl_pct = pnl_pct;
        }
    }

    pub fn holding_days(&self, current_date: NaiveDate) -> i64 {
        (current_date - self.entry_date).num_days()
    }

    /// T+1: shares bought today cannot be sold until the next trading day.
    pub fn is_sellable(&self, current_date: NaiveDate) -> bool {
        current_date > self.entry_date
    }
}

/// A round-trip trade. Gross P&L uses raw fill prices; net subtracts
/// every cash cost, so gross minus net equals the sum of commissions,
/// stamp tax, and slippage on both legs.
#[derive(Debug, Clone)]
pub struct Trade {
    pub code: String,
    pub quantity: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub selector: String,
    pub exit_reason: String,
    pub gross_pnl: f64,
    pub net_pnl: f64,
    pub total_costs: f64,
}

impl Trade {
    pub fn return_pct(&self) -> f64 {
        let basis = self.quantity as f64 * self.entry_price;
        if basis == 0.0 {
            return 0.0;
        }
        self.net_pnl / basis
    }

    pub fn holding_days(&self) -> i64 {
        (self.exit_date - self.entry_date).num_days()
    }

    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }
}
