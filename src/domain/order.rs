//! Order lifecycle for next-open execution with T+1 settlement.

use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderStatus {
    Pending,
    Filled,
    Rejected { reason: String },
    Cancelled { reason: String },
}

/// Transaction costs attached to a fill, all in cash terms.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FillCosts {
    pub commission: f64,
    pub stamp_tax: f64,
    pub slippage: f64,
}

impl FillCosts {
    pub fn total(&self) -> f64 {
        self.commission + self.stamp_tax + self.slippage
    }
}

#[derive(Debug, Clone)]
pub struct Order {
    pub code: String,
    pub side: OrderSide,
    pub quantity: i64,
    pub signal_date: NaiveDate,
    /// Selector alias for buys, exit rule name for sells.
    pub trigger: String,
    /// Cash held back while a buy is pending; zero for sells.
    pub estimated_cost: f64,
    /// Consecutive suspension days the order has waited through.
    pub defer_attempts: u32,
    pub status: OrderStatus,
    pub fill_price: f64,
    pub fill_date: Option<NaiveDate>,
    pub costs: FillCosts,
}

impl Order {
    pub fn buy(
        code: String,
        quantity: i64,
        signal_date: NaiveDate,
        selector: String,
        estimated_cost: f64,
    ) -> Self {
        Self {
            code,
            side: OrderSide::Buy,
            quantity,
            signal_date,
            trigger: selector,
            estimated_cost,
            defer_attempts: 0,
            status: OrderStatus::Pending,
            fill_price: 0.0,
            fill_date: None,
            costs: FillCosts::default(),
        }
    }

    pub fn sell(code: String, quantity: i64, signal_date: NaiveDate, exit_rule: String) -> Self {
        Self {
            code,
            side: OrderSide::Sell,
            quantity,
            signal_date,
            trigger: exit_rule,
            estimated_cost: 0.0,
            defer_attempts: 0,
            status: OrderStatus::Pending,
            fill_price: 0.0,
            fill_date: None,
            costs: FillCosts::default(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, OrderStatus::Pending)
    }

    /// Fills become possible only on trading days strictly after the
    /// signal date.
    pub fn is_fillable(&self, current_date: NaiveDate) -> bool {
        self.is_pending() && current_date > self.signal_date
    }

    pub fn fill(&mut self, price: f64, date: NaiveDate, costs: FillCosts) {
        self.status = OrderStatus::Filled;
        self.fill_price = price;
        self.fill_date = Some(date);
        self.costs = costs;
    }

    pub fn reject(&mut self, reason: impl Into<String>) {
        self.status = OrderStatus::Rejected {
            reason: reason.into(),
        };
    }

    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.status = OrderStatus::Cancelled {
            reason: reason.into(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn buy_order_starts_pending() {
        let order = Order::buy("000001".into(), 1000, day(4), "momentum".into(), 10_050.0);
        assert!(order.is_pending());
        assert_eq!(order.side, OrderSide::Buy);
        assert!((order.estimated_cost - 10_050.0).abs() < f64::EPSILON);
    }

    #[test]
    fn not_fillable_on_signal_date() {
        let order = Order::buy("000001".into(), 1000, day(4), "momentum".into(), 0.0);
        assert!(!order.is_fillable(day(4)));
        assert!(order.is_fillable(day(5)));
    }

    #[test]
    fn fillable_skips_non_trading_gap() {
        // Signal on a Friday; the next trading day may be days later.
        let order = Order::buy("000001".into(), 1000, day(1), "momentum".into(), 0.0);
        assert!(order.is_fillable(day(4)));
    }

    #[test]
    fn fill_records_price_date_costs() {
        let mut order = Order::sell("000001".into(), 1000, day(4), "trailing_stop".into());
        let costs = FillCosts {
            commission: 5.0,
            stamp_tax: 10.5,
            slippage: 10.5,
        };
        order.fill(10.5, day(5), costs);
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.fill_date, Some(day(5)));
        assert!((order.costs.total() - 26.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reject_carries_reason() {
        let mut order = Order::buy("000001".into(), 1000, day(4), "momentum".into(), 0.0);
        order.reject("price limit up");
        assert!(matches!(order.status, OrderStatus::Rejected { ref reason } if reason == "price limit up"));
        assert!(!order.is_pending());
    }
}
