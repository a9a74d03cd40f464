//! Fill simulation under A-share market rules.
//!
//! Orders fill at the next trading day's open, subject to the 10% price
//! limit, suspension deferral, 100-share lot sizing, commission with a
//! minimum, stamp tax on sells, and adverse slippage. Fill prices are
//! recorded as the raw open; slippage is booked as an explicit cash cost
//! so total costs reconcile exactly against gross and net P&L.

use super::ohlcv::OhlcvBar;
use super::order::{FillCosts, Order, OrderSide};

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub commission_rate: f64,
    pub min_commission: f64,
    /// Charged on sells only.
    pub stamp_tax_rate: f64,
    /// Adverse on both sides.
    pub slippage_rate: f64,
    pub lot_size: i64,
    /// Suspension days an order may wait before cancellation.
    pub max_defer_attempts: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission_rate: 0.0003,
            min_commission: 5.0,
            stamp_tax_rate: 0.001,
            slippage_rate: 0.001,
            lot_size: 100,
            max_defer_attempts: 5,
        }
    }
}

/// What happened when an order met the day's bar.
#[derive(Debug, Clone, PartialEq)]
pub enum FillOutcome {
    Filled { price: f64, costs: FillCosts },
    /// Stock suspended; order stays pending for another day.
    Deferred,
    Rejected { reason: String },
}

pub struct ExecutionModel {
    pub config: ExecutionConfig,
}

impl ExecutionModel {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    pub fn round_to_lot(&self, shares: i64) -> i64 {
        (shares / self.config.lot_size) * self.config.lot_size
    }

    fn commission(&self, value: f64) -> f64 {
        (value * self.config.commission_rate).max(self.config.min_commission)
    }

    /// Cash leaving the account for a buy of `shares` at raw price `price`.
    pub fn buy_cost(&self, shares: i64, price: f64) -> (f64, FillCosts) {
        let value = shares as f64 * price;
        let slippage = value * self.config.slippage_rate;
        let commission = self.commission(value + slippage);
        let costs = FillCosts {
            commission,
            stamp_tax: 0.0,
            slippage,
        };
        (value + costs.total(), costs)
    }

    /// Cash entering the account for a sell of `shares` at raw price `price`.
    pub fn sell_proceeds(&self, shares: i64, price: f64) -> (f64, FillCosts) {
        let value = shares as f64 * price;
        let slippage = value * self.config.slippage_rate;
        let slipped_value = value - slippage;
        let commission = self.commission(slipped_value);
        let stamp_tax = slipped_value * self.config.stamp_tax_rate;
        let costs = FillCosts {
            commission,
            stamp_tax,
            slippage,
        };
        (value - costs.total(), costs)
    }

    /// Largest lot-aligned share count whose full buy cost fits in
    /// `available_cash`. Iterates down a lot at a time because the minimum
    /// commission makes cost non-linear near zero.
    pub fn max_affordable_shares(&self, available_cash: f64, price: f64) -> i64 {
        if price <= 0.0 {
            return 0;
        }
        let effective = price * (1.0 + self.config.slippage_rate);
        let approx = available_cash / (effective * (1.0 + self.config.commission_rate));
        let mut shares = self.round_to_lot(approx as i64);

        while shares > 0 {
            let (total, _) = self.buy_cost(shares, price);
            if total <= available_cash {
                return shares;
            }
            shares -= self.config.lot_size;
        }
        0
    }

    /// The 10% daily limit with a small tolerance for exchange rounding.
    pub fn is_limit_up(&self, open: f64, prev_close: f64) -> bool {
        open >= prev_close * 1.099
    }

    pub fn is_limit_down(&self, open: f64, prev_close: f64) -> bool {
        open <= prev_close * 0.901
    }

    /// Attempt to fill `order` against the day's bar.
    ///
    /// `available_cash` for buys already includes the order's own reserved
    /// amount; affordability is re-checked at the actual open because
    /// deferred orders keep their original sizing.
    pub fn try_fill(
        &self,
        order: &Order,
        bar: &OhlcvBar,
        prev_close: f64,
        available_cash: f64,
    ) -> FillOutcome {
        if bar.is_suspended() {
            if order.defer_attempts + 1 >= self.config.max_defer_attempts {
                return FillOutcome::Rejected {
                    reason: format!(
                        "suspended for {} consecutive days",
                        self.config.max_defer_attempts
                    ),
                };
            }
            return FillOutcome::Deferred;
        }

        let open = bar.open;
        match order.side {
            OrderSide::Buy => {
                if self.is_limit_up(open, prev_close) {
                    return FillOutcome::Rejected {
                        reason: format!("open {open:.2} at upper price limit"),
                    };
                }
                let (total, costs) = self.buy_cost(order.quantity, open);
                if total > available_cash {
                    return FillOutcome::Rejected {
                        reason: format!(
                            "cost {total:.2} exceeds available cash {available_cash:.2}"
                        ),
                    };
                }
                FillOutcome::Filled { price: open, costs }
            }
            OrderSide::Sell => {
                if self.is_limit_down(open, prev_close) {
                    return FillOutcome::Rejected {
                        reason: format!("open {open:.2} at lower price limit"),
                    };
                }
                let (_, costs) = self.sell_proceeds(order.quantity, open);
                FillOutcome::Filled { price: open, costs }
            }
        }
    }
}
