//! Cash and position ledger.
//!
//! All cash mutation happens here. Sizing works against available cash,
//! which is cash minus the amount reserved by pending buy orders, divided
//! across remaining position slots. That discipline keeps cash from going
//! negative when several signals arrive the same day; a negative balance
//! past float tolerance aborts the run as an accounting violation.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;

use super::error::AshbackError;
use super::execution::{ExecutionModel, FillOutcome};
use super::indicators::atr;
use super::market::MarketSnapshot;
use super::ohlcv::OhlcvBar;
use super::order::{Order, OrderSide};
use super::position::{Position, Trade};

const CASH_TOLERANCE: f64 = 1e-6;

/// How new entries are sized.
#[derive(Debug, Clone, PartialEq)]
pub enum SizingMode {
    /// Split available cash evenly across the slots still open.
    EqualWeight,
    /// Risk a fixed fraction of initial capital per position against a
    /// stop of `atr_multiplier * ATR(atr_period)`. Falls back to equal
    /// weight when the history is too short for an ATR.
    RiskBased {
        risk_pct: f64,
        atr_period: usize,
        atr_multiplier: f64,
    },
}

impl Default for SizingMode {
    fn default() -> Self {
        SizingMode::EqualWeight
    }
}

/// Why a buy signal was declined without an order being queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSkip {
    PositionOpen,
    OrderPending,
    NoFreeSlots,
    ZeroSize,
}

impl fmt::Display for SignalSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SignalSkip::PositionOpen => "position already open",
            SignalSkip::OrderPending => "order already pending",
            SignalSkip::NoFreeSlots => "no free position slots",
            SignalSkip::ZeroSize => "sized to zero shares",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
    pub cash: f64,
    pub position_value: f64,
}

pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub max_positions: usize,
    pub sizing: SizingMode,
    pub positions: HashMap<String, Position>,
    pub pending_orders: Vec<Order>,
    /// Filled, rejected and cancelled orders, kept for the audit trail.
    pub order_history: Vec<Order>,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_capital: f64, max_positions: usize) -> Self {
        Self {
            cash: initial_capital,
            initial_capital,
            max_positions,
            sizing: SizingMode::EqualWeight,
            positions: HashMap::new(),
            pending_orders: Vec::new(),
            order_history: Vec::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn with_sizing(mut self, sizing: SizingMode) -> Self {
        self.sizing = sizing;
        self
    }

    pub fn pending_buy_count(&self) -> usize {
        self.pending_orders
            .iter()
            .filter(|o| o.side == OrderSide::Buy && o.is_pending())
            .count()
    }

    /// Cash held back for pending buy orders.
    pub fn reserved_cash(&self) -> f64 {
        self.pending_orders
            .iter()
            .filter(|o| o.side == OrderSide::Buy && o.is_pending())
            .map(|o| o.estimated_cost)
            .sum()
    }

    pub fn available_cash(&self) -> f64 {
        self.cash - self.reserved_cash()
    }

    /// Position limit covers open positions plus buys in flight.
    pub fn can_open(&self, code: &str) -> bool {
        if self.positions.contains_key(code) {
            return false;
        }
        if self
            .pending_orders
            .iter()
            .any(|o| o.is_pending() && o.code == code)
        {
            return false;
        }
        self.positions.len() + self.pending_buy_count() < self.max_positions
    }

    /// Share count for a new entry under the configured sizing mode.
    /// Both modes respect the reservation discipline: the cap is always
    /// what available cash can actually pay for.
    pub fn size_new_order(
        &self,
        price: f64,
        history: &[OhlcvBar],
        execution: &ExecutionModel,
    ) -> i64 {
        match self.sizing {
            SizingMode::EqualWeight => self.size_equal_weight(price, execution),
            SizingMode::RiskBased {
                risk_pct,
                atr_period,
                atr_multiplier,
            } => {
                let Some(atr) = atr(history, atr_period).filter(|a| *a > 0.0) else {
                    return self.size_equal_weight(price, execution);
                };
                let risk_budget = self.initial_capital * risk_pct;
                let stop_distance = atr * atr_multiplier;
                let shares_for_risk =
                    execution.round_to_lot((risk_budget / stop_distance) as i64);
                let cash_cap = execution.max_affordable_shares(self.available_cash(), price);
                let shares = shares_for_risk.min(cash_cap);
                if shares > 0 {
                    let (cost, _) = execution.buy_cost(shares, price);
                    if cost > self.available_cash() {
                        return 0;
                    }
                }
                shares
            }
        }
    }

    /// Split available cash across the slots still open, then fit a
    /// lot-aligned share count into that slice.
    fn size_equal_weight(&self, price: f64, execution: &ExecutionModel) -> i64 {
        let used = self.positions.len() + self.pending_buy_count();
        let remaining_slots = self.max_positions.saturating_sub(used).max(1);
        let target = self.available_cash() / remaining_slots as f64;
        if target <= 0.0 {
            return 0;
        }
        let shares = execution.max_affordable_shares(target, price);
        if shares > 0 {
            let (cost, _) = execution.buy_cost(shares, price);
            if cost > self.available_cash() {
                return 0;
            }
        }
        shares
    }

    /// Queue a buy for next-open execution. Returns the queued share
    /// count, or the reason the signal was declined.
    pub fn submit_buy(
        &mut self,
        code: &str,
        signal_date: NaiveDate,
        signal_price: f64,
        selector: &str,
        history: &[OhlcvBar],
        execution: &ExecutionModel,
    ) -> Result<i64, SignalSkip> {
        if self.positions.contains_key(code) {
            return Err(SignalSkip::PositionOpen);
        }
        if self
            .pending_orders
            .iter()
            .any(|o| o.is_pending() && o.code == code)
        {
            return Err(SignalSkip::OrderPending);
        }
        if self.positions.len() + self.pending_buy_count() >= self.max_positions {
            return Err(SignalSkip::NoFreeSlots);
        }
        let shares = self.size_new_order(signal_price, history, execution);
        if shares == 0 {
            return Err(SignalSkip::ZeroSize);
        }
        let (estimated_cost, _) = execution.buy_cost(shares, signal_price);
        let order = Order::buy(
            code.to_string(),
            shares,
            signal_date,
            selector.to_string(),
            estimated_cost,
        );
        self.pending_orders.push(order);
        Ok(shares)
    }

    /// Queue a full-position sell. T+1 holding and duplicate exits are
    /// screened here.
    pub fn submit_sell(
        &mut self,
        code: &str,
        signal_date: NaiveDate,
        reason: &str,
    ) -> Option<&Order> {
        let position = self.positions.get_mut(code)?;
        if position.pending_exit || !position.is_sellable(signal_date) {
            return None;
        }
        position.pending_exit = true;
        let order = Order::sell(
            code.to_string(),
            position.quantity,
            signal_date,
            reason.to_string(),
        );
        self.pending_orders.push(order);
        self.pending_orders.last()
    }

    /// Run every fillable pending order against the day's bars. Returns
    /// human-readable lines for the day log.
    pub fn settle_pending_orders(
        &mut self,
        date: NaiveDate,
        market: &MarketSnapshot<'_>,
        execution: &ExecutionModel,
    ) -> Result<Vec<String>, AshbackError> {
        let mut log = Vec::new();
        let mut orders = std::mem::take(&mut self.pending_orders);

        // Reservations held by orders still pending in this batch. Kept by
        // hand because the pending list is detached while settling.
        let mut reserved: f64 = orders
            .iter()
            .filter(|o| o.side == OrderSide::Buy)
            .map(|o| o.estimated_cost)
            .sum();

        for order in orders.iter_mut() {
            if !order.is_fillable(date) {
                continue;
            }

            let bar = market.bar(&order.code);
            let prev_close = market.prev_close(&order.code);
            let (Some(bar), Some(prev_close)) = (bar, prev_close) else {
                // No bar for the day reads as a halt.
                if order.defer_attempts + 1 >= execution.config.max_defer_attempts {
                    reserved -= order.estimated_cost;
                    if order.side == OrderSide::Sell {
                        if let Some(pos) = self.positions.get_mut(&order.code) {
                            pos.pending_exit = false;
                        }
                    }
                    order.reject("no market data after repeated deferrals");
                    log.push(format!("REJECT {} {}: no market data", side_str(order), order.code));
                } else {
                    order.defer_attempts += 1;
                }
                continue;
            };

            // A deferred buy keeps its original sizing, so affordability
            // is judged with its own reservation added back.
            let available = self.cash - reserved + order.estimated_cost;

            match execution.try_fill(order, bar, prev_close, available) {
                FillOutcome::Deferred => {
                    order.defer_attempts += 1;
                    log.push(format!(
                        "DEFER {} {}: suspended (attempt {})",
                        side_str(order),
                        order.code,
                        order.defer_attempts
                    ));
                }
                FillOutcome::Rejected { reason } => {
                    reserved -= order.estimated_cost;
                    if order.side == OrderSide::Sell {
                        if let Some(pos) = self.positions.get_mut(&order.code) {
                            pos.pending_exit = false;
                        }
                    }
                    log.push(format!("REJECT {} {}: {reason}", side_str(order), order.code));
                    order.reject(reason);
                }
                FillOutcome::Filled { price, costs } => {
                    reserved -= order.estimated_cost;
                    order.fill(price, date, costs);
                    match order.side {
                        OrderSide::Buy => self.apply_buy_fill(order, date, &mut log)?,
                        OrderSide::Sell => self.apply_sell_fill(order, date, &mut log)?,
                    }
                }
            }
        }

        for order in orders {
            if order.is_pending() {
                self.pending_orders.push(order);
            } else {
                self.order_history.push(order);
            }
        }
        Ok(log)
    }

    fn apply_buy_fill(
        &mut self,
        order: &Order,
        date: NaiveDate,
        log: &mut Vec<String>,
    ) -> Result<(), AshbackError> {
        let total = order.quantity as f64 * order.fill_price + order.costs.total();
        self.cash -= total;
        self.check_cash(&order.code)?;

        let position = Position::new(
            order.code.clone(),
            order.quantity,
            order.fill_price,
            date,
            total,
            order.trigger.clone(),
        );
        self.positions.insert(order.code.clone(), position);
        log.push(format!(
            "BUY {} {} @ {:.2} cost {:.2} [{}]",
            order.code, order.quantity, order.fill_price, total, order.trigger
        ));
        Ok(())
    }

    fn apply_sell_fill(
        &mut self,
        order: &Order,
        date: NaiveDate,
        log: &mut Vec<String>,
    ) -> Result<(), AshbackError> {
        let Some(position) = self.positions.remove(&order.code) else {
            return Err(AshbackError::AccountingViolation {
                reason: format!("sell fill for {} without an open position", order.code),
            });
        };

        let proceeds = order.quantity as f64 * order.fill_price - order.costs.total();
        self.cash += proceeds;
        self.check_cash(&order.code)?;

        let entry_costs = position.entry_cost - position.quantity as f64 * position.entry_price;
        let gross_pnl =
            order.quantity as f64 * (order.fill_price - position.entry_price);
        let net_pnl = proceeds - position.entry_cost;
        let trade = Trade {
            code: order.code.clone(),
            quantity: order.quantity,
            entry_price: position.entry_price,
            exit_price: order.fill_price,
            entry_date: position.entry_date,
            exit_date: date,
            selector: position.selector,
            exit_reason: order.trigger.clone(),
            gross_pnl,
            net_pnl,
            total_costs: entry_costs + order.costs.total(),
        };
        log.push(format!(
            "SELL {} {} @ {:.2} net {:+.2} [{}]",
            order.code, order.quantity, order.fill_price, trade.net_pnl, trade.exit_reason
        ));
        self.trades.push(trade);
        Ok(())
    }

    fn check_cash(&mut self, code: &str) -> Result<(), AshbackError> {
        if self.cash < -CASH_TOLERANCE {
            return Err(AshbackError::AccountingViolation {
                reason: format!("cash went negative ({:.8}) settling {code}", self.cash),
            });
        }
        if self.cash < 0.0 {
            self.cash = 0.0;
        }
        Ok(())
    }

    /// Update trailing high-water marks from the day's closes. Runs before
    /// exit evaluation so rules see today's extremes.
    pub fn update_marks(&mut self, market: &MarketSnapshot<'_>) {
        for position in self.positions.values_mut() {
            if let Some(bar) = market.bar(&position.code) {
                position.observe_close(bar.close);
            }
        }
    }

    /// Record the end-of-day equity snapshot. Suspended stocks carry
    /// their last known close.
    pub fn record_equity(&mut self, date: NaiveDate, market: &MarketSnapshot<'_>) {
        let position_value: f64 = self
            .positions
            .values()
            .map(|p| {
                let mark = market.last_close(&p.code).unwrap_or(p.entry_price);
                p.market_value(mark)
            })
            .sum();
        self.equity_curve.push(EquityPoint {
            date,
            equity: self.cash + position_value,
            cash: self.cash,
            position_value,
        });
    }

    pub fn equity(&self, market: &MarketSnapshot<'_>) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .map(|p| {
                let mark = market.last_close(&p.code).unwrap_or(p.entry_price);
                p.market_value(mark)
            })
            .sum();
        self.cash + position_value
    }

    /// Close every open position at the day's close, bypassing price
    /// limits and T+1, for the end of the run.
    pub fn liquidate_all(
        &mut self,
        date: NaiveDate,
        market: &MarketSnapshot<'_>,
        execution: &ExecutionModel,
    ) -> Result<Vec<String>, AshbackError> {
        let mut codes: Vec<String> = self.positions.keys().cloned().collect();
        codes.sort();

        let mut log = Vec::new();
        for code in codes {
            let position = &self.positions[&code];
            let price = market.last_close(&code).unwrap_or(position.entry_price);
            let quantity = position.quantity;

            let (_, costs) = execution.sell_proceeds(quantity, price);
            let mut order = Order::sell(code.clone(), quantity, date, "end of backtest".into());
            order.fill(price, date, costs);
            self.apply_sell_fill(&order, date, &mut log)?;
            self.order_history.push(order);
        }
        Ok(log)
    }

    /// Drop orders still pending when the run ends.
    pub fn cancel_pending(&mut self, reason: &str) -> Vec<String> {
        let mut log = Vec::new();
        for mut order in std::mem::take(&mut self.pending_orders) {
            if order.side == OrderSide::Sell {
                if let Some(pos) = self.positions.get_mut(&order.code) {
                    pos.pending_exit = false;
                }
            }
            log.push(format!("CANCEL {} {}: {reason}", side_str(&order), order.code));
            order.cancel(reason);
            self.order_history.push(order);
        }
        log
    }
}

fn side_str(order: &Order) -> &'static str {
    match order.side {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    }
}
