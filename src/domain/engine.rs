//! The daily simulation loop.
//!
//! Dates are processed strictly in order and each day is fully resolved
//! before the next begins: fills at the open, position marks, exit checks
//! at the close, new buy signals, then the equity snapshot. Cancellation
//! is honored only between days so observers never see a half-settled
//! ledger.

use chrono::NaiveDate;

use super::aggregator::SignalAggregator;
use super::error::AshbackError;
use super::execution::ExecutionModel;
use super::exit::CompositeExitStrategy;
use super::market::{build_trading_dates, MarketData, MarketSnapshot, StockHistory};
use super::performance::PerformanceReport;
use super::portfolio::{Portfolio, SizingMode};
use super::signal::{signal_score, Selector};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub initial_capital: f64,
    pub max_positions: usize,
    pub risk_free_rate: f64,
    pub sizing: SizingMode,
}

pub struct BacktestEngine {
    data: MarketData,
    config: EngineConfig,
    execution: ExecutionModel,
    selectors: Vec<Box<dyn Selector>>,
    aggregator: SignalAggregator,
    exit_strategy: CompositeExitStrategy,
    benchmark: Option<StockHistory>,
    pub portfolio: Portfolio,
    /// One human-readable line per notable event, for the audit trail.
    pub day_log: Vec<String>,
}

impl BacktestEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        data: MarketData,
        config: EngineConfig,
        execution: ExecutionModel,
        selectors: Vec<Box<dyn Selector>>,
        aggregator: SignalAggregator,
        exit_strategy: CompositeExitStrategy,
        benchmark: Option<StockHistory>,
    ) -> Self {
        let portfolio = Portfolio::new(config.initial_capital, config.max_positions)
            .with_sizing(config.sizing.clone());
        Self {
            data,
            config,
            execution,
            selectors,
            aggregator,
            exit_strategy,
            benchmark,
            portfolio,
            day_log: Vec::new(),
        }
    }

    pub fn run(&mut self) -> Result<PerformanceReport, AshbackError> {
        self.run_with_cancel(|| false)
    }

    /// Run the simulation, checking `cancelled` at each date boundary.
    /// A cancelled run keeps every fully processed day committed and
    /// skips forced liquidation.
    pub fn run_with_cancel(
        &mut self,
        cancelled: impl Fn() -> bool,
    ) -> Result<PerformanceReport, AshbackError> {
        let dates = build_trading_dates(&self.data, self.config.start, self.config.end);
        if dates.is_empty() {
            return Err(AshbackError::Data {
                reason: format!(
                    "no trading dates between {} and {}",
                    self.config.start, self.config.end
                ),
            });
        }

        let last = *dates.last().ok_or(AshbackError::Data {
            reason: "empty trading calendar".to_string(),
        })?;

        for &date in &dates {
            if cancelled() {
                let lines = self.portfolio.cancel_pending("run cancelled");
                append_log(&mut self.day_log, date, lines);
                break;
            }
            self.process_day(date, date == last)?;
        }

        Ok(self.report())
    }

    fn process_day(&mut self, date: NaiveDate, is_last: bool) -> Result<(), AshbackError> {
        let snapshot = MarketSnapshot::new(date, &self.data);

        // 1. Fills at the open for orders signalled on earlier days.
        let lines = self
            .portfolio
            .settle_pending_orders(date, &snapshot, &self.execution)?;
        append_log(&mut self.day_log, date, lines);

        // 2. Trailing marks from today's closes.
        self.portfolio.update_marks(&snapshot);

        if is_last {
            // Final day: no new signals; flatten the book at the close.
            let lines = self.portfolio.cancel_pending("end of backtest");
            append_log(&mut self.day_log, date, lines);
            let lines = self
                .portfolio
                .liquidate_all(date, &snapshot, &self.execution)?;
            append_log(&mut self.day_log, date, lines);
        } else {
            // 3. Exit checks at the close, in code order for determinism.
            let mut exits: Vec<(String, String)> = Vec::new();
            let mut codes: Vec<&String> = self.portfolio.positions.keys().collect();
            codes.sort();
            for code in codes {
                let position = &self.portfolio.positions[code.as_str()];
                if position.pending_exit {
                    continue;
                }
                let Some(history) = snapshot.history(code) else {
                    continue;
                };
                if let Some(reason) = self.exit_strategy.evaluate(position, date, history) {
                    exits.push((code.clone(), reason));
                }
            }
            for (code, reason) in exits {
                if self.portfolio.submit_sell(&code, date, &reason).is_some() {
                    self.day_log
                        .push(format!("{date} SIGNAL SELL {code}: {reason}"));
                }
            }

            // 4. Buy signals, combined, prioritized by score, sized
            // against remaining slots. Per-selector counts go to the log
            // so a thin day is auditable.
            let raw: Vec<(String, Vec<String>)> = self
                .selectors
                .iter()
                .map(|s| (s.alias().to_string(), s.select(&snapshot)))
                .collect();
            for (alias, picks) in &raw {
                self.day_log
                    .push(format!("{date} {alias}: {} signals", picks.len()));
            }

            let candidates = self.aggregator.combine(date, &raw);
            let mut scored: Vec<(f64, _)> = candidates
                .into_iter()
                .map(|c| {
                    let score = signal_score(snapshot.history(&c.code).unwrap_or(&[]));
                    (score, c)
                })
                .collect();
            // Strongest signals claim capital first; ties break by code.
            scored.sort_by(|a, b| {
                b.0.partial_cmp(&a.0)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.1.code.cmp(&b.1.code))
            });

            for (_, candidate) in scored {
                let Some(price) = snapshot.last_close(&candidate.code) else {
                    continue;
                };
                let history = snapshot.history(&candidate.code).unwrap_or(&[]);
                match self.portfolio.submit_buy(
                    &candidate.code,
                    date,
                    price,
                    &candidate.selector,
                    history,
                    &self.execution,
                ) {
                    Ok(shares) => self.day_log.push(format!(
                        "{date} SIGNAL BUY {} x{shares} @ {price:.2} [{}]",
                        candidate.code, candidate.selector
                    )),
                    Err(skip) => self
                        .day_log
                        .push(format!("{date} SKIP {}: {skip}", candidate.code)),
                }
            }
        }

        // 5. End-of-day equity snapshot.
        self.portfolio.record_equity(date, &snapshot);
        Ok(())
    }

    fn report(&mut self) -> PerformanceReport {
        let report = PerformanceReport::compute(&self.portfolio, self.config.risk_free_rate);
        match &self.benchmark {
            Some(history) => {
                let closes: Vec<f64> = self
                    .portfolio
                    .equity_curve
                    .iter()
                    .filter_map(|point| history.close_at_or_before(point.date))
                    .collect();
                if closes.len() == self.portfolio.equity_curve.len() {
                    report.with_benchmark(&self.portfolio, &closes)
                } else {
                    self.day_log.push(format!(
                        "{} WARN benchmark {} missing {} of {} equity dates; benchmark stats omitted",
                        self.config.end,
                        history.code,
                        self.portfolio.equity_curve.len() - closes.len(),
                        self.portfolio.equity_curve.len()
                    ));
                    report
                }
            }
            None => report,
        }
    }
}

fn append_log(day_log: &mut Vec<String>, date: NaiveDate, lines: Vec<String>) {
    for line in lines {
        day_log.push(format!("{date} {line}"));
    }
}
