//! Performance statistics over a finished run.

use std::collections::BTreeMap;

use super::portfolio::{EquityPoint, Portfolio};
use super::position::Trade;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const CALENDAR_DAYS_PER_YEAR: f64 = 365.25;

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceReport {
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: i64,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_holding_days: f64,
    pub max_win_streak: usize,
    pub max_loss_streak: usize,
    pub total_costs: f64,
    /// Trades per exit reason, keyed by the firing rule's name.
    pub exit_reason_counts: BTreeMap<String, usize>,
    /// Trades per originating selector.
    pub selector_counts: BTreeMap<String, usize>,
    pub benchmark: Option<BenchmarkStats>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkStats {
    pub benchmark_return: f64,
    pub excess_return: f64,
    pub beta: f64,
    /// Jensen's alpha, annualized.
    pub alpha: f64,
    pub tracking_error: f64,
    pub information_ratio: f64,
}

impl PerformanceReport {
    pub fn compute(portfolio: &Portfolio, risk_free_rate: f64) -> Self {
        let equity_curve = &portfolio.equity_curve;
        let trades = &portfolio.trades;
        let initial_capital = portfolio.initial_capital;

        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        // Annualization runs on calendar time, not bar count, so sparse
        // trading calendars do not inflate the figure.
        let calendar_days = match (equity_curve.first(), equity_curve.last()) {
            (Some(first), Some(last)) => (last.date - first.date).num_days(),
            _ => 0,
        };
        let years = calendar_days as f64 / CALENDAR_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);
        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(equity_curve, daily_rf);
        let calmar_ratio = if max_drawdown > 0.0 {
            annualized_return / max_drawdown
        } else {
            0.0
        };

        let stats = TradeStats::collect(trades);

        PerformanceReport {
            initial_capital,
            final_equity,
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            max_drawdown,
            max_drawdown_duration,
            total_trades: stats.total,
            trades_won: stats.won,
            trades_lost: stats.lost,
            trades_breakeven: stats.breakeven,
            win_rate: stats.win_rate(),
            profit_factor: stats.profit_factor(),
            avg_win: stats.avg_win(),
            avg_loss: stats.avg_loss(),
            largest_win: stats.largest_win,
            largest_loss: stats.largest_loss,
            avg_holding_days: stats.avg_holding_days(),
            max_win_streak: stats.max_win_streak,
            max_loss_streak: stats.max_loss_streak,
            total_costs: stats.total_costs,
            exit_reason_counts: stats.exit_reason_counts,
            selector_counts: stats.selector_counts,
            benchmark: None,
        }
    }

    /// Attach benchmark-relative statistics. `benchmark_closes` must be
    /// aligned one-to-one with the equity curve's dates.
    pub fn with_benchmark(mut self, portfolio: &Portfolio, benchmark_closes: &[f64]) -> Self {
        self.benchmark = compute_benchmark(
            &portfolio.equity_curve,
            benchmark_closes,
            self.total_return,
        );
        self
    }
}

struct TradeStats {
    total: usize,
    won: usize,
    lost: usize,
    breakeven: usize,
    total_wins: f64,
    total_losses: f64,
    largest_win: f64,
    largest_loss: f64,
    total_holding_days: i64,
    max_win_streak: usize,
    max_loss_streak: usize,
    total_costs: f64,
    exit_reason_counts: BTreeMap<String, usize>,
    selector_counts: BTreeMap<String, usize>,
}

impl TradeStats {
    fn collect(trades: &[Trade]) -> Self {
        let mut stats = TradeStats {
            total: trades.len(),
            won: 0,
            lost: 0,
            breakeven: 0,
            total_wins: 0.0,
            total_losses: 0.0,
            largest_win: 0.0,
            largest_loss: 0.0,
            total_holding_days: 0,
            max_win_streak: 0,
            max_loss_streak: 0,
            total_costs: 0.0,
            exit_reason_counts: BTreeMap::new(),
            selector_counts: BTreeMap::new(),
        };

        let mut win_streak = 0usize;
        let mut loss_streak = 0usize;

        for trade in trades {
            let pnl = trade.net_pnl;
            if pnl > 0.0 {
                stats.won += 1;
                stats.total_wins += pnl;
                stats.largest_win = stats.largest_win.max(pnl);
                win_streak += 1;
                loss_streak = 0;
            } else if pnl < 0.0 {
                stats.lost += 1;
                stats.total_losses += pnl.abs();
                stats.largest_loss = stats.largest_loss.max(pnl.abs());
                loss_streak += 1;
                win_streak = 0;
            } else {
                stats.breakeven += 1;
                win_streak = 0;
                loss_streak = 0;
            }
            stats.max_win_streak = stats.max_win_streak.max(win_streak);
            stats.max_loss_streak = stats.max_loss_streak.max(loss_streak);

            stats.total_holding_days += trade.holding_days();
            stats.total_costs += trade.total_costs;

            // The composite reports "rule: detail"; bucket by the rule.
            let reason = trade
                .exit_reason
                .split(':')
                .next()
                .unwrap_or(&trade.exit_reason)
                .to_string();
            *stats.exit_reason_counts.entry(reason).or_insert(0) += 1;
            *stats
                .selector_counts
                .entry(trade.selector.clone())
                .or_insert(0) += 1;
        }
        stats
    }

    fn win_rate(&self) -> f64 {
        if self.total > 0 {
            self.won as f64 / self.total as f64
        } else {
            0.0
        }
    }

    fn profit_factor(&self) -> f64 {
        if self.total_losses > 0.0 {
            self.total_wins / self.total_losses
        } else if self.total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }

    fn avg_win(&self) -> f64 {
        if self.won > 0 {
            self.total_wins / self.won as f64
        } else {
            0.0
        }
    }

    fn avg_loss(&self) -> f64 {
        if self.lost > 0 {
            self.total_losses / self.lost as f64
        } else {
            0.0
        }
    }

    fn avg_holding_days(&self) -> f64 {
        if self.total > 0 {
            self.total_holding_days as f64 / self.total as f64
        } else {
            0.0
        }
    }
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, i64) {
    if equity_curve.is_empty() {
        return (0.0, 0);
    }

    let mut peak = equity_curve[0].equity;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - point.equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            current_dd_duration += 1;
            if current_dd_duration > max_dd_duration {
                max_dd_duration = current_dd_duration;
            }
        }
    }

    (max_dd, max_dd_duration)
}

fn daily_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev > 0.0 {
                (w[1].equity - prev) / prev
            } else {
                0.0
            }
        })
        .collect()
}

fn compute_risk_adjusted(equity_curve: &[EquityPoint], daily_rf: f64) -> (f64, f64) {
    let returns = daily_returns(equity_curve);
    if returns.is_empty() {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    let excess_return = mean - daily_rf;
    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside_variance: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum::<f64>()
        / n;
    let downside_stddev = downside_variance.sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}

fn compute_benchmark(
    equity_curve: &[EquityPoint],
    benchmark_closes: &[f64],
    total_return: f64,
) -> Option<BenchmarkStats> {
    let len = equity_curve.len().min(benchmark_closes.len());
    if len < 2 {
        return None;
    }
    let first = benchmark_closes[0];
    let last = benchmark_closes[len - 1];
    if first <= 0.0 {
        return None;
    }
    let benchmark_return = (last - first) / first;

    let port: Vec<f64> = daily_returns(&equity_curve[..len]);
    let bench: Vec<f64> = benchmark_closes[..len]
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect();

    let n = port.len() as f64;
    let mean_p: f64 = port.iter().sum::<f64>() / n;
    let mean_b: f64 = bench.iter().sum::<f64>() / n;

    let var_b: f64 = bench.iter().map(|r| (r - mean_b).powi(2)).sum::<f64>() / n;
    let cov: f64 = port
        .iter()
        .zip(&bench)
        .map(|(p, b)| (p - mean_p) * (b - mean_b))
        .sum::<f64>()
        / n;

    let beta = if var_b > 0.0 { cov / var_b } else { 0.0 };
    let alpha = (mean_p - beta * mean_b) * TRADING_DAYS_PER_YEAR;

    let diffs: Vec<f64> = port.iter().zip(&bench).map(|(p, b)| p - b).collect();
    let mean_diff: f64 = diffs.iter().sum::<f64>() / n;
    let diff_var: f64 = diffs.iter().map(|d| (d - mean_diff).powi(2)).sum::<f64>() / n;
    let tracking_error = diff_var.sqrt() * TRADING_DAYS_PER_YEAR.sqrt();

    let information_ratio = if tracking_error > 0.0 {
        mean_diff * TRADING_DAYS_PER_YEAR / tracking_error
    } else {
        0.0
    };

    Some(BenchmarkStats {
        benchmark_return,
        excess_return: total_return - benchmark_return,
        beta,
        alpha,
        tracking_error,
        information_ratio,
    })
}
