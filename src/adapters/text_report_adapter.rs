//! Plain-text report adapter.

use crate::domain::error::AshbackError;
use crate::domain::performance::PerformanceReport;
use crate::domain::portfolio::Portfolio;
use crate::ports::report_port::ReportPort;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

fn companion_path(output_path: &str, suffix: &str) -> PathBuf {
    let path = Path::new(output_path);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("report");
    path.with_file_name(format!("{stem}_{suffix}.csv"))
}

fn csv_write_err(path: &Path, e: csv::Error) -> AshbackError {
    AshbackError::Data {
        reason: format!("failed to write {}: {e}", path.display()),
    }
}

pub struct TextReportAdapter {
    /// Append the per-day audit trail after the summary.
    pub include_day_log: bool,
}

impl TextReportAdapter {
    pub fn new(include_day_log: bool) -> Self {
        Self { include_day_log }
    }

    pub fn render(
        &self,
        report: &PerformanceReport,
        portfolio: &Portfolio,
        day_log: &[String],
    ) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "=== Backtest Summary ===");
        let _ = writeln!(out, "Initial capital:    {:>14.2}", report.initial_capital);
        let _ = writeln!(out, "Final equity:       {:>14.2}", report.final_equity);
        let _ = writeln!(out, "Total return:       {:>13.2}%", report.total_return * 100.0);
        let _ = writeln!(
            out,
            "Annualized return:  {:>13.2}%",
            report.annualized_return * 100.0
        );
        let _ = writeln!(out, "Sharpe ratio:       {:>14.3}", report.sharpe_ratio);
        let _ = writeln!(out, "Sortino ratio:      {:>14.3}", report.sortino_ratio);
        let _ = writeln!(out, "Calmar ratio:       {:>14.3}", report.calmar_ratio);
        let _ = writeln!(out, "Max drawdown:       {:>13.2}%", report.max_drawdown * 100.0);
        let _ = writeln!(
            out,
            "Drawdown duration:  {:>11} days",
            report.max_drawdown_duration
        );

        let _ = writeln!(out, "\n=== Trades ===");
        let _ = writeln!(out, "Total trades:       {:>14}", report.total_trades);
        let _ = writeln!(
            out,
            "Won / lost / flat:  {:>6} / {} / {}",
            report.trades_won, report.trades_lost, report.trades_breakeven
        );
        let _ = writeln!(out, "Win rate:           {:>13.2}%", report.win_rate * 100.0);
        let _ = writeln!(out, "Profit factor:      {:>14.3}", report.profit_factor);
        let _ = writeln!(out, "Avg win / loss:     {:>10.2} / {:.2}", report.avg_win, report.avg_loss);
        let _ = writeln!(out, "Avg holding days:   {:>14.1}", report.avg_holding_days);
        let _ = writeln!(
            out,
            "Streaks (win/loss): {:>9} / {}",
            report.max_win_streak, report.max_loss_streak
        );
        let _ = writeln!(out, "Total costs:        {:>14.2}", report.total_costs);

        if !report.exit_reason_counts.is_empty() {
            let _ = writeln!(out, "\n=== Exit reasons ===");
            for (reason, count) in &report.exit_reason_counts {
                let _ = writeln!(out, "{reason:<24} {count:>6}");
            }
        }
        if !report.selector_counts.is_empty() {
            let _ = writeln!(out, "\n=== Entries by selector ===");
            for (selector, count) in &report.selector_counts {
                let _ = writeln!(out, "{selector:<24} {count:>6}");
            }
        }

        if let Some(bench) = &report.benchmark {
            let _ = writeln!(out, "\n=== Benchmark ===");
            let _ = writeln!(
                out,
                "Benchmark return:   {:>13.2}%",
                bench.benchmark_return * 100.0
            );
            let _ = writeln!(out, "Excess return:      {:>13.2}%", bench.excess_return * 100.0);
            let _ = writeln!(out, "Beta:               {:>14.3}", bench.beta);
            let _ = writeln!(out, "Jensen's alpha:     {:>13.2}%", bench.alpha * 100.0);
            let _ = writeln!(out, "Tracking error:     {:>13.2}%", bench.tracking_error * 100.0);
            let _ = writeln!(out, "Information ratio:  {:>14.3}", bench.information_ratio);
        }

        let _ = writeln!(out, "\n=== Trade log ===");
        for trade in &portfolio.trades {
            let _ = writeln!(
                out,
                "{} {:>6} x{:<6} {:>8.2} -> {:>8.2}  net {:>+12.2}  [{} / {}]",
                trade.exit_date,
                trade.code,
                trade.quantity,
                trade.entry_price,
                trade.exit_price,
                trade.net_pnl,
                trade.selector,
                trade.exit_reason
            );
        }

        if self.include_day_log && !day_log.is_empty() {
            let _ = writeln!(out, "\n=== Day log ===");
            for line in day_log {
                let _ = writeln!(out, "{line}");
            }
        }

        out
    }

    /// Daily equity series as CSV for downstream plotting.
    fn write_equity_csv(&self, portfolio: &Portfolio, path: &Path) -> Result<(), AshbackError> {
        let mut wtr = csv::Writer::from_path(path).map_err(|e| csv_write_err(path, e))?;
        wtr.write_record(["date", "equity", "cash", "position_value"])
            .map_err(|e| csv_write_err(path, e))?;
        for point in &portfolio.equity_curve {
            wtr.write_record([
                point.date.to_string(),
                format!("{:.2}", point.equity),
                format!("{:.2}", point.cash),
                format!("{:.2}", point.position_value),
            ])
            .map_err(|e| csv_write_err(path, e))?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_trades_csv(&self, portfolio: &Portfolio, path: &Path) -> Result<(), AshbackError> {
        let mut wtr = csv::Writer::from_path(path).map_err(|e| csv_write_err(path, e))?;
        wtr.write_record([
            "code",
            "quantity",
            "entry_date",
            "entry_price",
            "exit_date",
            "exit_price",
            "gross_pnl",
            "net_pnl",
            "total_costs",
            "selector",
            "exit_reason",
        ])
        .map_err(|e| csv_write_err(path, e))?;
        for trade in &portfolio.trades {
            wtr.write_record([
                trade.code.clone(),
                trade.quantity.to_string(),
                trade.entry_date.to_string(),
                format!("{:.4}", trade.entry_price),
                trade.exit_date.to_string(),
                format!("{:.4}", trade.exit_price),
                format!("{:.2}", trade.gross_pnl),
                format!("{:.2}", trade.net_pnl),
                format!("{:.2}", trade.total_costs),
                trade.selector.clone(),
                trade.exit_reason.clone(),
            ])
            .map_err(|e| csv_write_err(path, e))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ReportPort for TextReportAdapter {
    fn write(
        &self,
        report: &PerformanceReport,
        portfolio: &Portfolio,
        day_log: &[String],
        output_path: &str,
    ) -> Result<(), AshbackError> {
        let rendered = self.render(report, portfolio, day_log);
        fs::write(output_path, rendered)?;
        self.write_equity_csv(portfolio, &companion_path(output_path, "equity"))?;
        self.write_trades_csv(portfolio, &companion_path(output_path, "trades"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> (PerformanceReport, Portfolio) {
        let portfolio = Portfolio::new(1_000_000.0, 5);
        let report = PerformanceReport::compute(&portfolio, 0.03);
        (report, portfolio)
    }

    #[test]
    fn render_contains_headline_figures() {
        let (report, portfolio) = sample();
        let adapter = TextReportAdapter::new(false);
        let text = adapter.render(&report, &portfolio, &[]);
        assert!(text.contains("=== Backtest Summary ==="));
        assert!(text.contains("1000000.00"));
        assert!(text.contains("Total trades"));
        assert!(!text.contains("=== Day log ==="));
    }

    #[test]
    fn render_appends_day_log_when_enabled() {
        let (report, portfolio) = sample();
        let adapter = TextReportAdapter::new(true);
        let log = vec!["2024-01-05 BUY 000001 1000 @ 10.00".to_string()];
        let text = adapter.render(&report, &portfolio, &log);
        assert!(text.contains("=== Day log ==="));
        assert!(text.contains("BUY 000001"));
    }

    #[test]
    fn write_creates_file_and_csv_companions() {
        let (report, portfolio) = sample();
        let adapter = TextReportAdapter::new(false);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        adapter
            .write(&report, &portfolio, &[], path.to_str().unwrap())
            .unwrap();
        assert!(path.exists());
        assert!(dir.path().join("report_equity.csv").exists());
        assert!(dir.path().join("report_trades.csv").exists());
    }

    #[test]
    fn equity_csv_holds_the_daily_series() {
        use crate::domain::portfolio::EquityPoint;
        use chrono::NaiveDate;

        let (report, mut portfolio) = sample();
        for (i, equity) in [1_000_000.0, 1_002_500.0, 998_750.0].into_iter().enumerate() {
            portfolio.equity_curve.push(EquityPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
                    + chrono::Duration::days(i as i64),
                equity,
                cash: equity - 10_000.0,
                position_value: 10_000.0,
            });
        }
        let adapter = TextReportAdapter::new(false);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        adapter
            .write(&report, &portfolio, &[], path.to_str().unwrap())
            .unwrap();

        let csv = fs::read_to_string(dir.path().join("report_equity.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "date,equity,cash,position_value");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "2024-01-02,1000000.00,990000.00,10000.00");
        assert_eq!(lines[3], "2024-01-04,998750.00,988750.00,10000.00");
    }

    #[test]
    fn trades_csv_holds_closed_trades() {
        use crate::domain::position::Trade;
        use chrono::NaiveDate;

        let (report, mut portfolio) = sample();
        portfolio.trades.push(Trade {
            code: "000001".into(),
            quantity: 1000,
            entry_price: 10.0,
            exit_price: 11.0,
            entry_date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            exit_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            selector: "momentum".into(),
            exit_reason: "profit_target: profit target 20.0% reached".into(),
            gross_pnl: 1000.0,
            net_pnl: 960.0,
            total_costs: 40.0,
        });
        let adapter = TextReportAdapter::new(false);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        adapter
            .write(&report, &portfolio, &[], path.to_str().unwrap())
            .unwrap();

        let csv = fs::read_to_string(dir.path().join("report_trades.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("code,quantity,entry_date"));
        assert!(lines[1].starts_with("000001,1000,2024-01-03,10.0000,2024-01-10,11.0000"));
        assert!(lines[1].contains("momentum"));
    }
}
