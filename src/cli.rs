//! CLI definition and dispatch.

use chrono::Duration;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::text_report_adapter::TextReportAdapter;
use crate::domain::aggregator::{CombinationMode, SignalAggregator};
use crate::domain::config_validation::{
    parse_date, validate_run_config, validate_strategy_config,
};
use crate::domain::engine::{BacktestEngine, EngineConfig};
use crate::domain::error::AshbackError;
use crate::domain::execution::{ExecutionConfig, ExecutionModel};
use crate::domain::exit::{build_exit_rule, CompositeExitStrategy, ExitCombination};
use crate::domain::market::StockHistory;
use crate::domain::portfolio::SizingMode;
use crate::domain::signal::{build_selector, Selector};
use crate::domain::universe::{filter_universe, screen_universe, DEFAULT_MIN_BARS};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_LOOKBACK_DAYS: i64 = 200;

#[derive(Parser, Debug)]
#[command(name = "ashback", about = "Rule-based A-share daily backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Restrict the universe to one stock code
        #[arg(long)]
        code: Option<String>,
        /// Validate and report the parsed configuration without running
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show data coverage for configured codes
    Info {
        #[arg(long)]
        code: Option<String>,
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List stock codes available in the data directory
    ListCodes {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            output,
            code,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest(&config, output.as_ref(), code.as_deref())
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::Info { code, config } => run_info(code.as_deref(), &config),
        Command::ListCodes { config } => run_list_codes(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

fn run_backtest(
    config_path: &PathBuf,
    output_path: Option<&PathBuf>,
    code_override: Option<&str>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_run_config(&adapter).and_then(|()| validate_strategy_config(&adapter))
    {
        eprintln!("error: {e}");
        return (&e).into();
    }

    match run_backtest_pipeline(&adapter, output_path, code_override) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn run_backtest_pipeline(
    adapter: &FileConfigAdapter,
    output_path: Option<&PathBuf>,
    code_override: Option<&str>,
) -> Result<(), AshbackError> {
    let engine_config = build_engine_config(adapter)?;
    let execution = ExecutionModel::new(build_execution_config(adapter));
    let selectors = build_selectors(adapter)?;
    let aggregator = build_aggregator(adapter)?;
    let exit_strategy = build_exit_strategy(adapter)?;

    let codes = resolve_codes(code_override, adapter);
    let data_port = data_port_from_config(adapter)?;
    let lookback = adapter.get_int("data", "lookback_days", DEFAULT_LOOKBACK_DAYS);
    let min_bars = adapter.get_int("data", "min_bars", DEFAULT_MIN_BARS as i64) as usize;

    eprintln!("Loading {} codes...", codes.len());
    let data = data_port.load_market_data(
        &codes,
        engine_config.start,
        engine_config.end,
        lookback,
    )?;
    let (data, excluded) = filter_universe(data, min_bars);
    for line in &excluded {
        eprintln!("warning: {line}");
    }
    if data.is_empty() {
        return Err(AshbackError::Data {
            reason: "no stocks passed data-quality screening".to_string(),
        });
    }

    let benchmark = load_benchmark(adapter, data_port.as_ref(), &engine_config)?;

    eprintln!(
        "Running backtest: {} stocks, {} to {}",
        data.len(),
        engine_config.start,
        engine_config.end
    );

    let mut engine = BacktestEngine::new(
        data,
        engine_config,
        execution,
        selectors,
        aggregator,
        exit_strategy,
        benchmark,
    );
    let report = engine.run()?;

    eprintln!("\n=== Results ===");
    eprintln!("Total Return:     {:.2}%", report.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", report.annualized_return * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", report.sharpe_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", report.max_drawdown * 100.0);
    eprintln!("Total Trades:     {}", report.total_trades);
    eprintln!("Win Rate:         {:.1}%", report.win_rate * 100.0);

    let output = output_path
        .cloned()
        .unwrap_or_else(|| PathBuf::from("report.txt"));
    let include_day_log = adapter.get_bool("report", "include_day_log", false);
    let report_port = TextReportAdapter::new(include_day_log);
    report_port.write(
        &report,
        &engine.portfolio,
        &engine.day_log,
        &output.display().to_string(),
    )?;
    eprintln!("\nReport written to: {}", output.display());
    Ok(())
}

pub fn build_engine_config(adapter: &dyn ConfigPort) -> Result<EngineConfig, AshbackError> {
    Ok(EngineConfig {
        start: parse_date(adapter, "start_date")?,
        end: parse_date(adapter, "end_date")?,
        initial_capital: adapter.get_double("backtest", "initial_capital", 1_000_000.0),
        max_positions: adapter.get_int("backtest", "max_positions", 5) as usize,
        risk_free_rate: adapter.get_double("backtest", "risk_free_rate", 0.03),
        sizing: build_sizing_mode(adapter)?,
    })
}

fn build_sizing_mode(adapter: &dyn ConfigPort) -> Result<SizingMode, AshbackError> {
    let mode = adapter
        .get_string("backtest", "position_sizing")
        .unwrap_or_else(|| "equal_weight".to_string());
    match mode.as_str() {
        "equal_weight" => Ok(SizingMode::EqualWeight),
        "risk_based" => Ok(SizingMode::RiskBased {
            risk_pct: adapter.get_double("backtest", "risk_pct", 0.01),
            atr_period: adapter.get_int("backtest", "atr_period", 14) as usize,
            atr_multiplier: adapter.get_double("backtest", "atr_multiplier", 2.0),
        }),
        other => Err(AshbackError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "position_sizing".to_string(),
            reason: format!("unknown mode {other:?}, expected equal_weight or risk_based"),
        }),
    }
}

pub fn build_execution_config(adapter: &dyn ConfigPort) -> ExecutionConfig {
    let defaults = ExecutionConfig::default();
    ExecutionConfig {
        commission_rate: adapter.get_double("execution", "commission_rate", defaults.commission_rate),
        min_commission: adapter.get_double("execution", "min_commission", defaults.min_commission),
        stamp_tax_rate: adapter.get_double("execution", "stamp_tax_rate", defaults.stamp_tax_rate),
        slippage_rate: adapter.get_double("execution", "slippage_rate", defaults.slippage_rate),
        lot_size: adapter.get_int("execution", "lot_size", defaults.lot_size),
        max_defer_attempts: adapter.get_int(
            "execution",
            "max_defer_attempts",
            defaults.max_defer_attempts as i64,
        ) as u32,
    }
}

pub fn build_selectors(adapter: &dyn ConfigPort) -> Result<Vec<Box<dyn Selector>>, AshbackError> {
    let active = adapter
        .get_string("selectors", "active")
        .ok_or_else(|| AshbackError::ConfigMissing {
            section: "selectors".to_string(),
            key: "active".to_string(),
        })?;

    let mut selectors = Vec::new();
    for name in split_list(&active) {
        selectors.push(build_selector(&name, adapter)?);
    }
    Ok(selectors)
}

pub fn build_aggregator(adapter: &dyn ConfigPort) -> Result<SignalAggregator, AshbackError> {
    let combination = adapter
        .get_string("selectors", "combination")
        .unwrap_or_else(|| "OR".to_string())
        .to_uppercase();
    let required = adapter
        .get_string("selectors", "required")
        .map(|s| split_list(&s))
        .unwrap_or_default();

    let mode = match combination.as_str() {
        "OR" => CombinationMode::Or,
        "AND" => CombinationMode::And { required },
        "TIME_WINDOW" => CombinationMode::TimeWindow {
            window: adapter.get_int("selectors", "window", 5),
            required,
        },
        other => {
            return Err(AshbackError::ConfigInvalid {
                section: "selectors".to_string(),
                key: "combination".to_string(),
                reason: format!("unknown combination {other:?}"),
            })
        }
    };
    Ok(SignalAggregator::new(mode))
}

pub fn build_exit_strategy(
    adapter: &dyn ConfigPort,
) -> Result<CompositeExitStrategy, AshbackError> {
    let rules_str = adapter
        .get_string("sell_strategy", "rules")
        .ok_or_else(|| AshbackError::ConfigMissing {
            section: "sell_strategy".to_string(),
            key: "rules".to_string(),
        })?;

    let mode = adapter
        .get_string("sell_strategy", "mode")
        .unwrap_or_else(|| "ANY".to_string());
    let combination = match mode.to_uppercase().as_str() {
        "ANY" => ExitCombination::Any,
        "ALL" => ExitCombination::All,
        other => {
            return Err(AshbackError::ConfigInvalid {
                section: "sell_strategy".to_string(),
                key: "mode".to_string(),
                reason: format!("unknown mode {other:?}"),
            })
        }
    };

    let mut rules = Vec::new();
    for name in split_list(&rules_str) {
        rules.push(build_exit_rule(&name, adapter)?);
    }
    Ok(CompositeExitStrategy::new(combination, rules))
}

pub fn resolve_codes(code_override: Option<&str>, config: &dyn ConfigPort) -> Vec<String> {
    if let Some(c) = code_override {
        return vec![c.to_string()];
    }
    config
        .get_string("backtest", "codes")
        .map(|s| split_list(&s))
        .unwrap_or_default()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn data_port_from_config(adapter: &dyn ConfigPort) -> Result<Box<dyn DataPort>, AshbackError> {
    let directory = adapter
        .get_string("data", "directory")
        .ok_or_else(|| AshbackError::ConfigMissing {
            section: "data".to_string(),
            key: "directory".to_string(),
        })?;
    Ok(Box::new(CsvAdapter::new(PathBuf::from(directory))))
}

fn load_benchmark(
    adapter: &dyn ConfigPort,
    data_port: &dyn DataPort,
    engine_config: &EngineConfig,
) -> Result<Option<StockHistory>, AshbackError> {
    let Some(code) = adapter.get_string("benchmark", "code") else {
        return Ok(None);
    };
    let start = engine_config.start - Duration::days(DEFAULT_LOOKBACK_DAYS);
    let history = data_port.load_history(&code, start, engine_config.end)?;
    Ok(Some(history))
}

pub fn run_dry_run(config_path: &PathBuf) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_run_config(&adapter).and_then(|()| validate_strategy_config(&adapter))
    {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let selectors = match build_selectors(&adapter) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let exit_strategy = match build_exit_strategy(&adapter) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("\nSelectors:");
    for selector in &selectors {
        eprintln!("  {}", selector.alias());
    }
    eprintln!("\nExit rules:");
    for rule in &exit_strategy.rules {
        eprintln!("  {}", rule.name());
    }
    eprintln!("\nUniverse: {}", resolve_codes(None, &adapter).join(", "));
    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_run_config(&adapter).and_then(|()| validate_strategy_config(&adapter))
    {
        eprintln!("error: {e}");
        return (&e).into();
    }

    // Building the strategy objects catches unknown names and bad
    // parameters the section checks cannot see.
    if let Err(e) = build_selectors(&adapter).map(|_| ()) {
        eprintln!("error: {e}");
        return (&e).into();
    }
    if let Err(e) = build_exit_strategy(&adapter).map(|_| ()) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    eprintln!("Configuration is valid.");
    ExitCode::SUCCESS
}

fn run_info(code_override: Option<&str>, config_path: &PathBuf) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let data_port = match data_port_from_config(&adapter) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let codes = resolve_codes(code_override, &adapter);
    if codes.is_empty() {
        eprintln!("error: no codes configured");
        return ExitCode::from(2);
    }

    let min_bars = adapter.get_int("data", "min_bars", DEFAULT_MIN_BARS as i64) as usize;
    for code in &codes {
        match data_port.load_history(code, chrono::NaiveDate::MIN, chrono::NaiveDate::MAX) {
            Ok(history) if history.bars().is_empty() => {
                eprintln!("{code}: no data");
            }
            Ok(history) => {
                let bars = history.bars();
                let first = bars[0].date;
                let last = bars[bars.len() - 1].date;
                let count = bars.len();
                let mut data = crate::domain::market::MarketData::new();
                data.insert(code.clone(), history);
                let screened = screen_universe(&data, min_bars);
                let status = if screened.accepted.contains(code) {
                    "ok"
                } else {
                    "excluded"
                };
                println!("{code}: {count} bars, {first} to {last} [{status}]");
            }
            Err(e) => eprintln!("error querying {code}: {e}"),
        }
    }
    ExitCode::SUCCESS
}

fn run_list_codes(config_path: &PathBuf) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let data_port = match data_port_from_config(&adapter) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    match data_port.list_codes() {
        Ok(codes) => {
            for code in &codes {
                println!("{code}");
            }
            eprintln!("{} codes found", codes.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}
