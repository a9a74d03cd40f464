//! Configuration validation.
//!
//! Every field is checked up front so a bad config fails before any data
//! is loaded.

use crate::domain::error::AshbackError;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_run_config(config: &dyn ConfigPort) -> Result<(), AshbackError> {
    validate_initial_capital(config)?;
    validate_max_positions(config)?;
    validate_dates(config)?;
    validate_risk_free_rate(config)?;
    validate_position_sizing(config)?;
    validate_codes(config)?;
    validate_execution(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), AshbackError> {
    validate_selectors(config)?;
    validate_sell_strategy(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> AshbackError {
    AshbackError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), AshbackError> {
    let value = config.get_double("backtest", "initial_capital", 0.0);
    if value <= 0.0 {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_max_positions(config: &dyn ConfigPort) -> Result<(), AshbackError> {
    let value = config.get_int("backtest", "max_positions", 0);
    if value <= 0 {
        return Err(invalid(
            "backtest",
            "max_positions",
            "max_positions must be at least 1",
        ));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), AshbackError> {
    let value = config.get_double("backtest", "risk_free_rate", 0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_position_sizing(config: &dyn ConfigPort) -> Result<(), AshbackError> {
    let mode = config
        .get_string("backtest", "position_sizing")
        .unwrap_or_else(|| "equal_weight".to_string());
    match mode.as_str() {
        "equal_weight" => Ok(()),
        "risk_based" => {
            let risk_pct = config.get_double("backtest", "risk_pct", 0.01);
            if !(0.0..1.0).contains(&risk_pct) || risk_pct == 0.0 {
                return Err(invalid(
                    "backtest",
                    "risk_pct",
                    "risk_pct must be between 0 and 1, exclusive",
                ));
            }
            if config.get_int("backtest", "atr_period", 14) <= 0 {
                return Err(invalid(
                    "backtest",
                    "atr_period",
                    "atr_period must be at least 1",
                ));
            }
            if config.get_double("backtest", "atr_multiplier", 2.0) <= 0.0 {
                return Err(invalid(
                    "backtest",
                    "atr_multiplier",
                    "atr_multiplier must be positive",
                ));
            }
            Ok(())
        }
        other => Err(invalid(
            "backtest",
            "position_sizing",
            format!("unknown mode {other:?}, expected equal_weight or risk_based"),
        )),
    }
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), AshbackError> {
    let start = parse_date(config, "start_date")?;
    let end = parse_date(config, "end_date")?;
    if start >= end {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

pub fn parse_date(config: &dyn ConfigPort, field: &str) -> Result<NaiveDate, AshbackError> {
    let value = config
        .get_string("backtest", field)
        .ok_or_else(|| AshbackError::ConfigMissing {
            section: "backtest".to_string(),
            key: field.to_string(),
        })?;
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|_| {
        invalid(
            "backtest",
            field,
            format!("invalid {field} format, expected YYYY-MM-DD"),
        )
    })
}

fn validate_codes(config: &dyn ConfigPort) -> Result<(), AshbackError> {
    match config.get_string("backtest", "codes") {
        Some(s) if s.split(',').any(|c| !c.trim().is_empty()) => Ok(()),
        _ => Err(AshbackError::ConfigMissing {
            section: "backtest".to_string(),
            key: "codes".to_string(),
        }),
    }
}

fn validate_execution(config: &dyn ConfigPort) -> Result<(), AshbackError> {
    for key in [
        "commission_rate",
        "min_commission",
        "stamp_tax_rate",
        "slippage_rate",
    ] {
        if config.get_double("execution", key, 0.0) < 0.0 {
            return Err(invalid("execution", key, format!("{key} must be non-negative")));
        }
    }
    if config.get_int("execution", "lot_size", 100) <= 0 {
        return Err(invalid("execution", "lot_size", "lot_size must be positive"));
    }
    if config.get_int("execution", "max_defer_attempts", 5) <= 0 {
        return Err(invalid(
            "execution",
            "max_defer_attempts",
            "max_defer_attempts must be at least 1",
        ));
    }
    Ok(())
}

fn validate_selectors(config: &dyn ConfigPort) -> Result<(), AshbackError> {
    match config.get_string("selectors", "active") {
        Some(s) if s.split(',').any(|c| !c.trim().is_empty()) => {}
        _ => {
            return Err(AshbackError::ConfigMissing {
                section: "selectors".to_string(),
                key: "active".to_string(),
            })
        }
    }

    let combination = config
        .get_string("selectors", "combination")
        .unwrap_or_else(|| "OR".to_string());
    match combination.to_uppercase().as_str() {
        "OR" | "AND" => {}
        "TIME_WINDOW" => {
            let window = config.get_int("selectors", "window", 0);
            if window <= 0 {
                return Err(invalid(
                    "selectors",
                    "window",
                    "TIME_WINDOW combination needs window >= 1",
                ));
            }
        }
        other => {
            return Err(invalid(
                "selectors",
                "combination",
                format!("unknown combination {other:?}, expected OR, AND or TIME_WINDOW"),
            ))
        }
    }
    Ok(())
}

fn validate_sell_strategy(config: &dyn ConfigPort) -> Result<(), AshbackError> {
    match config.get_string("sell_strategy", "rules") {
        Some(s) if s.split(',').any(|c| !c.trim().is_empty()) => {}
        _ => {
            return Err(AshbackError::ConfigMissing {
                section: "sell_strategy".to_string(),
                key: "rules".to_string(),
            })
        }
    }

    let mode = config
        .get_string("sell_strategy", "mode")
        .unwrap_or_else(|| "ANY".to_string());
    match mode.to_uppercase().as_str() {
        "ANY" | "ALL" => Ok(()),
        other => Err(invalid(
            "sell_strategy",
            "mode",
            format!("unknown mode {other:?}, expected ANY or ALL"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn valid_config() -> String {
        "[backtest]\n\
         initial_capital = 1000000\n\
         max_positions = 5\n\
         start_date = 2023-01-01\n\
         end_date = 2023-12-31\n\
         codes = 000001, 000002\n\
         \n\
         [selectors]\n\
         active = momentum\n\
         combination = OR\n\
         \n\
         [sell_strategy]\n\
         mode = ANY\n\
         rules = trailing_stop\n"
            .to_string()
    }

    fn adapter(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn accepts_valid_config() {
        let config = adapter(&valid_config());
        assert!(validate_run_config(&config).is_ok());
        assert!(validate_strategy_config(&config).is_ok());
    }

    #[test]
    fn rejects_non_positive_capital() {
        let content = valid_config().replace("initial_capital = 1000000", "initial_capital = 0");
        let config = adapter(&content);
        assert!(matches!(
            validate_run_config(&config),
            Err(AshbackError::ConfigInvalid { ref key, .. }) if key == "initial_capital"
        ));
    }

    #[test]
    fn rejects_reversed_dates() {
        let content = valid_config().replace("start_date = 2023-01-01", "start_date = 2024-06-01");
        let config = adapter(&content);
        assert!(validate_run_config(&config).is_err());
    }

    #[test]
    fn rejects_missing_codes() {
        let content = valid_config().replace("codes = 000001, 000002", "");
        let config = adapter(&content);
        assert!(matches!(
            validate_run_config(&config),
            Err(AshbackError::ConfigMissing { ref key, .. }) if key == "codes"
        ));
    }

    fn with_backtest_keys(extra: &str) -> String {
        valid_config().replace(
            "max_positions = 5",
            &format!("max_positions = 5\n{extra}"),
        )
    }

    #[test]
    fn rejects_unknown_position_sizing() {
        let config = adapter(&with_backtest_keys("position_sizing = martingale"));
        assert!(matches!(
            validate_run_config(&config),
            Err(AshbackError::ConfigInvalid { ref key, .. }) if key == "position_sizing"
        ));
    }

    #[test]
    fn risk_based_sizing_bounds_risk_pct() {
        let config = adapter(&with_backtest_keys(
            "position_sizing = risk_based\nrisk_pct = 1.5",
        ));
        assert!(matches!(
            validate_run_config(&config),
            Err(AshbackError::ConfigInvalid { ref key, .. }) if key == "risk_pct"
        ));

        let config = adapter(&with_backtest_keys(
            "position_sizing = risk_based\nrisk_pct = 0.02",
        ));
        assert!(validate_run_config(&config).is_ok());
    }

    #[test]
    fn rejects_unknown_combination() {
        let content = valid_config().replace("combination = OR", "combination = XOR");
        let config = adapter(&content);
        assert!(validate_strategy_config(&config).is_err());
    }

    #[test]
    fn time_window_requires_window() {
        let content = valid_config().replace("combination = OR", "combination = TIME_WINDOW");
        let config = adapter(&content);
        assert!(validate_strategy_config(&config).is_err());

        let content = content.replace("combination = TIME_WINDOW", "combination = TIME_WINDOW\nwindow = 5");
        let config = adapter(&content);
        assert!(validate_strategy_config(&config).is_ok());
    }

    #[test]
    fn rejects_unknown_sell_mode() {
        let content = valid_config().replace("mode = ANY", "mode = MAYBE");
        let config = adapter(&content);
        assert!(validate_strategy_config(&config).is_err());
    }

    #[test]
    fn rejects_negative_execution_rates() {
        let content = format!("{}\n[execution]\nslippage_rate = -0.001\n", valid_config());
        let config = adapter(&content);
        assert!(validate_run_config(&config).is_err());
    }
}
