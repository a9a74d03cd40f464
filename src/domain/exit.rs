//! Exit rules and their composite combination.
//!
//! Each rule inspects one open position against history up to the current
//! date (the last bar is the current day) and answers with a sell reason
//! when it fires. A composite joins rules under ANY or ALL logic.

use super::error::AshbackError;
use super::indicators::{atr, average_volume, log_return_volatility, sma};
use super::ohlcv::OhlcvBar;
use super::position::Position;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub trait ExitRule {
    fn name(&self) -> &str;

    /// Some(reason) when the rule wants the position closed.
    fn evaluate(
        &self,
        position: &Position,
        date: NaiveDate,
        history: &[OhlcvBar],
    ) -> Option<String>;
}

/// Stop at `high_water_close * (1 - trailing_pct)`, optionally armed only
/// once the position has seen a minimum gain.
pub struct PercentTrailingStop {
    pub name: String,
    pub trailing_pct: f64,
    pub activate_after_profit_pct: f64,
}

impl ExitRule for PercentTrailingStop {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        position: &Position,
        _date: NaiveDate,
        history: &[OhlcvBar],
    ) -> Option<String> {
        let close = history.last()?.close;
        if self.activate_after_profit_pct > 0.0
            && position.max_unrealized_pnl_pct < self.activate_after_profit_pct
        {
            return None;
        }
        let stop = position.high_water_close * (1.0 - self.trailing_pct);
        if close <= stop {
            return Some(format!(
                "trailing stop {:.1}% hit at {close:.2} (stop {stop:.2})",
                self.trailing_pct * 100.0
            ));
        }
        None
    }
}

/// Stop at `high_water_close - multiplier * ATR(period)`.
pub struct AtrTrailingStop {
    pub name: String,
    pub period: usize,
    pub multiplier: f64,
}

impl ExitRule for AtrTrailingStop {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        position: &Position,
        _date: NaiveDate,
        history: &[OhlcvBar],
    ) -> Option<String> {
        let close = history.last()?.close;
        let atr = atr(history, self.period)?;
        if atr <= 0.0 {
            return None;
        }
        let stop = position.high_water_close - atr * self.multiplier;
        if close <= stop {
            return Some(format!(
                "ATR trailing stop ({}x) hit at {close:.2} (stop {stop:.2})",
                self.multiplier
            ));
        }
        None
    }
}

pub struct FixedProfitTarget {
    pub name: String,
    pub target_pct: f64,
}

impl ExitRule for FixedProfitTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        position: &Position,
        _date: NaiveDate,
        history: &[OhlcvBar],
    ) -> Option<String> {
        let close = history.last()?.close;
        let pnl_pct = position.unrealized_pnl_pct(close);
        if pnl_pct >= self.target_pct {
            return Some(format!(
                "profit target {:.1}% reached ({:+.2}%)",
                self.target_pct * 100.0,
                pnl_pct * 100.0
            ));
        }
        None
    }
}

/// Close after a maximum calendar holding period.
pub struct TimedExit {
    pub name: String,
    pub max_holding_days: i64,
}

impl ExitRule for TimedExit {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        position: &Position,
        date: NaiveDate,
        _history: &[OhlcvBar],
    ) -> Option<String> {
        let held = position.holding_days(date);
        if held >= self.max_holding_days {
            return Some(format!("max holding period {held}d reached"));
        }
        None
    }
}

/// Fast moving average crossing below the slow one on the current day.
pub struct MaDeathCross {
    pub name: String,
    pub fast: usize,
    pub slow: usize,
}

impl ExitRule for MaDeathCross {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        _position: &Position,
        _date: NaiveDate,
        history: &[OhlcvBar],
    ) -> Option<String> {
        if history.len() < self.slow + 1 {
            return None;
        }
        let today = history;
        let yesterday = &history[..history.len() - 1];

        let fast_now = sma(today, self.fast)?;
        let slow_now = sma(today, self.slow)?;
        let fast_prev = sma(yesterday, self.fast)?;
        let slow_prev = sma(yesterday, self.slow)?;

        if fast_prev >= slow_prev && fast_now < slow_now {
            return Some(format!("MA{} crossed below MA{}", self.fast, self.slow));
        }
        None
    }
}

/// Turnover collapsing below a fraction of its trailing average for
/// several sessions in a row, read as momentum running out.
pub struct VolumeDryUpExit {
    pub name: String,
    pub threshold_pct: f64,
    pub lookback: usize,
    pub consecutive_days: usize,
}

impl ExitRule for VolumeDryUpExit {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        _position: &Position,
        _date: NaiveDate,
        history: &[OhlcvBar],
    ) -> Option<String> {
        if history.len() < self.lookback + self.consecutive_days {
            return None;
        }
        let avg = average_volume(history, self.lookback)?;
        if avg <= 0.0 {
            return None;
        }
        let cutoff = avg * self.threshold_pct;
        let recent = &history[history.len() - self.consecutive_days..];
        if recent.iter().all(|bar| (bar.volume as f64) < cutoff) {
            let ratio = history.last()?.volume as f64 / avg;
            return Some(format!(
                "volume dry-up ({}d under {:.0}% of {}d avg, ratio {ratio:.2})",
                self.consecutive_days,
                self.threshold_pct * 100.0,
                self.lookback
            ));
        }
        None
    }
}

/// Trailing stop whose width follows the volatility regime: tight in
/// quiet markets, wide when swings would whipsaw a fixed stop.
///
/// The regime is the percentile rank of current log-return volatility
/// among rolling volatilities over the lookback window.
pub struct AdaptiveVolatilityStop {
    pub name: String,
    pub volatility_period: usize,
    pub lookback: usize,
    pub low_percentile: f64,
    pub high_percentile: f64,
    pub low_vol_stop_pct: f64,
    pub normal_vol_stop_pct: f64,
    pub high_vol_stop_pct: f64,
}

impl AdaptiveVolatilityStop {
    fn volatility_percentile(&self, history: &[OhlcvBar], current_vol: f64) -> Option<f64> {
        if history.len() < self.lookback + self.volatility_period {
            return None;
        }
        let mut vols = Vec::with_capacity(self.lookback);
        for i in history.len() - self.lookback..history.len() {
            if i < self.volatility_period {
                continue;
            }
            if let Some(vol) = log_return_volatility(&history[..=i], self.volatility_period) {
                vols.push(vol);
            }
        }
        if vols.is_empty() {
            return None;
        }
        let below = vols.iter().filter(|vol| **vol < current_vol).count();
        Some(below as f64 / vols.len() as f64 * 100.0)
    }
}

impl ExitRule for AdaptiveVolatilityStop {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        position: &Position,
        _date: NaiveDate,
        history: &[OhlcvBar],
    ) -> Option<String> {
        let close = history.last()?.close;
        let current_vol = log_return_volatility(history, self.volatility_period)?;
        let percentile = self.volatility_percentile(history, current_vol)?;

        let (stop_pct, regime) = if percentile < self.low_percentile {
            (self.low_vol_stop_pct, "low vol")
        } else if percentile > self.high_percentile {
            (self.high_vol_stop_pct, "high vol")
        } else {
            (self.normal_vol_stop_pct, "normal vol")
        };

        let stop = position.high_water_close * (1.0 - stop_pct);
        if close <= stop {
            return Some(format!(
                "adaptive stop ({regime}, {:.1}%) hit at {close:.2} (stop {stop:.2})",
                stop_pct * 100.0
            ));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCombination {
    Any,
    All,
}

pub struct CompositeExitStrategy {
    pub combination: ExitCombination,
    pub rules: Vec<Box<dyn ExitRule>>,
}

impl CompositeExitStrategy {
    pub fn new(combination: ExitCombination, rules: Vec<Box<dyn ExitRule>>) -> Self {
        Self { combination, rules }
    }

    /// ANY returns the first firing rule's reason; ALL fires only when
    /// every rule does and joins their reasons.
    pub fn evaluate(
        &self,
        position: &Position,
        date: NaiveDate,
        history: &[OhlcvBar],
    ) -> Option<String> {
        match self.combination {
            ExitCombination::Any => self.rules.iter().find_map(|rule| {
                rule.evaluate(position, date, history)
                    .map(|reason| format!("{}: {reason}", rule.name()))
            }),
            ExitCombination::All => {
                if self.rules.is_empty() {
                    return None;
                }
                let mut reasons = Vec::with_capacity(self.rules.len());
                for rule in &self.rules {
                    let reason = rule.evaluate(position, date, history)?;
                    reasons.push(format!("{}: {reason}", rule.name()));
                }
                Some(reasons.join(" AND "))
            }
        }
    }
}

/// Build one exit rule from its configured identifier, with parameters
/// from the `[exit.<name>]` section.
pub fn build_exit_rule(
    name: &str,
    config: &dyn ConfigPort,
) -> Result<Box<dyn ExitRule>, AshbackError> {
    let section = format!("exit.{name}");
    match name {
        "trailing_stop" => Ok(Box::new(PercentTrailingStop {
            name: name.to_string(),
            trailing_pct: config.get_double(&section, "trailing_pct", 0.08),
            activate_after_profit_pct: config.get_double(
                &section,
                "activate_after_profit_pct",
                0.0,
            ),
        })),
        "atr_trailing_stop" => Ok(Box::new(AtrTrailingStop {
            name: name.to_string(),
            period: config.get_int(&section, "period", 14) as usize,
            multiplier: config.get_double(&section, "multiplier", 3.0),
        })),
        "profit_target" => Ok(Box::new(FixedProfitTarget {
            name: name.to_string(),
            target_pct: config.get_double(&section, "target_pct", 0.20),
        })),
        "timed" => Ok(Box::new(TimedExit {
            name: name.to_string(),
            max_holding_days: config.get_int(&section, "max_holding_days", 30),
        })),
        "ma_death_cross" => Ok(Box::new(MaDeathCross {
            name: name.to_string(),
            fast: config.get_int(&section, "fast", 5) as usize,
            slow: config.get_int(&section, "slow", 20) as usize,
        })),
        "volume_dry_up" => Ok(Box::new(VolumeDryUpExit {
            name: name.to_string(),
            threshold_pct: config.get_double(&section, "volume_threshold_pct", 0.5),
            lookback: config.get_int(&section, "lookback", 20) as usize,
            consecutive_days: config.get_int(&section, "consecutive_days", 3) as usize,
        })),
        "adaptive_stop" => Ok(Box::new(AdaptiveVolatilityStop {
            name: name.to_string(),
            volatility_period: config.get_int(&section, "volatility_period", 20) as usize,
            lookback: config.get_int(&section, "lookback", 120) as usize,
            low_percentile: config.get_double(&section, "low_vol_percentile", 30.0),
            high_percentile: config.get_double(&section, "high_vol_percentile", 70.0),
            low_vol_stop_pct: config.get_double(&section, "low_vol_stop_pct", 0.05),
            normal_vol_stop_pct: config.get_double(&section, "normal_vol_stop_pct", 0.08),
            high_vol_stop_pct: config.get_double(&section, "high_vol_stop_pct", 0.12),
        })),
        other => Err(AshbackError::UnknownExitRule(other.to_string())),
    }
}
