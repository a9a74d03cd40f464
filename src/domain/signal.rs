//! Buy signals, the selector capability trait, and the selector registry.
//!
//! Selectors are black-box signal sources: given a date and market view
//! truncated at that date, each returns the stock codes it names today.
//! New selectors are added by registering an identifier in
//! [`build_selector`]; the engine's control flow never changes.

use crate::domain::error::AshbackError;
use crate::domain::indicators::{average_volume, sma};
use crate::domain::market::MarketSnapshot;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

/// A buy signal emitted by a selector on its trigger date.
#[derive(Debug, Clone, PartialEq)]
pub struct BuySignal {
    pub code: String,
    pub date: NaiveDate,
    pub selector: String,
}

/// A pluggable buy-side rule. Implementations only see data up to and
/// including the given date.
pub trait Selector {
    /// Configured alias, used to tag signals and attribute trades.
    fn alias(&self) -> &str;

    /// Stock codes triggering on `date`.
    fn select(&self, market: &MarketSnapshot<'_>) -> Vec<String>;
}

/// Momentum breakout: close has gained at least `threshold` over the last
/// `lookback` sessions.
pub struct MomentumSelector {
    alias: String,
    pub lookback: usize,
    pub threshold: f64,
}

impl Selector for MomentumSelector {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn select(&self, market: &MarketSnapshot<'_>) -> Vec<String> {
        let mut picks = Vec::new();
        for code in market.codes() {
            let Some(hist) = market.history(code) else {
                continue;
            };
            if market.bar(code).is_none() || hist.len() < self.lookback + 1 {
                continue;
            }
            let past = hist[hist.len() - 1 - self.lookback].close;
            let now = hist[hist.len() - 1].close;
            if past > 0.0 && now / past - 1.0 >= self.threshold {
                picks.push(code.clone());
            }
        }
        picks
    }
}

/// SMA golden cross: fast average crosses above the slow average today.
pub struct SmaCrossSelector {
    alias: String,
    pub fast: usize,
    pub slow: usize,
}

impl Selector for SmaCrossSelector {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn select(&self, market: &MarketSnapshot<'_>) -> Vec<String> {
        let mut picks = Vec::new();
        for code in market.codes() {
            let Some(hist) = market.history(code) else {
                continue;
            };
            if market.bar(code).is_none() || hist.len() < self.slow + 1 {
                continue;
            }
            let prev = &hist[..hist.len() - 1];
            let (Some(fast_now), Some(slow_now)) = (sma(hist, self.fast), sma(hist, self.slow))
            else {
                continue;
            };
            let (Some(fast_prev), Some(slow_prev)) = (sma(prev, self.fast), sma(prev, self.slow))
            else {
                continue;
            };
            if fast_prev <= slow_prev && fast_now > slow_now {
                picks.push(code.clone());
            }
        }
        picks
    }
}

/// Volume surge: today's volume is at least `ratio` times the trailing
/// average and the close is up on the day.
pub struct VolumeSurgeSelector {
    alias: String,
    pub lookback: usize,
    pub ratio: f64,
}

impl Selector for VolumeSurgeSelector {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn select(&self, market: &MarketSnapshot<'_>) -> Vec<String> {
        let mut picks = Vec::new();
        for code in market.codes() {
            let Some(hist) = market.history(code) else {
                continue;
            };
            let Some(bar) = market.bar(code) else {
                continue;
            };
            if hist.len() < self.lookback + 1 {
                continue;
            }
            let Some(avg) = average_volume(&hist[..hist.len() - 1], self.lookback) else {
                continue;
            };
            let Some(prev_close) = market.prev_close(code) else {
                continue;
            };
            if avg > 0.0 && bar.volume as f64 >= avg * self.ratio && bar.close > prev_close {
                picks.push(code.clone());
            }
        }
        picks
    }
}

/// Build a selector from its configured identifier. Parameters come from
/// the `[selector.<name>]` section; unknown identifiers are fatal.
pub fn build_selector(
    name: &str,
    config: &dyn ConfigPort,
) -> Result<Box<dyn Selector>, AshbackError> {
    let section = format!("selector.{name}");
    let alias = config
        .get_string(&section, "alias")
        .unwrap_or_else(|| name.to_string());

    match name {
        "momentum" => Ok(Box::new(MomentumSelector {
            alias,
            lookback: config.get_int(&section, "lookback", 20) as usize,
            threshold: config.get_double(&section, "threshold", 0.10),
        })),
        "sma_cross" => Ok(Box::new(SmaCrossSelector {
            alias,
            fast: config.get_int(&section, "fast", 5) as usize,
            slow: config.get_int(&section, "slow", 20) as usize,
        })),
        "volume_surge" => Ok(Box::new(VolumeSurgeSelector {
            alias,
            lookback: config.get_int(&section, "lookback", 20) as usize,
            ratio: config.get_double(&section, "ratio", 2.0),
        })),
        other => Err(AshbackError::UnknownSelector(other.to_string())),
    }
}

/// Composite signal strength in [0, 100], used to rank same-day
/// candidates before capital is allocated.
///
/// Blends a daily-momentum score (peaking in the 2-5% gain band, so a
/// near-limit spike ranks below a steady advance) with a volume-expansion
/// score against the trailing 20-session average.
pub fn signal_score(history: &[OhlcvBar]) -> f64 {
    let n = history.len();
    if n < 2 {
        return 0.0;
    }
    let last = &history[n - 1];
    let prev_close = history[n - 2].close;

    let momentum_pct = if prev_close > 0.0 {
        last.close / prev_close - 1.0
    } else {
        0.0
    };
    let momentum_score = if momentum_pct <= 0.0 {
        0.0
    } else if momentum_pct <= 0.02 {
        momentum_pct / 0.02 * 100.0
    } else if momentum_pct <= 0.05 {
        100.0 - (momentum_pct - 0.02) / 0.03 * 50.0
    } else {
        50.0
    };

    let volume_score = match average_volume(&history[..n - 1], 20) {
        Some(avg) if avg > 0.0 => {
            let ratio = last.volume as f64 / avg;
            ((ratio - 1.0) / 2.0 * 100.0).clamp(0.0, 100.0)
        }
        _ => 0.0,
    };

    (momentum_score.clamp(0.0, 100.0) + volume_score) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{MarketData, StockHistory};
    use crate::domain::ohlcv::OhlcvBar;

    fn bars_with_closes(code: &str, closes: &[f64]) -> StockHistory {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| OhlcvBar {
                code: code.to_string(),
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 10_000,
            })
            .collect();
        StockHistory::new(code.to_string(), bars)
    }

    #[test]
    fn momentum_picks_gainers_only() {
        let mut data = MarketData::new();
        data.insert("000001".into(), bars_with_closes("000001", &[10.0, 12.0]));
        data.insert("000002".into(), bars_with_closes("000002", &[10.0, 10.1]));

        let selector = MomentumSelector {
            alias: "momentum".into(),
            lookback: 1,
            threshold: 0.10,
        };
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let snap = MarketSnapshot::new(date, &data);
        let picks = selector.select(&snap);
        assert_eq!(picks, vec!["000001".to_string()]);
    }

    #[test]
    fn momentum_requires_enough_history() {
        let mut data = MarketData::new();
        data.insert("000001".into(), bars_with_closes("000001", &[10.0, 12.0]));

        let selector = MomentumSelector {
            alias: "momentum".into(),
            lookback: 5,
            threshold: 0.10,
        };
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let snap = MarketSnapshot::new(date, &data);
        assert!(selector.select(&snap).is_empty());
    }

    #[test]
    fn momentum_ignores_non_trading_day() {
        let mut data = MarketData::new();
        data.insert("000001".into(), bars_with_closes("000001", &[10.0, 12.0]));

        let selector = MomentumSelector {
            alias: "momentum".into(),
            lookback: 1,
            threshold: 0.10,
        };
        // No bar on Jan 3 for this stock.
        let date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let snap = MarketSnapshot::new(date, &data);
        assert!(selector.select(&snap).is_empty());
    }

    #[test]
    fn sma_cross_fires_on_crossover_day_only() {
        // Fast SMA(2) crosses above slow SMA(3) on the last day.
        let closes = [10.0, 9.0, 8.0, 9.5, 12.0];
        let mut data = MarketData::new();
        data.insert("000001".into(), bars_with_closes("000001", &closes));

        let selector = SmaCrossSelector {
            alias: "cross".into(),
            fast: 2,
            slow: 3,
        };
        let last = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let snap = MarketSnapshot::new(last, &data);
        assert_eq!(selector.select(&snap), vec!["000001".to_string()]);
    }

    #[test]
    fn volume_surge_needs_up_close() {
        let mut base = bars_with_closes("000001", &[10.0, 10.0, 10.0, 9.0]);
        // Spike volume on the last (down) day.
        let mut bars = base.bars().to_vec();
        bars.last_mut().unwrap().volume = 100_000;
        base = StockHistory::new("000001".into(), bars);

        let mut data = MarketData::new();
        data.insert("000001".into(), base);

        let selector = VolumeSurgeSelector {
            alias: "surge".into(),
            lookback: 3,
            ratio: 2.0,
        };
        let date = NaiveDate::from_ymd_opt(2024, 1, 4).unwrap();
        let snap = MarketSnapshot::new(date, &data);
        assert!(selector.select(&snap).is_empty());
    }

    #[test]
    fn build_selector_unknown_identifier() {
        use crate::adapters::file_config_adapter::FileConfigAdapter;
        let cfg = FileConfigAdapter::from_string("[selectors]\n").unwrap();
        let result = build_selector("no_such_selector", &cfg);
        assert!(matches!(result, Err(AshbackError::UnknownSelector(_))));
    }

    #[test]
    fn build_selector_reads_params() {
        use crate::adapters::file_config_adapter::FileConfigAdapter;
        let cfg = FileConfigAdapter::from_string(
            "[selector.momentum]\nalias = mom20\nlookback = 30\nthreshold = 0.2\n",
        )
        .unwrap();
        let selector = build_selector("momentum", &cfg).unwrap();
        assert_eq!(selector.alias(), "mom20");
    }

    fn score_bars(closes: &[f64], volumes: &[i64]) -> Vec<OhlcvBar> {
        closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&c, &v))| OhlcvBar {
                code: "000001".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                open: c,
                high: c + 0.1,
                low: c - 0.1,
                close: c,
                volume: v,
            })
            .collect()
    }

    #[test]
    fn score_is_zero_for_short_history() {
        assert_eq!(signal_score(&[]), 0.0);
        assert_eq!(signal_score(&score_bars(&[10.0], &[10_000])), 0.0);
    }

    #[test]
    fn score_ranks_stronger_momentum_higher() {
        let weak = score_bars(&[10.0, 10.01], &[10_000, 10_000]);
        let strong = score_bars(&[10.0, 10.15], &[10_000, 10_000]);
        assert!(signal_score(&strong) > signal_score(&weak));
    }

    #[test]
    fn score_discounts_near_limit_spikes() {
        let steady = score_bars(&[10.0, 10.3], &[10_000, 10_000]);
        let spike = score_bars(&[10.0, 10.9], &[10_000, 10_000]);
        assert!(signal_score(&steady) > signal_score(&spike));
    }

    #[test]
    fn score_rewards_volume_expansion() {
        let closes: Vec<f64> = (0..21).map(|i| 10.0 + i as f64 * 0.01).collect();
        let flat_vol = vec![10_000i64; 21];
        let mut surging = flat_vol.clone();
        surging[20] = 30_000;
        assert!(
            signal_score(&score_bars(&closes, &surging))
                > signal_score(&score_bars(&closes, &flat_vol))
        );
    }
}
