//! Indicator helpers shared by selectors and exit rules.

use crate::domain::ohlcv::OhlcvBar;

/// Simple moving average of closes over the last `period` bars.
/// None if fewer than `period` bars are available.
pub fn sma(bars: &[OhlcvBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let sum: f64 = bars[bars.len() - period..].iter().map(|b| b.close).sum();
    Some(sum / period as f64)
}

/// Average True Range over the last `period` bars.
///
/// Needs `period + 1` bars so every true range has a prior close; the
/// first bar's TR falls back to high - low.
pub fn atr(bars: &[OhlcvBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }
    let start = bars.len() - period;
    let mut sum = 0.0;
    for i in start..bars.len() {
        sum += bars[i].true_range(bars[i - 1].close);
    }
    Some(sum / period as f64)
}

/// Average volume over the last `period` bars.
pub fn average_volume(bars: &[OhlcvBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let sum: f64 = bars[bars.len() - period..]
        .iter()
        .map(|b| b.volume as f64)
        .sum();
    Some(sum / period as f64)
}

/// Sample standard deviation of log returns over the trailing `period`
/// steps. Needs `period + 1` closes.
pub fn log_return_volatility(bars: &[OhlcvBar], period: usize) -> Option<f64> {
    if period < 2 || bars.len() < period + 1 {
        return None;
    }
    let returns: Vec<f64> = bars[bars.len() - period - 1..]
        .windows(2)
        .filter(|w| w[0].close > 0.0 && w[1].close > 0.0)
        .map(|w| (w[1].close / w[0].close).ln())
        .collect();
    if returns.len() < 2 {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
        / (returns.len() as f64 - 1.0);
    Some(var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_bars(closes: &[f64]) -> Vec<OhlcvBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| OhlcvBar {
                code: "000001".into(),
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                open: c,
                high: c + 2.0,
                low: c - 2.0,
                close: c,
                volume: 1000 + i as i64,
            })
            .collect()
    }

    #[test]
    fn sma_basic() {
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!((sma(&bars, 3).unwrap() - 4.0).abs() < f64::EPSILON);
        assert!((sma(&bars, 5).unwrap() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sma_insufficient_data() {
        let bars = make_bars(&[1.0, 2.0]);
        assert!(sma(&bars, 3).is_none());
        assert!(sma(&bars, 0).is_none());
    }

    #[test]
    fn atr_constant_range() {
        // Flat closes: TR = high - low = 4 on every bar.
        let bars = make_bars(&[10.0, 10.0, 10.0, 10.0, 10.0]);
        assert!((atr(&bars, 3).unwrap() - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn atr_needs_prior_close() {
        let bars = make_bars(&[10.0, 10.0, 10.0]);
        assert!(atr(&bars, 3).is_none());
        assert!(atr(&bars, 2).is_some());
    }

    #[test]
    fn average_volume_basic() {
        let bars = make_bars(&[1.0, 1.0, 1.0, 1.0]);
        // volumes 1000..1003, last two average 1002.5
        assert!((average_volume(&bars, 2).unwrap() - 1002.5).abs() < f64::EPSILON);
    }

    #[test]
    fn log_return_volatility_is_zero_for_flat_closes() {
        let bars = make_bars(&[10.0, 10.0, 10.0, 10.0]);
        assert!(log_return_volatility(&bars, 3).unwrap() < f64::EPSILON);
    }

    #[test]
    fn log_return_volatility_grows_with_swings() {
        let calm = make_bars(&[10.0, 10.05, 10.0, 10.05, 10.0]);
        let wild = make_bars(&[10.0, 11.0, 9.5, 11.0, 9.5]);
        assert!(
            log_return_volatility(&wild, 4).unwrap() > log_return_volatility(&calm, 4).unwrap()
        );
    }

    #[test]
    fn log_return_volatility_needs_enough_bars() {
        let bars = make_bars(&[10.0, 10.5]);
        assert!(log_return_volatility(&bars, 3).is_none());
    }
}
