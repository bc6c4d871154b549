//! Technical indicators over a price series.
//!
//! Every function is a pure transform producing a series aligned with its
//! input: one output value per input bar, `None` until enough history
//! exists. A division by zero anywhere yields `None` for that position,
//! never a default and never a panic; downstream row cleaning drops
//! incomplete rows.

use statrs::statistics::{Data, Distribution};

/// Simple moving average over `period` values.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    let mut sum = 0.0;
    for (i, v) in values.iter().enumerate() {
        sum += v;
        if i >= period {
            sum -= values[i - period];
        }
        if i + 1 >= period {
            out[i] = Some(sum / period as f64);
        }
    }
    out
}

/// Exponential moving average with span-style smoothing
/// (alpha = 2 / (period + 1)), seeded from the first value and therefore
/// defined from index 0.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if values.is_empty() || period == 0 {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut current = values[0];
    out[0] = Some(current);
    for i in 1..values.len() {
        current = alpha * values[i] + (1.0 - alpha) * current;
        out[i] = Some(current);
    }
    out
}

/// Return over `periods` steps, as a fraction.
pub fn pct_change(values: &[f64], periods: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if periods == 0 {
        return out;
    }
    for i in periods..values.len() {
        let base = values[i - periods];
        if base != 0.0 {
            out[i] = Some((values[i] - base) / base);
        }
    }
    out
}

/// Rolling mean over a window of an already-sparse series. A window
/// containing any `None` is `None`.
pub fn rolling_mean(series: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; series.len()];
    if window == 0 {
        return out;
    }
    for i in 0..series.len() {
        if i + 1 < window {
            continue;
        }
        let slice = &series[i + 1 - window..=i];
        if slice.iter().all(Option::is_some) {
            let sum: f64 = slice.iter().map(|v| v.unwrap_or(0.0)).sum();
            out[i] = Some(sum / window as f64);
        }
    }
    out
}

/// Rolling sample standard deviation of an already-sparse series.
pub fn rolling_std(series: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; series.len()];
    if window < 2 {
        return out;
    }
    for i in 0..series.len() {
        if i + 1 < window {
            continue;
        }
        let slice = &series[i + 1 - window..=i];
        if slice.iter().all(Option::is_some) {
            let values: Vec<f64> = slice.iter().map(|v| v.unwrap_or(0.0)).collect();
            let data = Data::new(values);
            out[i] = data.std_dev();
        }
    }
    out
}

/// Relative-strength oscillator: 100 - 100/(1+RS) with
/// RS = rolling average gain / rolling average loss over `period`.
///
/// A window with zero average loss and zero average gain (flat prices) is
/// undefined; zero average loss with positive gain saturates at 100, the
/// limit value.
pub fn rsi(close: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; close.len()];
    if period == 0 || close.len() <= period {
        return out;
    }
    for i in period..close.len() {
        let mut gain_sum = 0.0;
        let mut loss_sum = 0.0;
        for j in i + 1 - period..=i {
            let delta = close[j] - close[j - 1];
            if delta > 0.0 {
                gain_sum += delta;
            } else {
                loss_sum -= delta;
            }
        }
        let avg_gain = gain_sum / period as f64;
        let avg_loss = loss_sum / period as f64;
        out[i] = if avg_loss == 0.0 {
            if avg_gain == 0.0 {
                None
            } else {
                Some(100.0)
            }
        } else {
            let rs = avg_gain / avg_loss;
            Some(100.0 - 100.0 / (1.0 + rs))
        };
    }
    out
}

/// Trend-convergence indicator: fast EMA - slow EMA, its own EMA as the
/// signal line, and their difference as the histogram.
pub fn macd(
    close: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let fast_ema = ema(close, fast);
    let slow_ema = ema(close, slow);
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| f.unwrap_or(0.0) - s.unwrap_or(0.0))
        .collect();
    let signal_line = ema(&line, signal);
    let histogram: Vec<Option<f64>> = line
        .iter()
        .zip(signal_line.iter())
        .map(|(l, s)| s.map(|s| l - s))
        .collect();
    let line_opt = line.into_iter().map(Some).collect();
    (line_opt, signal_line, histogram)
}

/// Band indicator series derived from a moving average +/- k rolling stds.
pub struct BollingerBands {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
    /// (upper - lower) / middle; undefined when the middle band is zero.
    pub width: Vec<Option<f64>>,
    /// (price - lower) / (upper - lower); undefined when the band has no
    /// width (flat window).
    pub position: Vec<Option<f64>>,
}

pub fn bollinger(close: &[f64], period: usize, k: f64) -> BollingerBands {
    let middle = sma(close, period);
    let close_opt: Vec<Option<f64>> = close.iter().copied().map(Some).collect();
    let std = rolling_std(&close_opt, period);

    let n = close.len();
    let mut upper = vec![None; n];
    let mut lower = vec![None; n];
    let mut width = vec![None; n];
    let mut position = vec![None; n];

    for i in 0..n {
        if let (Some(m), Some(s)) = (middle[i], std[i]) {
            let u = m + k * s;
            let l = m - k * s;
            upper[i] = Some(u);
            lower[i] = Some(l);
            if m != 0.0 {
                width[i] = Some((u - l) / m);
            }
            if u - l != 0.0 {
                position[i] = Some((close[i] - l) / (u - l));
            }
        }
    }

    BollingerBands {
        upper,
        middle,
        lower,
        width,
        position,
    }
}

/// Rolling sample std of 1-period returns, annualized by the square root
/// of `periods_per_year` and expressed in percent.
pub fn volatility_pct(close: &[f64], window: usize, periods_per_year: f64) -> Vec<Option<f64>> {
    let returns = pct_change(close, 1);
    rolling_std(&returns, window)
        .into_iter()
        .map(|v| v.map(|s| s * periods_per_year.sqrt() * 100.0))
        .collect()
}

/// Decline from the running maximum, as a fraction (<= 0 everywhere).
pub fn drawdown(close: &[f64]) -> Vec<Option<f64>> {
    let mut out = vec![None; close.len()];
    let mut peak = f64::NEG_INFINITY;
    for (i, &price) in close.iter().enumerate() {
        peak = peak.max(price);
        if peak != 0.0 {
            out[i] = Some((price - peak) / peak);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn sma_warms_up() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert!(approx(out[2].unwrap(), 2.0, 1e-12));
        assert!(approx(out[3].unwrap(), 3.0, 1e-12));
    }

    #[test]
    fn ema_is_defined_from_first_value() {
        let out = ema(&[10.0, 11.0, 12.0], 3);
        assert!(approx(out[0].unwrap(), 10.0, 1e-12));
        // alpha = 0.5: 10 -> 10.5 -> 11.25
        assert!(approx(out[1].unwrap(), 10.5, 1e-12));
        assert!(approx(out[2].unwrap(), 11.25, 1e-12));
    }

    #[test]
    fn rsi_is_undefined_on_flat_series() {
        let flat = vec![50.0; 20];
        let out = rsi(&flat, 6);
        assert!(out.iter().all(Option::is_none));
    }

    #[test]
    fn rsi_saturates_on_monotonic_rise() {
        let rising: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&rising, 6);
        assert_eq!(out[5], None);
        assert!(approx(out[6].unwrap(), 100.0, 1e-12));
        assert!(approx(out[19].unwrap(), 100.0, 1e-12));
    }

    #[test]
    fn rsi_balanced_moves_give_midrange_value() {
        // Alternating +1/-1: average gain equals average loss.
        let mut prices = vec![100.0];
        for i in 0..12 {
            let last = *prices.last().unwrap();
            prices.push(if i % 2 == 0 { last + 1.0 } else { last - 1.0 });
        }
        let out = rsi(&prices, 6);
        assert!(approx(out[12].unwrap(), 50.0, 1e-9));
    }

    #[test]
    fn drawdown_matches_reference_sequence() {
        let out = drawdown(&[100.0, 90.0, 95.0, 80.0, 100.0]);
        let pct: Vec<f64> = out.iter().map(|v| v.unwrap() * 100.0).collect();
        let expected = [0.0, -10.0, -5.0, -20.0, 0.0];
        for (got, want) in pct.iter().zip(expected.iter()) {
            assert!(approx(*got, *want, 0.01), "got {:?}", pct);
        }
    }

    #[test]
    fn drawdown_never_positive() {
        let out = drawdown(&[1.0, 3.0, 2.0, 5.0, 4.0]);
        assert!(out.iter().all(|v| v.unwrap() <= 0.0));
    }

    #[test]
    fn pct_change_guards_zero_base() {
        let out = pct_change(&[0.0, 1.0, 2.0], 1);
        assert_eq!(out[1], None);
        assert!(approx(out[2].unwrap(), 1.0, 1e-12));
    }

    #[test]
    fn rolling_std_propagates_missing_values() {
        let series = vec![None, Some(1.0), Some(2.0), Some(3.0)];
        let out = rolling_std(&series, 3);
        assert_eq!(out[2], None);
        assert!(out[3].is_some());
    }

    #[test]
    fn bollinger_position_undefined_on_flat_window() {
        let flat = vec![10.0; 15];
        let bands = bollinger(&flat, 12, 2.0);
        assert!(bands.position.iter().all(Option::is_none));
        // Width is defined (zero) because the middle band is non-zero.
        assert!(approx(bands.width[12].unwrap(), 0.0, 1e-12));
    }

    #[test]
    fn volatility_is_zero_for_constant_growth() {
        let prices: Vec<f64> = (0..12).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let out = volatility_pct(&prices, 6, 12.0);
        assert!(approx(out[11].unwrap(), 0.0, 1e-9));
    }
}
