//! Technical indicators used by the trading rules.
//!
//! Every function returns a vector aligned with its input. Positions without a
//! full lookback window hold `NaN`, so comparisons against them are simply false.
//! Values at index `i` depend only on inputs at `0..=i`.

use crate::models::Candle;

/// Applies `f` to every complete, NaN-free window of `n` values.
fn rolling(values: &[f64], n: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if n == 0 {
        return out;
    }
    for i in (n - 1)..values.len() {
        let window = &values[i + 1 - n..=i];
        if window.iter().all(|v| !v.is_nan()) {
            out[i] = f(window);
        }
    }
    out
}

/// Simple moving average over `n` values.
pub fn sma(values: &[f64], n: usize) -> Vec<f64> {
    rolling(values, n, |w| w.iter().sum::<f64>() / w.len() as f64)
}

/// Population standard deviation (ddof 0) over `n` values.
pub fn rolling_std(values: &[f64], n: usize) -> Vec<f64> {
    rolling(values, n, |w| {
        let mean = w.iter().sum::<f64>() / w.len() as f64;
        let var = w.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / w.len() as f64;
        var.sqrt()
    })
}

pub fn rolling_max(values: &[f64], n: usize) -> Vec<f64> {
    rolling(values, n, |w| w.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

pub fn rolling_min(values: &[f64], n: usize) -> Vec<f64> {
    rolling(values, n, |w| w.iter().copied().fold(f64::INFINITY, f64::min))
}

/// Recursive exponential moving average seeded with the first observation.
///
/// `alpha = 2 / (span + 1)`; a missing input carries the previous average forward.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match (prev, v.is_nan()) {
            (None, true) => None,
            (None, false) => Some(v),
            (Some(p), true) => Some(p),
            (Some(p), false) => Some(alpha * v + (1.0 - alpha) * p),
        };
        out.push(next.unwrap_or(f64::NAN));
        prev = next;
    }
    out
}

/// MACD line, signal line and histogram, in that order.
pub fn macd(
    values: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let line: Vec<f64> = ema(values, fast)
        .iter()
        .zip(ema(values, slow))
        .map(|(f, s)| f - s)
        .collect();
    let signal = ema(&line, signal);
    let histogram = line.iter().zip(&signal).map(|(m, s)| m - s).collect();
    (line, signal, histogram)
}

/// Relative Strength Index from simple rolling means of gains and losses.
///
/// The first delta is undefined, so the first value appears at index `period`.
/// A window without losses reads 100; a window without any movement is NaN.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let mut gains = Vec::with_capacity(values.len());
    let mut losses = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        if i == 0 {
            gains.push(f64::NAN);
            losses.push(f64::NAN);
        } else {
            let delta = values[i] - values[i - 1];
            gains.push(delta.max(0.0));
            losses.push((-delta).max(0.0));
        }
    }
    sma(&gains, period)
        .into_iter()
        .zip(sma(&losses, period))
        .map(|(gain, loss)| 100.0 - 100.0 / (1.0 + gain / loss))
        .collect()
}

/// Average True Range over `n` bars.
pub fn atr(candles: &[Candle], n: usize) -> Vec<f64> {
    let true_range: Vec<f64> = candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let range = c.high - c.low;
            match i.checked_sub(1).map(|p| candles[p].close) {
                Some(prev) => range.max((c.high - prev).abs()).max((c.low - prev).abs()),
                None => range,
            }
        })
        .collect();
    sma(&true_range, n)
}
