//! Fast/slow simple moving average crossover with an RSI filter and trailing stop.

use super::{Rule, Signal};
use crate::indicators::{rsi, sma};
use crate::models::Candle;
use serde::Serialize;

/// RSI level above which an open position is always closed.
const RSI_OVERBOUGHT: f64 = 70.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmaCrossParams {
    pub fast: usize,
    pub slow: usize,
    pub rsi_period: usize,
    pub rsi_filter: f64,
    pub trail_pct: f64,
    pub fee: f64,
}

impl Default for SmaCrossParams {
    fn default() -> Self {
        Self {
            fast: 10,
            slow: 30,
            rsi_period: 14,
            rsi_filter: 50.0,
            trail_pct: 0.02,
            fee: 0.001,
        }
    }
}

impl SmaCrossParams {
    pub fn grid(fee: f64) -> Vec<Self> {
        let mut grid = Vec::new();
        for fast in [7, 10, 14] {
            for slow in [25, 30, 40] {
                if fast >= slow {
                    continue;
                }
                for rsi_period in [10, 14, 21] {
                    for rsi_filter in [48.0, 50.0, 55.0] {
                        for trail_pct in [0.01, 0.02, 0.03] {
                            grid.push(Self {
                                fast,
                                slow,
                                rsi_period,
                                rsi_filter,
                                trail_pct,
                                fee,
                            });
                        }
                    }
                }
            }
        }
        grid
    }
}

pub(crate) struct SmaCross {
    params: SmaCrossParams,
    /// Fast SMA minus slow SMA.
    spread: Vec<f64>,
    rsi: Vec<f64>,
    high_since_entry: Option<f64>,
}

impl SmaCross {
    pub(crate) fn new(params: SmaCrossParams) -> Self {
        Self {
            params,
            spread: Vec::new(),
            rsi: Vec::new(),
            high_since_entry: None,
        }
    }
}

impl Rule for SmaCross {
    fn prepare(&mut self, candles: &[Candle]) {
        let closes = Candle::closes(candles);
        let fast = sma(&closes, self.params.fast);
        let slow = sma(&closes, self.params.slow);
        self.spread = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        self.rsi = rsi(&closes, self.params.rsi_period);
    }

    fn decide(&mut self, i: usize, candles: &[Candle], in_position: bool) -> Option<Signal> {
        if i + 1 < self.params.fast.max(self.params.slow) + 2 {
            return None;
        }
        let price = candles[i].close;
        let (now, prev) = (self.spread[i], self.spread[i - 1]);
        let r = self.rsi[i];

        if in_position {
            let high = self.high_since_entry.unwrap_or(price).max(price);
            self.high_since_entry = Some(high);
            if price <= high * (1.0 - self.params.trail_pct)
                || (now < 0.0 && prev > 0.0)
                || r > RSI_OVERBOUGHT
            {
                self.high_since_entry = None;
                return Some(Signal::Sell);
            }
        } else if now > 0.0 && prev < 0.0 && r >= self.params.rsi_filter {
            self.high_since_entry = Some(price);
            return Some(Signal::Buy);
        }
        None
    }

    fn reset(&mut self) {
        self.high_since_entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::candles_from_closes;

    fn small() -> SmaCrossParams {
        SmaCrossParams {
            fast: 2,
            slow: 4,
            rsi_period: 2,
            rsi_filter: 50.0,
            trail_pct: 0.5,
            fee: 0.0,
        }
    }

    #[test]
    fn waits_for_warmup() {
        let candles = candles_from_closes(&[5.0, 4.0, 3.0, 2.0, 9.0]);
        let mut rule = SmaCross::new(small());
        rule.prepare(&candles);
        // Needs max(fast, slow) + 2 = 6 bars.
        assert!((0..candles.len()).all(|i| rule.decide(i, &candles, false).is_none()));
    }

    #[test]
    fn golden_cross_buys_and_overbought_rsi_sells() {
        let candles = candles_from_closes(&[10.0, 9.0, 8.0, 7.0, 6.0, 5.0, 9.0, 12.0]);
        let mut rule = SmaCross::new(small());
        rule.prepare(&candles);
        // Bar 6: fast 7.0 vs slow 6.75 (prev 5.5 vs 6.5) and RSI 80.
        assert_eq!(rule.decide(6, &candles, false), Some(Signal::Buy));
        // Bar 7: two up moves in the RSI window -> RSI 100 > 70.
        assert_eq!(rule.decide(7, &candles, true), Some(Signal::Sell));
    }
}
