//! MACD crossover entries confirmed by RSI, with a percentage trailing stop.

use super::{Rule, Signal};
use crate::indicators::{macd, rsi};
use crate::models::Candle;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacdRsiParams {
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub rsi_period: usize,
    pub rsi_buy: f64,
    pub rsi_sell: f64,
    pub trail_pct: f64,
    pub fee: f64,
}

impl Default for MacdRsiParams {
    fn default() -> Self {
        Self {
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            rsi_period: 14,
            rsi_buy: 55.0,
            rsi_sell: 70.0,
            trail_pct: 0.02,
            fee: 0.001,
        }
    }
}

impl MacdRsiParams {
    pub fn grid(fee: f64) -> Vec<Self> {
        let mut grid = Vec::new();
        for macd_fast in [8, 12, 16] {
            for macd_slow in [21, 26, 32] {
                if macd_fast >= macd_slow {
                    continue;
                }
                for macd_signal in [7, 9, 12] {
                    for rsi_period in [10, 14, 21] {
                        for rsi_buy in [52.0, 55.0, 58.0] {
                            for rsi_sell in [65.0, 70.0, 75.0] {
                                if rsi_buy >= rsi_sell {
                                    continue;
                                }
                                for trail_pct in [0.01, 0.02, 0.03] {
                                    grid.push(Self {
                                        macd_fast,
                                        macd_slow,
                                        macd_signal,
                                        rsi_period,
                                        rsi_buy,
                                        rsi_sell,
                                        trail_pct,
                                        fee,
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
        grid
    }
}

pub(crate) struct MacdRsi {
    params: MacdRsiParams,
    /// MACD line minus signal line.
    spread: Vec<f64>,
    rsi: Vec<f64>,
    high_since_entry: Option<f64>,
}

impl MacdRsi {
    pub(crate) fn new(params: MacdRsiParams) -> Self {
        Self {
            params,
            spread: Vec::new(),
            rsi: Vec::new(),
            high_since_entry: None,
        }
    }
}

impl Rule for MacdRsi {
    fn prepare(&mut self, candles: &[Candle]) {
        let closes = Candle::closes(candles);
        let p = &self.params;
        let (_, _, histogram) = macd(&closes, p.macd_fast, p.macd_slow, p.macd_signal);
        self.spread = histogram;
        self.rsi = rsi(&closes, p.rsi_period);
    }

    fn decide(&mut self, i: usize, candles: &[Candle], in_position: bool) -> Option<Signal> {
        if i < 2 {
            return None;
        }
        let price = candles[i].close;
        let (now, prev) = (self.spread[i], self.spread[i - 1]);
        let rsi_now = self.rsi[i];

        if in_position {
            let high = self.high_since_entry.unwrap_or(price).max(price);
            self.high_since_entry = Some(high);
            let trail_stop = high * (1.0 - self.params.trail_pct);
            let bearish_cross = now < 0.0 && prev > 0.0;
            if bearish_cross || rsi_now >= self.params.rsi_sell || price <= trail_stop {
                self.high_since_entry = None;
                return Some(Signal::Sell);
            }
        } else if now > 0.0 && prev < 0.0 && rsi_now >= self.params.rsi_buy {
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

    #[test]
    fn needs_three_bars() {
        let candles = candles_from_closes(&[1.0, 2.0]);
        let mut rule = MacdRsi::new(MacdRsiParams::default());
        rule.prepare(&candles);
        assert_eq!(rule.decide(1, &candles, false), None);
    }

    #[test]
    fn buys_on_bullish_cross_with_strong_rsi() {
        // Long decline then a sharp rally: the spread crosses above zero while RSI is high.
        let mut closes: Vec<f64> = (0..40).map(|i| 100.0 - i as f64 * 0.5).collect();
        closes.extend((1..=15).map(|i| 80.0 + i as f64 * 2.0));
        let candles = candles_from_closes(&closes);

        let params = MacdRsiParams {
            rsi_buy: 0.0,
            ..Default::default()
        };
        let mut rule = MacdRsi::new(params);
        rule.prepare(&candles);
        let first_buy = (0..candles.len()).find(|&i| rule.decide(i, &candles, false) == Some(Signal::Buy));
        let i = first_buy.expect("a bullish crossover");
        assert!(i >= 40);
        assert!(rule.spread[i] > 0.0 && rule.spread[i - 1] < 0.0);
        assert_eq!(rule.high_since_entry, Some(candles[i].close));
    }

    #[test]
    fn trailing_stop_exits_position() {
        let candles = candles_from_closes(&[100.0, 100.0, 100.0, 110.0, 107.0]);
        let params = MacdRsiParams {
            trail_pct: 0.02,
            rsi_sell: 1000.0,
            ..Default::default()
        };
        let mut rule = MacdRsi::new(params);
        rule.prepare(&candles);
        rule.high_since_entry = Some(100.0);
        // 110 raises the high; no stop yet unless the spread crossed down.
        let at_high = rule.decide(3, &candles, true);
        assert_eq!(at_high, None);
        assert_eq!(rule.high_since_entry, Some(110.0));
        // 107 <= 110 * 0.98 = 107.8
        assert_eq!(rule.decide(4, &candles, true), Some(Signal::Sell));
        assert_eq!(rule.high_since_entry, None);
    }
}
