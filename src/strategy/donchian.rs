//! Donchian channel breakout with an ATR-based trailing stop.

use super::{Rule, Signal};
use crate::indicators::{atr, rolling_max, rolling_min};
use crate::models::Candle;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DonchianParams {
    /// Entry channel length.
    pub ch: usize,
    /// Exit channel length.
    pub exit_ch: usize,
    pub atr_n: usize,
    pub atr_mult: f64,
    pub fee: f64,
}

impl Default for DonchianParams {
    fn default() -> Self {
        Self {
            ch: 20,
            exit_ch: 10,
            atr_n: 14,
            atr_mult: 2.0,
            fee: 0.001,
        }
    }
}

impl DonchianParams {
    pub fn grid(fee: f64) -> Vec<Self> {
        let atr_n = 14;
        let mut grid = Vec::new();
        for ch in [20, 30] {
            for exit_ch in [10, 15] {
                for atr_mult in [2.0, 2.5] {
                    grid.push(Self {
                        ch,
                        exit_ch,
                        atr_n,
                        atr_mult,
                        fee,
                    });
                }
            }
        }
        grid
    }
}

pub(crate) struct Donchian {
    params: DonchianParams,
    channel_high: Vec<f64>,
    exit_low: Vec<f64>,
    atr: Vec<f64>,
    trailing: Option<f64>,
}

impl Donchian {
    pub(crate) fn new(params: DonchianParams) -> Self {
        Self {
            params,
            channel_high: Vec::new(),
            exit_low: Vec::new(),
            atr: Vec::new(),
            trailing: None,
        }
    }
}

impl Rule for Donchian {
    fn prepare(&mut self, candles: &[Candle]) {
        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
        self.channel_high = rolling_max(&highs, self.params.ch);
        self.exit_low = rolling_min(&lows, self.params.exit_ch);
        self.atr = atr(candles, self.params.atr_n);
    }

    fn decide(&mut self, i: usize, candles: &[Candle], in_position: bool) -> Option<Signal> {
        if i + 1 < self.params.ch.max(self.params.exit_ch) + 2 {
            return None;
        }
        let price = candles[i].close;
        let stop_candidate = price - self.params.atr_mult * self.atr[i];

        if !in_position {
            // Break above the channel as it stood on the previous bar.
            if candles[i].close > self.channel_high[i - 1] {
                self.trailing = Some(stop_candidate);
                return Some(Signal::Buy);
            }
        } else {
            // f64::max ignores a NaN candidate, so an undefined ATR never lowers the stop.
            let trailing = self.trailing.unwrap_or(f64::NEG_INFINITY).max(stop_candidate);
            self.trailing = Some(trailing);
            if candles[i].close < self.exit_low[i] || price < trailing {
                self.trailing = None;
                return Some(Signal::Sell);
            }
        }
        None
    }

    fn reset(&mut self) {
        self.trailing = None;
    }
}
