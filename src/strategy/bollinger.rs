//! Counter-trend mean reversion on Bollinger bands.
//!
//! Entry: close at or below the lower band while RSI is at or below `rsi_buy`.
//! Exit: close back at the middle band, RSI at `rsi_exit`, or the fixed ATR stop
//! placed at entry.

use super::{Rule, Signal};
use crate::indicators::{atr, rolling_std, rsi, sma};
use crate::models::Candle;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BollingerParams {
    pub bb_period: usize,
    pub bb_dev: f64,
    pub rsi_period: usize,
    pub rsi_buy: f64,
    pub rsi_exit: f64,
    pub atr_n: usize,
    pub atr_mult: f64,
    pub fee: f64,
}

impl Default for BollingerParams {
    fn default() -> Self {
        Self {
            bb_period: 20,
            bb_dev: 2.0,
            rsi_period: 14,
            rsi_buy: 35.0,
            rsi_exit: 50.0,
            atr_n: 14,
            atr_mult: 2.0,
            fee: 0.001,
        }
    }
}

impl BollingerParams {
    pub fn grid(fee: f64) -> Vec<Self> {
        let atr_n = 14;
        let mut grid = Vec::new();
        for bb_period in [14, 20, 30] {
            for bb_dev in [1.5, 2.0, 2.5] {
                for rsi_period in [10, 14] {
                    for rsi_buy in [30.0, 35.0, 40.0] {
                        for rsi_exit in [48.0, 50.0, 55.0] {
                            for atr_mult in [1.5, 2.0] {
                                grid.push(Self {
                                    bb_period,
                                    bb_dev,
                                    rsi_period,
                                    rsi_buy,
                                    rsi_exit,
                                    atr_n,
                                    atr_mult,
                                    fee,
                                });
                            }
                        }
                    }
                }
            }
        }
        grid
    }
}

pub(crate) struct Bollinger {
    params: BollingerParams,
    mid: Vec<f64>,
    lower: Vec<f64>,
    rsi: Vec<f64>,
    atr: Vec<f64>,
    stop_px: Option<f64>,
}

impl Bollinger {
    pub(crate) fn new(params: BollingerParams) -> Self {
        Self {
            params,
            mid: Vec::new(),
            lower: Vec::new(),
            rsi: Vec::new(),
            atr: Vec::new(),
            stop_px: None,
        }
    }
}

impl Rule for Bollinger {
    fn prepare(&mut self, candles: &[Candle]) {
        let closes = Candle::closes(candles);
        let p = &self.params;
        self.mid = sma(&closes, p.bb_period);
        self.lower = self
            .mid
            .iter()
            .zip(rolling_std(&closes, p.bb_period))
            .map(|(m, sd)| m - p.bb_dev * sd)
            .collect();
        self.rsi = rsi(&closes, p.rsi_period);
        self.atr = atr(candles, p.atr_n);
    }

    fn decide(&mut self, i: usize, candles: &[Candle], in_position: bool) -> Option<Signal> {
        let p = &self.params;
        if i + 1 < p.bb_period.max(p.rsi_period).max(p.atr_n) + 2 {
            return None;
        }
        let price = candles[i].close;
        let r = self.rsi[i];

        if in_position {
            if matches!(self.stop_px, Some(stop) if price <= stop) {
                self.stop_px = None;
                return Some(Signal::Sell);
            }
            if price >= self.mid[i] || r >= p.rsi_exit {
                self.stop_px = None;
                return Some(Signal::Sell);
            }
        } else if price <= self.lower[i] && r <= p.rsi_buy {
            let atr_now = self.atr[i];
            self.stop_px = (!atr_now.is_nan()).then(|| price - p.atr_mult * atr_now);
            return Some(Signal::Buy);
        }
        None
    }

    fn reset(&mut self) {
        self.stop_px = None;
    }
}
