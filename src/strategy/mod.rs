//! Trading strategies.
//!
//! A [`Strategy`] owns the simulated account (cash, position, trade log, equity
//! curve) and delegates the buy/sell decision to a [`Rule`]. Rules precompute
//! their indicator columns once per candle window in [`Rule::prepare`] and are
//! then asked bar by bar for a signal.

mod account;
mod bollinger;
mod donchian;
mod macd_rsi;
mod params;
mod sma_cross;

pub use account::*;
pub use params::*;

use crate::models::Candle;
use std::fmt;

/// What a rule wants to do on the current bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
        }
    }
}

/// Signal logic of a strategy.
///
/// `decide(i, ..)` must only read indicator values at indices `<= i`; this is
/// what makes a single `prepare` over the whole history equivalent to
/// recomputing indicators on every growing prefix.
pub trait Rule: Send + Sync {
    /// Recomputes indicator columns for `candles`.
    fn prepare(&mut self, candles: &[Candle]);

    /// Signal for bar `i` of the window last passed to [`Rule::prepare`].
    fn decide(&mut self, i: usize, candles: &[Candle], in_position: bool) -> Option<Signal>;

    /// Forgets stop levels and other per-position state.
    fn reset(&mut self);
}
