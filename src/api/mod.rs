//! Provides clients and utilities for obtaining market data and placing orders.
//!
//! Includes:
//! - `binance`: Client for the Binance spot REST API.
//! - `mock`: Deterministic synthetic candles for offline runs and API fallback.

mod binance;
mod mock;


pub use binance::*;
pub use mock::*;
