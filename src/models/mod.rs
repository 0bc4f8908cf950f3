//! Defines the data structures and models used throughout the application.
//!
//! This includes market data fetched from the exchange, the trade log and
//! equity curve a strategy produces, and the performance summary derived from them.

mod market;
mod trade;

pub use market::*;
pub use trade::*;
