//! Trade log, equity curve and performance summary structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of an executed order. Strategies are long-only, so `Sell` always flattens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// A filled order as recorded by a strategy or the broker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub time: DateTime<Utc>,
    pub side: Side,
    pub price: f64,
    pub qty: f64,
    /// Id of the strategy that produced the trade (1-based).
    pub sid: usize,
}

/// Mark-to-market account value after a bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    pub equity: f64,
}

/// Performance summary of one strategy run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub sid: usize,
    pub name: String,
    pub final_equity: f64,
    pub pnl: f64,
    pub sharpe: f64,
    pub max_dd: f64,
    pub trades: usize,
    pub winrate: f64,
    pub cagr: f64,
    pub days: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"BUY\"");
        assert_eq!(Side::Sell.to_string(), "SELL");
    }

    #[test]
    fn metrics_json_keys() {
        let m = Metrics {
            sid: 2,
            name: "2: SMA Cross".to_string(),
            final_equity: 5100.0,
            pnl: 100.0,
            sharpe: 0.5,
            max_dd: 0.01,
            trades: 4,
            winrate: 0.5,
            cagr: 0.2,
            days: 1.0,
        };
        let value = serde_json::to_value(&m).unwrap();
        for key in [
            "sid",
            "name",
            "final_equity",
            "pnl",
            "sharpe",
            "max_dd",
            "trades",
            "winrate",
            "cagr",
            "days",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
    }
}
