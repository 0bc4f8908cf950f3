//! Market data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV bar (a Binance "kline").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time of the bar.
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Closing prices of a candle slice, in order.
    pub fn closes(candles: &[Candle]) -> Vec<f64> {
        candles.iter().map(|c| c.close).collect()
    }

    /// Drops bars without a usable close price.
    pub fn retain_finite(candles: &[Candle]) -> Vec<Candle> {
        candles
            .iter()
            .filter(|c| c.close.is_finite())
            .copied()
            .collect()
    }
}

/// Candle interval understood by the klines endpoint.
///
/// Returns the bar length in seconds, or `None` for strings Binance does not accept.
pub fn interval_seconds(interval: &str) -> Option<i64> {
    let secs = match interval {
        "1s" => 1,
        "1m" => 60,
        "3m" => 3 * 60,
        "5m" => 5 * 60,
        "15m" => 15 * 60,
        "30m" => 30 * 60,
        "1h" => 3600,
        "2h" => 2 * 3600,
        "4h" => 4 * 3600,
        "6h" => 6 * 3600,
        "8h" => 8 * 3600,
        "12h" => 12 * 3600,
        "1d" => 86_400,
        "3d" => 3 * 86_400,
        "1w" => 7 * 86_400,
        // Calendar months vary; 30 days is close enough for synthetic spacing.
        "1M" => 30 * 86_400,
        _ => return None,
    };
    Some(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(close: f64) -> Candle {
        Candle {
            open_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn retain_finite_drops_nan_closes() {
        let candles = vec![candle(1.0), candle(f64::NAN), candle(3.0)];
        let kept = Candle::retain_finite(&candles);
        assert_eq!(Candle::closes(&kept), vec![1.0, 3.0]);
    }

    #[test]
    fn interval_parsing() {
        assert_eq!(interval_seconds("1m"), Some(60));
        assert_eq!(interval_seconds("4h"), Some(14_400));
        assert_eq!(interval_seconds("7m"), None);
    }

    #[test]
    fn monthly_interval_is_case_sensitive() {
        assert_eq!(interval_seconds("1M"), Some(30 * 86_400));
        assert_eq!(interval_seconds("1m"), Some(60));
        assert_eq!(interval_seconds("1mo"), None);
    }
}
