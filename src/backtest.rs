//! Runs strategies over historical candles.

use crate::models::Candle;
use crate::strategy::{Strategy, StrategyParams};
use tracing::{debug, info};

/// Runs one fresh strategy per parameter set over the same candles.
///
/// Strategies are numbered 1..=n in the order given. Candles whose close is not
/// finite are dropped before anything runs.
pub fn run_backtest_multi(candles: &[Candle], specs: &[StrategyParams]) -> Vec<Strategy> {
    let candles = Candle::retain_finite(candles);
    info!(
        bars = candles.len(),
        strategies = specs.len(),
        "Running backtest"
    );
    specs
        .iter()
        .enumerate()
        .map(|(idx, params)| {
            let mut strategy = Strategy::new(idx + 1, params.clone());
            strategy.run(&candles);
            debug!(
                name = strategy.name(),
                trades = strategy.trades().len(),
                "Strategy finished"
            );
            strategy
        })
        .collect()
}

/// Backtests a single parameter set as strategy 1 without logging.
pub fn run_single(candles: &[Candle], params: &StrategyParams) -> Strategy {
    let mut strategy = Strategy::new(1, params.clone());
    strategy.run(candles);
    strategy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockDataProvider;
    use crate::strategy::{default_choices, StrategyKind};
    use chrono::{TimeZone, Utc};

    fn mock_candles(limit: usize) -> Vec<Candle> {
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        MockDataProvider::new()
            .candles("BTCUSDT", "1m", limit, end)
            .unwrap()
    }

    #[test]
    fn strategies_are_numbered_in_order() {
        let candles = mock_candles(300);
        let strategies = run_backtest_multi(&candles, &default_choices(0.001));
        let names: Vec<&str> = strategies.iter().map(Strategy::name).collect();
        assert_eq!(
            names,
            vec!["1: MACD+RSI", "2: SMA Cross", "3: Donchian", "4: Bollinger MR"]
        );
        for s in &strategies {
            assert_eq!(s.equity_curve().len(), 300);
            assert!(s.trades().iter().all(|t| t.sid == s.sid()));
        }
    }

    #[test]
    fn non_finite_closes_are_dropped() {
        let mut candles = mock_candles(50);
        candles[10].close = f64::NAN;
        candles[20].close = f64::INFINITY;
        let strategies = run_backtest_multi(
            &candles,
            &[StrategyKind::SmaCross.default_params(0.001)],
        );
        assert_eq!(strategies[0].equity_curve().len(), 48);
    }

    #[test]
    fn trades_alternate_buy_and_sell() {
        use crate::models::Side;
        let candles = mock_candles(2000);
        for s in run_backtest_multi(&candles, &default_choices(0.001)) {
            for (i, t) in s.trades().iter().enumerate() {
                let expected = if i % 2 == 0 { Side::Buy } else { Side::Sell };
                assert_eq!(t.side, expected, "{}", s.name());
            }
        }
    }

    #[test]
    fn single_run_matches_multi_run() {
        let candles = mock_candles(500);
        let params = StrategyKind::Donchian.default_params(0.001);
        let single = run_single(&candles, &params);
        let multi = run_backtest_multi(&candles, &[params]);
        assert_eq!(single.trades(), multi[0].trades());
    }
}
