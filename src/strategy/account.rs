use super::{Rule, Signal, StrategyKind, StrategyParams};
use crate::models::{Candle, EquityPoint, Metrics, Side, Trade};
use tracing::trace;

/// Cash every strategy starts with, in quote currency.
pub const DEFAULT_START_CASH: f64 = 5000.0;

/// Orders smaller than this are treated as "no money left".
const MIN_QTY: f64 = 1e-9;

/// Sharpe is scaled by the square root of this many bars (one trading day of 1m bars).
const SHARPE_BARS_PER_DAY: f64 = 1440.0;

/// A long-only strategy with its own simulated account.
pub struct Strategy {
    sid: usize,
    name: String,
    params: StrategyParams,
    start_cash: f64,
    cash: f64,
    position: f64,
    trades: Vec<Trade>,
    equity: Vec<EquityPoint>,
    rule: Box<dyn Rule>,
}

impl Strategy {
    /// Creates strategy number `sid` (1-based) from its parameters.
    pub fn new(sid: usize, params: StrategyParams) -> Self {
        let rule = params.build_rule();
        Self {
            sid,
            name: format!("{}: {}", sid, params.kind().label()),
            params,
            start_cash: DEFAULT_START_CASH,
            cash: DEFAULT_START_CASH,
            position: 0.0,
            trades: Vec::new(),
            equity: Vec::new(),
            rule,
        }
    }

    pub fn sid(&self) -> usize {
        self.sid
    }

    /// `"{sid}: {label}"`, e.g. `"1: MACD+RSI"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StrategyKind {
        self.params.kind()
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn fee(&self) -> f64 {
        self.params.fee()
    }

    #[cfg(test)]
    pub fn cash(&self) -> f64 {
        self.cash
    }

    #[cfg(test)]
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    #[cfg(test)]
    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity
    }

    /// Restores the starting account and clears all history.
    pub fn reset(&mut self) {
        self.cash = self.start_cash;
        self.position = 0.0;
        self.trades.clear();
        self.equity.clear();
        self.rule.reset();
    }

    /// Starts from a fresh account and steps through every bar of `candles` in order.
    pub fn run(&mut self, candles: &[Candle]) {
        self.reset();
        self.rule.prepare(candles);
        for i in 0..candles.len() {
            self.step(i, candles);
        }
    }

    /// Steps only the last bar of `candles`, treating the slice as the full
    /// history known so far. Used by the live loop.
    pub fn step_latest(&mut self, candles: &[Candle]) -> Option<Signal> {
        if candles.is_empty() {
            return None;
        }
        self.rule.prepare(candles);
        self.step(candles.len() - 1, candles)
    }

    /// Asks the rule for a signal on bar `i` and executes it against the account.
    ///
    /// Returns the rule's signal whether or not it led to a fill.
    fn step(&mut self, i: usize, candles: &[Candle]) -> Option<Signal> {
        let bar = &candles[i];
        let price = bar.close;
        let fee = self.params.fee();
        let signal = self.rule.decide(i, candles, self.position > 0.0);

        match signal {
            Some(Signal::Buy) if self.position == 0.0 => {
                let qty = self.cash / (price * (1.0 + fee));
                if qty > MIN_QTY {
                    self.cash -= qty * price * (1.0 + fee);
                    self.position = qty;
                    self.record(bar, Side::Buy, price, qty);
                }
            },
            Some(Signal::Sell) if self.position > 0.0 => {
                let qty = self.position;
                self.cash += qty * price * (1.0 - fee);
                self.position = 0.0;
                self.record(bar, Side::Sell, price, qty);
            },
            _ => {},
        }

        self.equity.push(EquityPoint {
            time: bar.open_time,
            equity: self.cash + self.position * price,
        });
        signal
    }

    fn record(&mut self, bar: &Candle, side: Side, price: f64, qty: f64) {
        trace!(sid = self.sid, %side, price, qty, "Fill");
        self.trades.push(Trade {
            time: bar.open_time,
            side,
            price,
            qty,
            sid: self.sid,
        });
    }

    /// Performance summary of the equity curve and trade log, or `None` before the first bar.
    pub fn metrics(&self) -> Option<Metrics> {
        let first = self.equity.iter().position(|p| !p.equity.is_nan())?;
        let t0 = self.equity[first].time;
        let t1 = self.equity.last()?.time;
        let values: Vec<f64> = self
            .equity
            .iter()
            .map(|p| p.equity)
            .filter(|v| !v.is_nan())
            .collect();

        let days = ((t1 - t0).num_milliseconds() as f64 / 86_400_000.0).max(1e-9);

        let returns: Vec<f64> = std::iter::once(0.0)
            .chain(values.windows(2).map(|w| {
                let r = w[1] / w[0] - 1.0;
                if r.is_nan() {
                    0.0
                } else {
                    r
                }
            }))
            .collect();
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let sigma = if returns.len() > 1 {
            (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        let sharpe = if sigma > 0.0 {
            mean / sigma * SHARPE_BARS_PER_DAY.sqrt()
        } else {
            0.0
        };

        let mut peak = values[0];
        let mut max_dd = 0.0_f64;
        for &v in &values {
            peak = peak.max(v);
            if peak > 0.0 {
                max_dd = max_dd.max((peak - v) / peak);
            }
        }

        let start_eq = values[0];
        let end_eq = values[values.len() - 1];
        let years = days / 365.0;
        let cagr = if start_eq > 0.0 {
            (end_eq / start_eq).powf(1.0 / years.max(1e-9)) - 1.0
        } else {
            0.0
        };

        let (mut wins, mut losses) = (0usize, 0usize);
        for pair in self.trades.chunks_exact(2) {
            let (buy, sell) = (&pair[0], &pair[1]);
            if (sell.price - buy.price) * buy.qty > 0.0 {
                wins += 1;
            } else {
                losses += 1;
            }
        }
        let winrate = wins as f64 / (wins + losses).max(1) as f64;

        Some(Metrics {
            sid: self.sid,
            name: self.name.clone(),
            final_equity: end_eq,
            pnl: end_eq - start_eq,
            sharpe,
            max_dd,
            trades: self.trades.len(),
            winrate,
            cagr,
            days,
        })
    }
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("sid", &self.sid)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("cash", &self.cash)
            .field("position", &self.position)
            .field("trades", &self.trades.len())
            .finish()
    }
}
