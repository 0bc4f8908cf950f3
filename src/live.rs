//! Live trading loop: poll the latest candle, re-optimise now and then, and
//! route the combined strategy signal to the broker.

use crate::api::BinanceClient;
use crate::backtest::run_single;
use crate::broker::Broker;
use crate::broker::DEFAULT_QTY_PRECISION;
use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::models::Candle;
use crate::optimizer::{grid_search_one, optimise_all, SearchConfig};
use crate::strategy::{Signal, Strategy, StrategyKind, StrategyParams, DEFAULT_START_CASH};
use clap::ValueEnum;
use std::time::Duration;
use tracing::{error, info, warn};

/// Symbol traded when none is given.
pub const DEFAULT_LIVE_SYMBOL: &str = "BTCUSDT";

/// Bar size of the live history; `BinanceClient::latest_candle` polls 1m bars.
pub const LIVE_INTERVAL: &str = "1m";

/// How the candidate strategies are turned into orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LiveMode {
    /// Trade only the candidate with the best Sharpe ratio
    Best,
    /// Run every candidate and trade on a majority vote
    All,
}

#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub symbol: String,
    pub interval: String,
    pub paper: bool,
    pub testnet: bool,
    /// Polls between re-optimisations.
    pub reopt_every: usize,
    /// Candles kept as history and used for optimisation.
    pub hist_bars: usize,
    pub loop_sec: u64,
    pub mode: LiveMode,
    pub kinds: Vec<StrategyKind>,
    pub search: SearchConfig,
    /// Decimals exchange order quantities are rounded down to.
    pub qty_precision: u32,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            symbol: DEFAULT_LIVE_SYMBOL.to_string(),
            interval: LIVE_INTERVAL.to_string(),
            paper: true,
            testnet: true,
            reopt_every: 120,
            hist_bars: 1000,
            loop_sec: 10,
            mode: LiveMode::Best,
            kinds: StrategyKind::OPTIMIZABLE.to_vec(),
            search: SearchConfig::default(),
            qty_precision: DEFAULT_QTY_PRECISION,
        }
    }
}

impl LiveConfig {
    /// Polls only ever see 1m bars, so any other history interval would mix bar sizes.
    pub fn validate(&self) -> Result<()> {
        if self.interval != LIVE_INTERVAL {
            return Err(AppError::Cli(format!(
                "Live trading runs on {} candles, got --interval {}",
                LIVE_INTERVAL, self.interval
            )));
        }
        Ok(())
    }
}

/// The live loop trades a single symbol: the first distinct upper-cased entry.
pub fn resolve_live_symbol(symbols: &[String]) -> String {
    let mut seen: Vec<String> = Vec::new();
    for s in symbols {
        let s = s.trim().to_uppercase();
        if !s.is_empty() && !seen.contains(&s) {
            seen.push(s);
        }
    }
    if seen.len() > 1 {
        info!(ignored = ?&seen[1..], "Live mode trades one symbol");
    }
    seen.into_iter()
        .next()
        .unwrap_or_else(|| DEFAULT_LIVE_SYMBOL.to_string())
}

/// Single signal in `Best` mode, strict majority of all candidates in `All` mode.
pub fn combine_signals(mode: LiveMode, signals: &[Option<Signal>]) -> Option<Signal> {
    match mode {
        LiveMode::Best => signals.first().copied().flatten(),
        LiveMode::All => {
            let half = signals.len() / 2;
            let buys = signals.iter().filter(|s| **s == Some(Signal::Buy)).count();
            let sells = signals.iter().filter(|s| **s == Some(Signal::Sell)).count();
            if sells > half {
                Some(Signal::Sell)
            } else if buys > half {
                Some(Signal::Buy)
            } else {
                None
            }
        },
    }
}

/// Grid winner for `kind`, or its defaults, with the Sharpe ratio of that choice.
fn tune(candles: &[Candle], kind: StrategyKind, search: &SearchConfig) -> (StrategyParams, f64) {
    match grid_search_one(candles, kind, search, None) {
        Some((params, metrics)) => (params, metrics.sharpe),
        None => {
            let params = kind.default_params(search.fee);
            let sharpe = run_single(candles, &params)
                .metrics()
                .map_or(f64::NEG_INFINITY, |m| m.sharpe);
            warn!(%kind, "No qualifying parameters, trading defaults");
            (params, sharpe)
        },
    }
}

/// Rolling history and the strategies currently trading it.
pub struct LiveSession {
    mode: LiveMode,
    hist_bars: usize,
    reopt_every: usize,
    search: SearchConfig,
    /// Kinds being traded: the chosen one in `Best` mode, all candidates in `All` mode.
    active: Vec<StrategyKind>,
    history: Vec<Candle>,
    strategies: Vec<Strategy>,
    polls_since_opt: usize,
}

impl LiveSession {
    /// Optimises every candidate on `history` and sets up the strategies to trade.
    pub fn start(history: Vec<Candle>, cfg: &LiveConfig) -> Self {
        let history = Candle::retain_finite(&history);
        let tuned: Vec<(StrategyKind, StrategyParams, f64)> = cfg
            .kinds
            .iter()
            .map(|&kind| {
                let (params, sharpe) = tune(&history, kind, &cfg.search);
                (kind, params, sharpe)
            })
            .collect();

        let mut best: Option<usize> = None;
        for (idx, (_, _, sharpe)) in tuned.iter().enumerate() {
            if *sharpe > best.map_or(-1e9, |b| tuned[b].2) {
                best = Some(idx);
            }
        }
        let best = best.unwrap_or(0);
        if let Some((kind, params, sharpe)) = tuned.get(best) {
            info!(%kind, sharpe, ?params, "Chosen strategy");
        }

        let (active, params): (Vec<StrategyKind>, Vec<StrategyParams>) = match cfg.mode {
            LiveMode::Best => tuned
                .into_iter()
                .nth(best)
                .map(|(k, p, _)| (vec![k], vec![p]))
                .unwrap_or_default(),
            LiveMode::All => tuned.into_iter().map(|(k, p, _)| (k, p)).unzip(),
        };

        let mut session = Self {
            mode: cfg.mode,
            hist_bars: cfg.hist_bars.max(1),
            reopt_every: cfg.reopt_every.max(1),
            search: cfg.search,
            active,
            history,
            strategies: Vec::new(),
            polls_since_opt: 0,
        };
        session.install(params);
        session
    }

    fn install(&mut self, params: Vec<StrategyParams>) {
        self.strategies = params
            .into_iter()
            .enumerate()
            .map(|(i, p)| Strategy::new(i + 1, p))
            .collect();
        for s in &self.strategies {
            info!(name = s.name(), params = ?s.params(), "Trading");
        }
    }

    #[cfg(test)]
    pub fn history(&self) -> &[Candle] {
        &self.history
    }

    #[cfg(test)]
    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Replaces the last candle when it has the same open time, appends newer
    /// ones, then trims the history to `hist_bars`. Older candles are dropped.
    pub fn apply_candle(&mut self, candle: Candle) {
        if !candle.close.is_finite() {
            warn!(open_time = %candle.open_time, "Ignoring candle without a close");
            return;
        }
        match self.history.last_mut() {
            Some(last) if last.open_time == candle.open_time => *last = candle,
            Some(last) if last.open_time > candle.open_time => {
                warn!(open_time = %candle.open_time, "Ignoring out-of-order candle");
                return;
            },
            _ => self.history.push(candle),
        }
        if self.history.len() > self.hist_bars {
            let excess = self.history.len() - self.hist_bars;
            self.history.drain(..excess);
        }
    }

    /// Counts a poll and reports whether re-optimisation is due.
    pub fn tick(&mut self) -> bool {
        self.polls_since_opt += 1;
        self.polls_since_opt >= self.reopt_every
    }

    /// Re-tunes the active kinds on fresh history and restarts their strategies.
    pub fn reoptimise(&mut self, history: Vec<Candle>) -> Result<()> {
        let history = Candle::retain_finite(&history);
        let params = optimise_all(&history, &self.active, &self.search, false)?
            .into_iter()
            .map(|w| w.params)
            .collect();
        info!(kinds = ?self.active, "Re-optimised live strategies");
        self.history = history;
        if self.history.len() > self.hist_bars {
            let excess = self.history.len() - self.hist_bars;
            self.history.drain(..excess);
        }
        self.install(params);
        self.polls_since_opt = 0;
        Ok(())
    }

    /// Steps every strategy on the current history and combines their signals.
    pub fn signal(&mut self) -> Option<Signal> {
        let history = &self.history;
        let signals: Vec<Option<Signal>> = self
            .strategies
            .iter_mut()
            .map(|s| s.step_latest(history))
            .collect();
        combine_signals(self.mode, &signals)
    }
}

/// The last `bars` 1m candles, the same bar size the polls deliver.
async fn fetch_history(market: &BinanceClient, symbol: &str, bars: usize) -> Result<Vec<Candle>> {
    market.fetch_klines(symbol, LIVE_INTERVAL, bars, None).await
}

/// Runs the live loop until Ctrl-C.
pub async fn run_live(cfg: LiveConfig, settings: &Settings) -> Result<()> {
    cfg.validate()?;
    info!(
        symbol = %cfg.symbol,
        paper = cfg.paper,
        testnet = cfg.testnet,
        mode = ?cfg.mode,
        "Starting live session"
    );

    let market = BinanceClient::new(&settings.rest_url);
    let history = fetch_history(&market, &cfg.symbol, cfg.hist_bars).await?;
    let mut session = tokio::task::block_in_place(|| LiveSession::start(history, &cfg));
    let mut broker = Broker::new(
        &cfg.symbol,
        cfg.search.fee,
        cfg.paper,
        cfg.testnet,
        DEFAULT_START_CASH,
        settings,
    )
    .with_qty_precision(cfg.qty_precision);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Stopped");
                break;
            }
            _ = async {
                if let Err(e) = poll_once(&market, &cfg, &mut session, &mut broker).await {
                    error!(error = %e, "Live error");
                }
                tokio::time::sleep(Duration::from_secs(cfg.loop_sec)).await;
            } => {}
        }
    }
    Ok(())
}

async fn poll_once(
    market: &BinanceClient,
    cfg: &LiveConfig,
    session: &mut LiveSession,
    broker: &mut Broker,
) -> Result<()> {
    let candle = market.latest_candle(&cfg.symbol).await?;
    session.apply_candle(candle);

    if session.tick() {
        let fresh = fetch_history(market, &cfg.symbol, cfg.hist_bars).await?;
        tokio::task::block_in_place(|| session.reoptimise(fresh))?;
    }

    let px = candle.close;
    match session.signal() {
        Some(Signal::Buy) if broker.position() == 0.0 => {
            broker.market_buy(broker.cash() / px, Some(px)).await?;
        },
        Some(Signal::Sell) if broker.position() > 0.0 => {
            broker.market_sell(broker.position(), Some(px)).await?;
        },
        _ => {},
    }
    info!(
        symbol = %broker.symbol(),
        price = px,
        equity = broker.equity(px),
        pos = broker.position(),
        fills = broker.trades().len(),
        "Live status"
    );
    Ok(())
}
