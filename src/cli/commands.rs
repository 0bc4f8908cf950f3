use crate::api::{BinanceClient, MockDataProvider};
use crate::backtest::run_backtest_multi;
use crate::broker::DEFAULT_QTY_PRECISION;
use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::live::{resolve_live_symbol, run_live, LiveConfig, LiveMode};
use crate::models::{interval_seconds, Candle};
use crate::optimizer::{optimise_all, SearchConfig};
use crate::report::{metrics_json, metrics_table, strategy_report};
use crate::strategy::{default_choices, Strategy, StrategyKind, DEFAULT_FEE};
use crate::viewer::InteractiveViewer;
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::*;
use tracing::{info, warn};

/// Symbols backtested when none are given.
pub const DEFAULT_SYMBOLS: [&str; 3] = ["BTCUSDT", "ETHUSDT", "SOLUSDT"];

/// Backtest, optimise and live-trade crypto strategies on Binance
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Backtest the default strategy set on one or more symbols
    Backtest(BacktestArgs),

    /// Grid-search MACD+RSI, SMA Cross and Donchian, then backtest the winners
    Optimize(OptimizeArgs),

    /// Trade one symbol live (paper by default), re-optimising periodically
    Live(LiveArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BacktestArgs {
    /// Comma separated symbols
    #[arg(long, value_delimiter = ',', default_value = "BTCUSDT,ETHUSDT,SOLUSDT")]
    pub symbols: Vec<String>,

    /// Candle interval (1m, 5m, 1h, ...)
    #[arg(long, default_value = "1m")]
    pub interval: String,

    /// Number of candles per symbol
    #[arg(long, default_value_t = 1000)]
    pub limit: usize,

    /// Fee per fill, e.g. 0.001 for 0.1%
    #[arg(long, default_value_t = DEFAULT_FEE)]
    pub fee: f64,

    /// Print metrics as JSON instead of tables
    #[arg(long)]
    pub json: bool,

    /// Browse the results interactively afterwards
    #[arg(long)]
    pub interactive: bool,

    /// Use generated candles instead of the Binance API
    #[arg(long)]
    pub synthetic: bool,
}

#[derive(Args, Debug, Clone)]
pub struct OptimizeArgs {
    #[arg(long, default_value = "BTCUSDT")]
    pub symbol: String,

    #[arg(long, default_value = "1m")]
    pub interval: String,

    #[arg(long, default_value_t = 1000)]
    pub limit: usize,

    #[arg(long, default_value_t = DEFAULT_FEE)]
    pub fee: f64,

    /// Minimum number of fills for a parameter set to qualify
    #[arg(long, default_value_t = 6)]
    pub min_trades: usize,

    /// Maximum drawdown (fraction) a parameter set may have
    #[arg(long, default_value_t = 0.25)]
    pub max_dd_cap: f64,

    #[arg(long)]
    pub synthetic: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LiveArgs {
    /// Only the first symbol is traded
    #[arg(long, value_delimiter = ',', default_value = "BTCUSDT")]
    pub symbols: Vec<String>,

    /// Only 1m is supported: polls read 1m candles
    #[arg(long, default_value = "1m")]
    pub interval: String,

    /// Simulate fills locally
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub paper: bool,

    /// Send real orders to the spot testnet rather than production
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub testnet: bool,

    /// Polls between re-optimisations
    #[arg(long, default_value_t = 120)]
    pub reopt_every: usize,

    /// Candles of history kept and optimised on
    #[arg(long, default_value_t = 1000)]
    pub hist_bars: usize,

    /// Seconds between polls
    #[arg(long, default_value_t = 10)]
    pub loop_sec: u64,

    #[arg(long, value_enum, default_value_t = LiveMode::Best)]
    pub live_mode: LiveMode,

    #[arg(long, default_value_t = DEFAULT_FEE)]
    pub fee: f64,

    /// Decimals order quantities are rounded down to
    #[arg(long, default_value_t = DEFAULT_QTY_PRECISION)]
    pub qty_precision: u32,
}

impl Default for BacktestArgs {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            interval: "1m".to_string(),
            limit: 1000,
            fee: DEFAULT_FEE,
            json: false,
            interactive: false,
            synthetic: false,
        }
    }
}

impl Default for OptimizeArgs {
    fn default() -> Self {
        let search = SearchConfig::default();
        Self {
            symbol: "BTCUSDT".to_string(),
            interval: "1m".to_string(),
            limit: 1000,
            fee: search.fee,
            min_trades: search.min_trades,
            max_dd_cap: search.max_dd_cap,
            synthetic: false,
        }
    }
}

impl Default for LiveArgs {
    fn default() -> Self {
        let cfg = LiveConfig::default();
        Self {
            symbols: vec![cfg.symbol],
            interval: cfg.interval,
            paper: cfg.paper,
            testnet: cfg.testnet,
            reopt_every: cfg.reopt_every,
            hist_bars: cfg.hist_bars,
            loop_sec: cfg.loop_sec,
            live_mode: cfg.mode,
            fee: cfg.search.fee,
            qty_precision: cfg.qty_precision,
        }
    }
}

/// Upper-cased, trimmed, non-empty symbols in the given order.
pub fn normalize_symbols(symbols: &[String]) -> Vec<String> {
    symbols
        .iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// CLI application
pub struct App {
    settings: Settings,
    market: BinanceClient,
    mock_provider: MockDataProvider,
}

impl App {
    /// Reads settings from the environment and targets the production market data API.
    pub fn new() -> Self {
        let settings = Settings::from_env();
        let market = BinanceClient::new(&settings.rest_url);
        Self::with_parts(settings, market)
    }

    pub fn with_parts(settings: Settings, market: BinanceClient) -> Self {
        Self {
            settings,
            market,
            mock_provider: MockDataProvider::new(),
        }
    }

    pub async fn run_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Backtest(args) => self.backtest(&args).await,
            Commands::Optimize(args) => self.optimize(&args).await,
            Commands::Live(args) => self.live(&args).await,
        }
    }

    /// Klines from Binance, or generated candles when asked for or when the API fails.
    pub async fn load_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
        synthetic: bool,
    ) -> Result<Vec<Candle>> {
        if interval_seconds(interval).is_none() {
            return Err(AppError::Cli(format!("Unsupported interval: {}", interval)));
        }
        if synthetic {
            return self.mock_provider.candles(symbol, interval, limit, Utc::now());
        }
        match self.market.fetch_klines(symbol, interval, limit, None).await {
            Ok(candles) => Ok(candles),
            Err(e) => {
                warn!(%symbol, error = %e, "API request failed, using mock data instead");
                println!(
                    "{} {}",
                    "Binance unavailable, using synthetic candles:".yellow(),
                    e
                );
                self.mock_provider.candles(symbol, interval, limit, Utc::now())
            },
        }
    }

    /// Backtests the default strategy set on every symbol and prints the results.
    pub async fn backtest(&self, args: &BacktestArgs) -> Result<()> {
        let symbols = normalize_symbols(&args.symbols);
        if symbols.is_empty() {
            return Err(AppError::Cli("No symbols given".to_string()));
        }
        let specs = default_choices(args.fee);

        let mut data = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let candles = self
                .load_candles(&symbol, &args.interval, args.limit, args.synthetic)
                .await?;
            info!(%symbol, bars = candles.len(), "Loaded candles");
            data.push((symbol, candles));
        }

        if args.interactive {
            let mut viewer = InteractiveViewer::new(data, specs)?;
            return viewer.run();
        }

        for (symbol, candles) in &data {
            let strategies = run_backtest_multi(candles, &specs);
            self.print_results(symbol, &args.interval, candles, &strategies, args.json)?;
        }
        Ok(())
    }

    /// Optimises each tunable kind on one symbol, then backtests the winners together.
    pub async fn optimize(&self, args: &OptimizeArgs) -> Result<()> {
        let symbol = args.symbol.trim().to_uppercase();
        let candles = self
            .load_candles(&symbol, &args.interval, args.limit, args.synthetic)
            .await?;
        let cfg = SearchConfig {
            fee: args.fee,
            min_trades: args.min_trades,
            max_dd_cap: args.max_dd_cap,
        };

        let winners = optimise_all(&candles, &StrategyKind::OPTIMIZABLE, &cfg, true)?;
        for winner in &winners {
            let kind = winner.params.kind();
            match &winner.metrics {
                Some(metrics) => {
                    println!("{} {}:", "Best".green().bold(), kind);
                    println!("{}", metrics_json(metrics)?);
                },
                None => println!(
                    "{} {}: no parameter set met the constraints, using defaults",
                    "Best".yellow().bold(),
                    kind
                ),
            }
        }

        let winners: Vec<_> = winners.into_iter().map(|w| w.params).collect();
        let strategies = run_backtest_multi(&candles, &winners);
        self.print_results(&symbol, &args.interval, &candles, &strategies, false)
    }

    pub async fn live(&self, args: &LiveArgs) -> Result<()> {
        let cfg = LiveConfig {
            symbol: resolve_live_symbol(&args.symbols),
            interval: args.interval.clone(),
            paper: args.paper,
            testnet: args.testnet,
            reopt_every: args.reopt_every,
            hist_bars: args.hist_bars,
            loop_sec: args.loop_sec,
            mode: args.live_mode,
            kinds: StrategyKind::OPTIMIZABLE.to_vec(),
            search: SearchConfig {
                fee: args.fee,
                ..Default::default()
            },
            qty_precision: args.qty_precision,
        };
        println!(
            "{}",
            format!(
                "Live on {}, paper={}, mode={:?} (Ctrl-C to stop)",
                cfg.symbol, cfg.paper, cfg.mode
            )
            .cyan()
        );
        run_live(cfg, &self.settings).await
    }

    fn print_results(
        &self,
        symbol: &str,
        interval: &str,
        candles: &[Candle],
        strategies: &[Strategy],
        json: bool,
    ) -> Result<()> {
        if json {
            for metrics in strategies.iter().filter_map(Strategy::metrics) {
                println!("{}", metrics_json(&metrics)?);
            }
            return Ok(());
        }
        println!(
            "{}",
            metrics_table(strategies, &format!("{} {} backtest", symbol, interval))
                .bold()
        );
        for s in strategies {
            println!("\n{}", strategy_report(s, candles));
        }
        Ok(())
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
