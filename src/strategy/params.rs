//! Strategy catalogue: which rules exist, their default parameters and search grids.

use super::bollinger::{Bollinger, BollingerParams};
use super::donchian::{Donchian, DonchianParams};
use super::macd_rsi::{MacdRsi, MacdRsiParams};
use super::sma_cross::{SmaCross, SmaCrossParams};
use super::Rule;
use clap::ValueEnum;
use serde::Serialize;
use std::fmt;

/// Trading fee per fill used when nothing else is configured (0.1%).
pub const DEFAULT_FEE: f64 = 0.001;

/// The built-in strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// MACD crossovers filtered by RSI, with a trailing stop
    MacdRsi,
    /// Fast/slow SMA crossovers filtered by RSI, with a trailing stop
    SmaCross,
    /// Donchian channel breakouts with an ATR trailing stop
    Donchian,
    /// Bollinger band mean reversion with an RSI filter and ATR stop
    Bollinger,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::MacdRsi,
        StrategyKind::SmaCross,
        StrategyKind::Donchian,
        StrategyKind::Bollinger,
    ];

    /// Kinds that take part in optimisation and live trading by default.
    pub const OPTIMIZABLE: [StrategyKind; 3] = [
        StrategyKind::MacdRsi,
        StrategyKind::SmaCross,
        StrategyKind::Donchian,
    ];

    /// Short label used in strategy names and report legends.
    pub fn label(&self) -> &'static str {
        match self {
            StrategyKind::MacdRsi => "MACD+RSI",
            StrategyKind::SmaCross => "SMA Cross",
            StrategyKind::Donchian => "Donchian",
            StrategyKind::Bollinger => "Bollinger MR",
        }
    }

    /// Identifier used in logs and optimisation output.
    pub fn type_name(&self) -> &'static str {
        match self {
            StrategyKind::MacdRsi => "MACDRSI",
            StrategyKind::SmaCross => "SMACross",
            StrategyKind::Donchian => "DonchianBreakout",
            StrategyKind::Bollinger => "BollingerReversion",
        }
    }

    pub fn default_params(&self, fee: f64) -> StrategyParams {
        match self {
            StrategyKind::MacdRsi => StrategyParams::MacdRsi(MacdRsiParams {
                fee,
                ..Default::default()
            }),
            StrategyKind::SmaCross => StrategyParams::SmaCross(SmaCrossParams {
                fee,
                ..Default::default()
            }),
            StrategyKind::Donchian => StrategyParams::Donchian(DonchianParams {
                fee,
                ..Default::default()
            }),
            StrategyKind::Bollinger => StrategyParams::Bollinger(BollingerParams {
                fee,
                ..Default::default()
            }),
        }
    }

    /// Every parameter combination searched by the optimiser, in search order.
    pub fn grid(&self, fee: f64) -> Vec<StrategyParams> {
        match self {
            StrategyKind::MacdRsi => MacdRsiParams::grid(fee)
                .into_iter()
                .map(StrategyParams::MacdRsi)
                .collect(),
            StrategyKind::SmaCross => SmaCrossParams::grid(fee)
                .into_iter()
                .map(StrategyParams::SmaCross)
                .collect(),
            StrategyKind::Donchian => DonchianParams::grid(fee)
                .into_iter()
                .map(StrategyParams::Donchian)
                .collect(),
            StrategyKind::Bollinger => BollingerParams::grid(fee)
                .into_iter()
                .map(StrategyParams::Bollinger)
                .collect(),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// The default line-up: every built-in strategy with its default parameters.
pub fn default_choices(fee: f64) -> Vec<StrategyParams> {
    StrategyKind::ALL
        .iter()
        .map(|kind| kind.default_params(fee))
        .collect()
}

/// Parameters of one strategy instance; the variant selects the rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyParams {
    MacdRsi(MacdRsiParams),
    SmaCross(SmaCrossParams),
    Donchian(DonchianParams),
    Bollinger(BollingerParams),
}

impl StrategyParams {
    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyParams::MacdRsi(_) => StrategyKind::MacdRsi,
            StrategyParams::SmaCross(_) => StrategyKind::SmaCross,
            StrategyParams::Donchian(_) => StrategyKind::Donchian,
            StrategyParams::Bollinger(_) => StrategyKind::Bollinger,
        }
    }

    pub fn fee(&self) -> f64 {
        match self {
            StrategyParams::MacdRsi(p) => p.fee,
            StrategyParams::SmaCross(p) => p.fee,
            StrategyParams::Donchian(p) => p.fee,
            StrategyParams::Bollinger(p) => p.fee,
        }
    }

    /// Same parameters with a different fee.
    pub fn with_fee(&self, fee: f64) -> Self {
        let mut params = self.clone();
        match &mut params {
            StrategyParams::MacdRsi(p) => p.fee = fee,
            StrategyParams::SmaCross(p) => p.fee = fee,
            StrategyParams::Donchian(p) => p.fee = fee,
            StrategyParams::Bollinger(p) => p.fee = fee,
        }
        params
    }

    pub(crate) fn build_rule(&self) -> Box<dyn Rule> {
        match self {
            StrategyParams::MacdRsi(p) => Box::new(MacdRsi::new(p.clone())),
            StrategyParams::SmaCross(p) => Box::new(SmaCross::new(p.clone())),
            StrategyParams::Donchian(p) => Box::new(Donchian::new(p.clone())),
            StrategyParams::Bollinger(p) => Box::new(Bollinger::new(p.clone())),
        }
    }
}
