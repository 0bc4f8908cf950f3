//! Interactive browser for backtest results across symbols and strategies.
//!
//! Results are cached per symbol. Changing the fee re-runs the backtest of the
//! symbol currently on screen only.

use crate::backtest::run_backtest_multi;
use crate::error::{AppError, Result};
use crate::models::Candle;
use crate::report::{legend, metrics_table, strategy_report};
use crate::strategy::{Strategy, StrategyParams};
use colored::*;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{FuzzySelect, Input, Select};
use std::collections::HashMap;
use tracing::{debug, info};

/// Highest fee the viewer accepts (5%).
pub const MAX_FEE: f64 = 0.05;

/// Parses fee input such as `0.001`, `0,001` or `0.1%`, clamped to `[0, MAX_FEE]`.
pub fn parse_fee(text: &str) -> Option<f64> {
    let t = text.trim().replace(',', ".");
    let value = match t.strip_suffix('%') {
        Some(pct) => pct.trim().parse::<f64>().ok()? / 100.0,
        None => t.parse::<f64>().ok()?,
    };
    if value.is_nan() {
        return None;
    }
    Some(value.clamp(0.0, MAX_FEE))
}

pub struct InteractiveViewer {
    symbols: Vec<String>,
    data: HashMap<String, Vec<Candle>>,
    specs: Vec<StrategyParams>,
    fee: f64,
    results: HashMap<String, Vec<Strategy>>,
    symbol_idx: usize,
    strategy_idx: usize,
}

impl InteractiveViewer {
    /// Backtests every symbol with a zero fee.
    pub fn new(data: Vec<(String, Vec<Candle>)>, specs: Vec<StrategyParams>) -> Result<Self> {
        if data.is_empty() {
            return Err(AppError::Cli("No symbols to show".to_string()));
        }
        if specs.is_empty() {
            return Err(AppError::Cli("No strategies to show".to_string()));
        }
        let fee = 0.0;
        let symbols: Vec<String> = data.iter().map(|(s, _)| s.clone()).collect();
        let data: HashMap<String, Vec<Candle>> = data.into_iter().collect();
        let mut viewer = Self {
            symbols,
            data,
            specs,
            fee,
            results: HashMap::new(),
            symbol_idx: 0,
            strategy_idx: 0,
        };
        for symbol in viewer.symbols.clone() {
            viewer.rerun(&symbol);
        }
        Ok(viewer)
    }

    fn rerun(&mut self, symbol: &str) {
        let specs: Vec<StrategyParams> = self.specs.iter().map(|p| p.with_fee(self.fee)).collect();
        let candles = self.data.get(symbol).map(Vec::as_slice).unwrap_or_default();
        debug!(symbol, fee = self.fee, "Backtesting for viewer");
        let strategies = run_backtest_multi(candles, &specs);
        self.results.insert(symbol.to_string(), strategies);
    }

    #[cfg(test)]
    pub fn fee(&self) -> f64 {
        self.fee
    }

    pub fn current_symbol(&self) -> &str {
        &self.symbols[self.symbol_idx]
    }

    fn current_results(&self) -> &[Strategy] {
        self.results
            .get(self.current_symbol())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Strategy names (`"sid: label"`) for the current symbol.
    pub fn labels(&self) -> Vec<String> {
        self.current_results()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn current_strategy(&self) -> Option<&Strategy> {
        let results = self.current_results();
        results.get(self.strategy_idx.min(results.len().saturating_sub(1)))
    }

    /// Switches symbol and keeps the selected strategy slot. Unknown symbols are ignored.
    pub fn select_symbol(&mut self, symbol: &str) -> bool {
        match self.symbols.iter().position(|s| s == symbol) {
            Some(idx) => {
                self.symbol_idx = idx;
                true
            },
            None => false,
        }
    }

    /// Selects a strategy by its `"sid: label"` text; unreadable labels select the first.
    pub fn select_strategy(&mut self, label: &str) {
        let idx = label
            .split(':')
            .next()
            .and_then(|sid| sid.trim().parse::<usize>().ok())
            .map_or(0, |sid| sid.saturating_sub(1));
        self.strategy_idx = idx.min(self.specs.len() - 1);
    }

    /// Applies a fee typed by the user. Returns whether the backtest was re-run.
    pub fn submit_fee(&mut self, text: &str) -> bool {
        let Some(fee) = parse_fee(text) else {
            debug!(text, "Ignoring unparsable fee");
            return false;
        };
        if (fee - self.fee).abs() < 1e-9 {
            return false;
        }
        self.fee = fee;
        let symbol = self.current_symbol().to_string();
        info!(%symbol, fee, "Fee changed, re-running backtest");
        self.rerun(&symbol);
        true
    }

    /// Heading plus the report of the selected strategy.
    pub fn render(&self) -> String {
        let heading = format!(
            "{} - {}  |  fee={:.4}%",
            self.current_symbol(),
            legend(self.current_results()),
            self.fee * 100.0
        );
        let candles = self
            .data
            .get(self.current_symbol())
            .map(Vec::as_slice)
            .unwrap_or_default();
        match self.current_strategy() {
            Some(s) => format!("{}\n{}", heading, strategy_report(s, candles)),
            None => heading,
        }
    }

    /// Menu loop until the user quits or cancels.
    pub fn run(&mut self) -> Result<()> {
        let theme = ColorfulTheme::default();
        loop {
            println!("\n{}", self.render());

            let actions = &[
                "Choose symbol",
                "Choose strategy",
                "Set fee",
                "Compare all strategies",
                "Back",
            ];
            let choice = Select::with_theme(&theme)
                .with_prompt("Viewer")
                .items(actions)
                .default(0)
                .interact_opt()?
                .unwrap_or(actions.len() - 1);

            match choice {
                0 => {
                    if let Some(idx) = FuzzySelect::with_theme(&theme)
                        .with_prompt("Symbol")
                        .items(&self.symbols)
                        .default(self.symbol_idx)
                        .interact_opt()?
                    {
                        let symbol = self.symbols[idx].clone();
                        self.select_symbol(&symbol);
                    }
                },
                1 => {
                    let labels = self.labels();
                    if let Some(idx) = Select::with_theme(&theme)
                        .with_prompt("Strategy")
                        .items(&labels)
                        .default(self.strategy_idx.min(labels.len().saturating_sub(1)))
                        .interact_opt()?
                    {
                        self.select_strategy(&labels[idx]);
                    }
                },
                2 => {
                    let text: String = Input::with_theme(&theme)
                        .with_prompt("Fee (e.g. 0.001 or 0.1%)")
                        .with_initial_text(format!("{:.4}", self.fee))
                        .interact_text()?;
                    if parse_fee(&text).is_none() {
                        println!("{} {}", "Not a fee:".red(), text);
                    } else if !self.submit_fee(&text) {
                        println!("{}", "Fee unchanged.".yellow());
                    }
                },
                3 => {
                    println!(
                        "{}",
                        metrics_table(self.current_results(), self.current_symbol())
                    );
                },
                _ => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockDataProvider;
    use crate::strategy::default_choices;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    #[rstest]
    #[case("0.001", Some(0.001))]
    #[case(" 0,002 ", Some(0.002))]
    #[case("0.1%", Some(0.001))]
    #[case("0,25 %", Some(0.0025))]
    #[case("1", Some(MAX_FEE))]
    #[case("-0.01", Some(0.0))]
    #[case("abc", None)]
    #[case("", None)]
    fn fee_parsing(#[case] text: &str, #[case] expected: Option<f64>) {
        match (parse_fee(text), expected) {
            (Some(got), Some(want)) => assert!((got - want).abs() < 1e-12, "{} -> {}", text, got),
            (got, want) => assert_eq!(got, want),
        }
    }

    fn viewer() -> InteractiveViewer {
        let end = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        let provider = MockDataProvider::new();
        let data = ["BTCUSDT", "ETHUSDT"]
            .iter()
            .map(|s| (s.to_string(), provider.candles(s, "1m", 400, end).unwrap()))
            .collect();
        InteractiveViewer::new(data, default_choices(0.001)).unwrap()
    }

    #[test]
    fn starts_with_zero_fee_on_first_symbol() {
        let v = viewer();
        assert_eq!(v.fee(), 0.0);
        assert_eq!(v.current_symbol(), "BTCUSDT");
        assert_eq!(v.labels()[0], "1: MACD+RSI");
        assert_eq!(v.current_strategy().unwrap().fee(), 0.0);
    }

    #[test]
    fn strategy_selection_by_label() {
        let mut v = viewer();
        v.select_strategy("3: Donchian");
        assert_eq!(v.current_strategy().unwrap().name(), "3: Donchian");
        v.select_strategy("nonsense");
        assert_eq!(v.current_strategy().unwrap().sid(), 1);
        v.select_strategy("99: Missing");
        assert_eq!(v.current_strategy().unwrap().sid(), 4);
    }

    #[test]
    fn symbol_switch_keeps_strategy_slot() {
        let mut v = viewer();
        v.select_strategy("2: SMA Cross");
        assert!(v.select_symbol("ETHUSDT"));
        assert_eq!(v.current_symbol(), "ETHUSDT");
        assert_eq!(v.current_strategy().unwrap().sid(), 2);
        assert!(!v.select_symbol("DOGEUSDT"));
        assert_eq!(v.current_symbol(), "ETHUSDT");
    }

    #[test]
    fn fee_change_reruns_only_current_symbol() {
        let mut v = viewer();
        assert!(v.submit_fee("0.1%"));
        assert!((v.current_strategy().unwrap().fee() - 0.001).abs() < 1e-12);

        v.select_symbol("ETHUSDT");
        assert_eq!(v.current_strategy().unwrap().fee(), 0.0);
    }

    #[test]
    fn unchanged_or_invalid_fee_is_ignored() {
        let mut v = viewer();
        assert!(!v.submit_fee("0"));
        assert!(!v.submit_fee("free"));
        assert_eq!(v.fee(), 0.0);
    }

    #[test]
    fn render_shows_heading_and_report() {
        let v = viewer();
        let text = v.render();
        assert!(text.starts_with("BTCUSDT - 1:MACD+RSI | 2:SMA Cross"));
        assert!(text.contains("fee=0.0000%"));
        assert!(text.contains("1: MACD+RSI  |  "));
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert!(InteractiveViewer::new(vec![], default_choices(0.0)).is_err());
        let data = vec![("BTCUSDT".to_string(), Vec::new())];
        assert!(InteractiveViewer::new(data, vec![]).is_err());
    }
}
