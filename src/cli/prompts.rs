//! Prompts used by the interactive menu to fill in command arguments.

use super::{normalize_symbols, BacktestArgs, Commands, LiveArgs, OptimizeArgs};
use crate::error::{AppError, Result};
use crate::live::LiveMode;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};

/// Entries of the main menu, in display order.
pub const MENU: [&str; 4] = ["Backtest", "Optimize", "Live trading", "Exit"];

pub fn prompt_symbols(default: &str) -> Result<Vec<String>> {
    let text: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Symbols (comma separated)")
        .default(default.to_string())
        .interact_text()?;
    let symbols = normalize_symbols(&text.split(',').map(str::to_string).collect::<Vec<_>>());
    if symbols.is_empty() {
        return Err(AppError::Cli("No symbols given".to_string()));
    }
    Ok(symbols)
}

pub fn prompt_interval() -> Result<String> {
    Ok(Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Interval")
        .default("1m".to_string())
        .validate_with(|s: &String| {
            crate::models::interval_seconds(s)
                .map(|_| ())
                .ok_or("unsupported interval")
        })
        .interact_text()?)
}

pub fn prompt_limit(default: usize) -> Result<usize> {
    Ok(Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Number of candles")
        .default(default)
        .interact_text()?)
}

fn confirm(prompt: &str, default: bool) -> Result<bool> {
    Ok(Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default)
        .interact()?)
}

/// Builds the command behind main menu entry `selection`; `None` for Exit.
pub fn prompt_command(selection: usize) -> Result<Option<Commands>> {
    let command = match selection {
        0 => {
            let defaults = BacktestArgs::default();
            Commands::Backtest(BacktestArgs {
                symbols: prompt_symbols(&defaults.symbols.join(","))?,
                interval: prompt_interval()?,
                limit: prompt_limit(defaults.limit)?,
                interactive: confirm("Open the interactive viewer?", true)?,
                ..defaults
            })
        },
        1 => {
            let defaults = OptimizeArgs::default();
            let symbol = prompt_symbols(&defaults.symbol)?.remove(0);
            Commands::Optimize(OptimizeArgs {
                symbol,
                interval: prompt_interval()?,
                limit: prompt_limit(defaults.limit)?,
                ..defaults
            })
        },
        2 => {
            let defaults = LiveArgs::default();
            let modes = ["best", "all"];
            let mode = Select::with_theme(&ColorfulTheme::default())
                .with_prompt("Live mode")
                .items(&modes)
                .default(0)
                .interact()?;
            Commands::Live(LiveArgs {
                symbols: prompt_symbols(&defaults.symbols.join(","))?,
                paper: confirm("Paper trading?", true)?,
                testnet: confirm("Use the testnet?", true)?,
                live_mode: if mode == 1 { LiveMode::All } else { LiveMode::Best },
                ..defaults
            })
        },
        _ => return Ok(None),
    };
    Ok(Some(command))
}
