mod api;
mod backtest;
mod broker;
mod cli;
mod config;
mod error;
mod indicators;
mod live;
mod models;
mod optimizer;
mod report;
mod strategy;
mod viewer;

use anyhow::Context;
use clap::Parser;
use cli::{App, Cli, MENU};
use colored::*;
use dialoguer::{theme::ColorfulTheme, Select};
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Directory for JSON log files; console logging only when unset.
const LOG_DIR_ENV: &str = "TRADING_BOT_LOG_DIR";

/// Console logs filtered by `RUST_LOG`, plus a daily JSON log file when
/// `TRADING_BOT_LOG_DIR` is set. The returned guard must live until exit.
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let console = fmt::layer().with_filter(EnvFilter::from_default_env());
    match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "trading-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new("info"));
            tracing_subscriber::registry().with(console).with(file).init();
            Some(guard)
        },
        _ => {
            tracing_subscriber::registry().with(console).init();
            None
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_logging();
    let cli = Cli::parse();

    info!("Initializing trading bot...");
    let app = App::new();

    if let Some(command) = cli.command {
        return app
            .run_command(command)
            .await
            .context("Command execution failed");
    }

    println!("{}", "Welcome to the trading bot CLI!".cyan().bold());

    // Main interactive loop
    loop {
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("What would you like to do?")
            .items(&MENU)
            .default(0)
            .interact_opt()
            .context("Menu prompt failed")?
            .unwrap_or(MENU.len() - 1);

        println!("\n---\n");

        let command = match cli::prompt_command(selection) {
            Ok(Some(command)) => command,
            Ok(None) => {
                println!("{}", "Exiting. Goodbye!".green());
                break;
            },
            Err(e) => {
                println!("{} {}", "Failed to get input:".red(), e);
                continue;
            },
        };

        if let Err(e) = app.run_command(command).await {
            error!("Command execution failed: {:?}", e);
            println!(
                "{} {}",
                "Error executing command:".red(),
                e.to_string().red()
            );
        }

        println!("\n---\n");
    }

    Ok(())
}
