//! Text reports for backtest results: per-trade tables, PnL summaries and
//! multi-strategy metric comparisons.

use crate::error::Result;
use crate::models::{Candle, Metrics, Side, Trade};
use crate::strategy::Strategy;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Table};

const TIME_FORMAT: &str = "%d.%m.%Y %H:%M";

/// A closed round trip: a BUY immediately followed by a SELL.
#[derive(Debug, Clone, PartialEq)]
pub struct TradePair {
    pub buy: Trade,
    pub sell: Trade,
    pub qty: f64,
    /// Buy notional including the fee.
    pub cost: f64,
    /// Sell notional net of the fee.
    pub proceeds: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub fees: f64,
}

/// Pairs consecutive BUY -> SELL trades; anything that does not fit the pattern is skipped.
pub fn pair_trades(trades: &[Trade], fee: f64) -> Vec<TradePair> {
    let mut pairs = Vec::new();
    let mut i = 0;
    while i + 1 < trades.len() {
        let (buy, sell) = (trades[i], trades[i + 1]);
        if buy.side != Side::Buy || sell.side != Side::Sell {
            i += 1;
            continue;
        }
        let qty = if sell.qty > 0.0 {
            buy.qty.min(sell.qty)
        } else {
            buy.qty
        };
        let cost = qty * buy.price * (1.0 + fee);
        let proceeds = qty * sell.price * (1.0 - fee);
        pairs.push(TradePair {
            buy,
            sell,
            qty,
            cost,
            proceeds,
            pnl: proceeds - cost,
            pnl_pct: (proceeds / cost - 1.0) * 100.0,
            fees: qty * buy.price * fee + qty * sell.price * fee,
        });
        i += 2;
    }
    pairs
}

/// `+$1,234.56` or `-$1,234.56`.
pub fn format_money(x: f64) -> String {
    let sign = if x >= 0.0 { '+' } else { '-' };
    format!("{}${}", sign, group_thousands(x.abs()))
}

/// Two decimals with `,` between thousands.
fn group_thousands(x: f64) -> String {
    let sign = if x < 0.0 { "-" } else { "" };
    let text = format!("{:.2}", x.abs());
    let (int, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let digits: Vec<char> = int.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }
    format!("{}{}.{}", sign, grouped, frac)
}

/// Realized and open profit of one strategy run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PnlSummary {
    pub realized: f64,
    pub unrealized: f64,
    pub fees: f64,
    pub total: f64,
    pub final_equity: f64,
}

impl PnlSummary {
    /// Summarises `trades`, marking an open position at `last_close`.
    pub fn from_trades(trades: &[Trade], fee: f64, last_close: f64, final_equity: f64) -> Self {
        let pairs = pair_trades(trades, fee);
        let realized: f64 = pairs.iter().map(|p| p.pnl).sum();
        let fees: f64 = pairs.iter().map(|p| p.fees).sum();
        let unrealized = match trades.last() {
            Some(t) if t.side == Side::Buy => t.qty * (last_close - t.price * (1.0 + fee)),
            _ => 0.0,
        };
        Self {
            realized,
            unrealized,
            fees,
            total: realized + unrealized,
            final_equity,
        }
    }

    pub fn of(strategy: &Strategy, candles: &[Candle]) -> Self {
        let last_close = candles.last().map_or(0.0, |c| c.close);
        let final_equity = strategy.metrics().map_or(0.0, |m| m.final_equity);
        Self::from_trades(strategy.trades(), strategy.fee(), last_close, final_equity)
    }
}

impl std::fmt::Display for PnlSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Realized {}   |   Unrealized {}   |   Fees {}\nTotal {}   |   Equity ${}",
            format_money(self.realized),
            format_money(self.unrealized),
            format_money(-self.fees),
            format_money(self.total),
            group_thousands(self.final_equity),
        )
    }
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn money_cell(x: f64) -> Cell {
    let color = if x >= 0.0 { Color::Green } else { Color::Red };
    Cell::new(format_money(x))
        .fg(color)
        .set_alignment(CellAlignment::Right)
}

/// Trade-by-trade table of one strategy followed by its PnL summary.
pub fn strategy_report(strategy: &Strategy, candles: &[Candle]) -> String {
    let mut out = String::new();
    let span = match (candles.first(), candles.last()) {
        (Some(a), Some(b)) => format!(
            "{} -> {}",
            a.open_time.format("%Y-%m-%d"),
            b.open_time.format("%Y-%m-%d")
        ),
        _ => "no data".to_string(),
    };
    out.push_str(&format!("{}  |  {}\n", strategy.name(), span));

    let pairs = pair_trades(strategy.trades(), strategy.fee());
    let mut table = new_table();
    table.set_header(vec!["#", "Time", "Side", "Price", "Qty", "PnL", "PnL %"]);
    for (n, trade) in strategy.trades().iter().enumerate() {
        let side_color = match trade.side {
            Side::Buy => Color::Green,
            Side::Sell => Color::Red,
        };
        let closed = pairs.iter().find(|p| p.sell == *trade);
        table.add_row(vec![
            Cell::new(n + 1),
            Cell::new(trade.time.format(TIME_FORMAT)),
            Cell::new(trade.side).fg(side_color),
            Cell::new(format!("{:.4}", trade.price)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.6}", trade.qty)).set_alignment(CellAlignment::Right),
            closed.map_or_else(|| Cell::new(""), |p| money_cell(p.pnl)),
            closed.map_or_else(
                || Cell::new(""),
                |p| Cell::new(format!("{:+.2}%", p.pnl_pct)).set_alignment(CellAlignment::Right),
            ),
        ]);
    }
    if strategy.trades().is_empty() {
        out.push_str("No trades.\n");
    } else {
        out.push_str(&format!("{}\n", table));
    }
    out.push_str(&PnlSummary::of(strategy, candles).to_string());
    out.push('\n');
    out
}

/// `1:MACD+RSI | 2:SMA Cross | ...`
pub fn legend(strategies: &[Strategy]) -> String {
    strategies
        .iter()
        .map(|s| format!("{}:{}", s.sid(), s.kind().label()))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// One row of metrics per strategy, with the sid legend underneath.
pub fn metrics_table(strategies: &[Strategy], title: &str) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "Strategy", "Trades", "Win %", "PnL", "Final equity", "Sharpe", "Max DD %", "CAGR %",
    ]);
    for s in strategies {
        match s.metrics() {
            Some(m) => table.add_row(vec![
                Cell::new(&m.name),
                Cell::new(m.trades).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.1}", m.winrate * 100.0)).set_alignment(CellAlignment::Right),
                money_cell(m.pnl),
                Cell::new(format!("${}", group_thousands(m.final_equity)))
                    .set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.3}", m.sharpe)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2}", m.max_dd * 100.0)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2}", m.cagr * 100.0)).set_alignment(CellAlignment::Right),
            ]),
            None => table.add_row(vec![Cell::new(s.name()), Cell::new("no data")]),
        };
    }
    format!("{}\n{}\n{}", title, table, legend(strategies))
}

/// Metrics as pretty-printed JSON.
pub fn metrics_json(metrics: &Metrics) -> Result<String> {
    Ok(serde_json::to_string_pretty(metrics)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rstest::rstest;

    fn trade(minute: i64, side: Side, price: f64, qty: f64) -> Trade {
        Trade {
            time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute),
            side,
            price,
            qty,
            sid: 1,
        }
    }

    #[rstest]
    #[case(1234.5, "+$1,234.50")]
    #[case(-1234567.891, "-$1,234,567.89")]
    #[case(0.0, "+$0.00")]
    #[case(999.999, "+$1,000.00")]
    #[case(-12.0, "-$12.00")]
    fn money_formatting(#[case] x: f64, #[case] expected: &str) {
        assert_eq!(format_money(x), expected);
    }

    #[test]
    fn pairs_consecutive_buy_sell() {
        let trades = vec![
            trade(0, Side::Sell, 100.0, 1.0),
            trade(1, Side::Buy, 100.0, 2.0),
            trade(2, Side::Sell, 110.0, 2.0),
            trade(3, Side::Buy, 120.0, 1.0),
        ];
        let pairs = pair_trades(&trades, 0.001);
        assert_eq!(pairs.len(), 1);
        let p = &pairs[0];
        assert_eq!(p.qty, 2.0);
        assert!((p.cost - 200.2).abs() < 1e-9);
        assert!((p.proceeds - 219.78).abs() < 1e-9);
        assert!((p.pnl - 19.58).abs() < 1e-9);
        assert!((p.fees - 0.42).abs() < 1e-9);
        assert!((p.pnl_pct - (219.78 / 200.2 - 1.0) * 100.0).abs() < 1e-9);
    }

    #[test]
    fn zero_qty_sell_uses_buy_qty() {
        let trades = vec![trade(0, Side::Buy, 10.0, 3.0), trade(1, Side::Sell, 11.0, 0.0)];
        assert_eq!(pair_trades(&trades, 0.0)[0].qty, 3.0);
    }

    #[test]
    fn summary_marks_open_position() {
        let trades = vec![
            trade(0, Side::Buy, 100.0, 1.0),
            trade(1, Side::Sell, 110.0, 1.0),
            trade(2, Side::Buy, 105.0, 2.0),
        ];
        let s = PnlSummary::from_trades(&trades, 0.0, 100.0, 5000.0);
        assert!((s.realized - 10.0).abs() < 1e-9);
        assert!((s.unrealized + 10.0).abs() < 1e-9);
        assert!(s.total.abs() < 1e-9);
        assert_eq!(s.fees, 0.0);
        assert!(s.to_string().contains("Equity $5,000.00"));
    }

    #[test]
    fn flat_account_has_no_unrealized() {
        let trades = vec![trade(0, Side::Buy, 100.0, 1.0), trade(1, Side::Sell, 90.0, 1.0)];
        let s = PnlSummary::from_trades(&trades, 0.0, 200.0, 4990.0);
        assert_eq!(s.unrealized, 0.0);
        assert!((s.total + 10.0).abs() < 1e-9);
    }

    #[test]
    fn metrics_json_has_expected_keys() {
        let m = Metrics {
            sid: 2,
            name: "2: SMA Cross".into(),
            final_equity: 5100.0,
            pnl: 100.0,
            sharpe: 1.5,
            max_dd: 0.05,
            trades: 8,
            winrate: 0.75,
            cagr: 0.4,
            days: 0.7,
        };
        let value: serde_json::Value = serde_json::from_str(&metrics_json(&m).unwrap()).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["cagr", "days", "final_equity", "max_dd", "name", "pnl", "sharpe", "sid", "trades", "winrate"]
        );
    }

    #[test]
    fn reports_render_names_and_legend() {
        use crate::backtest::run_backtest_multi;
        use crate::strategy::default_choices;

        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let candles = crate::api::MockDataProvider::new()
            .candles("BTCUSDT", "1m", 600, end)
            .unwrap();
        let strategies = run_backtest_multi(&candles, &default_choices(0.001));

        let table = metrics_table(&strategies, "BTCUSDT 1m");
        assert!(table.starts_with("BTCUSDT 1m"));
        assert!(table.ends_with("1:MACD+RSI | 2:SMA Cross | 3:Donchian | 4:Bollinger MR"));

        let report = strategy_report(&strategies[0], &candles);
        assert!(report.starts_with("1: MACD+RSI  |  "));
        assert!(report.contains("Realized"));
    }
}
