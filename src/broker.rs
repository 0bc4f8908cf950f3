//! Order execution for the live loop, simulated or on Binance.

use crate::api::BinanceClient;
use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::models::{Side, Trade};
use chrono::Utc;
use tracing::{info, warn};

/// Trades recorded by the broker carry this strategy id.
pub const BROKER_SID: usize = 0;

/// Decimal places market order quantities are rounded down to.
pub const DEFAULT_QTY_PRECISION: u32 = 5;

/// Holds the live account and routes orders to paper fills or the exchange.
///
/// Paper mode is used when asked for, and also whenever no API credentials are
/// configured.
#[derive(Debug, Clone)]
pub struct Broker {
    symbol: String,
    fee: f64,
    paper: bool,
    client: BinanceClient,
    cash: f64,
    position: f64,
    trades: Vec<Trade>,
    qty_precision: u32,
}

impl Broker {
    pub fn new(
        symbol: &str,
        fee: f64,
        paper: bool,
        testnet: bool,
        start_cash: f64,
        settings: &Settings,
    ) -> Self {
        let client = BinanceClient::new(settings.trading_url(testnet))
            .with_credentials(&settings.api_key, &settings.api_secret);
        Self::with_client(symbol, fee, paper, start_cash, client)
    }

    /// Broker on top of an already configured client.
    pub fn with_client(
        symbol: &str,
        fee: f64,
        paper: bool,
        start_cash: f64,
        client: BinanceClient,
    ) -> Self {
        let broker = Self {
            symbol: symbol.to_uppercase(),
            fee,
            paper,
            client,
            cash: start_cash,
            position: 0.0,
            trades: Vec::new(),
            qty_precision: DEFAULT_QTY_PRECISION,
        };
        if !paper && broker.is_paper() {
            warn!(symbol = %broker.symbol, "No API credentials, falling back to paper trading");
        }
        broker
    }

    pub fn with_qty_precision(mut self, decimals: u32) -> Self {
        self.qty_precision = decimals;
        self
    }

    /// Whether orders are simulated locally.
    pub fn is_paper(&self) -> bool {
        self.paper || !self.client.has_credentials()
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Cash plus the position marked at `price`.
    pub fn equity(&self, price: f64) -> f64 {
        self.cash + self.position * price
    }

    pub async fn market_buy(&mut self, qty: f64, price_hint: Option<f64>) -> Result<Trade> {
        self.execute(Side::Buy, qty, price_hint).await
    }

    pub async fn market_sell(&mut self, qty: f64, price_hint: Option<f64>) -> Result<Trade> {
        self.execute(Side::Sell, qty, price_hint).await
    }

    async fn execute(&mut self, side: Side, qty: f64, price_hint: Option<f64>) -> Result<Trade> {
        let trade = if self.is_paper() {
            self.paper_fill(side, qty, price_hint).await?
        } else {
            self.exchange_fill(side, qty, price_hint).await?
        };
        info!(
            symbol = %self.symbol,
            side = %trade.side,
            price = trade.price,
            qty = trade.qty,
            cash = self.cash,
            position = self.position,
            paper = self.is_paper(),
            "Order filled"
        );
        self.trades.push(trade);
        Ok(trade)
    }

    async fn paper_fill(&mut self, side: Side, qty: f64, price_hint: Option<f64>) -> Result<Trade> {
        let price = match price_hint {
            Some(px) => px,
            None => self.client.latest_close(&self.symbol).await?.1,
        };
        if price.is_nan() || price <= 0.0 {
            return Err(AppError::Data(format!("Invalid fill price: {}", price)));
        }

        let qty = match side {
            Side::Buy => {
                let affordable = self.cash / (price * (1.0 + self.fee));
                let qty = qty.min(affordable);
                self.cash -= qty * price * (1.0 + self.fee);
                self.position += qty;
                qty
            },
            Side::Sell => {
                let qty = qty.min(self.position);
                self.cash += qty * price * (1.0 - self.fee);
                self.position -= qty;
                qty
            },
        };

        Ok(Trade {
            time: Utc::now(),
            side,
            price,
            qty,
            sid: BROKER_SID,
        })
    }

    async fn exchange_fill(
        &mut self,
        side: Side,
        qty: f64,
        price_hint: Option<f64>,
    ) -> Result<Trade> {
        let qty = self.round_qty(qty);
        if qty <= 0.0 {
            return Err(AppError::Data(format!(
                "Order quantity rounds to zero at {} decimals",
                self.qty_precision
            )));
        }

        let order = self.client.market_order(&self.symbol, side, qty).await?;
        let filled = order.executed_qty();
        let quote = order.quote_qty();
        let price = if filled > 0.0 {
            quote / filled
        } else {
            price_hint.unwrap_or(0.0)
        };
        match side {
            Side::Buy => {
                self.cash -= quote * (1.0 + self.fee);
                self.position += filled;
            },
            Side::Sell => {
                self.cash += quote * (1.0 - self.fee);
                self.position -= filled;
            },
        }
        info!(
            order_id = order.order_id,
            symbol = %order.symbol,
            status = %order.status,
            "Exchange order acknowledged"
        );

        Ok(Trade {
            time: Utc::now(),
            side,
            price,
            qty: filled,
            sid: BROKER_SID,
        })
    }

    /// Rounds down to the configured number of decimals.
    fn round_qty(&self, qty: f64) -> f64 {
        let scale = 10f64.powi(self.qty_precision as i32);
        (qty * scale).floor() / scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn paper_broker(fee: f64) -> Broker {
        let client = BinanceClient::new("http://127.0.0.1:9");
        Broker::with_client("btcusdt", fee, true, 5000.0, client)
    }

    #[tokio::test]
    async fn paper_buy_is_clamped_to_cash() {
        let mut broker = paper_broker(0.001);
        let trade = broker.market_buy(1000.0, Some(100.0)).await.unwrap();

        let max_qty = 5000.0 / (100.0 * 1.001);
        assert!((trade.qty - max_qty).abs() < 1e-9);
        assert!(broker.cash().abs() < 1e-6);
        assert!((broker.position() - max_qty).abs() < 1e-9);
        assert_eq!(trade.sid, BROKER_SID);
        assert_eq!(broker.symbol(), "BTCUSDT");
    }

    #[tokio::test]
    async fn paper_round_trip_updates_equity() {
        let mut broker = paper_broker(0.0);
        broker.market_buy(10.0, Some(100.0)).await.unwrap();
        assert!((broker.equity(110.0) - 5100.0).abs() < 1e-9);

        let sell = broker.market_sell(10.0, Some(110.0)).await.unwrap();
        assert_eq!(sell.side, Side::Sell);
        assert_eq!(broker.position(), 0.0);
        assert!((broker.cash() - 5100.0).abs() < 1e-9);
        assert_eq!(broker.trades().len(), 2);
    }

    #[tokio::test]
    async fn paper_sell_cannot_go_short() {
        let mut broker = paper_broker(0.0);
        let trade = broker.market_sell(1.0, Some(100.0)).await.unwrap();
        assert_eq!(trade.qty, 0.0);
        assert_eq!(broker.position(), 0.0);
        assert_eq!(broker.cash(), 5000.0);
    }

    #[tokio::test]
    async fn missing_keys_force_paper_mode() {
        let client = BinanceClient::new("http://127.0.0.1:9");
        let broker = Broker::with_client("ETHUSDT", 0.001, false, 5000.0, client);
        assert!(broker.is_paper());
    }

    #[tokio::test]
    async fn paper_fill_without_hint_uses_latest_close() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!([[1_700_000_000_000i64, "250.0", "251.0", "249.0", "250.0", "1.0"]])
                    .to_string(),
            )
            .create_async()
            .await;
        let client = BinanceClient::new(&server.url());
        let mut broker = Broker::with_client("SOLUSDT", 0.0, true, 5000.0, client);
        let trade = broker.market_buy(2.0, None).await.unwrap();
        assert_eq!(trade.price, 250.0);
        assert_eq!(broker.cash(), 4500.0);
    }

    #[tokio::test]
    async fn live_order_updates_account_from_fill() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v3/order")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("side".into(), "BUY".into()),
                Matcher::UrlEncoded("quantity".into(), "0.12345".into()),
            ]))
            .match_header("X-MBX-APIKEY", "key")
            .with_status(200)
            .with_body(
                json!({
                    "symbol": "BTCUSDT",
                    "orderId": 42,
                    "status": "FILLED",
                    "executedQty": "0.12345000",
                    "cummulativeQuoteQty": "1234.50000000"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = BinanceClient::new(&server.url()).with_credentials("key", "secret");
        let mut broker = Broker::with_client("BTCUSDT", 0.0, false, 5000.0, client);
        let trade = broker.market_buy(0.123456789, Some(9999.0)).await.unwrap();

        mock.assert_async().await;
        assert!((trade.qty - 0.12345).abs() < 1e-12);
        assert!((trade.price - 10_000.0).abs() < 1e-6);
        assert!((broker.cash() - 3765.5).abs() < 1e-6);
        assert!((broker.position() - 0.12345).abs() < 1e-12);
    }

    #[tokio::test]
    async fn live_order_below_precision_is_rejected() {
        let client = BinanceClient::new("http://127.0.0.1:9").with_credentials("key", "secret");
        let mut broker = Broker::with_client("BTCUSDT", 0.0, false, 5000.0, client)
            .with_qty_precision(3);
        let err = broker.market_buy(0.0004, Some(100.0)).await.unwrap_err();
        assert!(matches!(err, AppError::Data(_)));
        assert!(broker.trades().is_empty());
    }
}
