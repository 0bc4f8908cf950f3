//! Provides a client for the Binance spot REST API.
//!
//! Covers the three things the bot needs from the exchange: historical klines,
//! the most recent kline for the live loop, and HMAC-signed order placement.

use crate::error::{ascii_safe, AppError, Result};
use crate::models::{Candle, Side};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, error, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Largest `limit` the klines endpoint accepts per request.
pub const MAX_KLINES_PER_REQUEST: usize = 1000;

const USER_AGENT: &str = "trading-bot/klines";
const KLINES_TIMEOUT: Duration = Duration::from_secs(12);
const LATEST_TIMEOUT: Duration = Duration::from_secs(5);
const SIGNED_TIMEOUT: Duration = Duration::from_secs(10);

/// Order acknowledgement returned by `POST /api/v3/order` (FULL/RESULT response types).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub symbol: String,
    pub order_id: i64,
    pub status: String,
    pub executed_qty: String,
    /// Binance's own spelling.
    pub cummulative_quote_qty: String,
}

impl OrderResponse {
    pub fn executed_qty(&self) -> f64 {
        self.executed_qty.parse().unwrap_or(0.0)
    }

    pub fn quote_qty(&self) -> f64 {
        self.cummulative_quote_qty.parse().unwrap_or(0.0)
    }
}

/// An asynchronous client for Binance market data and signed trading endpoints.
#[derive(Debug, Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    max_retries: usize,
    retry_delay: Duration,
}

impl BinanceClient {
    /// Creates an unauthenticated client against `base_url`.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    pub fn with_credentials(mut self, api_key: &str, api_secret: &str) -> Self {
        self.api_key = api_key.to_string();
        self.api_secret = api_secret.to_string();
        self
    }

    /// Overrides how often a kline download is attempted and the pause between attempts.
    pub fn with_retry_policy(mut self, max_retries: usize, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }

    /// Fetches `limit` candles for `symbol`, oldest first.
    ///
    /// Requests above [`MAX_KLINES_PER_REQUEST`] are served by paging backwards
    /// in time from `end_time` (milliseconds, defaults to now).
    pub async fn fetch_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
        end_time: Option<i64>,
    ) -> Result<Vec<Candle>> {
        let symbol = symbol.to_uppercase();
        info!(%symbol, interval, limit, "Fetching klines");

        let mut candles: Vec<Candle> = Vec::with_capacity(limit);
        let mut end = end_time;
        while candles.len() < limit.max(1) {
            let page_limit = (limit.max(1) - candles.len()).min(MAX_KLINES_PER_REQUEST);
            let page = self
                .fetch_klines_page(&symbol, interval, page_limit, end)
                .await?;
            let full_page = page.len() >= page_limit;
            let earliest = page.first().map(|c| c.open_time.timestamp_millis());
            candles.extend(page);
            match earliest {
                Some(first_ms) if full_page => end = Some(first_ms - 1),
                _ => break,
            }
        }

        candles.sort_by_key(|c| c.open_time);
        candles.dedup_by_key(|c| c.open_time);
        if candles.len() > limit {
            let excess = candles.len() - limit;
            candles.drain(..excess);
        }
        debug!(%symbol, count = candles.len(), "Klines ready");
        Ok(candles)
    }

    /// One klines request with retries.
    async fn fetch_klines_page(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
        end_time: Option<i64>,
    ) -> Result<Vec<Candle>> {
        let mut query = vec![
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(end) = end_time {
            query.push(("endTime", end.to_string()));
        }

        let mut last_err: Option<AppError> = None;
        for attempt in 1..=self.max_retries {
            let outcome = async {
                let response = self
                    .client
                    .get(format!("{}/api/v3/klines", self.base_url))
                    .header("User-Agent", USER_AGENT)
                    .header("Accept-Charset", "utf-8")
                    .query(&query)
                    .timeout(KLINES_TIMEOUT)
                    .send()
                    .await?;
                let payload = read_json(response).await?;
                parse_klines(&payload)
            }
            .await;

            match outcome {
                Ok(candles) => return Ok(candles),
                Err(e) => {
                    warn!(attempt, %symbol, error = %e, "Kline request failed");
                    last_err = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                },
            }
        }

        let reason = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());
        error!(%symbol, "Giving up on klines: {}", reason);
        Err(AppError::Data(format!(
            "fetch_klines failed: {}",
            ascii_safe(reason)
        )))
    }

    /// Most recent one-minute candle (possibly still forming).
    pub async fn latest_candle(&self, symbol: &str) -> Result<Candle> {
        let outcome = async {
            let response = self
                .client
                .get(format!("{}/api/v3/klines", self.base_url))
                .header("User-Agent", USER_AGENT)
                .header("Accept-Charset", "utf-8")
                .query(&[("symbol", symbol), ("interval", "1m"), ("limit", "1")])
                .timeout(LATEST_TIMEOUT)
                .send()
                .await?;
            let payload = read_json(response).await?;
            parse_klines(&payload)?
                .pop()
                .ok_or_else(|| AppError::Data("empty kline response".to_string()))
        }
        .await;

        outcome.map_err(|e| {
            AppError::Data(format!(
                "stream_latest_close failed: {}",
                ascii_safe(e.to_string())
            ))
        })
    }

    /// `(open_time, close)` of the most recent candle.
    pub async fn latest_close(&self, symbol: &str) -> Result<(DateTime<Utc>, f64)> {
        let candle = self.latest_candle(symbol).await?;
        Ok((candle.open_time, candle.close))
    }

    /// Sends a request to a `SIGNED` endpoint.
    ///
    /// A millisecond `timestamp` is appended to `params` and the url-encoded
    /// query is signed with HMAC-SHA256 using the API secret.
    pub async fn signed_request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value> {
        if !self.has_credentials() {
            return Err(AppError::Auth("API keys missing".to_string()));
        }

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in params {
            query.append_pair(key, value);
        }
        query.append_pair("timestamp", &Utc::now().timestamp_millis().to_string());
        let query = query.finish();
        let signature = sign(&self.api_secret, &query)?;

        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);
        debug!(%method, path, "Signed request");
        let response = self
            .client
            .request(method, url)
            .header("X-MBX-APIKEY", &self.api_key)
            .timeout(SIGNED_TIMEOUT)
            .send()
            .await?;
        read_json(response).await
    }

    /// Places a MARKET order for `qty` units of the base asset.
    pub async fn market_order(&self, symbol: &str, side: Side, qty: f64) -> Result<OrderResponse> {
        let params = [
            ("symbol", symbol.to_uppercase()),
            ("side", side.to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", format_quantity(qty)),
            ("newOrderRespType", "RESULT".to_string()),
        ];
        info!(%symbol, %side, qty, "Placing market order");
        let payload = self
            .signed_request(Method::POST, "/api/v3/order", &params)
            .await?;
        Ok(serde_json::from_value(payload)?)
    }
}

/// Hex-encoded HMAC-SHA256 of `payload` keyed with `secret`.
pub fn sign(secret: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Auth("Invalid API secret".to_string()))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Quantities go out without float noise or exponent notation.
fn format_quantity(qty: f64) -> String {
    let text = format!("{:.8}", qty);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// Decodes a response body, surfacing exchange error objects and HTTP failures.
async fn read_json(response: Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        if let Ok(value) = serde_json::from_str::<Value>(&body) {
            if let Some(err) = exchange_error(&value) {
                return Err(err);
            }
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            error!("Received {}. Check BINANCE_API_KEY validity and permissions.", status);
        }
        return Err(AppError::Data(format!(
            "HTTP {}: {}",
            status,
            ascii_safe(body.chars().take(200).collect::<String>())
        )));
    }

    Ok(serde_json::from_str(&body)?)
}

fn exchange_error(value: &Value) -> Option<AppError> {
    let obj = value.as_object()?;
    let code = obj.get("code")?;
    Some(AppError::Exchange {
        code: code.as_i64().unwrap_or_default(),
        msg: ascii_safe(obj.get("msg").and_then(Value::as_str).unwrap_or("")),
    })
}

/// Converts a klines payload into candles, skipping malformed rows.
pub fn parse_klines(payload: &Value) -> Result<Vec<Candle>> {
    if let Some(err) = exchange_error(payload) {
        return Err(err);
    }
    let rows = payload.as_array().ok_or_else(|| {
        AppError::Data(format!(
            "Unexpected payload type: {}",
            json_type_name(payload)
        ))
    })?;

    let mut candles: Vec<Candle> = rows
        .iter()
        .filter_map(parse_kline_row)
        .filter(|c| c.close.is_finite())
        .collect();
    if candles.is_empty() {
        return Err(AppError::Data("No valid candles parsed".to_string()));
    }
    candles.sort_by_key(|c| c.open_time);
    Ok(candles)
}

fn parse_kline_row(row: &Value) -> Option<Candle> {
    let fields = row.as_array()?;
    if fields.len() < 6 {
        return None;
    }
    let open_ms = fields[0].as_i64()?;
    Some(Candle {
        open_time: DateTime::from_timestamp_millis(open_ms)?,
        open: number(&fields[1])?,
        high: number(&fields[2])?,
        low: number(&fields[3])?,
        close: number(&fields[4])?,
        volume: number(&fields[5])?,
    })
}

/// Binance sends prices as strings; accept plain numbers as well.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse().ok(),
        other => other.as_f64(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
