//! AlphaVantage market data over HTTP.
//!
//! The free tier allows five calls a minute, so calls made through one
//! client are spaced by a configurable delay.

use crate::core::fields::{
    clean_object, date_field, number_field, number_field_or, percent_field, required,
};
use crate::core::MarketData;
use crate::domain::model::{DailySeries, PricePoint, Quote};
use crate::utils::error::{Result, TrackerError};
use async_trait::async_trait;
use chrono::NaiveDate;
use moka::future::Cache;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(12);

const DAILY_SERIES_KEY: &str = "Time Series (Daily)";
const QUOTE_KEY: &str = "Global Quote";

/// Spaces successive calls at least `interval` apart.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                let pause = self.interval - elapsed;
                tracing::debug!("Rate limiting market data call for {:?}", pause);
                tokio::time::sleep(pause).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

pub struct AlphaVantageClient {
    client: Client,
    base_url: String,
    api_key: String,
    throttle: Throttle,
}

impl AlphaVantageClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_options(api_key, DEFAULT_BASE_URL, DEFAULT_REQUEST_DELAY)
    }

    pub fn with_options(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        request_delay: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            throttle: Throttle::new(request_delay),
        }
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<Value> {
        self.throttle.wait().await;

        tracing::debug!("AlphaVantage request: {:?}", params);
        let response = self
            .client
            .get(&self.base_url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MarketData for AlphaVantageClient {
    async fn daily_series(&self, symbol: &str, full: bool) -> Result<Arc<DailySeries>> {
        let output_size = if full { "full" } else { "compact" };
        let payload = self
            .query(&[
                ("function", "TIME_SERIES_DAILY_ADJUSTED"),
                ("symbol", symbol),
                ("outputsize", output_size),
            ])
            .await?;

        let series = parse_daily_series(symbol, &payload)?;
        tracing::info!("Loaded {} daily prices for {}", series.len(), symbol);
        Ok(Arc::new(series))
    }

    async fn quote(&self, symbol: &str) -> Result<Quote> {
        let payload = self
            .query(&[("function", "GLOBAL_QUOTE"), ("symbol", symbol)])
            .await?;
        parse_quote(symbol, &payload)
    }
}

/// The API answers errors and throttling with HTTP 200 and a message field.
fn api_message(payload: &Value) -> String {
    ["Error Message", "Note", "Information"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| payload.to_string())
}

/// Field errors inside an upstream payload are reported as `MarketDataError`.
fn payload_error(symbol: &str, err: TrackerError) -> TrackerError {
    match err {
        TrackerError::ValidationError { message } => TrackerError::MarketDataError {
            symbol: symbol.to_string(),
            message,
        },
        other => other,
    }
}

fn parse_point(date: NaiveDate, fields: &HashMap<String, String>) -> Result<PricePoint> {
    let close = number_field(fields, "close")?;
    Ok(PricePoint {
        date,
        open: number_field(fields, "open")?,
        high: number_field(fields, "high")?,
        low: number_field(fields, "low")?,
        close,
        adjusted_close: number_field_or(fields, "adjusted_close", close)?,
        volume: number_field(fields, "volume")?,
        dividend_amount: number_field_or(fields, "dividend_amount", 0.0)?,
        split_coefficient: number_field_or(fields, "split_coefficient", 1.0)?,
    })
}

pub fn parse_daily_series(symbol: &str, payload: &Value) -> Result<DailySeries> {
    let days = payload
        .get(DAILY_SERIES_KEY)
        .and_then(Value::as_object)
        .ok_or_else(|| TrackerError::MarketDataError {
            symbol: symbol.to_string(),
            message: api_message(payload),
        })?;

    let mut points = Vec::with_capacity(days.len());
    for (day, values) in days {
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| {
            TrackerError::MarketDataError {
                symbol: symbol.to_string(),
                message: format!("unexpected date key '{}'", day),
            }
        })?;
        let fields = values.as_object().map(clean_object).unwrap_or_default();
        points.push(parse_point(date, &fields).map_err(|e| payload_error(symbol, e))?);
    }

    let metadata = payload
        .get("Meta Data")
        .and_then(Value::as_object)
        .map(clean_object)
        .unwrap_or_default();

    Ok(DailySeries::new(symbol, points).with_metadata(metadata))
}

pub fn parse_quote(symbol: &str, payload: &Value) -> Result<Quote> {
    let fields = payload
        .get(QUOTE_KEY)
        .and_then(Value::as_object)
        .filter(|obj| !obj.is_empty())
        .map(clean_object)
        .ok_or_else(|| TrackerError::MarketDataError {
            symbol: symbol.to_string(),
            message: api_message(payload),
        })?;

    quote_from_fields(&fields).map_err(|e| payload_error(symbol, e))
}

fn quote_from_fields(fields: &HashMap<String, String>) -> Result<Quote> {
    Ok(Quote {
        symbol: required(fields, "symbol")?.to_string(),
        open: number_field(fields, "open")?,
        high: number_field(fields, "high")?,
        low: number_field(fields, "low")?,
        price: number_field(fields, "price")?,
        volume: number_field(fields, "volume")?,
        latest_trading_day: date_field(fields, "latest_trading_day")?,
        previous_close: number_field(fields, "previous_close")?,
        change: number_field(fields, "change")?,
        change_percent: percent_field(fields, "change_percent")?,
    })
}

/// TTL cache of daily series in front of another source. Quotes pass through.
pub struct CachedMarketData<M: MarketData> {
    inner: M,
    series: Cache<(String, bool), Arc<DailySeries>>,
}

impl<M: MarketData> CachedMarketData<M> {
    pub fn new(inner: M, ttl: Duration) -> Self {
        let series = Cache::builder()
            .max_capacity(256)
            .time_to_live(ttl)
            .build();
        Self { inner, series }
    }
}

#[async_trait]
impl<M: MarketData> MarketData for CachedMarketData<M> {
    async fn daily_series(&self, symbol: &str, full: bool) -> Result<Arc<DailySeries>> {
        let key = (symbol.to_string(), full);
        if let Some(series) = self.series.get(&key).await {
            tracing::debug!("Daily series cache hit for {}", symbol);
            return Ok(series);
        }
        // a full history also answers a compact request
        if !full {
            if let Some(series) = self.series.get(&(symbol.to_string(), true)).await {
                return Ok(series);
            }
        }

        let series = self.inner.daily_series(symbol, full).await?;
        self.series.insert(key, series.clone()).await;
        Ok(series)
    }

    async fn quote(&self, symbol: &str) -> Result<Quote> {
        self.inner.quote(symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn daily_payload() -> Value {
        serde_json::json!({
            "Meta Data": {
                "1. Information": "Daily Time Series with Splits and Dividend Events",
                "2. Symbol": "SBUX"
            },
            "Time Series (Daily)": {
                "2020-07-21": {
                    "1. open": "77.00", "2. high": "78.10", "3. low": "76.50",
                    "4. close": "78.00", "5. adjusted close": "77.50",
                    "6. volume": "5000000", "7. dividend amount": "0.4100",
                    "8. split coefficient": "1.0"
                },
                "2020-07-20": {
                    "1. open": "76.00", "2. high": "77.20", "3. low": "75.80",
                    "4. close": "77.00", "5. adjusted close": "76.50",
                    "6. volume": "4000000", "7. dividend amount": "0.0000",
                    "8. split coefficient": "1.0"
                }
            }
        })
    }

    fn quote_payload() -> Value {
        serde_json::json!({
            "Global Quote": {
                "01. symbol": "VOO", "02. open": "300.00", "03. high": "302.00",
                "04. low": "299.50", "05. price": "301.2500", "06. volume": "3000000",
                "07. latest trading day": "2020-08-03", "08. previous close": "300.0000",
                "09. change": "1.2500", "10. change percent": "0.4167%"
            }
        })
    }

    #[test]
    fn test_parse_daily_series() {
        let series = parse_daily_series("SBUX", &daily_payload()).unwrap();
        assert_eq!(series.len(), 2);
        let first = &series.points()[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2020, 7, 20).unwrap());
        assert_eq!(series.latest().unwrap().dividend_amount, 0.41);
        assert_eq!(series.metadata.get("symbol").unwrap(), "SBUX");
    }

    #[test]
    fn test_parse_daily_series_rate_limit_note() {
        let payload = serde_json::json!({"Note": "Thank you for using Alpha Vantage!"});
        let err = parse_daily_series("SBUX", &payload).unwrap_err();
        match err {
            TrackerError::MarketDataError { message, .. } => {
                assert!(message.contains("Thank you"))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_malformed_payload_is_a_market_data_error() {
        let payload = serde_json::json!({
            "Time Series (Daily)": {"2020-07-20": {"1. open": "1.0"}}
        });
        match parse_daily_series("SBUX", &payload).unwrap_err() {
            TrackerError::MarketDataError { symbol, message } => {
                assert_eq!(symbol, "SBUX");
                assert!(message.contains("close"));
            }
            other => panic!("unexpected error {:?}", other),
        }

        let mut quote = quote_payload();
        quote["Global Quote"]["05. price"] = Value::from("n/a");
        let err = parse_quote("VOO", &quote).unwrap_err();
        assert!(matches!(err, TrackerError::MarketDataError { .. }));
    }

    #[test]
    fn test_parse_quote() {
        let quote = parse_quote("VOO", &quote_payload()).unwrap();
        assert_eq!(quote.symbol, "VOO");
        assert_eq!(quote.price, 301.25);
        assert_eq!(quote.change_percent, 0.4167);
        assert_eq!(quote.summary(), "+0.4167% - 301.25");
    }

    #[test]
    fn test_parse_quote_unknown_symbol() {
        let payload = serde_json::json!({"Global Quote": {}});
        assert!(parse_quote("NOPE", &payload).is_err());
    }

    #[tokio::test]
    async fn test_client_sends_query() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/query")
                .query_param("function", "TIME_SERIES_DAILY_ADJUSTED")
                .query_param("symbol", "SBUX")
                .query_param("outputsize", "full")
                .query_param("apikey", "demo");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(daily_payload());
        });

        let client = AlphaVantageClient::with_options("demo", server.url("/query"), Duration::ZERO);
        let series = client.daily_series("SBUX", true).await.unwrap();

        api_mock.assert();
        assert_eq!(series.symbol, "SBUX");
        assert_eq!(series.len(), 2);
    }

    #[tokio::test]
    async fn test_client_http_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/query");
            then.status(503);
        });

        let client = AlphaVantageClient::with_options("demo", server.url("/query"), Duration::ZERO);
        let err = client.quote("VOO").await.unwrap_err();
        assert!(matches!(err, TrackerError::ApiError(_)));
    }

    #[tokio::test]
    async fn test_cache_reuses_series() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET).path("/query");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(daily_payload());
        });

        let client = AlphaVantageClient::with_options("demo", server.url("/query"), Duration::ZERO);
        let cached = CachedMarketData::new(client, Duration::from_secs(60));
        cached.daily_series("SBUX", true).await.unwrap();
        cached.daily_series("SBUX", true).await.unwrap();
        cached.daily_series("SBUX", false).await.unwrap();

        api_mock.assert_hits(1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_spaces_calls() {
        let throttle = Throttle::new(Duration::from_secs(12));
        let start = Instant::now();
        throttle.wait().await;
        throttle.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(12));
    }
}
