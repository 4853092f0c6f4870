use crate::config::Settings;
use crate::market::{HistoricalPriceSource, PriceBar, RealtimePriceSource, SentimentSource};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_RETRIES: u32 = 2;
const MAX_RETRIES: u32 = 8;
const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 8_000;

/// JSON market-data gateway serving history, batched quotes and the market overview.
#[derive(Debug, Clone)]
pub struct HttpMarketData {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retries: u32,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    bars: Vec<PriceBar>,
}

#[derive(Debug, Deserialize)]
struct QuotesResponse {
    quotes: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    ticker: String,
    price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MarketContextResponse {
    summary: String,
}

impl HttpMarketData {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_market_data_base_url()?.to_string();
        let api_key = settings.market_data_api_key.clone();

        let timeout_secs = std::env::var("MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("MARKET_DATA_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .clamp(1, MAX_RETRIES);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            retries,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn get_once<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let res = self
            .http
            .get(self.url(path))
            .headers(self.headers()?)
            .query(query)
            .send()
            .await
            .with_context(|| format!("market data request failed: {path}"))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read market data response")?;
        if !status.is_success() {
            anyhow::bail!("market data HTTP {status} for {path}: {text}");
        }

        serde_json::from_str::<T>(&text)
            .with_context(|| format!("unexpected market data payload for {path}: {text}"))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.get_once(path, query).await {
                Ok(v) => return Ok(v),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = backoff_for(attempt);
                    tracing::warn!(attempt, path, ?backoff, error = %err, "market data fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl HistoricalPriceSource for HttpMarketData {
    async fn fetch_daily_bars(&self, ticker: &str, range: &str) -> Result<Vec<PriceBar>> {
        let resp: HistoryResponse = self
            .get(
                "/v1/history",
                &[("ticker", ticker.to_string()), ("range", range.to_string())],
            )
            .await?;
        let mut bars = resp.bars;
        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }
}

#[async_trait::async_trait]
impl RealtimePriceSource for HttpMarketData {
    async fn fetch_quotes(&self, tickers: &[String]) -> Result<HashMap<String, f64>> {
        if tickers.is_empty() {
            return Ok(HashMap::new());
        }
        let resp: QuotesResponse = self
            .get("/v1/quotes", &[("tickers", tickers.join(","))])
            .await?;
        Ok(collect_quotes(resp))
    }
}

#[async_trait::async_trait]
impl SentimentSource for HttpMarketData {
    async fn fetch_market_context(&self) -> Result<String> {
        let resp: MarketContextResponse = self.get("/v1/market_context", &[]).await?;
        Ok(resp.summary)
    }
}

/// Doubles from 500ms per failed attempt, capped at 8s.
fn backoff_for(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

fn collect_quotes(resp: QuotesResponse) -> HashMap<String, f64> {
    resp.quotes
        .into_iter()
        .filter_map(|q| {
            let price = q.price.filter(|p| p.is_finite() && *p > 0.0)?;
            Some((q.ticker.trim().to_string(), price))
        })
        .collect()
}
