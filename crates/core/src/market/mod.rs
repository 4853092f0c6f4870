pub mod http;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One daily OHLC bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

#[async_trait::async_trait]
pub trait HistoricalPriceSource: Send + Sync {
    /// Daily bars oldest-first for a lookback keyword such as `"1mo"`.
    async fn fetch_daily_bars(&self, ticker: &str, range: &str) -> anyhow::Result<Vec<PriceBar>>;
}

#[async_trait::async_trait]
pub trait RealtimePriceSource: Send + Sync {
    /// Current prices keyed by ticker. Tickers without a quote are simply absent.
    async fn fetch_quotes(&self, tickers: &[String]) -> anyhow::Result<HashMap<String, f64>>;
}

#[async_trait::async_trait]
pub trait SentimentSource: Send + Sync {
    /// Free-text market overview for the model prompt.
    async fn fetch_market_context(&self) -> anyhow::Result<String>;
}
