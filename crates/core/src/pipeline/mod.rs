pub mod budget;
pub mod context;
pub mod controller;
pub mod diversify;
pub mod orchestrator;
pub mod report;
pub mod scoring;
pub mod selection;
pub mod technical;

#[cfg(test)]
mod testing;

use crate::config::Settings;
use crate::llm::anthropic::AnthropicClient;
use crate::llm::{DisabledModel, LlmClient};
use crate::market::http::HttpMarketData;
use crate::market::{HistoricalPriceSource, RealtimePriceSource, SentimentSource};
use crate::pipeline::diversify::DiversifyOptions;
use crate::storage::{PgStore, PipelineStore};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Users processed in parallel. Bounded by the model API's rate limits.
    pub concurrency: usize,
    pub diversify: DiversifyOptions,
    /// Stocks whose price is older than this many days are not loaded.
    pub stale_price_days: u32,
    /// Lookback keyword passed to the history source.
    pub history_range: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            diversify: DiversifyOptions::default(),
            stale_price_days: 7,
            history_range: "1mo".to_string(),
        }
    }
}

impl PipelineOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Some(n) = env_parse::<usize>("PIPELINE_CONCURRENCY") {
            out.concurrency = n;
        }
        if let Some(n) = env_parse::<usize>("PIPELINE_MAX_CANDIDATES") {
            out.diversify.max_candidates = n;
        }
        if let Some(n) = env_parse::<usize>("PIPELINE_SECTOR_CAP") {
            out.diversify.sector_cap = n;
        }
        if let Some(n) = env_parse::<usize>("PIPELINE_EXCLUSION_FLOOR") {
            out.diversify.exclusion_floor = n;
        }
        if let Some(n) = env_parse::<u32>("PIPELINE_STALE_PRICE_DAYS") {
            out.stale_price_days = n;
        }
        if let Ok(s) = std::env::var("PIPELINE_HISTORY_RANGE") {
            if !s.trim().is_empty() {
                out.history_range = s.trim().to_string();
            }
        }

        out
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.concurrency >= 1, "PIPELINE_CONCURRENCY must be >= 1");
        anyhow::ensure!(
            self.diversify.max_candidates >= 1,
            "PIPELINE_MAX_CANDIDATES must be >= 1"
        );
        anyhow::ensure!(self.diversify.sector_cap >= 1, "PIPELINE_SECTOR_CAP must be >= 1");
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

/// Collaborators and tuning for a pipeline run. Shared read-only by every user task.
pub struct Pipeline {
    pub store: Arc<dyn PipelineStore>,
    pub llm: Arc<dyn LlmClient>,
    pub history: Arc<dyn HistoricalPriceSource>,
    pub realtime: Arc<dyn RealtimePriceSource>,
    pub sentiment: Arc<dyn SentimentSource>,
    pub opts: PipelineOptions,
}

impl Pipeline {
    /// Production wiring: Postgres store, Anthropic selection, HTTP market data.
    pub fn from_settings(
        settings: &Settings,
        pool: sqlx::PgPool,
        opts: PipelineOptions,
    ) -> anyhow::Result<Self> {
        let llm = Arc::new(AnthropicClient::from_settings(settings)?);
        Self::wire(settings, pool, opts, llm)
    }

    /// Same wiring without model credentials. Only [`Pipeline::preview`] is meaningful on it.
    pub fn without_model(
        settings: &Settings,
        pool: sqlx::PgPool,
        opts: PipelineOptions,
    ) -> anyhow::Result<Self> {
        Self::wire(settings, pool, opts, Arc::new(DisabledModel))
    }

    fn wire(
        settings: &Settings,
        pool: sqlx::PgPool,
        opts: PipelineOptions,
        llm: Arc<dyn LlmClient>,
    ) -> anyhow::Result<Self> {
        opts.validate()?;
        let market = Arc::new(HttpMarketData::from_settings(settings)?);
        Ok(Self {
            store: Arc::new(PgStore::new(pool)),
            llm,
            history: market.clone(),
            realtime: market.clone(),
            sentiment: market,
            opts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_validate() {
        assert!(PipelineOptions::default().validate().is_ok());
        let mut bad = PipelineOptions::default();
        bad.concurrency = 0;
        assert!(bad.validate().is_err());
    }
}
