//! In-memory collaborators for pipeline tests.

use crate::domain::holdings::Transaction;
use crate::domain::recommendation::{OutcomeRecord, RecommendationSlot};
use crate::domain::stock::{test_candidate, StockCandidate};
use crate::domain::user::{InvestmentHorizon, RiskTolerance, UserProfile};
use crate::llm::{LlmClient, SelectionRequest};
use crate::market::{HistoricalPriceSource, PriceBar, RealtimePriceSource, SentimentSource};
use crate::pipeline::technical::bars_from_closes;
use crate::pipeline::{Pipeline, PipelineOptions};
use crate::storage::PipelineStore;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

type SlotKey = (Uuid, NaiveDate, i32);

#[derive(Default)]
pub(crate) struct FakeStore {
    pub profiles: Vec<UserProfile>,
    pub candidates: Vec<StockCandidate>,
    pub transactions: HashMap<Uuid, Vec<Transaction>>,
    pub watched: HashMap<Uuid, Vec<i64>>,
    pub fail_loads: bool,
    pub fail_upsert_positions: HashSet<i32>,
    pub fail_outcome_positions: HashSet<i32>,
    pub slots: Mutex<BTreeMap<SlotKey, (Uuid, RecommendationSlot)>>,
    pub outcomes: Mutex<Vec<OutcomeRecord>>,
}

impl FakeStore {
    pub fn slots_for(&self, user_id: Uuid, date: NaiveDate) -> Vec<RecommendationSlot> {
        self.slots
            .lock()
            .unwrap()
            .iter()
            .filter(|((u, d, _), _)| *u == user_id && *d == date)
            .map(|(_, (_, slot))| slot.clone())
            .collect()
    }

    pub fn outcome_count(&self) -> usize {
        self.outcomes.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl PipelineStore for FakeStore {
    async fn load_profiles(&self, target: Option<Uuid>) -> anyhow::Result<Vec<UserProfile>> {
        anyhow::ensure!(!self.fail_loads, "database unreachable");
        Ok(self
            .profiles
            .iter()
            .filter(|p| target.map_or(true, |t| t == p.user_id))
            .cloned()
            .collect())
    }

    async fn load_candidates(&self, _fresh_since: NaiveDate) -> anyhow::Result<Vec<StockCandidate>> {
        Ok(self.candidates.clone())
    }

    async fn load_transactions(
        &self,
        _user_ids: &[Uuid],
    ) -> anyhow::Result<HashMap<Uuid, Vec<Transaction>>> {
        Ok(self.transactions.clone())
    }

    async fn load_watched(&self, _user_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, Vec<i64>>> {
        Ok(self.watched.clone())
    }

    async fn upsert_slot(&self, slot: &RecommendationSlot) -> anyhow::Result<Uuid> {
        anyhow::ensure!(
            !self.fail_upsert_positions.contains(&slot.position),
            "upsert rejected"
        );
        let mut slots = self.slots.lock().unwrap();
        let key = (slot.user_id, slot.date, slot.position);
        let id = slots.get(&key).map_or_else(Uuid::new_v4, |(id, _)| *id);
        slots.insert(key, (id, slot.clone()));
        Ok(id)
    }

    async fn insert_outcome(&self, outcome: &OutcomeRecord) -> anyhow::Result<()> {
        let position = self
            .slots
            .lock()
            .unwrap()
            .values()
            .find(|(id, _)| *id == outcome.recommendation_id)
            .map(|(_, slot)| slot.position);
        anyhow::ensure!(
            !position.is_some_and(|p| self.fail_outcome_positions.contains(&p)),
            "outcome insert rejected"
        );
        self.outcomes.lock().unwrap().push(outcome.clone());
        Ok(())
    }

    async fn prune_slots_after(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        keep: i32,
    ) -> anyhow::Result<u64> {
        let mut slots = self.slots.lock().unwrap();
        let before = slots.len();
        slots.retain(|(u, d, p), _| !(*u == user_id && *d == date && *p > keep));
        Ok((before - slots.len()) as u64)
    }
}

/// Picks the first `picks` shortlisted tickers in briefing order.
pub(crate) struct FakeLlm {
    pub reason_prefix: String,
    pub picks: usize,
    pub failing_users: HashSet<Uuid>,
    pub delay: Duration,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FakeLlm {
    pub fn new(reason_prefix: &str) -> Self {
        Self {
            reason_prefix: reason_prefix.to_string(),
            picks: 5,
            failing_users: HashSet::new(),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

fn briefing_ticker(text: &str) -> Option<&str> {
    let rest = text.strip_prefix('[')?;
    Some(&rest[..rest.find(']')?])
}

#[async_trait::async_trait]
impl LlmClient for FakeLlm {
    fn provider(&self) -> &'static str {
        "fake"
    }

    async fn request_selection(&self, req: &SelectionRequest) -> anyhow::Result<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        anyhow::ensure!(!self.failing_users.contains(&req.user_id), "model unavailable");
        let selections: Vec<_> = req
            .briefings
            .iter()
            .filter_map(|b| briefing_ticker(b))
            .take(self.picks)
            .map(|t| json!({"ticker": t, "reason": format!("{} {t}", self.reason_prefix), "theme": "growth"}))
            .collect();
        Ok(json!({"market_sentiment": "bullish", "selections": selections}))
    }
}

pub(crate) struct FakeMarket {
    pub quotes_fail: bool,
    pub sentiment_fail: bool,
}

#[async_trait::async_trait]
impl HistoricalPriceSource for FakeMarket {
    async fn fetch_daily_bars(&self, _ticker: &str, _range: &str) -> anyhow::Result<Vec<PriceBar>> {
        let closes: Vec<f64> = (0..22).map(|i| 1_000.0 + i as f64 * 3.0).collect();
        Ok(bars_from_closes(&closes))
    }
}

#[async_trait::async_trait]
impl RealtimePriceSource for FakeMarket {
    async fn fetch_quotes(&self, tickers: &[String]) -> anyhow::Result<HashMap<String, f64>> {
        anyhow::ensure!(!self.quotes_fail, "quotes down");
        Ok(tickers.iter().map(|t| (t.clone(), 1_234.0)).collect())
    }
}

#[async_trait::async_trait]
impl SentimentSource for FakeMarket {
    async fn fetch_market_context(&self) -> anyhow::Result<String> {
        anyhow::ensure!(!self.sentiment_fail, "sentiment down");
        Ok("Indices steady.".to_string())
    }
}

pub(crate) fn build_pipeline(
    store: Arc<FakeStore>,
    llm: Arc<FakeLlm>,
    market: FakeMarket,
    opts: PipelineOptions,
) -> Arc<Pipeline> {
    let market = Arc::new(market);
    Arc::new(Pipeline {
        store,
        llm,
        history: market.clone(),
        realtime: market.clone(),
        sentiment: market,
        opts,
    })
}

pub(crate) fn healthy_market() -> FakeMarket {
    FakeMarket {
        quotes_fail: false,
        sentiment_fail: false,
    }
}

/// 40 stocks across 8 sectors priced 10,000..=400,000.
pub(crate) fn forty_candidates() -> Vec<StockCandidate> {
    const SECTORS: [&str; 8] = [
        "Tech", "Bank", "Retail", "Energy", "Pharma", "Auto", "Telecom", "Utilities",
    ];
    (1..=40)
        .map(|id| {
            let mut c = test_candidate(id, Some(SECTORS[(id as usize - 1) % 8]), Some(id * 10_000));
            c.change_rate_1w = Some((id % 7) as f64 - 3.0);
            c.volatility = Some(10.0 + (id % 5) as f64 * 8.0);
            c.per = Some(5.0 + (id % 9) as f64 * 4.0);
            c.market_cap = Some(Decimal::from(id * 1_000_000_000));
            c
        })
        .collect()
}

pub(crate) fn profile(budget: Option<i64>) -> UserProfile {
    UserProfile {
        user_id: Uuid::new_v4(),
        horizon: InvestmentHorizon::Medium,
        risk: RiskTolerance::Medium,
        total_budget: budget.map(Decimal::from),
    }
}
