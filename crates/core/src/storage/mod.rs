pub mod holdings;
pub mod lock;
pub mod recommendations;
pub mod stocks;
pub mod users;

use crate::domain::holdings::Transaction;
use crate::domain::recommendation::{OutcomeRecord, RecommendationSlot};
use crate::domain::stock::StockCandidate;
use crate::domain::user::UserProfile;
use anyhow::Context;
use chrono::NaiveDate;
use std::collections::HashMap;
use uuid::Uuid;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Persistence seen by the pipeline: bulk reads up front, per-slot writes afterwards.
#[async_trait::async_trait]
pub trait PipelineStore: Send + Sync {
    /// All users with saved settings, or just `target` when given.
    async fn load_profiles(&self, target: Option<Uuid>) -> anyhow::Result<Vec<UserProfile>>;

    /// Listed stocks priced on or after `fresh_since`.
    async fn load_candidates(&self, fresh_since: NaiveDate) -> anyhow::Result<Vec<StockCandidate>>;

    async fn load_transactions(
        &self,
        user_ids: &[Uuid],
    ) -> anyhow::Result<HashMap<Uuid, Vec<Transaction>>>;

    async fn load_watched(&self, user_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, Vec<i64>>>;

    /// Insert or overwrite the slot at `(user_id, date, position)`; returns the slot id.
    async fn upsert_slot(&self, slot: &RecommendationSlot) -> anyhow::Result<Uuid>;

    async fn insert_outcome(&self, outcome: &OutcomeRecord) -> anyhow::Result<()>;

    /// Remove slots beyond `keep` for a user and date. Returns the number removed.
    async fn prune_slots_after(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        keep: i32,
    ) -> anyhow::Result<u64>;
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PipelineStore for PgStore {
    async fn load_profiles(&self, target: Option<Uuid>) -> anyhow::Result<Vec<UserProfile>> {
        users::load_profiles(&self.pool, target).await
    }

    async fn load_candidates(&self, fresh_since: NaiveDate) -> anyhow::Result<Vec<StockCandidate>> {
        stocks::load_candidates(&self.pool, fresh_since).await
    }

    async fn load_transactions(
        &self,
        user_ids: &[Uuid],
    ) -> anyhow::Result<HashMap<Uuid, Vec<Transaction>>> {
        holdings::load_transactions(&self.pool, user_ids).await
    }

    async fn load_watched(&self, user_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, Vec<i64>>> {
        holdings::load_watched(&self.pool, user_ids).await
    }

    async fn upsert_slot(&self, slot: &RecommendationSlot) -> anyhow::Result<Uuid> {
        recommendations::upsert_slot(&self.pool, slot).await
    }

    async fn insert_outcome(&self, outcome: &OutcomeRecord) -> anyhow::Result<()> {
        recommendations::insert_outcome(&self.pool, outcome).await
    }

    async fn prune_slots_after(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        keep: i32,
    ) -> anyhow::Result<u64> {
        recommendations::prune_slots_after(&self.pool, user_id, date, keep).await
    }
}
