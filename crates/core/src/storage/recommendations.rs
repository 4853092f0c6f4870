use crate::domain::recommendation::{OutcomeRecord, RecommendationSlot, SavedRecommendation};
use anyhow::Context;
use chrono::NaiveDate;
use uuid::Uuid;

pub async fn upsert_slot(pool: &sqlx::PgPool, slot: &RecommendationSlot) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO daily_recommendations \
             (id, user_id, recommendation_date, position, stock_id, reason, theme, session) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (user_id, recommendation_date, position) DO UPDATE \
           SET stock_id = EXCLUDED.stock_id, reason = EXCLUDED.reason, theme = EXCLUDED.theme, \
               session = EXCLUDED.session, updated_at = now() \
         RETURNING id",
    )
    .persistent(false)
    .bind(Uuid::new_v4())
    .bind(slot.user_id)
    .bind(slot.date)
    .bind(slot.position)
    .bind(slot.stock_id)
    .bind(&slot.reason)
    .bind(slot.theme.map(|t| t.as_str()))
    .bind(slot.session.as_str())
    .fetch_one(pool)
    .await
    .with_context(|| {
        format!(
            "upsert daily_recommendations failed (user_id={}, date={}, position={})",
            slot.user_id, slot.date, slot.position
        )
    })?;
    Ok(id)
}

pub async fn insert_outcome(pool: &sqlx::PgPool, outcome: &OutcomeRecord) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO recommendation_outcomes \
             (id, recommendation_id, user_id, stock_id, recommended_on, price_at_recommendation, \
              sector, volatility, market_cap, prediction, session) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .persistent(false)
    .bind(Uuid::new_v4())
    .bind(outcome.recommendation_id)
    .bind(outcome.user_id)
    .bind(outcome.stock_id)
    .bind(outcome.recommended_on)
    .bind(outcome.price_at_recommendation)
    .bind(&outcome.sector)
    .bind(outcome.volatility)
    .bind(outcome.market_cap)
    .bind(outcome.prediction.as_str())
    .bind(outcome.session.as_str())
    .execute(pool)
    .await
    .context("insert recommendation_outcomes failed")?;
    Ok(())
}

pub async fn prune_slots_after(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    date: NaiveDate,
    keep: i32,
) -> anyhow::Result<u64> {
    let res = sqlx::query(
        "DELETE FROM daily_recommendations \
         WHERE user_id = $1 AND recommendation_date = $2 AND position > $3",
    )
    .persistent(false)
    .bind(user_id)
    .bind(date)
    .bind(keep)
    .execute(pool)
    .await
    .context("prune daily_recommendations failed")?;
    Ok(res.rows_affected())
}

pub async fn fetch_slots(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    date: NaiveDate,
) -> anyhow::Result<Vec<SavedRecommendation>> {
    let rows = sqlx::query_as::<_, (i32, i64, String, String, String, Option<String>)>(
        "SELECT r.position, r.stock_id, s.ticker, s.name, r.reason, r.theme \
         FROM daily_recommendations r \
         JOIN stocks s ON s.id = r.stock_id \
         WHERE r.user_id = $1 AND r.recommendation_date = $2 \
         ORDER BY r.position ASC",
    )
    .persistent(false)
    .bind(user_id)
    .bind(date)
    .fetch_all(pool)
    .await
    .context("fetch daily_recommendations failed")?;

    Ok(rows
        .into_iter()
        .map(|(position, stock_id, ticker, name, reason, theme)| SavedRecommendation {
            position,
            stock_id,
            ticker,
            name,
            reason,
            theme: theme.and_then(|t| t.parse().ok()),
        })
        .collect())
}
