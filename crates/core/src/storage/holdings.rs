use crate::domain::holdings::{Transaction, TransactionKind};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

pub async fn load_transactions(
    pool: &sqlx::PgPool,
    user_ids: &[Uuid],
) -> anyhow::Result<HashMap<Uuid, Vec<Transaction>>> {
    let rows = sqlx::query_as::<_, (Uuid, i64, String, Decimal, Decimal, DateTime<Utc>)>(
        "SELECT user_id, stock_id, transaction_type, quantity, price, executed_at \
         FROM portfolio_transactions \
         WHERE user_id = ANY($1) \
         ORDER BY executed_at ASC, created_at ASC",
    )
    .persistent(false)
    .bind(user_ids)
    .fetch_all(pool)
    .await
    .context("load portfolio_transactions failed")?;

    let mut out: HashMap<Uuid, Vec<Transaction>> = HashMap::new();
    for (user_id, stock_id, kind, quantity, price, executed_at) in rows {
        let kind: TransactionKind = match kind.parse() {
            Ok(k) => k,
            Err(err) => {
                tracing::warn!(%user_id, stock_id, error = %err, "skipping transaction with unknown type");
                continue;
            }
        };
        out.entry(user_id).or_default().push(Transaction {
            stock_id,
            kind,
            quantity,
            price,
            executed_at,
        });
    }
    Ok(out)
}

pub async fn load_watched(
    pool: &sqlx::PgPool,
    user_ids: &[Uuid],
) -> anyhow::Result<HashMap<Uuid, Vec<i64>>> {
    let rows = sqlx::query_as::<_, (Uuid, i64)>(
        "SELECT user_id, stock_id FROM watchlist_items WHERE user_id = ANY($1)",
    )
    .persistent(false)
    .bind(user_ids)
    .fetch_all(pool)
    .await
    .context("load watchlist_items failed")?;

    let mut out: HashMap<Uuid, Vec<i64>> = HashMap::new();
    for (user_id, stock_id) in rows {
        out.entry(user_id).or_default().push(stock_id);
    }
    Ok(out)
}
