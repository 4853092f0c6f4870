use crate::domain::stock::StockCandidate;
use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::Row;

pub async fn load_candidates(
    pool: &sqlx::PgPool,
    fresh_since: NaiveDate,
) -> anyhow::Result<Vec<StockCandidate>> {
    let rows = sqlx::query(
        "SELECT id, ticker, name, sector, latest_price, change_rate_1w, volatility, volume_ratio, \
                market_cap, is_profitable, ma_deviation, dividend_yield, per, pbr, earnings_trend, \
                revenue_growth, eps, week52_high, week52_low \
         FROM stocks \
         WHERE is_delisted = FALSE AND price_date IS NOT NULL AND price_date >= $1 \
         ORDER BY id ASC",
    )
    .persistent(false)
    .bind(fresh_since)
    .fetch_all(pool)
    .await
    .context("load stocks failed")?;

    rows.iter().map(row_to_candidate).collect()
}

fn row_to_candidate(row: &PgRow) -> anyhow::Result<StockCandidate> {
    let ticker: String = row.try_get("ticker")?;
    let earnings_trend = row
        .try_get::<Option<String>, _>("earnings_trend")?
        .and_then(|s| match s.parse() {
            Ok(t) => Some(t),
            Err(err) => {
                tracing::debug!(%ticker, error = %err, "ignoring unknown earnings trend");
                None
            }
        });

    Ok(StockCandidate {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        sector: row
            .try_get::<Option<String>, _>("sector")?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        latest_price: row.try_get("latest_price")?,
        change_rate_1w: row.try_get("change_rate_1w")?,
        volatility: row.try_get("volatility")?,
        volume_ratio: row.try_get("volume_ratio")?,
        market_cap: row.try_get("market_cap")?,
        is_profitable: row.try_get("is_profitable")?,
        ma_deviation: row.try_get("ma_deviation")?,
        dividend_yield: row.try_get("dividend_yield")?,
        per: row.try_get("per")?,
        pbr: row.try_get("pbr")?,
        earnings_trend,
        revenue_growth: row.try_get("revenue_growth")?,
        eps: row.try_get("eps")?,
        week52_high: row.try_get("week52_high")?,
        week52_low: row.try_get("week52_low")?,
        ticker,
    })
}
