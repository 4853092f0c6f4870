use crate::domain::user::UserProfile;
use anyhow::Context;
use rust_decimal::Decimal;
use uuid::Uuid;

type ProfileRow = (Uuid, String, String, Option<Decimal>);

pub async fn load_profiles(
    pool: &sqlx::PgPool,
    target: Option<Uuid>,
) -> anyhow::Result<Vec<UserProfile>> {
    let rows: Vec<ProfileRow> = match target {
        Some(user_id) => sqlx::query_as(
            "SELECT user_id, investment_period, risk_tolerance, investment_budget \
             FROM user_settings \
             WHERE user_id = $1",
        )
        .persistent(false)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("load user_settings (single user) failed")?,
        None => sqlx::query_as(
            "SELECT user_id, investment_period, risk_tolerance, investment_budget \
             FROM user_settings \
             ORDER BY user_id ASC",
        )
        .persistent(false)
        .fetch_all(pool)
        .await
        .context("load user_settings failed")?,
    };

    Ok(rows.into_iter().filter_map(row_to_profile).collect())
}

fn row_to_profile((user_id, period, risk, budget): ProfileRow) -> Option<UserProfile> {
    let horizon = match period.parse() {
        Ok(h) => h,
        Err(err) => {
            tracing::warn!(%user_id, error = %err, "skipping user with invalid investment period");
            return None;
        }
    };
    let risk = match risk.parse() {
        Ok(r) => r,
        Err(err) => {
            tracing::warn!(%user_id, error = %err, "skipping user with invalid risk tolerance");
            return None;
        }
    };
    Some(UserProfile {
        user_id,
        horizon,
        risk,
        total_budget: budget,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::{InvestmentHorizon, RiskTolerance};

    #[test]
    fn maps_rows_and_skips_invalid_settings() {
        let id = Uuid::new_v4();
        let ok = row_to_profile((id, "Long".into(), "low".into(), Some(Decimal::from(1_000)))).unwrap();
        assert_eq!(ok.horizon, InvestmentHorizon::Long);
        assert_eq!(ok.risk, RiskTolerance::Low);
        assert!(row_to_profile((id, "forever".into(), "low".into(), None)).is_none());
    }
}
