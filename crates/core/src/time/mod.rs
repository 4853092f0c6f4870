use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};

const DEFAULT_MARKET_UTC_OFFSET_HOURS: i32 = 9;

fn market_offset() -> anyhow::Result<chrono::FixedOffset> {
    let hours = std::env::var("MARKET_UTC_OFFSET_HOURS")
        .ok()
        .and_then(|s| s.parse::<i32>().ok())
        .filter(|h| (-12..=14).contains(h))
        .unwrap_or(DEFAULT_MARKET_UTC_OFFSET_HOURS);
    chrono::FixedOffset::east_opt(hours * 3600).context("invalid market UTC offset")
}

/// Recommendation date: the explicit `YYYY-MM-DD` argument, else today in market time.
pub fn resolve_run_date(date_arg: Option<&str>, now_utc: DateTime<Utc>) -> anyhow::Result<NaiveDate> {
    if let Some(s) = date_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid date: {s}"));
    }
    Ok(now_utc.with_timezone(&market_offset()?).date_naive())
}

/// Oldest price date still considered fresh for a run on `run_date`.
pub fn stale_price_cutoff(run_date: NaiveDate, stale_days: u32) -> NaiveDate {
    run_date - Duration::days(i64::from(stale_days))
}
