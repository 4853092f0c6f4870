use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EarningsTrend {
    Improving,
    Stable,
    Declining,
}

impl FromStr for EarningsTrend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "improving" | "up" | "increase" => Ok(Self::Improving),
            "stable" | "flat" => Ok(Self::Stable),
            "declining" | "down" | "decrease" => Ok(Self::Declining),
            other => anyhow::bail!("unknown earnings trend: {other}"),
        }
    }
}

/// Point-in-time view of one listed equity, loaded once per pipeline run.
///
/// Currency amounts stay `Decimal`; ratios and rates are plain floats since they only
/// feed comparative scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockCandidate {
    pub id: i64,
    pub ticker: String,
    pub name: String,
    pub sector: Option<String>,
    pub latest_price: Option<Decimal>,
    /// Percent change over the last week (e.g. 3.5 for +3.5%).
    pub change_rate_1w: Option<f64>,
    /// Annualised volatility in percent.
    pub volatility: Option<f64>,
    /// Latest volume divided by its trailing average.
    pub volume_ratio: Option<f64>,
    pub market_cap: Option<Decimal>,
    pub is_profitable: Option<bool>,
    /// Percent deviation of the latest price from its 25-day moving average.
    pub ma_deviation: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub per: Option<f64>,
    pub pbr: Option<f64>,
    pub earnings_trend: Option<EarningsTrend>,
    pub revenue_growth: Option<f64>,
    pub eps: Option<f64>,
    pub week52_high: Option<Decimal>,
    pub week52_low: Option<Decimal>,
}

impl StockCandidate {
    pub fn market_cap_f64(&self) -> Option<f64> {
        self.market_cap.and_then(|c| c.to_f64())
    }

    /// Where the latest price sits inside the 52-week range, 0.0 at the low and 1.0 at the high.
    pub fn range_position(&self) -> Option<f64> {
        let price = self.latest_price?;
        let high = self.week52_high?;
        let low = self.week52_low?;
        let span = high - low;
        if span <= Decimal::ZERO {
            return None;
        }
        ((price - low) / span).to_f64().map(|p| p.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
pub(crate) fn test_candidate(id: i64, sector: Option<&str>, price: Option<i64>) -> StockCandidate {
    StockCandidate {
        id,
        ticker: format!("{}", 1000 + id),
        name: format!("Stock {id}"),
        sector: sector.map(str::to_string),
        latest_price: price.map(Decimal::from),
        change_rate_1w: None,
        volatility: None,
        volume_ratio: None,
        market_cap: None,
        is_profitable: None,
        ma_deviation: None,
        dividend_yield: None,
        per: None,
        pbr: None,
        earnings_trend: None,
        revenue_growth: None,
        eps: None,
        week52_high: None,
        week52_low: None,
    }
}
