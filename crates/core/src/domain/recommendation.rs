use crate::domain::user::Session;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Slots per user and date.
pub const MAX_SELECTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketSentiment {
    Bullish,
    #[default]
    Neutral,
    Bearish,
}

impl MarketSentiment {
    pub const ALL: [&'static str; 3] = ["bullish", "neutral", "bearish"];
}

impl FromStr for MarketSentiment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bullish" => Ok(Self::Bullish),
            "neutral" => Ok(Self::Neutral),
            "bearish" => Ok(Self::Bearish),
            other => anyhow::bail!("unknown market sentiment: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeTag {
    Growth,
    Value,
    Dividend,
    Momentum,
    Defensive,
    Rebound,
}

impl ThemeTag {
    pub const ALL: [&'static str; 6] = [
        "growth",
        "value",
        "dividend",
        "momentum",
        "defensive",
        "rebound",
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Growth => "growth",
            Self::Value => "value",
            Self::Dividend => "dividend",
            Self::Momentum => "momentum",
            Self::Defensive => "defensive",
            Self::Rebound => "rebound",
        }
    }
}

impl FromStr for ThemeTag {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "growth" => Ok(Self::Growth),
            "value" => Ok(Self::Value),
            "dividend" => Ok(Self::Dividend),
            "momentum" => Ok(Self::Momentum),
            "defensive" => Ok(Self::Defensive),
            "rebound" => Ok(Self::Rebound),
            other => anyhow::bail!("unknown theme tag: {other}"),
        }
    }
}

/// One validated pick from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub ticker: String,
    pub reason: String,
    pub theme: Option<ThemeTag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub sentiment: MarketSentiment,
    pub selections: Vec<Selection>,
}

/// Persisted unit of output. `(user_id, date, position)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationSlot {
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub position: i32,
    pub stock_id: i64,
    pub reason: String,
    pub theme: Option<ThemeTag>,
    pub session: Session,
}

impl RecommendationSlot {
    pub fn new(
        user_id: Uuid,
        date: NaiveDate,
        position: i32,
        stock_id: i64,
        selection: &Selection,
        session: Session,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            (1..=MAX_SELECTIONS as i32).contains(&position),
            "slot position out of range: {position}"
        );
        Ok(Self {
            user_id,
            date,
            position,
            stock_id,
            reason: selection.reason.clone(),
            theme: selection.theme,
            session,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prediction {
    Buy,
}

impl Prediction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
        }
    }
}

/// Append-only snapshot of what a recommendation looked like when it was issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub recommendation_id: Uuid,
    pub user_id: Uuid,
    pub stock_id: i64,
    pub recommended_on: NaiveDate,
    pub price_at_recommendation: Option<Decimal>,
    pub sector: Option<String>,
    pub volatility: Option<f64>,
    pub market_cap: Option<Decimal>,
    pub prediction: Prediction,
    pub session: Session,
}

/// A slot as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRecommendation {
    pub position: i32,
    pub stock_id: i64,
    pub ticker: String,
    pub name: String,
    pub reason: String,
    pub theme: Option<ThemeTag>,
}
