use crate::domain::recommendation::{MarketSentiment, SavedRecommendation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRunResult {
    pub user_id: Uuid,
    pub success: bool,
    /// The model's read of the market for this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_sentiment: Option<MarketSentiment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<SavedRecommendation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UserRunResult {
    pub fn saved(
        user_id: Uuid,
        market_sentiment: MarketSentiment,
        recommendations: Vec<SavedRecommendation>,
    ) -> Self {
        Self {
            user_id,
            success: true,
            market_sentiment: Some(market_sentiment),
            recommendations: Some(recommendations),
            error: None,
        }
    }

    pub fn failed(user_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            user_id,
            success: false,
            market_sentiment: None,
            recommendations: None,
            error: Some(error.into()),
        }
    }
}

/// Aggregate returned to the batch caller. Per-user failures never flip `success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub success: bool,
    pub processed: usize,
    pub failed: usize,
    pub results: Vec<UserRunResult>,
}

impl RunReport {
    pub fn from_results(results: Vec<UserRunResult>) -> Self {
        let processed = results.iter().filter(|r| r.success).count();
        Self {
            success: true,
            processed,
            failed: results.len() - processed,
            results,
        }
    }
}
