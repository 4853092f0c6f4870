pub mod anthropic;
pub mod error;
pub mod json;
pub mod prompt;

use crate::domain::user::{InvestmentHorizon, RiskTolerance, Session};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Everything the model sees for one user run.
#[derive(Debug, Clone)]
pub struct SelectionRequest {
    pub user_id: Uuid,
    pub session: Session,
    pub horizon: InvestmentHorizon,
    pub risk: RiskTolerance,
    pub remaining_budget: Option<Decimal>,
    pub market_context: String,
    pub briefings: Vec<String>,
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> &'static str;

    /// Issues exactly one schema-constrained request and returns the structured object
    /// as produced by the model, unvalidated.
    async fn request_selection(&self, req: &SelectionRequest) -> anyhow::Result<serde_json::Value>;
}

/// Client for pipelines that must never reach the model, such as dry-run previews.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledModel;

#[async_trait::async_trait]
impl LlmClient for DisabledModel {
    fn provider(&self) -> &'static str {
        "disabled"
    }

    async fn request_selection(&self, req: &SelectionRequest) -> anyhow::Result<serde_json::Value> {
        anyhow::bail!("model calls are disabled (user_id={})", req.user_id)
    }
}
