use crate::domain::contract::parse_selection_value;
use crate::domain::recommendation::SelectionResult;
use crate::llm::{LlmClient, SelectionRequest};
use std::collections::HashSet;

/// One model request, then validation against the shortlisted tickers.
pub async fn select_stocks(
    llm: &dyn LlmClient,
    req: &SelectionRequest,
    known_tickers: &HashSet<&str>,
) -> anyhow::Result<SelectionResult> {
    let t0 = std::time::Instant::now();
    let value = llm.request_selection(req).await?;
    let result = parse_selection_value(value, known_tickers)?;
    tracing::info!(
        user_id = %req.user_id,
        provider = llm.provider(),
        session = %req.session,
        sentiment = ?result.sentiment,
        selections = result.selections.len(),
        elapsed_ms = t0.elapsed().as_millis(),
        "model selection received"
    );
    Ok(result)
}
