use crate::domain::recommendation::{
    MarketSentiment, Selection, SelectionResult, MAX_SELECTIONS,
};
use anyhow::{ensure, Context};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

/// Raw shape requested from the model. Items stay untyped so that one bad item can be
/// dropped without rejecting the batch.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSelectionResponse {
    #[serde(default)]
    pub market_sentiment: Option<String>,
    pub selections: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSelectionItem {
    pub ticker: String,
    pub reason: String,
    #[serde(default)]
    pub theme: Option<String>,
}

impl LlmSelectionResponse {
    pub fn from_value(value: Value) -> anyhow::Result<Self> {
        ensure!(value.is_object(), "model response is not a JSON object");
        serde_json::from_value(value)
            .context("model response is missing a `selections` array")
    }

    /// Keeps every well-formed selection that names a shortlisted ticker, in model order,
    /// capped at [`MAX_SELECTIONS`]. Zero survivors is an error.
    pub fn validate_and_into_result(
        self,
        known_tickers: &HashSet<&str>,
    ) -> anyhow::Result<SelectionResult> {
        let sentiment = self
            .market_sentiment
            .as_deref()
            .and_then(|s| s.parse::<MarketSentiment>().ok())
            .unwrap_or_default();

        let total = self.selections.len();
        let mut seen = HashSet::new();
        let mut selections = Vec::with_capacity(MAX_SELECTIONS);
        for raw in self.selections {
            let Some(selection) = LlmSelectionItem::into_selection(raw) else {
                continue;
            };
            if !known_tickers.contains(selection.ticker.as_str()) {
                tracing::warn!(ticker = %selection.ticker, "model picked a ticker outside the shortlist; dropping");
                continue;
            }
            if !seen.insert(selection.ticker.clone()) {
                continue;
            }
            selections.push(selection);
            if selections.len() == MAX_SELECTIONS {
                break;
            }
        }

        if selections.len() < total {
            tracing::debug!(total, kept = selections.len(), "dropped model selections");
        }

        ensure!(
            !selections.is_empty(),
            "model returned no valid selections (received {total})"
        );

        Ok(SelectionResult {
            sentiment,
            selections,
        })
    }
}

impl LlmSelectionItem {
    fn into_selection(raw: Value) -> Option<Selection> {
        let item = match serde_json::from_value::<LlmSelectionItem>(raw) {
            Ok(item) => item,
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed model selection");
                return None;
            }
        };

        let ticker = item.ticker.trim().to_string();
        let reason = item.reason.trim().to_string();
        if ticker.is_empty() || reason.is_empty() {
            return None;
        }

        // An unknown tag loses the tag, not the pick.
        let theme = item.theme.as_deref().and_then(|t| t.parse().ok());

        Some(Selection {
            ticker,
            reason,
            theme,
        })
    }
}

pub fn parse_selection_value(
    value: Value,
    known_tickers: &HashSet<&str>,
) -> anyhow::Result<SelectionResult> {
    LlmSelectionResponse::from_value(value)?.validate_and_into_result(known_tickers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recommendation::ThemeTag;
    use serde_json::json;

    fn known() -> HashSet<&'static str> {
        ["1001", "1002", "1003", "1004", "1005", "1006", "1007"]
            .into_iter()
            .collect()
    }

    #[test]
    fn rejects_missing_or_non_array_selections() {
        assert!(parse_selection_value(json!({"market_sentiment": "bullish"}), &known()).is_err());
        assert!(parse_selection_value(json!({"selections": "1001"}), &known()).is_err());
        assert!(parse_selection_value(json!([]), &known()).is_err());
    }

    #[test]
    fn drops_items_missing_required_fields() {
        let value = json!({
            "market_sentiment": "bearish",
            "selections": [
                {"ticker": "1001", "reason": "steady earnings", "theme": "value"},
                {"ticker": "1002"},
                {"reason": "no ticker"},
                {"ticker": "1003", "reason": "   "},
                {"ticker": "1004", "reason": "breakout", "theme": "moonshot"},
            ]
        });
        let result = parse_selection_value(value, &known()).unwrap();
        assert_eq!(result.sentiment, MarketSentiment::Bearish);
        assert_eq!(result.selections.len(), 2);
        assert_eq!(result.selections[0].theme, Some(ThemeTag::Value));
        assert_eq!(result.selections[1].ticker, "1004");
        assert_eq!(result.selections[1].theme, None);
    }

    #[test]
    fn truncates_to_five_and_skips_duplicates_and_unknown_tickers() {
        let items: Vec<_> = ["1001", "1001", "9999", "1002", "1003", "1004", "1005", "1006"]
            .iter()
            .map(|t| json!({"ticker": t, "reason": format!("pick {t}")}))
            .collect();
        let result = parse_selection_value(json!({"selections": items}), &known()).unwrap();
        let tickers: Vec<_> = result.selections.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["1001", "1002", "1003", "1004", "1005"]);
        assert_eq!(result.sentiment, MarketSentiment::Neutral);
    }

    #[test]
    fn zero_valid_selections_is_an_error() {
        let value = json!({"market_sentiment": "neutral", "selections": [{"ticker": "1001"}]});
        assert!(parse_selection_value(value, &known()).is_err());
    }
}
