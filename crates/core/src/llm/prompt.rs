use crate::domain::recommendation::{MarketSentiment, ThemeTag, MAX_SELECTIONS};
use crate::domain::user::{InvestmentHorizon, RiskTolerance, Session};
use crate::llm::SelectionRequest;

/// JSON schema for the selection tool input.
pub fn selection_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["market_sentiment", "selections"],
        "properties": {
            "market_sentiment": {"type": "string", "enum": MarketSentiment::ALL},
            "selections": {
                "type": "array",
                "maxItems": MAX_SELECTIONS,
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["ticker", "reason"],
                    "properties": {
                        "ticker": {"type": "string"},
                        "reason": {"type": "string"},
                        "theme": {"type": "string", "enum": ThemeTag::ALL}
                    }
                }
            }
        }
    })
}

fn session_focus(session: Session) -> &'static str {
    match session {
        Session::Morning => {
            "It is before the market opens. Focus on names set up for today's session and what to watch at the open."
        }
        Session::Afternoon => {
            "The market is mid-session. Focus on intraday momentum and whether the morning moves are holding."
        }
        Session::Evening => {
            "The market has closed. Review today's action and pick names worth preparing for tomorrow."
        }
    }
}

fn horizon_text(h: InvestmentHorizon) -> &'static str {
    match h {
        InvestmentHorizon::Short => "short-term (days to weeks)",
        InvestmentHorizon::Medium => "medium-term (months)",
        InvestmentHorizon::Long => "long-term (a year or more)",
    }
}

fn risk_text(r: RiskTolerance) -> &'static str {
    match r {
        RiskTolerance::Low => "low: prefers stable, established companies",
        RiskTolerance::Medium => "medium: accepts moderate swings for better returns",
        RiskTolerance::High => "high: comfortable with volatile, high-upside names",
    }
}

pub fn system_prompt(session: Session) -> String {
    let pick_rule =
        format!("Pick up to {MAX_SELECTIONS} stocks ONLY from the candidates provided, best first.");
    [
        "You are an investment coach picking stocks for an individual investor.",
        session_focus(session),
        pick_rule.as_str(),
        "Each reason must be two or three plain sentences grounded in the candidate data.",
        "Never recommend a stock whose price exceeds the remaining budget.",
        "Respond by calling the provided tool. Do not add prose.",
    ]
    .join("\n")
}

pub fn user_prompt(req: &SelectionRequest) -> String {
    let budget = match req.remaining_budget {
        Some(b) => format!("{}", b.round()),
        None => "not set".to_string(),
    };
    let market = if req.market_context.trim().is_empty() {
        "No market overview available."
    } else {
        req.market_context.trim()
    };

    format!(
        "Investor profile\n- Horizon: {}\n- Risk tolerance: {}\n- Remaining budget: {budget}\n\n\
Market overview\n{market}\n\n\
Candidates ({n})\n{candidates}",
        horizon_text(req.horizon),
        risk_text(req.risk),
        n = req.briefings.len(),
        candidates = req.briefings.join("\n"),
    )
}
