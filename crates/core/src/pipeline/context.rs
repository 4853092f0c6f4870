use crate::domain::stock::StockCandidate;
use crate::market::{HistoricalPriceSource, PriceBar, RealtimePriceSource};
use crate::pipeline::scoring::ScoredCandidate;
use crate::pipeline::technical;
use futures::future::join_all;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceOrigin {
    Realtime,
    Snapshot,
    /// No price known; `current_price` is zero and must not drive decisions.
    Missing,
}

#[derive(Debug, Clone)]
pub struct CandidateBriefing<'a> {
    pub candidate: &'a StockCandidate,
    pub score: f64,
    pub current_price: Decimal,
    pub price_origin: PriceOrigin,
    pub text: String,
}

impl CandidateBriefing<'_> {
    pub fn known_price(&self) -> Option<Decimal> {
        match self.price_origin {
            PriceOrigin::Missing => None,
            _ => Some(self.current_price),
        }
    }
}

/// Fetches per-ticker history and one batched quote lookup concurrently, then renders a
/// briefing per shortlisted candidate. Fetch failures degrade the briefing, never fail it.
pub async fn assemble_briefings<'a>(
    shortlist: &[ScoredCandidate<'a>],
    history: &dyn HistoricalPriceSource,
    realtime: &dyn RealtimePriceSource,
    range: &str,
) -> Vec<CandidateBriefing<'a>> {
    let tickers: Vec<String> = shortlist
        .iter()
        .map(|c| c.candidate.ticker.clone())
        .collect();

    let history_futs = shortlist.iter().map(|c| {
        let ticker = c.candidate.ticker.as_str();
        async move {
            match history.fetch_daily_bars(ticker, range).await {
                Ok(bars) => bars,
                Err(err) => {
                    tracing::warn!(%ticker, error = %err, "history fetch failed; using empty technical context");
                    Vec::new()
                }
            }
        }
    });

    let (histories, quotes) = tokio::join!(join_all(history_futs), realtime.fetch_quotes(&tickers));
    let quotes = quotes.unwrap_or_else(|err| {
        tracing::warn!(error = %err, tickers = tickers.len(), "quote fetch failed; using snapshot prices");
        HashMap::new()
    });

    shortlist
        .iter()
        .zip(histories)
        .map(|(scored, bars)| {
            let (current_price, price_origin) = resolve_price(scored.candidate, &quotes);
            let text = render_briefing(scored.candidate, current_price, price_origin, &bars);
            CandidateBriefing {
                candidate: scored.candidate,
                score: scored.score,
                current_price,
                price_origin,
                text,
            }
        })
        .collect()
}

/// Fresh quote, then snapshot price, then zero.
pub fn resolve_price(
    candidate: &StockCandidate,
    quotes: &HashMap<String, f64>,
) -> (Decimal, PriceOrigin) {
    if let Some(p) = quotes
        .get(&candidate.ticker)
        .and_then(|&p| Decimal::from_f64(p))
        .filter(|p| *p > Decimal::ZERO)
    {
        return (p.round_dp(4), PriceOrigin::Realtime);
    }
    match candidate.latest_price.filter(|p| *p > Decimal::ZERO) {
        Some(p) => (p, PriceOrigin::Snapshot),
        None => (Decimal::ZERO, PriceOrigin::Missing),
    }
}

fn render_briefing(
    c: &StockCandidate,
    price: Decimal,
    origin: PriceOrigin,
    bars: &[PriceBar],
) -> String {
    let mut out = String::new();
    let sector = c.sector.as_deref().unwrap_or("unknown sector");
    let _ = writeln!(out, "[{}] {} ({sector})", c.ticker, c.name);

    let price_part = match origin {
        PriceOrigin::Realtime => format!("Price {price} (live)"),
        PriceOrigin::Snapshot => format!("Price {price} (last close)"),
        PriceOrigin::Missing => "Price unknown".to_string(),
    };
    let mut fields = vec![price_part];
    push_opt(&mut fields, "1w", c.change_rate_1w, |v| format!("{v:+.1}%"));
    push_opt(&mut fields, "Vol", c.volatility, |v| format!("{v:.1}%"));
    push_opt(&mut fields, "VolumeRatio", c.volume_ratio, |v| format!("{v:.2}x"));
    push_opt(&mut fields, "MA dev", c.ma_deviation, |v| format!("{v:+.1}%"));
    push_opt(&mut fields, "PER", c.per, |v| format!("{v:.1}"));
    push_opt(&mut fields, "PBR", c.pbr, |v| format!("{v:.2}"));
    push_opt(&mut fields, "Div", c.dividend_yield, |v| format!("{v:.2}%"));
    push_opt(&mut fields, "EPS", c.eps, |v| format!("{v:.1}"));
    push_opt(&mut fields, "RevGrowth", c.revenue_growth, |v| format!("{v:+.1}%"));
    if let Some(cap) = c.market_cap {
        fields.push(format!("MktCap {}", cap.round()));
    }
    if let Some(p) = c.is_profitable {
        fields.push(if p { "profitable" } else { "loss-making" }.to_string());
    }
    if let Some(t) = c.earnings_trend {
        fields.push(format!("earnings {t:?}").to_lowercase());
    }
    if let Some(pos) = c.range_position() {
        fields.push(format!("52w position {:.0}%", pos * 100.0));
    }
    let _ = writeln!(out, "{}", fields.join(" | "));

    if bars.is_empty() {
        let _ = writeln!(out, "Technicals: unavailable");
        return out;
    }

    let _ = writeln!(out, "{}", technical::technical_summary(bars));
    let candles = technical::candlestick_patterns(bars);
    if !candles.is_empty() {
        let _ = writeln!(out, "Candles: {}", candles.join(", "));
    }
    let charts = technical::chart_patterns(bars);
    if !charts.is_empty() {
        let _ = writeln!(out, "Chart: {}", charts.join(", "));
    }
    let _ = writeln!(out, "{}", technical::week_change_narrative(bars));
    out
}

fn push_opt(fields: &mut Vec<String>, label: &str, v: Option<f64>, fmt: impl Fn(f64) -> String) {
    if let Some(v) = v.filter(|v| v.is_finite()) {
        fields.push(format!("{label} {}", fmt(v)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stock::test_candidate;
    use crate::pipeline::technical::bars_from_closes;
    use std::collections::HashSet;

    struct History {
        failing: HashSet<String>,
    }

    #[async_trait::async_trait]
    impl HistoricalPriceSource for History {
        async fn fetch_daily_bars(&self, ticker: &str, _range: &str) -> anyhow::Result<Vec<PriceBar>> {
            anyhow::ensure!(!self.failing.contains(ticker), "boom");
            let closes: Vec<f64> = (0..22).map(|i| 100.0 + i as f64).collect();
            Ok(bars_from_closes(&closes))
        }
    }

    struct Quotes(Option<HashMap<String, f64>>);

    #[async_trait::async_trait]
    impl RealtimePriceSource for Quotes {
        async fn fetch_quotes(&self, _tickers: &[String]) -> anyhow::Result<HashMap<String, f64>> {
            self.0.clone().ok_or_else(|| anyhow::anyhow!("quotes down"))
        }
    }

    fn shortlist(all: &[StockCandidate]) -> Vec<ScoredCandidate<'_>> {
        all.iter()
            .map(|candidate| ScoredCandidate { candidate, score: 50.0 })
            .collect()
    }

    #[test]
    fn price_precedence() {
        let priced = test_candidate(1, None, Some(900));
        let unpriced = test_candidate(2, None, None);
        let quotes: HashMap<String, f64> = [(priced.ticker.clone(), 950.5)].into_iter().collect();

        assert_eq!(
            resolve_price(&priced, &quotes),
            (Decimal::new(9505, 1), PriceOrigin::Realtime)
        );
        assert_eq!(
            resolve_price(&priced, &HashMap::new()),
            (Decimal::from(900), PriceOrigin::Snapshot)
        );
        assert_eq!(
            resolve_price(&unpriced, &HashMap::new()),
            (Decimal::ZERO, PriceOrigin::Missing)
        );
    }

    #[tokio::test]
    async fn one_failed_history_only_degrades_that_candidate() {
        let all = vec![test_candidate(1, Some("Tech"), Some(100)), test_candidate(2, None, Some(200))];
        let history = History {
            failing: [all[1].ticker.clone()].into_iter().collect(),
        };
        let quotes = Quotes(Some([(all[0].ticker.clone(), 105.0)].into_iter().collect()));

        let out = assemble_briefings(&shortlist(&all), &history, &quotes, "1mo").await;
        assert_eq!(out.len(), 2);
        assert!(out[0].text.contains("SMA5"));
        assert_eq!(out[0].price_origin, PriceOrigin::Realtime);
        assert!(out[1].text.contains("Technicals: unavailable"));
        assert_eq!(out[1].price_origin, PriceOrigin::Snapshot);
    }

    #[tokio::test]
    async fn failed_quote_batch_falls_back_to_snapshot_prices() {
        let all = vec![test_candidate(1, None, Some(100)), test_candidate(2, None, None)];
        let history = History { failing: HashSet::new() };
        let out = assemble_briefings(&shortlist(&all), &history, &Quotes(None), "1mo").await;
        assert_eq!(out[0].known_price(), Some(Decimal::from(100)));
        assert_eq!(out[1].known_price(), None);
        assert!(out[1].text.contains("Price unknown"));
    }
}
