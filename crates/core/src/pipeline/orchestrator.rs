//! Runs one user through budget filter, scoring, diversification, context, model selection
//! and persistence. Any stage failure ends that user's run; other users are unaffected.

use crate::domain::recommendation::{
    MarketSentiment, OutcomeRecord, Prediction, RecommendationSlot, SavedRecommendation,
    SelectionResult,
};
use crate::domain::stock::StockCandidate;
use crate::domain::user::{Session, UserProfile};
use crate::llm::SelectionRequest;
use crate::pipeline::context::{assemble_briefings, CandidateBriefing};
use crate::pipeline::diversify::{diversify, exclude_registered, DiversifyOptions};
use crate::pipeline::report::UserRunResult;
use crate::pipeline::scoring::{rank_candidates, ScoredCandidate};
use crate::pipeline::{budget, selection, Pipeline};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::fmt;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Started,
    BudgetFiltered,
    Scored,
    Diversified,
    ContextBuilt,
    Selected,
    Saved,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Started => "started",
            Self::BudgetFiltered => "budget_filtered",
            Self::Scored => "scored",
            Self::Diversified => "diversified",
            Self::ContextBuilt => "context_built",
            Self::Selected => "selected",
            Self::Saved => "saved",
        })
    }
}

/// Why a user's run stopped. `stage` is the last stage that completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub reason: String,
}

impl StageFailure {
    fn after(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Per-user inputs precomputed before fan-out.
#[derive(Debug, Clone)]
pub struct UserInput {
    pub profile: UserProfile,
    pub remaining_budget: Option<Decimal>,
    /// Held or watched stock IDs.
    pub registered: HashSet<i64>,
}

/// Run-wide values shared by every user task.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub date: NaiveDate,
    pub session: Session,
    pub market_context: String,
}

/// Budget filter, scoring and diversification. Pure and deterministic.
pub fn build_shortlist<'a>(
    candidates: &'a [StockCandidate],
    input: &UserInput,
    opts: &DiversifyOptions,
) -> Result<Vec<ScoredCandidate<'a>>, StageFailure> {
    let affordable = budget::filter_affordable(candidates, input.remaining_budget);
    if affordable.is_empty() {
        return Err(StageFailure::after(
            Stage::Started,
            "No stocks available after budget filter",
        ));
    }
    tracing::debug!(stage = %Stage::BudgetFiltered, affordable = affordable.len());

    let ranked = rank_candidates(&affordable, input.profile.horizon, input.profile.risk);
    let shortlist = diversify(&ranked, opts);
    let shortlist = exclude_registered(shortlist, &input.registered, opts.exclusion_floor);
    if shortlist.is_empty() {
        return Err(StageFailure::after(
            Stage::Scored,
            "No candidates left after diversification",
        ));
    }
    Ok(shortlist)
}

impl Pipeline {
    pub async fn process_user(
        &self,
        input: &UserInput,
        candidates: &[StockCandidate],
        run: &RunContext,
    ) -> UserRunResult {
        let user_id = input.profile.user_id;
        let span = tracing::info_span!("user_run", %user_id, session = %run.session);

        match self.run_stages(input, candidates, run).instrument(span).await {
            Ok((sentiment, saved)) => {
                tracing::info!(%user_id, stage = %Stage::Saved, ?sentiment, saved = saved.len(), "user run saved");
                UserRunResult::saved(user_id, sentiment, saved)
            }
            Err(failure) => {
                tracing::warn!(%user_id, stage = %failure.stage, reason = %failure.reason, "user run failed");
                UserRunResult::failed(user_id, failure.reason)
            }
        }
    }

    async fn run_stages(
        &self,
        input: &UserInput,
        candidates: &[StockCandidate],
        run: &RunContext,
    ) -> Result<(MarketSentiment, Vec<SavedRecommendation>), StageFailure> {
        let shortlist = build_shortlist(candidates, input, &self.opts.diversify)?;
        tracing::debug!(stage = %Stage::Diversified, shortlist = shortlist.len());

        let briefings = assemble_briefings(
            &shortlist,
            self.history.as_ref(),
            self.realtime.as_ref(),
            &self.opts.history_range,
        )
        .await;
        tracing::debug!(stage = %Stage::ContextBuilt, briefings = briefings.len());

        let request = SelectionRequest {
            user_id: input.profile.user_id,
            session: run.session,
            horizon: input.profile.horizon,
            risk: input.profile.risk,
            remaining_budget: input.remaining_budget,
            market_context: run.market_context.clone(),
            briefings: briefings.iter().map(|b| b.text.clone()).collect(),
        };
        let known: HashSet<&str> = briefings
            .iter()
            .map(|b| b.candidate.ticker.as_str())
            .collect();
        let result = selection::select_stocks(self.llm.as_ref(), &request, &known)
            .await
            .map_err(|err| {
                StageFailure::after(Stage::ContextBuilt, format!("AI selection failed: {err:#}"))
            })?;

        let saved = self.save(input, run, &briefings, &result).await?;
        Ok((result.sentiment, saved))
    }

    /// Upserts one slot per selection in model order, each followed by its outcome record.
    /// A failed slot is skipped; the run fails only if nothing was saved.
    async fn save(
        &self,
        input: &UserInput,
        run: &RunContext,
        briefings: &[CandidateBriefing<'_>],
        result: &SelectionResult,
    ) -> Result<Vec<SavedRecommendation>, StageFailure> {
        let user_id = input.profile.user_id;
        let mut saved = Vec::with_capacity(result.selections.len());

        for (idx, pick) in result.selections.iter().enumerate() {
            let position = idx as i32 + 1;
            let Some(briefing) = briefings.iter().find(|b| b.candidate.ticker == pick.ticker) else {
                tracing::warn!(%user_id, ticker = %pick.ticker, "selection not in shortlist; skipping");
                continue;
            };
            let stock = briefing.candidate;

            let slot = match RecommendationSlot::new(user_id, run.date, position, stock.id, pick, run.session) {
                Ok(slot) => slot,
                Err(err) => {
                    tracing::warn!(%user_id, position, error = %err, "invalid slot; skipping");
                    continue;
                }
            };

            let recommendation_id = match self.store.upsert_slot(&slot).await {
                Ok(id) => id,
                Err(err) => {
                    tracing::error!(%user_id, position, ticker = %stock.ticker, error = %err, "slot upsert failed");
                    continue;
                }
            };

            let outcome = OutcomeRecord {
                recommendation_id,
                user_id,
                stock_id: stock.id,
                recommended_on: run.date,
                price_at_recommendation: briefing.known_price(),
                sector: stock.sector.clone(),
                volatility: stock.volatility,
                market_cap: stock.market_cap,
                prediction: Prediction::Buy,
                session: run.session,
            };
            if let Err(err) = self.store.insert_outcome(&outcome).await {
                tracing::warn!(%user_id, position, %recommendation_id, error = %err, "outcome insert failed; slot kept");
            }

            saved.push(SavedRecommendation {
                position,
                stock_id: stock.id,
                ticker: stock.ticker.clone(),
                name: stock.name.clone(),
                reason: pick.reason.clone(),
                theme: pick.theme,
            });
        }

        if saved.is_empty() {
            return Err(StageFailure::after(
                Stage::Selected,
                "Failed to save recommendations",
            ));
        }

        let keep = result.selections.len() as i32;
        match self.store.prune_slots_after(user_id, run.date, keep).await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(%user_id, removed, "pruned stale slots"),
            Err(err) => tracing::warn!(%user_id, error = %err, "stale slot prune failed"),
        }

        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{forty_candidates, profile};
    use std::collections::HashMap;

    fn input(budget: Option<i64>, registered: &[i64]) -> UserInput {
        let profile = profile(budget);
        UserInput {
            remaining_budget: profile.total_budget,
            registered: registered.iter().copied().collect(),
            profile,
        }
    }

    #[test]
    fn shortlist_respects_capacity_and_sector_cap() {
        let all = forty_candidates();
        let shortlist = build_shortlist(&all, &input(None, &[]), &DiversifyOptions::default()).unwrap();
        assert_eq!(shortlist.len(), 15);

        let mut per_sector: HashMap<&str, usize> = HashMap::new();
        for c in &shortlist {
            *per_sector.entry(c.sector().unwrap()).or_default() += 1;
        }
        assert!(per_sector.values().all(|&n| n <= 3));
        assert!(shortlist.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn empty_budget_filter_fails_before_scoring() {
        let all = forty_candidates();
        let failure = build_shortlist(&all, &input(Some(5_000), &[]), &DiversifyOptions::default())
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Started);
        assert_eq!(failure.reason, "No stocks available after budget filter");
    }

    #[test]
    fn registered_exclusion_never_starves_the_shortlist() {
        let all = forty_candidates();
        let opts = DiversifyOptions::default();
        // Budget leaves ids 1..=6; registering all of them would empty the list.
        let starved = build_shortlist(&all, &input(Some(60_000), &[1, 2, 3, 4, 5, 6]), &opts).unwrap();
        assert_eq!(starved.len(), 6);

        let plenty = build_shortlist(&all, &input(None, &[1, 2, 3, 4, 5, 6]), &opts).unwrap();
        assert!(plenty.len() >= 9);
        assert!(plenty.iter().all(|c| c.candidate.id > 6));
    }

    #[test]
    fn stage_failure_displays_its_reason() {
        let failure = StageFailure::after(Stage::Selected, "Failed to save recommendations");
        assert_eq!(failure.to_string(), "Failed to save recommendations");
        assert_eq!(Stage::BudgetFiltered.to_string(), "budget_filtered");
    }
}
