use crate::domain::holdings::{holdings_cost, open_stock_ids, remaining_budget};
use crate::domain::stock::StockCandidate;
use crate::domain::user::Session;
use crate::pipeline::context::assemble_briefings;
use crate::pipeline::orchestrator::{build_shortlist, RunContext, UserInput};
use crate::pipeline::report::{RunReport, UserRunResult};
use crate::pipeline::Pipeline;
use crate::time::stale_price_cutoff;
use anyhow::Context;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub date: NaiveDate,
    pub session: Session,
    /// Only this user when set; otherwise every user with saved settings.
    pub target_user: Option<Uuid>,
}

/// Shortlist and model context for one user, built without calling the model or writing
/// anything.
#[derive(Debug, Clone)]
pub struct ShortlistPreview {
    pub user_id: Uuid,
    pub shortlist: Result<Vec<String>, String>,
    /// Briefing text per shortlisted ticker; empty when the shortlist failed.
    pub briefings: Vec<String>,
}

struct Prepared {
    users: Vec<UserInput>,
    candidates: Arc<Vec<StockCandidate>>,
}

impl Pipeline {
    /// Bulk loads shared by every user. Any error here is an infrastructure failure.
    async fn prepare(&self, req: &RunRequest) -> anyhow::Result<Prepared> {
        let profiles = self
            .store
            .load_profiles(req.target_user)
            .await
            .context("loading users failed")?;

        let cutoff = stale_price_cutoff(req.date, self.opts.stale_price_days);
        let candidates = self
            .store
            .load_candidates(cutoff)
            .await
            .context("loading stocks failed")?;

        let user_ids: Vec<Uuid> = profiles.iter().map(|p| p.user_id).collect();
        let mut transactions = self
            .store
            .load_transactions(&user_ids)
            .await
            .context("loading holdings failed")?;
        let mut watched = self
            .store
            .load_watched(&user_ids)
            .await
            .context("loading watchlists failed")?;

        let users = profiles
            .into_iter()
            .map(|profile| {
                let txs = transactions.remove(&profile.user_id).unwrap_or_default();
                let cost = holdings_cost(&txs);
                let mut registered: HashSet<i64> = open_stock_ids(&txs).into_iter().collect();
                registered.extend(watched.remove(&profile.user_id).unwrap_or_default());
                UserInput {
                    remaining_budget: remaining_budget(profile.total_budget, cost),
                    registered,
                    profile,
                }
            })
            .collect();

        tracing::info!(
            %req.date,
            session = %req.session,
            %cutoff,
            candidates = candidates.len(),
            "pipeline inputs loaded"
        );

        Ok(Prepared {
            users,
            candidates: Arc::new(candidates),
        })
    }

    /// Processes every user under a concurrency cap and waits for all of them.
    /// Returns `Err` only when the initial loads fail.
    pub async fn run(self: &Arc<Self>, req: RunRequest) -> anyhow::Result<RunReport> {
        self.opts.validate()?;
        let t0 = std::time::Instant::now();
        let Prepared { users, candidates } = self.prepare(&req).await?;

        let market_context = match self.sentiment.fetch_market_context().await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "market context unavailable; continuing without it");
                String::new()
            }
        };
        let run = Arc::new(RunContext {
            date: req.date,
            session: req.session,
            market_context,
        });

        let semaphore = Arc::new(Semaphore::new(self.opts.concurrency));
        let mut handles = Vec::with_capacity(users.len());
        for input in users {
            let user_id = input.profile.user_id;
            let pipeline = Arc::clone(self);
            let candidates = Arc::clone(&candidates);
            let run = Arc::clone(&run);
            let semaphore = Arc::clone(&semaphore);

            let handle = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return UserRunResult::failed(user_id, "Worker pool closed");
                };
                pipeline.process_user(&input, &candidates, &run).await
            });
            handles.push((user_id, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (user_id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => {
                    tracing::error!(%user_id, error = %err, "user task aborted");
                    UserRunResult::failed(user_id, format!("Unexpected error: {err}"))
                }
            };
            results.push(result);
        }

        let report = RunReport::from_results(results);
        tracing::info!(
            %req.date,
            session = %req.session,
            processed = report.processed,
            failed = report.failed,
            elapsed_ms = t0.elapsed().as_millis(),
            "pipeline run finished"
        );
        Ok(report)
    }

    /// Same loads as [`Pipeline::run`], then shortlist and context assembly per user.
    /// Stops before the model call.
    pub async fn preview(&self, req: RunRequest) -> anyhow::Result<Vec<ShortlistPreview>> {
        let Prepared { users, candidates } = self.prepare(&req).await?;
        let mut out = Vec::with_capacity(users.len());
        for input in &users {
            let user_id = input.profile.user_id;
            let preview = match build_shortlist(&candidates, input, &self.opts.diversify) {
                Ok(list) => {
                    let briefings = assemble_briefings(
                        &list,
                        self.history.as_ref(),
                        self.realtime.as_ref(),
                        &self.opts.history_range,
                    )
                    .await;
                    ShortlistPreview {
                        user_id,
                        shortlist: Ok(list.iter().map(|c| c.candidate.ticker.clone()).collect()),
                        briefings: briefings.into_iter().map(|b| b.text).collect(),
                    }
                }
                Err(failure) => ShortlistPreview {
                    user_id,
                    shortlist: Err(failure.reason),
                    briefings: Vec::new(),
                },
            };
            out.push(preview);
        }
        Ok(out)
    }
}
