use anyhow::Context;
use clap::Parser;
use pickwise_core::domain::user::Session;
use pickwise_core::pipeline::controller::RunRequest;
use pickwise_core::pipeline::{Pipeline, PipelineOptions};
use pickwise_core::storage::lock::SessionLock;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "pickwise_worker")]
struct Args {
    /// Delivery session the run is recorded under.
    #[arg(long, default_value = "evening")]
    session: Session,

    /// Only process this user.
    #[arg(long)]
    user_id: Option<Uuid>,

    /// Recommendation date (YYYY-MM-DD). Defaults to today in market time.
    #[arg(long)]
    date: Option<String>,

    /// Build and print shortlists without calling the model or writing anything.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = pickwise_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let date = pickwise_core::time::resolve_run_date(args.date.as_deref(), chrono::Utc::now())?;
    let req = RunRequest {
        date,
        session: args.session,
        target_user: args.user_id,
    };

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    if args.dry_run {
        let pipeline = Pipeline::without_model(&settings, pool, PipelineOptions::from_env())?;
        for preview in pipeline.preview(req).await? {
            match preview.shortlist {
                Ok(tickers) => tracing::info!(
                    user_id = %preview.user_id,
                    size = tickers.len(),
                    shortlist = %tickers.join(","),
                    briefings = preview.briefings.len(),
                    "dry-run shortlist"
                ),
                Err(reason) => tracing::warn!(user_id = %preview.user_id, %reason, "dry-run shortlist empty"),
            }
        }
        return Ok(());
    }

    pickwise_core::storage::migrate(&pool).await?;

    let pipeline = Arc::new(Pipeline::from_settings(
        &settings,
        pool.clone(),
        PipelineOptions::from_env(),
    )?);

    let Some(session_lock) = SessionLock::try_acquire(&pool, date, args.session).await? else {
        tracing::warn!(%date, session = %args.session, "session lock not acquired; another run in progress");
        return Ok(());
    };

    let outcome = pipeline.run(req).await;
    if let Err(err) = session_lock.release().await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(%date, session = %args.session, error = %err, "session lock release failed");
    }

    match outcome {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%date, session = %args.session, error = %err, "recommendation run failed");
            Err(err)
        }
    }
}

fn init_sentry(settings: &pickwise_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
