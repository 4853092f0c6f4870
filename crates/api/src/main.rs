use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use pickwise_core::domain::recommendation::SavedRecommendation;
use pickwise_core::domain::user::Session;
use pickwise_core::pipeline::controller::RunRequest;
use pickwise_core::pipeline::report::RunReport;
use pickwise_core::pipeline::{Pipeline, PipelineOptions};

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

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(db_url)
            .await
        {
            Ok(pool) => match pickwise_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let pipeline = match &pool {
        Some(pool) => {
            match Pipeline::from_settings(&settings, pool.clone(), PipelineOptions::from_env()) {
                Ok(p) => Some(Arc::new(p)),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "pipeline not configured; batch trigger disabled");
                    None
                }
            }
        }
        None => None,
    };

    if settings.batch_secret.is_none() {
        tracing::warn!("BATCH_SECRET not set; batch trigger will reject every request");
    }

    let state = AppState {
        pool,
        pipeline,
        batch_secret: settings.batch_secret.clone().map(Arc::from),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/recommendations/generate", post(generate))
        .route("/recommendations/:user_id/:date", get(get_recommendations))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    pool: Option<PgPool>,
    pipeline: Option<Arc<Pipeline>>,
    batch_secret: Option<Arc<str>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct GenerateBody {
    session: Option<String>,
    user_id: Option<Uuid>,
}

fn authorized(headers: &HeaderMap, secret: &str) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token.trim() == secret)
}

fn run_failed(err: &anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"success": false, "error": format!("{err:#}")})),
    )
        .into_response()
}

fn bad_request(reason: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"success": false, "error": reason})),
    )
        .into_response()
}

/// Session and target user from the trigger body. A missing or blank body means the
/// evening session for every user; a body that is present must parse in full.
fn parse_trigger(body: &[u8]) -> Result<(Session, Option<Uuid>), String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok((Session::default(), None));
    }
    let body: GenerateBody =
        serde_json::from_slice(body).map_err(|e| format!("invalid request body: {e}"))?;
    let session = match body.session.as_deref() {
        Some(s) => s.parse::<Session>().map_err(|e| e.to_string())?,
        None => Session::default(),
    };
    Ok((session, body.user_id))
}

/// Batch trigger for schedulers.
async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RunReport>, Response> {
    let Some(secret) = state.batch_secret.as_deref() else {
        return Err(StatusCode::SERVICE_UNAVAILABLE.into_response());
    };
    if !authorized(&headers, secret) {
        return Err(StatusCode::UNAUTHORIZED.into_response());
    }
    let (session, target_user) = parse_trigger(&body).map_err(bad_request)?;
    let Some(pipeline) = &state.pipeline else {
        return Err(StatusCode::SERVICE_UNAVAILABLE.into_response());
    };

    let date = pickwise_core::time::resolve_run_date(None, Utc::now()).map_err(|e| run_failed(&e))?;

    let req = RunRequest {
        date,
        session,
        target_user,
    };
    match pipeline.run(req).await {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(%date, %session, error = %e, "recommendation run failed");
            Err(run_failed(&e))
        }
    }
}

async fn get_recommendations(
    State(state): State<AppState>,
    Path((user_id, date)): Path<(Uuid, String)>,
) -> Result<Json<Vec<SavedRecommendation>>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| StatusCode::BAD_REQUEST)?;

    let slots = pickwise_core::storage::recommendations::fetch_slots(pool, user_id, date)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    if slots.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(slots))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_must_match() {
        let mut headers = HeaderMap::new();
        assert!(!authorized(&headers, "s3cret"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong"));
        assert!(!authorized(&headers, "s3cret"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert!(authorized(&headers, "s3cret"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("s3cret"));
        assert!(!authorized(&headers, "s3cret"));
    }

    #[test]
    fn trigger_body_is_optional_but_strict_when_present() {
        let id = Uuid::new_v4();
        let body = json!({"session": "morning", "userId": id}).to_string();
        assert_eq!(parse_trigger(body.as_bytes()), Ok((Session::Morning, Some(id))));
        assert_eq!(parse_trigger(b""), Ok((Session::Evening, None)));
        assert_eq!(parse_trigger(b" \n"), Ok((Session::Evening, None)));
        assert_eq!(parse_trigger(b"{}"), Ok((Session::Evening, None)));

        assert!(parse_trigger(br#"{"session":"morning","userId":"not-a-uuid"}"#).is_err());
        assert!(parse_trigger(br#"{"userid":"00000000-0000-0000-0000-000000000000"}"#).is_err());
        assert!(parse_trigger(br#"{"session":"midnight"}"#).is_err());
        assert!(parse_trigger(b"[1,2]").is_err());
    }

    fn state_without_pipeline() -> AppState {
        AppState {
            pool: None,
            pipeline: None,
            batch_secret: Some(Arc::from("s3cret")),
        }
    }

    async fn call_generate(token: &'static str, body: &'static [u8]) -> StatusCode {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(token));
        generate(State(state_without_pipeline()), headers, Bytes::from_static(body))
            .await
            .into_response()
            .status()
    }

    #[tokio::test]
    async fn malformed_targeted_trigger_is_rejected_before_running() {
        let bad = br#"{"session":"morning","userId":"not-a-uuid"}"#;
        assert_eq!(call_generate("Bearer s3cret", bad).await, StatusCode::BAD_REQUEST);
        assert_eq!(call_generate("Bearer wrong", bad).await, StatusCode::UNAUTHORIZED);
        // Well-formed or empty bodies get past validation; no pipeline is configured here.
        assert_eq!(call_generate("Bearer s3cret", b"").await, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            call_generate("Bearer s3cret", br#"{"session":"afternoon"}"#).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
