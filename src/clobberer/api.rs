use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::buildbot::check_clobber_requests;
use super::db::DbHandle;
use super::models::{BuildKey, ClobberRequest, ReleasePrefixes, format_lastclobber};
use super::taskcluster::{TaskclusterApi, summarize_branches};
use crate::config::TaskclusterSection;
use crate::errors::ClobbererError;
use crate::introspection;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub prefixes: ReleasePrefixes,
    pub taskcluster: Arc<dyn TaskclusterApi>,
    pub taskcluster_config: TaskclusterSection,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ClobberBody {
    pub clobbers: Vec<ClobberRequest>,
    #[serde(default)]
    pub who: Option<String>,
}

#[derive(Serialize)]
pub struct ClobberResponse {
    pub inserted: usize,
}

#[derive(Deserialize)]
pub struct LastClobberQuery {
    pub branch: Option<String>,
    pub builddir: Option<String>,
    pub slave: Option<String>,
    pub buildername: Option<String>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
    BadGateway(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "request failed");
        }
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<ClobbererError> for ApiError {
    fn from(err: ClobbererError) -> Self {
        match err {
            ClobbererError::BadRequest(msg) => ApiError::BadRequest(msg),
            ClobbererError::Taskcluster(e) => ApiError::BadGateway(e.to_string()),
            e @ (ClobbererError::Database(_) | ClobbererError::LockPoisoned) => {
                ApiError::Internal(e.to_string())
            }
        }
    }
}

fn db_error(e: anyhow::Error) -> ApiError {
    match e.downcast::<ClobbererError>() {
        Ok(err) => err.into(),
        Err(e) => ClobbererError::Database(e).into(),
    }
}

// ── Router ────────────────────────────────────────────────────────────

/// Routes of every registered blueprint, merged.
pub fn api_router() -> Router<SharedState> {
    introspection::get_blueprints()
        .iter()
        .fold(Router::new(), |router, bp| router.merge((bp.routes)()))
}

pub fn base_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/versions", get(versions))
}

pub fn clobberer_routes() -> Router<SharedState> {
    Router::new()
        .route("/clobberer/branches", get(list_branches))
        .route("/clobberer/branches/{branch}", get(branch_summary))
        .route("/clobberer/clobber", post(clobber))
        .route("/clobberer/lastclobber", get(lastclobber))
}

pub fn taskcluster_routes() -> Router<SharedState> {
    Router::new().route("/clobberer/taskcluster", get(taskcluster_branches))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn versions() -> impl IntoResponse {
    Json(introspection::versions())
}

async fn list_branches(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let prefixes = state.prefixes.clone();
    let branches = state
        .db
        .call(move |db| db.list_branches(&prefixes))
        .await
        .map_err(db_error)?;
    Ok(Json(branches))
}

async fn branch_summary(
    State(state): State<SharedState>,
    Path(branch): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let prefixes = state.prefixes.clone();
    let summary = state
        .db
        .call(move |db| db.branch_summary(&branch, &prefixes))
        .await
        .map_err(db_error)?;
    Ok(Json(summary))
}

async fn taskcluster_branches(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    let branches = summarize_branches(state.taskcluster.as_ref(), &state.taskcluster_config)
        .await
        .map_err(ClobbererError::from)?;
    Ok(Json(branches))
}

async fn clobber(
    State(state): State<SharedState>,
    body: Result<Json<ClobberBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    check_clobber_requests(&body.clobbers, &state.prefixes)?;

    let ClobberBody { clobbers, who } = body;
    let inserted = state
        .db
        .call(move |db| db.clobber(&clobbers, who.as_deref()))
        .await
        .map_err(db_error)?;
    tracing::info!(count = inserted.len(), "clobbers recorded");
    Ok(Json(ClobberResponse {
        inserted: inserted.len(),
    }))
}

async fn lastclobber(
    State(state): State<SharedState>,
    Query(query): Query<LastClobberQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let branch = query
        .branch
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ApiError::BadRequest("branch is required".into()))?;
    let LastClobberQuery {
        builddir,
        slave,
        buildername,
        ..
    } = query;

    let lines = state
        .db
        .call(move |db| {
            if let (Some(builddir), Some(buildername)) = (&builddir, &buildername) {
                db.touch_build(&BuildKey::new(&branch, builddir, buildername))?;
            }
            let times = db.last_clobbers(&branch, builddir.as_deref(), slave.as_deref())?;
            Ok(times.iter().map(format_lastclobber).collect::<Vec<_>>())
        })
        .await
        .map_err(db_error)?;
    Ok(lines.join("\n"))
}

// ── Tests ─────────────────────────────────────────────────────────────
