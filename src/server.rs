//! HTTP surface.
//!
//! Every route except `/health` requires a bearer token that maps to a
//! caller identity; job routes are scoped to that identity by the store, so
//! another tenant's job answers 404 rather than 403. Failures serialize as
//! `{"error": code, "message": ...}` via [`ApiError`]; successes as
//! `{"ok": true, ...}`.

use crate::config::Config;
use crate::db::Database;
use crate::error::ApiError;
use crate::i18n::{Params, Resolver};
use crate::jobs::JobState;
use crate::security::lookup_identity;
use axum::extract::{Path, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub resolver: Arc<Resolver>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/resolve", get(resolve_message))
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/cleanup", post(cleanup_jobs))
        .route("/jobs/:id", get(get_job).delete(delete_job))
        .route("/jobs/:id/cancel", post(cancel_job))
        .route("/jobs/:id/force-cancel", post(force_cancel_job))
        .route("/jobs/:id/logs", get(get_job_logs))
        .route("/jobs/:id/payload", get(get_job_payload))
        .route("/missing-keys", get(list_missing_keys).delete(clear_missing_keys))
        .route("/missing-keys/:id", delete(delete_missing_key))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolve the bearer token in `Authorization` to a caller identity.
fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    let token = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;
    lookup_identity(&state.config.api_keys, token)
        .map(str::to_string)
        .ok_or(ApiError::Unauthorized)
}

// ==================== Health ====================

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

// ==================== Resolution ====================

#[derive(Debug, Deserialize)]
struct ResolveQuery {
    key: String,
    locale: String,
    /// JSON object of placeholder parameters.
    params: Option<String>,
    default: Option<String>,
    /// Originating page path, recorded with any miss report.
    path: Option<String>,
}

async fn resolve_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers)?;

    let params = match &query.params {
        Some(raw) => Some(
            serde_json::from_str::<Params>(raw)
                .map_err(|e| ApiError::BadRequest(format!("invalid params: {}", e)))?,
        ),
        None => None,
    };
    let origin = query.path.as_deref().unwrap_or("/resolve");

    let message = state.resolver.resolve(
        &query.key,
        &query.locale,
        params.as_ref(),
        query.default.as_deref(),
        origin,
    );

    Ok(Json(json!({
        "ok": true,
        "key": query.key,
        "locale": query.locale,
        "message": message,
    })))
}

// ==================== Jobs ====================

#[derive(Debug, Deserialize)]
struct CreateJobRequest {
    payload: Value,
}

async fn create_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<CreateJobRequest>>,
) -> Result<Json<Value>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let Some(Json(request)) = body else {
        return Err(ApiError::BadRequest("expected a JSON body with a payload field".to_string()));
    };

    let job = state.db.create_job(&caller, &request.payload)?;
    Ok(Json(json!({ "ok": true, "job": job })))
}

async fn list_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let jobs = state.db.list_jobs(&caller)?;
    Ok(Json(json!({ "ok": true, "jobs": jobs })))
}

async fn get_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let job = state.db.get_job(&caller, id)?;
    Ok(Json(json!({ "ok": true, "job": job })))
}

async fn cancel_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let job = state.db.request_cancel(&caller, id)?;
    Ok(Json(json!({ "ok": true, "job": job })))
}

async fn force_cancel_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let job = state.db.force_cancel(&caller, id, chrono::Utc::now())?;
    Ok(Json(json!({ "ok": true, "job": job })))
}

async fn delete_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    state.db.delete_job(&caller, id)?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Default, Deserialize)]
struct CleanupRequest {
    days: Option<i64>,
    states: Option<Vec<String>>,
}

async fn cleanup_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<CleanupRequest>>,
) -> Result<Json<Value>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let states = parse_states(request.states)?;
    let deleted = state.db.cleanup_jobs(&caller, request.days, states.as_deref())?;
    Ok(Json(json!({ "ok": true, "deleted": deleted })))
}

fn parse_states(states: Option<Vec<String>>) -> Result<Option<Vec<JobState>>, ApiError> {
    let Some(states) = states else { return Ok(None) };
    let mut parsed = Vec::with_capacity(states.len());
    for raw in states {
        let state = JobState::parse(&raw)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown state '{}'", raw)))?;
        parsed.push(state);
    }
    Ok(Some(parsed))
}

// ==================== Job Logs & Payloads ====================

#[derive(Debug, Default, Deserialize)]
struct ExportQuery {
    format: Option<String>,
    download: Option<bool>,
}

async fn get_job_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let logs = state.db.get_job_logs(&caller, id)?;
    let download = query.download.unwrap_or(false);

    match query.format.as_deref() {
        Some("csv") => {
            let mut rows = vec![vec![
                "timestamp".to_string(),
                "level".to_string(),
                "message".to_string(),
                "data".to_string(),
            ]];
            for line in &logs {
                rows.push(vec![
                    line.timestamp.clone(),
                    line.level.clone(),
                    line.message.clone(),
                    line.data.as_ref().map(Value::to_string).unwrap_or_default(),
                ]);
            }
            let body = crate::csv::to_csv(&rows);
            respond_export(
                "text/csv; charset=utf-8",
                format!("job-{}-logs.csv", id),
                download,
                body,
            )
        }
        None | Some("json") => {
            let body = json!({ "ok": true, "logs": logs }).to_string();
            respond_export(
                "application/json",
                format!("job-{}-logs.json", id),
                download,
                body,
            )
        }
        Some(other) => Err(ApiError::BadRequest(format!("unknown format '{}'", other))),
    }
}

async fn get_job_payload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let payload = state.db.get_job_payload(&caller, id)?;
    let download = query.download.unwrap_or(false);

    match query.format.as_deref() {
        Some("csv") => {
            let parsed: Value = serde_json::from_str(&payload)
                .map_err(|e| ApiError::BadRequest(format!("payload is not JSON: {}", e)))?;
            let rows = payload_rows(&parsed).ok_or_else(|| {
                ApiError::BadRequest("payload is not tabular (expected an array of objects)".to_string())
            })?;
            respond_export(
                "text/csv; charset=utf-8",
                format!("job-{}-payload.csv", id),
                download,
                crate::csv::to_csv(&rows),
            )
        }
        None | Some("json") => respond_export(
            "application/json",
            format!("job-{}-payload.json", id),
            download,
            payload,
        ),
        Some(other) => Err(ApiError::BadRequest(format!("unknown format '{}'", other))),
    }
}

/// Flatten an array-of-objects payload (the bulk import format) into CSV
/// rows, using the first object's keys as the header.
fn payload_rows(payload: &Value) -> Option<Vec<Vec<String>>> {
    let items = payload.as_array()?;
    let first = items.first()?.as_object()?;
    let columns: Vec<String> = first.keys().cloned().collect();

    let mut rows = vec![columns.clone()];
    for item in items {
        let object = item.as_object()?;
        rows.push(
            columns
                .iter()
                .map(|column| match object.get(column) {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                })
                .collect(),
        );
    }
    Some(rows)
}

fn respond_export(
    content_type: &'static str,
    filename: String,
    download: bool,
    body: String,
) -> Result<Response, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    if download {
        let disposition = format!("attachment; filename=\"{}\"", filename);
        let value = HeaderValue::from_str(&disposition)
            .map_err(|_| ApiError::BadRequest("invalid attachment filename".to_string()))?;
        headers.insert(CONTENT_DISPOSITION, value);
    }
    Ok((headers, body).into_response())
}

// ==================== Missing Keys ====================

async fn list_missing_keys(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers)?;
    let rows = state.db.list_missing_keys()?;
    Ok(Json(json!({ "ok": true, "rows": rows })))
}

async fn delete_missing_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers)?;
    if !state.db.delete_missing_key(id)? {
        return Err(ApiError::NotFound);
    }
    Ok(Json(json!({ "ok": true })))
}

async fn clear_missing_keys(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers)?;
    let cleared = state.db.clear_missing_keys()?;
    Ok(Json(json!({ "ok": true, "cleared": cleared })))
}
