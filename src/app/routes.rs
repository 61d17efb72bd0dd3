use axum::Router;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::AppState;
use super::error::ApiError;
use crate::batch::{self, ExtractionReport};
use crate::contract;
use crate::folders::{self, SectionListing};
use crate::literature;
use crate::render::{self, DOCX_CONTENT_TYPE, SUMMARY_FILENAME, SummaryDocument};

const OUTSIDE_ALLOW_LIST: &str = "path is outside the allowed directories";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/folders", get(list_folders_handler))
        .route("/api/folders/all", get(list_all_folders_handler))
        .route("/api/check-path", get(check_path_handler))
        .route("/api/extract-info", post(extract_info_handler))
        .route("/api/generate-summary", post(generate_summary_handler))
        .route("/api/download-summary", post(download_summary_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "trialdigest service is running",
    }))
}

#[derive(Debug, Deserialize)]
struct PathQuery {
    path: Option<String>,
}

impl PathQuery {
    fn required(&self) -> Result<&str, ApiError> {
        self.path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ApiError::BadRequest("path is required".to_owned()))
    }
}

async fn list_folders_handler(
    State(state): State<AppState>,
    query: Result<Query<PathQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(q) = query?;
    let raw = q.required()?;
    let path = state
        .guard
        .resolve(raw)
        .ok_or_else(|| ApiError::Forbidden(OUTSIDE_ALLOW_LIST.to_owned()))?;

    let subfolders = folders::list_subfolders(&path).await?;
    tracing::info!(path = %raw, count = subfolders.len(), "listed folders");
    Ok(Json(json!({ "subfolders": subfolders })))
}

async fn check_path_handler(
    State(state): State<AppState>,
    query: Result<Query<PathQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(q) = query?;
    let raw = q.required()?;
    let Some(path) = state.guard.resolve(raw) else {
        return Ok(Json(json!({
            "exists": false,
            "reason": OUTSIDE_ALLOW_LIST,
        })));
    };
    let exists = folders::directory_exists(&path).await;
    Ok(Json(json!({ "exists": exists })))
}

async fn list_all_folders_handler(State(state): State<AppState>) -> Json<SectionListing> {
    Json(folders::list_sections(&state.base_path, &state.sections, &state.guard).await)
}

#[derive(Debug, Deserialize)]
struct ExtractRequest {
    #[serde(default)]
    selected_items: Vec<String>,
}

async fn extract_info_handler(
    State(state): State<AppState>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> Result<Json<ExtractionReport>, ApiError> {
    let Json(req) = payload?;
    if req.selected_items.is_empty() {
        return Err(ApiError::BadRequest("selected_items is required".to_owned()));
    }

    let backend = state.completion.ensure_initialized().await?;
    let report = batch::extract_selected(
        backend.as_ref(),
        &state.base_path,
        &state.guard,
        &req.selected_items,
    )
    .await;
    tracing::info!(
        count = report.total_processed,
        skipped = report.skipped.len(),
        "extraction batch finished"
    );
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct SummaryRequest {
    literature_info: Option<LiteratureInfo>,
}

#[derive(Debug, Deserialize)]
struct LiteratureInfo {
    md_file_path: Option<String>,
    literature_name: Option<String>,
    section_name: Option<String>,
}

async fn generate_summary_handler(
    State(state): State<AppState>,
    payload: Result<Json<SummaryRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    let info = req
        .literature_info
        .ok_or_else(|| ApiError::BadRequest("literature_info is required".to_owned()))?;
    let md_file_path = info
        .md_file_path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::BadRequest("md_file_path is required".to_owned()))?;
    let path = state
        .guard
        .resolve(md_file_path)
        .ok_or_else(|| ApiError::Forbidden(OUTSIDE_ALLOW_LIST.to_owned()))?;

    let content = literature::read_document(&path).await?;
    let backend = state.completion.ensure_initialized().await?;
    let mut summary = contract::generate_summary(backend.as_ref(), &content).await?;
    batch::annotate(
        &mut summary,
        info.literature_name.as_deref().unwrap_or_default(),
        info.section_name.as_deref().unwrap_or_default(),
        None,
    );
    tracing::info!(path = %md_file_path, "summary generated");
    Ok(Json(json!({ "success": true, "summary": summary })))
}

#[derive(Debug, Deserialize)]
struct DownloadRequest {
    summary: Option<Value>,
}

async fn download_summary_handler(
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    let summary = req
        .summary
        .ok_or_else(|| ApiError::BadRequest("summary is required".to_owned()))?;
    let summary: SummaryDocument = serde_json::from_value(summary)
        .map_err(|err| ApiError::BadRequest(format!("invalid summary: {err}")))?;

    let bytes = render::render_docx(&summary)?;
    let disposition = HeaderValue::from_str(&content_disposition(SUMMARY_FILENAME))
        .map_err(|err| ApiError::Internal(format!("content disposition: {err}")))?;
    tracing::info!(bytes = bytes.len(), "rendered summary document");

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(DOCX_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// ASCII fallback plus the RFC 5987 form for the real (non-ASCII) name.
fn content_disposition(filename: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(filename.as_bytes()).collect();
    format!("attachment; filename=\"summary.docx\"; filename*=UTF-8''{encoded}")
}
