//! JSON HTTP adapter: uploads start scans, clients poll job status and read
//! reports. Stored media is served as static files under `/uploads`.
//!
//! `/view/:id` is the link handed out with jobs and reports. It answers with
//! the display form of the report; `t` and `safe` are hints for the player.

mod upload;

pub use upload::stream_to_file;

use crate::adapters::local::fs::FsReportStore;
use crate::application::scanner::ScanService;
use crate::domain::layout::MediaLayout;
use crate::domain::report::{Report, ReportSummary};
use crate::error::RepositoryError;
use crate::ports::repository::ReportRepository;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Multipart field carrying the video.
pub const UPLOAD_FIELD: &str = "video";

#[derive(Clone)]
pub struct AppState {
    pub scanner: Arc<ScanService<FsReportStore>>,
    pub reports: Arc<FsReportStore>,
    pub layout: MediaLayout,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let media = ServeDir::new(state.layout.root());

    Router::new()
        .route("/upload", post(upload_video))
        .route("/status/:id", get(job_status))
        .route("/reports", get(list_reports))
        .route("/reports/:id", get(get_report))
        .route("/view/:id", get(get_report))
        .route("/delete/:id", post(delete_video))
        .nest_service("/uploads", media)
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug)]
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "ok": false, "error": self.1 }))).into_response()
    }
}

impl From<(StatusCode, String)> for ApiError {
    fn from((status, message): (StatusCode, String)) -> Self {
        ApiError(status, message)
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(_) => not_found(),
            other => ApiError(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

fn not_found() -> ApiError {
    ApiError(StatusCode::NOT_FOUND, "not found".to_string())
}

/// Video ids are generated uuids; anything else never names a stored file.
fn video_id(raw: &str) -> Result<String, ApiError> {
    Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .map_err(|_| not_found())
}

async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let original = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => continue,
        };

        let id = Uuid::new_v4().to_string();
        let path = state.layout.video_path(&id);
        let written = stream_to_file(&path, field).await?;
        tracing::info!("saved {} ({} bytes) as {:?}", original, written, path);

        state.scanner.submit(&id, &original);
        return Ok(Json(json!({
            "ok": true,
            "job": id,
            "view": format!("/view/{}", id),
        })));
    }

    Err(ApiError(StatusCode::BAD_REQUEST, "no file".to_string()))
}

async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state.scanner.jobs().get(&id).ok_or_else(not_found)?;
    Ok(Json(json!({ "ok": true, "status": job.status() })))
}

async fn list_reports(
    State(state): State<AppState>,
) -> Result<Json<Vec<ReportSummary>>, ApiError> {
    let reports = state.reports.list_all().await?;
    Ok(Json(reports.iter().map(|r| r.summary()).collect()))
}

async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Report>, ApiError> {
    let id = video_id(&id)?;
    let report = state.reports.load(&id).await?;
    Ok(Json(report.for_display()))
}

async fn delete_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = video_id(&id)?;
    let outcome = state.reports.delete(&id).await;
    Ok(Json(json!({
        "ok": true,
        "removed": outcome.removed,
        "errors": outcome.errors,
    })))
}
