use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::import::{ImportEngine, ImportError, ImportSummary, SourceRegistry, MAX_UPLOAD_BYTES};
use crate::middleware::request_logging;
use crate::models::{DataSource, ImportedFile, TelecomActivity};
use crate::query::ActivityQueryService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ImportEngine>,
    pub registry: Arc<SourceRegistry>,
    pub query: Arc<ActivityQueryService>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/data-import/upload", post(upload_csv))
        .route("/api/data-import/status", get(import_status))
        .route("/api/data-import/switch-source", post(switch_source))
        .route("/api/data-import/files", get(list_files))
        .route("/api/data-import/files/:filename", delete(delete_file))
        .route("/api/telecom/activities", get(get_activities))
        .route("/api/telecom/activities/export", get(export_activities))
        .route("/api/telecom/fraud-activities", get(get_fraud_activities))
        .route("/api/telecom/stats", get(get_stats))
        .route("/api/dashboard/activity", get(get_dashboard_activity))
        // Leave headroom above the upload cap so the canonical oversize error
        // comes from validation, not the body limit.
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024))
        .layer(axum::middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Accept one multipart-encoded CSV upload under the `file` field
async fn upload_csv(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ImportSummary>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("Invalid multipart payload: {err}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload.csv").to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|err| ApiError::BadRequest(format!("Failed to read upload: {err}")))?;

        ImportEngine::validate_upload(&filename, content_type.as_deref(), data.len())?;
        let summary = state.engine.ingest(&filename, &data)?;
        return Ok(Json(summary));
    }

    Err(ApiError::BadRequest("No file uploaded".to_string()))
}

/// Current data source indicator
async fn import_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "source": state.registry.current_source().as_str() }))
}

/// Switch the authoritative data source
async fn switch_source(
    State(state): State<AppState>,
    Json(request): Json<SwitchSourceRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let source = DataSource::from_str(&request.source)
        .ok_or_else(|| ApiError::BadRequest("Invalid data source".to_string()))?;
    state.registry.set_source(source)?;
    Ok(Json(json!({ "success": true, "source": source.as_str() })))
}

/// List uploaded files
async fn list_files(State(state): State<AppState>) -> Json<Vec<ImportedFile>> {
    Json(state.engine.uploaded_files())
}

/// Delete an uploaded file and its catalog entry
async fn delete_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.engine.delete_file(&filename)? {
        Ok(Json(json!({ "success": true })))
    } else {
        Err(ApiError::NotFound("File not found".to_string()))
    }
}

/// List activities from the active source with optional filters
async fn get_activities(
    State(state): State<AppState>,
    Query(params): Query<ActivityQuery>,
) -> Result<Json<Vec<TelecomActivity>>, ApiError> {
    let activities = state.query.list_activities(
        params.user_id.as_deref(),
        params.limit,
        params.time_range.as_deref(),
    )?;
    Ok(Json(activities))
}

/// List fraud-flagged activities from the active source
async fn get_fraud_activities(
    State(state): State<AppState>,
    Query(params): Query<ActivityQuery>,
) -> Result<Json<Vec<TelecomActivity>>, ApiError> {
    let activities = state
        .query
        .list_fraud_activities(params.user_id.as_deref(), params.time_range.as_deref())?;
    Ok(Json(activities))
}

/// Aggregate statistics over the active source
async fn get_stats(
    State(state): State<AppState>,
    Query(params): Query<ActivityQuery>,
) -> Result<Json<crate::models::ActivityStats>, ApiError> {
    let stats = state.query.compute_stats(params.time_range.as_deref())?;
    Ok(Json(stats))
}

/// Recent-activity feed for the dashboard (1-hour default window)
async fn get_dashboard_activity(
    State(state): State<AppState>,
    Query(params): Query<ActivityQuery>,
) -> Result<Json<Vec<TelecomActivity>>, ApiError> {
    let activities = state
        .query
        .dashboard_activity(params.time_range.as_deref())?;
    Ok(Json(activities))
}

/// Export the active dataset as a CSV attachment
async fn export_activities(State(state): State<AppState>) -> Result<Response, ApiError> {
    let activities = state.query.list_activities(None, None, Some("all"))?;
    let body = render_activities_csv(&activities)
        .map_err(|err| ApiError::Internal(anyhow::anyhow!(err)))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=activities.csv",
            ),
        ],
        body,
    )
        .into_response())
}

const EXPORT_HEADERS: &[&str] = &[
    "Timestamp",
    "UserId",
    "Type",
    "DurationSec",
    "Location",
    "Network",
    "Peer",
    "Roaming",
    "Fraud",
    "DataMB",
    "Cost",
];

fn render_activities_csv(activities: &[TelecomActivity]) -> Result<String, String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(EXPORT_HEADERS)
        .map_err(|e| e.to_string())?;
    for a in activities {
        writer
            .write_record([
                a.timestamp.to_rfc3339(),
                a.user_id.clone(),
                a.activity_type.as_str().to_string(),
                a.duration_sec.to_string(),
                a.location.clone(),
                a.network_type.clone(),
                a.peer_number.clone(),
                a.is_roaming.to_string(),
                a.is_spam_or_fraud.to_string(),
                a.data_usage_mb.to_string(),
                a.cost.to_string(),
            ])
            .map_err(|e| e.to_string())?;
    }
    let bytes = writer.into_inner().map_err(|e| e.to_string())?;
    String::from_utf8(bytes).map_err(|e| e.to_string())
}

// ===== Request/Response Types =====

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityQuery {
    user_id: Option<String>,
    limit: Option<usize>,
    time_range: Option<String>,
}

#[derive(Deserialize)]
struct SwitchSourceRequest {
    source: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

// ===== Error Handling =====

#[derive(Debug)]
enum ApiError {
    Internal(anyhow::Error),
    Import(ImportError),
    NotFound(String),
    BadRequest(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        ApiError::Import(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Internal(err) => {
                tracing::error!("Query error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::Import(
                err @ (ImportError::InvalidFileType | ImportError::PayloadTooLarge { .. }),
            ) => (StatusCode::BAD_REQUEST, err.to_string()),
            ApiError::Import(err) => {
                tracing::error!("Import failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
