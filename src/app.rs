use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, FromRequest, FromRequestParts, Multipart, Path, Query, State,
        multipart::MultipartRejection,
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::diff::{self, DiffReport, OriginalIndex};
use crate::downloader;
use crate::edit::CellEdit;
use crate::error::{BookError, Result};
use crate::filter::{self, View, ViewQuery};
use crate::generator;
use crate::loader::{self, ParseWarning};
use crate::record::{Dataset, IncomingRow, Row};
use crate::session::{MemorySessionStore, SessionId, SessionStore};

const UPLOAD_FIELD: &str = "csvFile";
// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// `Json` whose rejections are reported as `BookError`.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(BookError))]
struct JsonBody<T>(T);

/// `Query` whose rejections are reported as `BookError`.
#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(BookError))]
struct QueryParams<T>(T);

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        AppState {
            store: Arc::new(MemorySessionStore::with_ttl(config.session_ttl)),
            config: Arc::new(config),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedResponse {
    session_id: SessionId,
    data: Dataset,
    message: String,
    warnings: Vec<ParseWarning>,
}

#[derive(Serialize)]
struct DataResponse {
    data: Dataset,
    filename: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Serialize)]
struct ResetResponse {
    data: Dataset,
    message: String,
}

#[derive(Serialize)]
struct EditResponse {
    row: Row,
    modified: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ViewResponse {
    #[serde(flatten)]
    view: View,
    filename: String,
    genres: Vec<String>,
    active_filters: usize,
    modified_count: usize,
}

#[derive(Deserialize)]
struct GenerateQuery {
    count: Option<String>,
}

#[derive(Deserialize)]
struct UpdateRequest {
    data: Vec<IncomingRow>,
}

/// Build the API router around `state`.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/api/health", get(health))
        .route("/api/generate-sample", get(generate_sample))
        .route("/api/upload", post(upload))
        .route(
            "/api/data/:session_id",
            get(get_data).put(update_data).delete(delete_data),
        )
        .route("/api/data/:session_id/cell", patch(edit_cell))
        .route("/api/view/:session_id", get(view_data))
        .route("/api/diff/:session_id", get(diff_data))
        .route("/api/reset/:session_id", post(reset_data))
        .route("/api/download/:session_id", get(download))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let addr = config.addr.clone();
    let state = AppState::new(config);

    if let Some(ttl) = state.config.session_ttl {
        log::info!("sessions expire after {} idle seconds", ttl.num_seconds());
        let store = state.store.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(EVICTION_INTERVAL);
            loop {
                ticker.tick().await;
                let evicted = store.evict_expired();
                if evicted > 0 {
                    log::info!("evicted {evicted} idle sessions");
                }
            }
        });
    }

    let app = router(state);

    let listener = TcpListener::bind(&addr).await?;
    log::info!("Server is running on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK", "message": "Server is running" }))
}

async fn generate_sample(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<GenerateQuery>,
) -> Result<Json<CreatedResponse>> {
    // Missing or non-numeric counts fall back to the default, like the browser client expects.
    let requested = params
        .count
        .as_deref()
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .unwrap_or(generator::DEFAULT_COUNT.min(state.config.max_generate) as i64);
    let count = generator::check_count(requested, state.config.max_generate)?;

    let data = generator::generate(count)?;
    let session_id = state
        .store
        .create(data.clone(), &generator::sample_filename(count));

    Ok(Json(CreatedResponse {
        session_id,
        data,
        message: format!("Generated {count} sample book records"),
        warnings: Vec::new(),
    }))
}

async fn upload(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<CreatedResponse>> {
    let mut multipart = multipart?;
    let limit = state.config.max_upload_bytes;
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(e, limit))? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload.csv").to_string();
        loader::check_csv_upload(&filename, field.content_type())?;

        let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        if bytes.len() > limit {
            return Err(BookError::FileTooLarge { limit });
        }
        upload = Some((filename, bytes));
    }

    let (filename, bytes) =
        upload.ok_or_else(|| BookError::ParseFailure("No file uploaded".to_string()))?;

    let parsed = tokio::task::spawn_blocking(move || loader::parse_bytes(&bytes))
        .await
        .map_err(|e| BookError::Io(std::io::Error::other(e)))??;

    let session_id = state.store.create(parsed.dataset.clone(), &filename);

    Ok(Json(CreatedResponse {
        session_id,
        message: format!("Successfully parsed {} records", parsed.dataset.len()),
        data: parsed.dataset,
        warnings: parsed.warnings,
    }))
}

fn multipart_error(err: axum::extract::multipart::MultipartError, limit: usize) -> BookError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        BookError::FileTooLarge { limit }
    } else {
        BookError::ParseFailure(err.body_text())
    }
}

async fn get_data(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<DataResponse>> {
    let snapshot = state.store.get(&session_id.into())?;
    Ok(Json(DataResponse {
        data: snapshot.data,
        filename: snapshot.filename,
    }))
}

async fn update_data(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    JsonBody(payload): JsonBody<UpdateRequest>,
) -> Result<Json<MessageResponse>> {
    let stored = state.store.replace_rows(&session_id.into(), payload.data)?;
    log::debug!("replaced working copy with {} records", stored.len());
    Ok(Json(MessageResponse {
        message: "Data updated successfully".to_string(),
    }))
}

async fn delete_data(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode> {
    state.store.remove(&session_id.into())?;
    Ok(StatusCode::NO_CONTENT)
}

async fn edit_cell(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    JsonBody(edit): JsonBody<CellEdit>,
) -> Result<Json<EditResponse>> {
    let id = SessionId::from(session_id);
    let current = state.store.get(&id)?.data;
    let edited = edit.apply(&current)?;
    state.store.replace(&id, edited.clone())?;

    let original = state.store.original(&id)?;
    let row = edited
        .get(edit.position)
        .cloned()
        .ok_or(BookError::IndexOutOfRange {
            position: edit.position,
            len: edited.len(),
        })?;
    let modified = OriginalIndex::new(&original).row_modified(&row);

    Ok(Json(EditResponse { row, modified }))
}

async fn view_data(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    QueryParams(query): QueryParams<ViewQuery>,
) -> Result<Json<ViewResponse>> {
    let id = SessionId::from(session_id);
    let snapshot = state.store.get(&id)?;
    let original = state.store.original(&id)?;
    let index = OriginalIndex::new(&original);

    let spec = query.filter();
    let view = filter::view(&snapshot.data, &spec, query.sort(), query.page(), |row| {
        index.row_modified(row)
    });
    let modified_count = diff::modified_positions(&original, &snapshot.data).len();

    Ok(Json(ViewResponse {
        view,
        filename: snapshot.filename,
        genres: filter::unique_genres(&original),
        active_filters: spec.active_count(),
        modified_count,
    }))
}

async fn diff_data(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<DiffReport>> {
    let id = SessionId::from(session_id);
    let current = state.store.get(&id)?.data;
    let original = state.store.original(&id)?;
    Ok(Json(diff::diff(&original, &current)))
}

async fn reset_data(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ResetResponse>> {
    let data = state.store.reset(&session_id.into())?;
    Ok(Json(ResetResponse {
        data,
        message: "Data reset to original".to_string(),
    }))
}

async fn download(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response> {
    let snapshot = state.store.get(&session_id.into())?;
    let csv = downloader::to_csv(&snapshot.data);
    let filename = downloader::export_filename(&snapshot.filename);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        csv,
    )
        .into_response())
}
