use std::error::Error as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use doc_vault::VaultDocumentStore;
use records_core::db::SqliteStore;
use records_core::schema::{
    AchievementReference, AchievementView, CreateAchievementRequest, CreatedAchievement, FileMeta,
    History, RejectRequest, UpdateAchievementRequest,
};
use records_core::{AttachmentHandler, AttachmentUpload, Config, Coordinator, RecordsError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::principal::Authenticated;

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    coordinator: Arc<Coordinator>,
    attachments: AttachmentHandler,
}

impl AppState {
    pub fn new(coordinator: Coordinator) -> Self {
        let attachments = coordinator.attachments();
        Self {
            coordinator: Arc::new(coordinator),
            attachments,
        }
    }

    /// Opens the SQLite database and the document vault named by `config`.
    pub fn open(config: &Config) -> Result<Self> {
        let sql = Arc::new(
            SqliteStore::open(&config.database_path)
                .with_context(|| format!("opening database {}", config.database_path.display()))?,
        );
        let documents = Arc::new(
            VaultDocumentStore::open(&config.documents_root, config.documents_timeout)
                .with_context(|| format!("opening vault {}", config.documents_root.display()))?,
        );
        info!(
            database = %config.database_path.display(),
            vault = %config.documents_root.display(),
            "stores opened"
        );

        let coordinator =
            Coordinator::new(sql.clone(), sql, documents).with_admin_role(config.admin_role.clone());
        Ok(Self::new(coordinator))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/achievements", get(list).post(create))
        .route(
            "/achievements/:id",
            get(fetch).put(update_link).delete(remove),
        )
        .route("/achievements/:id/submit", post(submit))
        .route("/achievements/:id/verify", post(verify))
        .route("/achievements/:id/reject", post(reject))
        .route("/achievements/:id/history", get(history))
        .route(
            "/achievements/:id/attachments",
            post(add_attachment).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .with_state(state)
}

/// Maps coordinator errors onto HTTP statuses. Storage failures are logged
/// in full and answered with a generic message.
#[derive(Debug)]
pub struct ApiError(pub RecordsError);

impl From<RecordsError> for ApiError {
    fn from(err: RecordsError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(RecordsError::validation(rejection.body_text()))
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            RecordsError::Validation(_) => StatusCode::BAD_REQUEST,
            RecordsError::NotFound { .. } => StatusCode::NOT_FOUND,
            RecordsError::Forbidden(_) => StatusCode::FORBIDDEN,
            RecordsError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(
                error = %self.0,
                cause = self.0.source().map(|s| s.to_string()).unwrap_or_default(),
                "request failed"
            );
            "internal storage error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    student_id: Option<String>,
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<AchievementView>>> {
    let views = state
        .coordinator
        .list(Some(&principal), query.student_id.as_deref())
        .await?;
    Ok(Json(views))
}

async fn create(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    payload: std::result::Result<Json<CreateAchievementRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreatedAchievement>)> {
    let Json(request) = payload?;
    let created = state.coordinator.create(Some(&principal), request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn fetch(
    State(state): State<AppState>,
    Authenticated(_principal): Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Json<AchievementView>> {
    Ok(Json(state.coordinator.get(&id).await?))
}

async fn update_link(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
    payload: std::result::Result<Json<UpdateAchievementRequest>, JsonRejection>,
) -> ApiResult<Json<AchievementReference>> {
    let Json(request) = payload?;
    let document_ref = request.document_ref.unwrap_or_default();
    let updated = state
        .coordinator
        .update_document_link(Some(&principal), &id, &document_ref)
        .await?;
    Ok(Json(updated))
}

async fn remove(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.coordinator.delete(Some(&principal), &id).await?;
    Ok(Json(json!({ "id": id, "deleted": true })))
}

async fn submit(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Json<AchievementReference>> {
    Ok(Json(state.coordinator.submit(Some(&principal), &id).await?))
}

async fn verify(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Json<AchievementReference>> {
    Ok(Json(state.coordinator.verify(Some(&principal), &id).await?))
}

async fn reject(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<AchievementReference>> {
    let request: RejectRequest = optional_json(&body)?;
    let rejected = state
        .coordinator
        .reject(Some(&principal), &id, &request.note)
        .await?;
    Ok(Json(rejected))
}

async fn history(
    State(state): State<AppState>,
    Authenticated(_principal): Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Json<History>> {
    Ok(Json(state.coordinator.history(&id).await?))
}

/// Only metadata is kept; the file bytes are read and dropped.
async fn add_attachment(
    State(state): State<AppState>,
    Authenticated(_principal): Authenticated,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Json<FileMeta>> {
    let mut upload: Option<AttachmentUpload> = None;
    let mut file_url = None;

    while let Some(mut field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let mut file_size = 0u64;
                while let Some(chunk) = field.chunk().await.map_err(bad_multipart)? {
                    file_size += chunk.len() as u64;
                }
                upload = Some(AttachmentUpload {
                    file_name,
                    file_size,
                    content_type,
                    file_url: None,
                });
            }
            Some("file_url") => {
                file_url = Some(field.text().await.map_err(bad_multipart)?);
            }
            _ => {}
        }
    }

    let Some(mut upload) = upload else {
        return Err(RecordsError::validation("multipart field `file` required").into());
    };
    upload.file_url = file_url;

    Ok(Json(state.attachments.add_attachment(&id, upload).await?))
}

/// Parses `body` as JSON, treating an empty body as `T::default()`.
fn optional_json<T: DeserializeOwned + Default>(body: &[u8]) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| RecordsError::validation(format!("malformed JSON body: {err}")).into())
}

fn bad_multipart(err: MultipartError) -> ApiError {
    RecordsError::validation(format!("malformed multipart body: {err}")).into()
}
