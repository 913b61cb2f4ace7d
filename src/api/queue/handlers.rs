use std::collections::BTreeMap;
use std::time::Duration;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::AdminAccess;
use crate::api::validation::is_pdf_upload;
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, unix_millis_now};
use crate::db::models::QueueRecord;
use crate::db::types::QueueStatus;
use crate::repositories;
use crate::repositories::queue::CreateQueueRecord;
use crate::schemas::queue::{
    PdfUrlResponse, QueueListQuery, QueueResponse, QueueStatsResponse, QueueUploadResponse,
    ResetStalledResponse,
};
use crate::services::filename_metadata;
use crate::services::storage::{pdf_key, StorageService};

fn respond(state: &AppState, record: QueueRecord) -> QueueResponse {
    QueueResponse::from_record(
        record,
        primitive_now_utc(),
        state.settings().parsing().stale_processing_minutes,
    )
}

async fn fetch_record(state: &AppState, id: &str) -> Result<QueueRecord, ApiError> {
    repositories::queue::find_by_id(state.db(), id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load queue item"))?
        .ok_or_else(|| ApiError::NotFound("Queue item not found".to_string()))
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

async fn enqueue(
    state: &AppState,
    storage: &StorageService,
    filename: &str,
    bytes: Vec<u8>,
) -> Result<QueueRecord, ApiError> {
    let metadata = filename_metadata::extract(filename);
    let key = pdf_key(filename, unix_millis_now());
    let (size, sha256) = storage
        .upload_pdf(&key, bytes)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to upload PDF"))?;

    let id = Uuid::new_v4().to_string();
    let created = repositories::queue::create(
        state.db(),
        CreateQueueRecord {
            id: &id,
            filename,
            file_size: size,
            storage_path: Some(&key),
            extracted_type3: non_empty(&metadata.type3),
            extracted_grade: non_empty(&metadata.grade),
            extracted_years: non_empty(&metadata.years),
            extracted_source: non_empty(&metadata.source),
            now: primitive_now_utc(),
        },
    )
    .await;

    match created {
        Ok(record) => {
            tracing::info!(queue_id = %record.id, filename, size, sha256 = %sha256, "PDF queued");
            Ok(record)
        }
        Err(err) => {
            if let Err(cleanup) = storage.delete_pdf(&key).await {
                tracing::warn!(key = %key, error = %cleanup, "Failed to remove orphaned PDF");
            }
            Err(ApiError::internal(err, "Failed to create queue item"))
        }
    }
}

pub(super) async fn upload_pdfs(
    _admin: AdminAccess,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<QueueUploadResponse>), ApiError> {
    let storage = state.storage().ok_or_else(ApiError::storage_disabled)?;
    let max_mb = state.settings().storage().max_upload_size_mb;
    let max_bytes = max_mb * 1024 * 1024;

    let mut items = Vec::new();
    let mut skipped = Vec::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        if !is_pdf_upload(&filename, field.content_type()) {
            tracing::debug!(filename = %filename, "Skipping non-PDF upload part");
            skipped.push(filename);
            continue;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
        {
            if bytes.len() as u64 + chunk.len() as u64 > max_bytes {
                return Err(ApiError::BadRequest(format!("File size exceeds {max_mb}MB limit")));
            }
            bytes.extend_from_slice(&chunk);
        }

        let record = enqueue(&state, storage, &filename, bytes).await?;
        items.push(respond(&state, record));
    }

    if items.is_empty() && skipped.is_empty() {
        return Err(ApiError::BadRequest("No files uploaded".to_string()));
    }

    Ok((StatusCode::CREATED, Json(QueueUploadResponse { items, skipped })))
}

pub(super) async fn list_queue(
    _admin: AdminAccess,
    State(state): State<AppState>,
    Query(query): Query<QueueListQuery>,
) -> Result<Json<Vec<QueueResponse>>, ApiError> {
    let status = match query.status.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
        Some(raw) => Some(
            QueueStatus::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown status '{raw}'")))?,
        ),
        None => None,
    };

    let records = repositories::queue::list(state.db(), status, query.skip, query.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list queue"))?;

    Ok(Json(records.into_iter().map(|record| respond(&state, record)).collect()))
}

pub(super) async fn queue_stats(
    _admin: AdminAccess,
    State(state): State<AppState>,
) -> Result<Json<QueueStatsResponse>, ApiError> {
    let rows = repositories::queue::status_counts(state.db())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count queue items"))?;
    let total_questions = repositories::questions::total_count(state.db())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count questions"))?;

    let mut counts: BTreeMap<&'static str, i64> =
        QueueStatus::ALL.into_iter().map(|status| (status.as_str(), 0)).collect();
    for row in rows {
        counts.insert(row.status.as_str(), row.count);
    }
    let total: i64 = counts.values().sum();

    Ok(Json(QueueStatsResponse { counts, total, total_questions }))
}

pub(super) async fn get_queue_item(
    _admin: AdminAccess,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<QueueResponse>, ApiError> {
    let record = fetch_record(&state, &id).await?;
    Ok(Json(respond(&state, record)))
}

pub(super) async fn delete_queue_item(
    _admin: AdminAccess,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let record = fetch_record(&state, &id).await?;

    if let (Some(key), Some(storage)) = (record.storage_path.as_deref(), state.storage()) {
        if let Err(err) = storage.delete_pdf(key).await {
            tracing::warn!(queue_id = %id, key, error = %err, "Failed to delete stored PDF");
        }
    }

    let deleted = repositories::queue::delete(state.db(), &id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete queue item"))?;
    if !deleted {
        return Err(ApiError::NotFound("Queue item not found".to_string()));
    }

    tracing::info!(queue_id = %id, filename = %record.filename, "Queue item deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn retry_queue_item(
    _admin: AdminAccess,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<QueueResponse>, ApiError> {
    let retried = repositories::queue::retry(state.db(), &id, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to retry queue item"))?;

    match retried {
        Some(record) => {
            tracing::info!(queue_id = %id, "Queue item reset to pending");
            Ok(Json(respond(&state, record)))
        }
        None => {
            let record = fetch_record(&state, &id).await?;
            Err(ApiError::Conflict(format!(
                "Queue item in status '{}' cannot be retried",
                record.status.as_str()
            )))
        }
    }
}

pub(super) async fn pdf_url(
    _admin: AdminAccess,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PdfUrlResponse>, ApiError> {
    let storage = state.storage().ok_or_else(ApiError::storage_disabled)?;
    let record = fetch_record(&state, &id).await?;
    let key = record
        .storage_path
        .ok_or_else(|| ApiError::NotFound("Queue item has no stored PDF".to_string()))?;

    let expires_in = state.settings().s3().signed_url_expire_seconds;
    let url = storage
        .presign_pdf(&key, Duration::from_secs(expires_in))
        .await
        .map_err(|e| ApiError::internal(e, "Failed to sign PDF URL"))?;

    Ok(Json(PdfUrlResponse { url, expires_in }))
}

pub(super) async fn reset_stalled(
    _admin: AdminAccess,
    State(state): State<AppState>,
) -> Result<Json<ResetStalledResponse>, ApiError> {
    let reset = repositories::queue::reset_stalled(state.db(), primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to reset stalled queue items"))?;

    tracing::info!(reset, "Reset failed and processing queue items to pending");
    Ok(Json(ResetStalledResponse { reset }))
}
