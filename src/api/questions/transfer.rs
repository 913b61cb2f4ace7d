use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::AdminAccess;
use crate::api::validation::validate_image_upload;
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, unix_millis_now};
use crate::repositories;
use crate::schemas::question::{ImportQuery, ImportResponse, QuestionListQuery, QuestionResponse};
use crate::services::csv_export;
use crate::services::storage::chart_image_key;

use super::handlers::{fetch_question, image_url, respond};

struct UploadedFile {
    filename: String,
    content_type: String,
    bytes: Vec<u8>,
}

/// First `file` part of a multipart body, bounded by the upload size limit.
async fn read_file_part(
    state: &AppState,
    multipart: &mut Multipart,
) -> Result<UploadedFile, ApiError> {
    let max_mb = state.settings().storage().max_upload_size_mb;
    let max_bytes = max_mb * 1024 * 1024;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
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
        return Ok(UploadedFile { filename, content_type, bytes });
    }

    Err(ApiError::BadRequest("Missing file field".to_string()))
}

pub(super) async fn export_csv(
    _admin: AdminAccess,
    State(state): State<AppState>,
    Query(query): Query<QuestionListQuery>,
) -> Result<Response, ApiError> {
    let questions = repositories::questions::list(state.db(), &query.filter(), None)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load questions for export"))?;

    let s3 = state.settings().s3();
    let rows: Vec<Vec<String>> = questions
        .iter()
        .map(|question| {
            csv_export::question_row(question, image_url(s3, question.image_path.as_deref()))
        })
        .collect();
    let body = csv_export::render(&rows);
    tracing::info!(rows = rows.len(), "Exported questions as CSV");

    let disposition = format!(
        "attachment; filename=\"mock_exam_questions_{}.csv\"",
        OffsetDateTime::now_utc().date()
    );
    let mut response = (StatusCode::OK, body).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8"));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// Restores rows of a previously exported CSV under `pdf_filename`.
pub(super) async fn import_csv(
    _admin: AdminAccess,
    State(state): State<AppState>,
    Query(query): Query<ImportQuery>,
    mut multipart: Multipart,
) -> Result<Json<ImportResponse>, ApiError> {
    let pdf_filename = query.pdf_filename.trim().to_string();
    if pdf_filename.is_empty() {
        return Err(ApiError::BadRequest("pdf_filename is required".to_string()));
    }

    let file = read_file_part(&state, &mut multipart).await?;
    let text = String::from_utf8(file.bytes)
        .map_err(|_| ApiError::BadRequest("CSV must be UTF-8".to_string()))?;

    let s3 = state.settings().s3();
    let mut skipped = 0u32;
    let questions: Vec<_> = csv_export::parse(&text)
        .into_iter()
        .filter(|cols| cols.first().map(String::as_str) != Some(csv_export::HEADERS[0]))
        .filter_map(|cols| {
            let question =
                csv_export::row_to_question(&cols, &pdf_filename, |url| s3.image_key_from_url(url));
            if question.is_none() {
                skipped += 1;
            }
            question
        })
        .collect();

    let now = primitive_now_utc();
    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start import"))?;
    let (replaced, stored) = if query.replace {
        let removed = repositories::questions::delete_by_filename(&mut *tx, &pdf_filename)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to clear existing questions"))?;
        (removed, Vec::new())
    } else {
        let stored = repositories::questions::numbers_by_filename(&mut *tx, &pdf_filename)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load existing questions"))?;
        (0, stored)
    };
    let (questions, duplicates) = csv_export::skip_stored_numbers(questions, stored);
    skipped += duplicates;
    for question in &questions {
        repositories::questions::insert(&mut *tx, &Uuid::new_v4().to_string(), question, now)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to import question"))?;
    }
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit import"))?;

    let imported = questions.len() as u32;
    tracing::info!(
        pdf_filename = %pdf_filename,
        source = %file.filename,
        imported,
        skipped,
        replaced,
        "Imported questions from CSV"
    );

    Ok(Json(ImportResponse { pdf_filename, imported, skipped, replaced }))
}

pub(super) async fn upload_image(
    _admin: AdminAccess,
    Path(id): Path<String>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<QuestionResponse>, ApiError> {
    let storage = state.storage().ok_or_else(ApiError::storage_disabled)?;
    fetch_question(&state, &id).await?;

    let file = read_file_part(&state, &mut multipart).await?;
    let extension = validate_image_upload(
        &file.filename,
        &file.content_type,
        &state.settings().storage().allowed_image_extensions,
    )?;

    let key = chart_image_key(&id, unix_millis_now(), &extension);
    storage
        .upload_image(&key, &file.content_type, file.bytes)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to upload chart image"))?;

    let updated = repositories::questions::set_image_path(state.db(), &id, &key)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to save image path"))?
        .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;

    tracing::info!(question_id = %id, key = %key, "Chart image attached");
    Ok(Json(respond(&state, updated)))
}
