use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::AdminAccess;
use crate::api::pagination::PaginatedResponse;
use crate::core::config::S3Settings;
use crate::core::state::AppState;
use crate::db::models::MockExamQuestion;
use crate::repositories;
use crate::repositories::questions::UpdateQuestion;
use crate::schemas::question::{
    FilterOptionsResponse, QuestionListQuery, QuestionResponse, QuestionUpdate,
};

/// Public URL of a stored image path; full URLs pass through.
pub(super) fn image_url(s3: &S3Settings, image_path: Option<&str>) -> Option<String> {
    let path = image_path.map(str::trim).filter(|path| !path.is_empty())?;
    if path.contains("://") {
        Some(path.to_string())
    } else {
        Some(s3.image_public_url(path))
    }
}

pub(super) fn respond(state: &AppState, question: MockExamQuestion) -> QuestionResponse {
    let url = image_url(state.settings().s3(), question.image_path.as_deref());
    QuestionResponse::from_model(question, url)
}

pub(super) async fn fetch_question(
    state: &AppState,
    id: &str,
) -> Result<MockExamQuestion, ApiError> {
    repositories::questions::find_by_id(state.db(), id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load question"))?
        .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))
}

pub(super) async fn list_questions(
    _admin: AdminAccess,
    State(state): State<AppState>,
    Query(query): Query<QuestionListQuery>,
) -> Result<Json<PaginatedResponse<QuestionResponse>>, ApiError> {
    let filter = query.filter();
    let limit = query.limit.clamp(1, 1000);

    let total_count = repositories::questions::count(state.db(), &filter)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count questions"))?;
    let questions =
        repositories::questions::list(state.db(), &filter, Some((query.skip, limit)))
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list questions"))?;

    let items = questions.into_iter().map(|question| respond(&state, question)).collect();
    Ok(Json(PaginatedResponse::new(items, total_count, query.skip, limit)))
}

pub(super) async fn filter_options(
    _admin: AdminAccess,
    State(state): State<AppState>,
) -> Result<Json<FilterOptionsResponse>, ApiError> {
    let options = repositories::questions::filter_options(state.db())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load filter options"))?;
    Ok(Json(options.into()))
}

pub(super) async fn get_question(
    _admin: AdminAccess,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let question = fetch_question(&state, &id).await?;
    Ok(Json(respond(&state, question)))
}

pub(super) async fn update_question(
    _admin: AdminAccess,
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<QuestionUpdate>,
) -> Result<Json<QuestionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if payload.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }

    let updated = repositories::questions::update_content(
        state.db(),
        &id,
        UpdateQuestion {
            question_text: payload.question_text.as_deref(),
            passage: payload.passage.as_deref(),
            choices: [
                payload.choice_1.as_deref(),
                payload.choice_2.as_deref(),
                payload.choice_3.as_deref(),
                payload.choice_4.as_deref(),
                payload.choice_5.as_deref(),
            ],
            correct_answer: payload.correct_answer.as_deref(),
            model_translation: payload.model_translation.as_deref(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update question"))?
    .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;

    Ok(Json(respond(&state, updated)))
}

pub(super) async fn delete_question(
    _admin: AdminAccess,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let deleted = repositories::questions::delete(state.db(), &id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete question"))?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Question not found".to_string()))
    }
}
