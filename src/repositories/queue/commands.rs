use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::QueueRecord;
use crate::db::types::QueueStatus;

use super::types::{ClaimRule, CreateQueueRecord, FinishRun, COLUMNS};

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateQueueRecord<'_>,
) -> Result<QueueRecord, sqlx::Error> {
    sqlx::query_as::<_, QueueRecord>(&format!(
        "INSERT INTO pdf_processing_queue (
            id, filename, file_size, storage_path, status, progress, extracted_type3,
            extracted_grade, extracted_years, extracted_source, expected_questions,
            total_questions, processed_questions, retry_count, created_at, updated_at
         ) VALUES ($1,$2,$3,$4,$5,0,$6,$7,$8,$9,0,0,0,0,$10,$11)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.filename)
    .bind(params.file_size)
    .bind(params.storage_path)
    .bind(QueueStatus::Pending)
    .bind(params.extracted_type3)
    .bind(params.extracted_grade)
    .bind(params.extracted_years)
    .bind(params.extracted_source)
    .bind(params.now)
    .bind(params.now)
    .fetch_one(pool)
    .await
}

/// Compare-and-swap into `processing`. `None` means another caller owns the record
/// or its status does not allow the requested mode.
pub(crate) async fn claim(
    pool: &PgPool,
    id: &str,
    rule: &ClaimRule,
    now: PrimitiveDateTime,
) -> Result<Option<QueueRecord>, sqlx::Error> {
    sqlx::query_as::<_, QueueRecord>(&format!(
        "UPDATE pdf_processing_queue
         SET status = $1,
             started_at = $2,
             completed_at = NULL,
             error_message = NULL,
             updated_at = $2
         WHERE id = $3
           AND (
                status = ANY($4)
                OR ($5::timestamp IS NOT NULL AND status = $1 AND started_at < $5)
           )
         RETURNING {COLUMNS}"
    ))
    .bind(QueueStatus::Processing)
    .bind(now)
    .bind(id)
    .bind(&rule.allowed)
    .bind(rule.stale_before)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn set_expected(
    pool: &PgPool,
    id: &str,
    expected_questions: i32,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE pdf_processing_queue
         SET expected_questions = $1, updated_at = $2
         WHERE id = $3",
    )
    .bind(expected_questions)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn update_progress(
    pool: &PgPool,
    id: &str,
    processed_questions: i32,
    progress: i32,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE pdf_processing_queue
         SET processed_questions = $1, progress = $2, updated_at = $3
         WHERE id = $4 AND status = $5",
    )
    .bind(processed_questions)
    .bind(progress.clamp(0, 100))
    .bind(now)
    .bind(id)
    .bind(QueueStatus::Processing)
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn finish(
    pool: &PgPool,
    id: &str,
    params: FinishRun<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE pdf_processing_queue
         SET status = $1,
             total_questions = $2,
             processed_questions = $2,
             expected_questions = $3,
             extraction_ratio = $4,
             error_message = $5,
             progress = 100,
             completed_at = $6,
             updated_at = $6
         WHERE id = $7",
    )
    .bind(params.status)
    .bind(params.total_questions)
    .bind(params.expected_questions)
    .bind(params.extraction_ratio)
    .bind(params.error_message)
    .bind(params.now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn mark_failed(
    pool: &PgPool,
    id: &str,
    message: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE pdf_processing_queue
         SET status = $1, error_message = $2, completed_at = $3, updated_at = $3
         WHERE id = $4",
    )
    .bind(QueueStatus::Failed)
    .bind(message)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Manual retry; only `pending` and `failed` records move back to `pending`.
pub(crate) async fn retry(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<QueueRecord>, sqlx::Error> {
    sqlx::query_as::<_, QueueRecord>(&format!(
        "UPDATE pdf_processing_queue
         SET status = $1,
             error_message = NULL,
             retry_count = 0,
             progress = 0,
             started_at = NULL,
             completed_at = NULL,
             updated_at = $2
         WHERE id = $3 AND status = ANY($4)
         RETURNING {COLUMNS}"
    ))
    .bind(QueueStatus::Pending)
    .bind(now)
    .bind(id)
    .bind(QueueStatus::ALL.into_iter().filter(|status| status.is_retryable()).collect::<Vec<_>>())
    .fetch_optional(pool)
    .await
}

/// Maintenance sweep: every `failed` and `processing` record goes back to `pending`.
pub(crate) async fn reset_stalled(pool: &PgPool, now: PrimitiveDateTime) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE pdf_processing_queue
         SET status = $1, error_message = NULL, started_at = NULL, updated_at = $2
         WHERE status = ANY($3)",
    )
    .bind(QueueStatus::Pending)
    .bind(now)
    .bind(vec![QueueStatus::Failed, QueueStatus::Processing])
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub(crate) async fn delete(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM pdf_processing_queue WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}
