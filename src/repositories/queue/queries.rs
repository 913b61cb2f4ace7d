use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::QueueRecord;
use crate::db::types::QueueStatus;

use super::types::{StatusCountRow, COLUMNS};

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<QueueRecord>, sqlx::Error> {
    sqlx::query_as::<_, QueueRecord>(&format!(
        "SELECT {COLUMNS} FROM pdf_processing_queue WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn current_status(
    pool: &PgPool,
    id: &str,
) -> Result<Option<QueueStatus>, sqlx::Error> {
    sqlx::query_scalar::<_, QueueStatus>("SELECT status FROM pdf_processing_queue WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list(
    pool: &PgPool,
    status: Option<QueueStatus>,
    skip: i64,
    limit: i64,
) -> Result<Vec<QueueRecord>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {COLUMNS} FROM pdf_processing_queue WHERE 1=1"
    ));

    if let Some(status) = status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }

    builder.push(" ORDER BY created_at DESC OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 100));

    builder.build_query_as::<QueueRecord>().fetch_all(pool).await
}

pub(crate) async fn status_counts(pool: &PgPool) -> Result<Vec<StatusCountRow>, sqlx::Error> {
    sqlx::query_as::<_, StatusCountRow>(
        "SELECT status, COUNT(*) AS count
         FROM pdf_processing_queue
         GROUP BY status",
    )
    .fetch_all(pool)
    .await
}

/// Oldest `pending` record, the worker's next candidate.
pub(crate) async fn next_pending(pool: &PgPool) -> Result<Option<QueueRecord>, sqlx::Error> {
    sqlx::query_as::<_, QueueRecord>(&format!(
        "SELECT {COLUMNS}
         FROM pdf_processing_queue
         WHERE status = $1
         ORDER BY created_at
         LIMIT 1"
    ))
    .bind(QueueStatus::Pending)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_stuck(
    pool: &PgPool,
    stale_before: PrimitiveDateTime,
) -> Result<Vec<QueueRecord>, sqlx::Error> {
    sqlx::query_as::<_, QueueRecord>(&format!(
        "SELECT {COLUMNS}
         FROM pdf_processing_queue
         WHERE status = $1 AND started_at < $2
         ORDER BY started_at"
    ))
    .bind(QueueStatus::Processing)
    .bind(stale_before)
    .fetch_all(pool)
    .await
}
