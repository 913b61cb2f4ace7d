use time::PrimitiveDateTime;

use crate::db::types::QueueStatus;

pub(crate) const COLUMNS: &str = "\
    id, filename, file_size, storage_path, status, progress, extracted_type3, extracted_grade, \
    extracted_years, extracted_source, expected_questions, total_questions, processed_questions, \
    extraction_ratio, error_message, retry_count, created_at, updated_at, started_at, completed_at";

pub(crate) struct CreateQueueRecord<'a> {
    pub(crate) id: &'a str,
    pub(crate) filename: &'a str,
    pub(crate) file_size: i64,
    pub(crate) storage_path: Option<&'a str>,
    pub(crate) extracted_type3: Option<&'a str>,
    pub(crate) extracted_grade: Option<&'a str>,
    pub(crate) extracted_years: Option<&'a str>,
    pub(crate) extracted_source: Option<&'a str>,
    pub(crate) now: PrimitiveDateTime,
}

/// Source states a claim may move to `processing`.
#[derive(Debug, Clone)]
pub(crate) struct ClaimRule {
    pub(crate) allowed: Vec<QueueStatus>,
    /// When set, a `processing` record started before this instant is claimable too.
    pub(crate) stale_before: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone)]
pub(crate) struct FinishRun<'a> {
    pub(crate) status: QueueStatus,
    pub(crate) total_questions: i32,
    pub(crate) expected_questions: i32,
    pub(crate) extraction_ratio: Option<i32>,
    pub(crate) error_message: Option<&'a str>,
    pub(crate) now: PrimitiveDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StatusCountRow {
    pub(crate) status: QueueStatus,
    pub(crate) count: i64,
}
