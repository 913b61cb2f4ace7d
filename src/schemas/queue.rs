use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

use crate::core::time::{elapsed_seconds, format_primitive, minutes_before};
use crate::db::models::QueueRecord;
use crate::db::types::QueueStatus;

#[derive(Debug, Deserialize)]
pub(crate) struct QueueListQuery {
    pub(crate) status: Option<String>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_queue_limit")]
    pub(crate) limit: i64,
}

const fn default_queue_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub(crate) struct QueueResponse {
    pub(crate) id: String,
    pub(crate) filename: String,
    pub(crate) file_size: i64,
    pub(crate) storage_path: Option<String>,
    pub(crate) status: QueueStatus,
    pub(crate) progress: i32,
    pub(crate) extracted_type3: Option<String>,
    pub(crate) extracted_grade: Option<String>,
    pub(crate) extracted_years: Option<String>,
    pub(crate) extracted_source: Option<String>,
    pub(crate) expected_questions: i32,
    pub(crate) total_questions: i32,
    pub(crate) processed_questions: i32,
    pub(crate) extraction_ratio: Option<i32>,
    pub(crate) error_message: Option<String>,
    pub(crate) retry_count: i32,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) started_at: Option<String>,
    pub(crate) completed_at: Option<String>,
    /// Seconds since `started_at` while processing.
    pub(crate) elapsed_seconds: Option<i64>,
    /// Processing for longer than the staleness threshold.
    pub(crate) is_stuck: bool,
}

impl QueueResponse {
    pub(crate) fn from_record(
        record: QueueRecord,
        now: PrimitiveDateTime,
        stale_minutes: u64,
    ) -> Self {
        let processing_since = (record.status == QueueStatus::Processing)
            .then_some(record.started_at)
            .flatten();
        let stale_before = minutes_before(now, stale_minutes);

        Self {
            elapsed_seconds: processing_since.map(|started| elapsed_seconds(started, now)),
            is_stuck: processing_since.is_some_and(|started| started < stale_before),
            id: record.id,
            filename: record.filename,
            file_size: record.file_size,
            storage_path: record.storage_path,
            status: record.status,
            progress: record.progress,
            extracted_type3: record.extracted_type3,
            extracted_grade: record.extracted_grade,
            extracted_years: record.extracted_years,
            extracted_source: record.extracted_source,
            expected_questions: record.expected_questions,
            total_questions: record.total_questions,
            processed_questions: record.processed_questions,
            extraction_ratio: record.extraction_ratio,
            error_message: record.error_message,
            retry_count: record.retry_count,
            created_at: format_primitive(record.created_at),
            updated_at: format_primitive(record.updated_at),
            started_at: record.started_at.map(format_primitive),
            completed_at: record.completed_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct QueueUploadResponse {
    pub(crate) items: Vec<QueueResponse>,
    /// Parts that were not PDFs.
    pub(crate) skipped: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QueueStatsResponse {
    pub(crate) counts: BTreeMap<&'static str, i64>,
    pub(crate) total: i64,
    pub(crate) total_questions: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct PdfUrlResponse {
    pub(crate) url: String,
    pub(crate) expires_in: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResetStalledResponse {
    pub(crate) reset: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn record(status: QueueStatus, started_at: Option<PrimitiveDateTime>) -> QueueRecord {
        QueueRecord {
            id: "q".to_string(),
            filename: "a.pdf".to_string(),
            file_size: 10,
            storage_path: None,
            status,
            progress: 0,
            extracted_type3: None,
            extracted_grade: None,
            extracted_years: None,
            extracted_source: None,
            expected_questions: 0,
            total_questions: 0,
            processed_questions: 0,
            extraction_ratio: None,
            error_message: None,
            retry_count: 0,
            created_at: datetime!(2025-03-01 10:00),
            updated_at: datetime!(2025-03-01 10:00),
            started_at,
            completed_at: None,
        }
    }

    #[test]
    fn processing_past_threshold_is_stuck() {
        let now = datetime!(2025-03-01 10:10);
        let response = QueueResponse::from_record(
            record(QueueStatus::Processing, Some(datetime!(2025-03-01 10:00))),
            now,
            5,
        );
        assert!(response.is_stuck);
        assert_eq!(response.elapsed_seconds, Some(600));
    }

    #[test]
    fn recent_or_finished_records_are_not_stuck() {
        let now = datetime!(2025-03-01 10:03);
        let recent = QueueResponse::from_record(
            record(QueueStatus::Processing, Some(datetime!(2025-03-01 10:00))),
            now,
            5,
        );
        assert!(!recent.is_stuck);

        let done = QueueResponse::from_record(
            record(QueueStatus::Completed, Some(datetime!(2025-03-01 09:00))),
            now,
            5,
        );
        assert!(!done.is_stuck);
        assert_eq!(done.elapsed_seconds, None);
    }
}
