use anyhow::Result;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::QueueRecord;
use crate::db::types::QueueStatus;
use crate::repositories;
use crate::services::parsing::events::ProgressSink;
use crate::services::parsing::store::PgParseStore;
use crate::services::parsing::{self, ParseMode, ParseRequest, ParserOptions, RunReport};
use crate::services::pdf_text;
use crate::services::storage::StorageService;

/// Downloads a queued PDF and extracts its text. `Err` carries the message stored
/// on the record.
pub(crate) async fn load_text(storage: &StorageService, record: &QueueRecord) -> Result<String, String> {
    let key = record
        .storage_path
        .as_deref()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| "PDF 파일 경로가 없습니다".to_string())?;

    let bytes =
        storage.download_pdf(key).await.map_err(|err| format!("PDF 다운로드 실패: {err}"))?;

    tokio::task::spawn_blocking(move || pdf_text::extract(&bytes))
        .await
        .map_err(|err| format!("텍스트 추출 실패: {err}"))?
        .map_err(|err| format!("텍스트 추출 실패: {err}"))
}

/// Runs the oldest `pending` record, if any. Returns whether a record was handled.
pub(crate) async fn process_next(state: &AppState, storage: &StorageService) -> Result<bool> {
    let Some(record) = repositories::queue::next_pending(state.db()).await? else {
        return Ok(false);
    };

    let status = repositories::queue::current_status(state.db(), &record.id).await?;
    if status != Some(QueueStatus::Pending) {
        tracing::debug!(queue_id = %record.id, "Queue item left pending before processing");
        return Ok(true);
    }

    tracing::info!(queue_id = %record.id, filename = %record.filename, "Processing queued PDF");

    let pdf_text = match load_text(storage, &record).await {
        Ok(text) => text,
        Err(message) => {
            tracing::warn!(queue_id = %record.id, error = %message, "Queued PDF could not be read");
            repositories::queue::mark_failed(state.db(), &record.id, &message, primitive_now_utc())
                .await?;
            return Ok(true);
        }
    };

    let request = ParseRequest {
        queue_id: record.id.clone(),
        pdf_text,
        filename: record.filename.clone(),
        extracted_type3: record.extracted_type3.clone(),
        mode: ParseMode::Full,
        reanalyze: false,
        chunk_size: None,
    };
    let store = PgParseStore::new(state.db().clone());
    let client = state.llm();
    let options = ParserOptions::from_settings(state.settings().parsing());

    match parsing::run(&store, client.as_ref(), &options, &request, &ProgressSink::detached()).await {
        RunReport::Finished(outcome) => tracing::info!(
            queue_id = %record.id,
            status = outcome.status.as_str(),
            saved = outcome.saved,
            expected = outcome.expected,
            "Queued PDF processed"
        ),
        RunReport::Aborted { reason } => {
            tracing::warn!(queue_id = %record.id, reason = %reason, "Queued PDF run aborted")
        }
    }

    Ok(true)
}

/// Logs `processing` records older than the staleness threshold; they are left for a
/// resume run or a manual reset.
pub(crate) async fn report_stuck(state: &AppState) -> Result<usize> {
    let stale_before = crate::core::time::minutes_before(
        primitive_now_utc(),
        state.settings().parsing().stale_processing_minutes,
    );
    let stuck = repositories::queue::list_stuck(state.db(), stale_before).await?;
    for record in &stuck {
        tracing::warn!(
            queue_id = %record.id,
            filename = %record.filename,
            started_at = ?record.started_at,
            "Queue item appears stuck in processing"
        );
    }
    Ok(stuck.len())
}

#[cfg(test)]
mod tests {
    use super::load_text;
    use crate::core::config::Settings;
    use crate::db::models::QueueRecord;
    use crate::db::types::QueueStatus;
    use crate::services::storage::StorageService;
    use crate::test_support;
    use time::macros::datetime;

    #[tokio::test]
    async fn missing_storage_path_fails_without_download() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        test_support::set_test_storage_env();

        let settings = Settings::load().expect("settings");
        let storage = StorageService::from_settings(&settings)
            .await
            .expect("storage")
            .expect("storage enabled");

        let record = QueueRecord {
            id: "q".to_string(),
            filename: "a.pdf".to_string(),
            file_size: 0,
            storage_path: None,
            status: QueueStatus::Pending,
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
            started_at: None,
            completed_at: None,
        };

        assert_eq!(load_text(&storage, &record).await.unwrap_err(), "PDF 파일 경로가 없습니다");
    }
}
