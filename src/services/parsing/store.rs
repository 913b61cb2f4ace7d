use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::types::QueueStatus;
use crate::repositories;
use crate::repositories::questions::NewQuestion;
use crate::repositories::queue::{ClaimRule, FinishRun};

/// The parts of a queue record a run needs once it owns the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ClaimedRecord {
    pub(crate) filename: String,
    pub(crate) extracted_type3: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunOutcome {
    pub(crate) status: QueueStatus,
    pub(crate) saved: u32,
    pub(crate) expected: u32,
    pub(crate) ratio: u32,
    pub(crate) message: Option<String>,
}

/// Persistence used by a parse run: the queue record and the question rows of one file.
#[async_trait]
pub(crate) trait ParseStore: Send + Sync {
    async fn claim(&self, queue_id: &str, rule: &ClaimRule) -> anyhow::Result<Option<ClaimedRecord>>;
    async fn current_status(&self, queue_id: &str) -> anyhow::Result<Option<QueueStatus>>;
    async fn set_expected(&self, queue_id: &str, expected: u32) -> anyhow::Result<()>;
    async fn update_progress(&self, queue_id: &str, processed: u32, progress: u32) -> anyhow::Result<()>;
    async fn saved_numbers(&self, pdf_filename: &str) -> anyhow::Result<Vec<i32>>;
    async fn count_saved(&self, pdf_filename: &str) -> anyhow::Result<u32>;
    async fn delete_saved(&self, pdf_filename: &str) -> anyhow::Result<u64>;
    /// Inserts all rows or none.
    async fn insert_questions(&self, questions: &[NewQuestion]) -> anyhow::Result<u32>;
    async fn finish(&self, queue_id: &str, outcome: &RunOutcome) -> anyhow::Result<()>;
    async fn fail(&self, queue_id: &str, message: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub(crate) struct PgParseStore {
    pool: PgPool,
}

impl PgParseStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[async_trait]
impl ParseStore for PgParseStore {
    async fn claim(&self, queue_id: &str, rule: &ClaimRule) -> anyhow::Result<Option<ClaimedRecord>> {
        let record =
            repositories::queue::claim(&self.pool, queue_id, rule, primitive_now_utc()).await?;
        Ok(record.map(|record| ClaimedRecord {
            filename: record.filename,
            extracted_type3: record.extracted_type3,
        }))
    }

    async fn current_status(&self, queue_id: &str) -> anyhow::Result<Option<QueueStatus>> {
        Ok(repositories::queue::current_status(&self.pool, queue_id).await?)
    }

    async fn set_expected(&self, queue_id: &str, expected: u32) -> anyhow::Result<()> {
        repositories::queue::set_expected(&self.pool, queue_id, to_i32(expected), primitive_now_utc())
            .await?;
        Ok(())
    }

    async fn update_progress(&self, queue_id: &str, processed: u32, progress: u32) -> anyhow::Result<()> {
        repositories::queue::update_progress(
            &self.pool,
            queue_id,
            to_i32(processed),
            to_i32(progress),
            primitive_now_utc(),
        )
        .await?;
        Ok(())
    }

    async fn saved_numbers(&self, pdf_filename: &str) -> anyhow::Result<Vec<i32>> {
        Ok(repositories::questions::numbers_by_filename(&self.pool, pdf_filename).await?)
    }

    async fn count_saved(&self, pdf_filename: &str) -> anyhow::Result<u32> {
        let count = repositories::questions::count_by_filename(&self.pool, pdf_filename).await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn delete_saved(&self, pdf_filename: &str) -> anyhow::Result<u64> {
        Ok(repositories::questions::delete_by_filename(&self.pool, pdf_filename).await?)
    }

    async fn insert_questions(&self, questions: &[NewQuestion]) -> anyhow::Result<u32> {
        let now = primitive_now_utc();
        let mut tx = self.pool.begin().await?;
        for question in questions {
            repositories::questions::insert(&mut *tx, &Uuid::new_v4().to_string(), question, now)
                .await?;
        }
        tx.commit().await?;
        Ok(questions.len() as u32)
    }

    async fn finish(&self, queue_id: &str, outcome: &RunOutcome) -> anyhow::Result<()> {
        repositories::queue::finish(
            &self.pool,
            queue_id,
            FinishRun {
                status: outcome.status,
                total_questions: to_i32(outcome.saved),
                expected_questions: to_i32(outcome.expected),
                extraction_ratio: Some(to_i32(outcome.ratio)),
                error_message: outcome.message.as_deref(),
                now: primitive_now_utc(),
            },
        )
        .await?;
        Ok(())
    }

    async fn fail(&self, queue_id: &str, message: &str) -> anyhow::Result<()> {
        repositories::queue::mark_failed(&self.pool, queue_id, message, primitive_now_utc()).await?;
        Ok(())
    }
}
