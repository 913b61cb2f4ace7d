use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::QueueStatus;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QueueRecord {
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
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct MockExamQuestion {
    pub(crate) id: String,
    pub(crate) type1: String,
    pub(crate) type2: String,
    pub(crate) type3: String,
    pub(crate) source_year: Option<i32>,
    pub(crate) source_month: Option<String>,
    pub(crate) source_grade: Option<String>,
    pub(crate) source_org: Option<String>,
    pub(crate) source_number: Option<i32>,
    pub(crate) question_number: i32,
    pub(crate) question_text: String,
    pub(crate) passage: String,
    pub(crate) choice_1: String,
    pub(crate) choice_2: String,
    pub(crate) choice_3: String,
    pub(crate) choice_4: String,
    pub(crate) choice_5: String,
    pub(crate) correct_answer: String,
    pub(crate) model_translation: String,
    pub(crate) image_path: Option<String>,
    pub(crate) pdf_filename: String,
    pub(crate) created_at: PrimitiveDateTime,
}
