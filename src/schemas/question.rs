use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::pagination::default_limit;
use crate::core::time::format_primitive;
use crate::db::models::MockExamQuestion;
use crate::repositories::questions::{FilterOptions, QuestionFilter};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct QuestionListQuery {
    pub(crate) type1: Option<String>,
    pub(crate) type2: Option<String>,
    pub(crate) type3: Option<String>,
    pub(crate) source_grade: Option<String>,
    pub(crate) source_year: Option<i32>,
    pub(crate) source_org: Option<String>,
    pub(crate) pdf_filename: Option<String>,
    pub(crate) search: Option<String>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
}

fn present(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}

impl QuestionListQuery {
    pub(crate) fn filter(&self) -> QuestionFilter {
        QuestionFilter {
            type1: present(&self.type1),
            type2: present(&self.type2),
            type3: present(&self.type3),
            source_grade: present(&self.source_grade),
            source_year: self.source_year,
            source_org: present(&self.source_org),
            pdf_filename: present(&self.pdf_filename),
            search: present(&self.search),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
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
    pub(crate) image_url: Option<String>,
    pub(crate) pdf_filename: String,
    pub(crate) created_at: String,
}

impl QuestionResponse {
    pub(crate) fn from_model(question: MockExamQuestion, image_url: Option<String>) -> Self {
        Self {
            id: question.id,
            type1: question.type1,
            type2: question.type2,
            type3: question.type3,
            source_year: question.source_year,
            source_month: question.source_month,
            source_grade: question.source_grade,
            source_org: question.source_org,
            source_number: question.source_number,
            question_number: question.question_number,
            question_text: question.question_text,
            passage: question.passage,
            choice_1: question.choice_1,
            choice_2: question.choice_2,
            choice_3: question.choice_3,
            choice_4: question.choice_4,
            choice_5: question.choice_5,
            correct_answer: question.correct_answer,
            model_translation: question.model_translation,
            image_path: question.image_path,
            image_url,
            pdf_filename: question.pdf_filename,
            created_at: format_primitive(question.created_at),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionUpdate {
    #[validate(length(min = 1, message = "question_text must not be empty"))]
    pub(crate) question_text: Option<String>,
    pub(crate) passage: Option<String>,
    pub(crate) choice_1: Option<String>,
    pub(crate) choice_2: Option<String>,
    pub(crate) choice_3: Option<String>,
    pub(crate) choice_4: Option<String>,
    pub(crate) choice_5: Option<String>,
    #[validate(length(min = 1, max = 16, message = "correct_answer must be 1-16 characters"))]
    pub(crate) correct_answer: Option<String>,
    pub(crate) model_translation: Option<String>,
}

impl QuestionUpdate {
    pub(crate) fn is_empty(&self) -> bool {
        self.question_text.is_none()
            && self.passage.is_none()
            && self.choice_1.is_none()
            && self.choice_2.is_none()
            && self.choice_3.is_none()
            && self.choice_4.is_none()
            && self.choice_5.is_none()
            && self.correct_answer.is_none()
            && self.model_translation.is_none()
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct FilterOptionsResponse {
    pub(crate) type1: Vec<String>,
    pub(crate) type2: Vec<String>,
    pub(crate) type3: Vec<String>,
    pub(crate) source_grade: Vec<String>,
    pub(crate) source_year: Vec<i32>,
    pub(crate) source_org: Vec<String>,
    pub(crate) pdf_filename: Vec<String>,
}

impl From<FilterOptions> for FilterOptionsResponse {
    fn from(options: FilterOptions) -> Self {
        Self {
            type1: options.type1,
            type2: options.type2,
            type3: options.type3,
            source_grade: options.source_grade,
            source_year: options.source_year,
            source_org: options.source_org,
            pdf_filename: options.pdf_filename,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImportQuery {
    pub(crate) pdf_filename: String,
    /// Drop the file's existing rows before importing.
    #[serde(default)]
    pub(crate) replace: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ImportResponse {
    pub(crate) pdf_filename: String,
    pub(crate) imported: u32,
    pub(crate) skipped: u32,
    pub(crate) replaced: u64,
}
