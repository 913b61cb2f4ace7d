use std::collections::HashSet;

use crate::db::models::MockExamQuestion;
use crate::repositories::questions::NewQuestion;

pub(crate) const HEADERS: [&str; 19] = [
    "유형 1",
    "유형 2",
    "유형 3",
    "출제년도",
    "출제월",
    "출제학년",
    "출제교육청",
    "출제번호",
    "문제번호",
    "문제",
    "문제지문",
    "선지1",
    "선지2",
    "선지3",
    "선지4",
    "선지5",
    "정답",
    "모범해석",
    "이미지URL",
];

const BOM: char = '\u{FEFF}';

fn escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|inner| inner.to_string()).unwrap_or_default()
}

pub(crate) fn question_row(question: &MockExamQuestion, image_url: Option<String>) -> Vec<String> {
    vec![
        question.type1.clone(),
        question.type2.clone(),
        question.type3.clone(),
        optional(question.source_year),
        optional(question.source_month.as_deref()),
        optional(question.source_grade.as_deref()),
        optional(question.source_org.as_deref()),
        optional(question.source_number),
        question.question_number.to_string(),
        question.question_text.clone(),
        question.passage.clone(),
        question.choice_1.clone(),
        question.choice_2.clone(),
        question.choice_3.clone(),
        question.choice_4.clone(),
        question.choice_5.clone(),
        question.correct_answer.clone(),
        question.model_translation.clone(),
        image_url.unwrap_or_default(),
    ]
}

/// Header plus rows joined with `\n`, prefixed with a UTF-8 BOM for spreadsheet apps.
pub(crate) fn render(rows: &[Vec<String>]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(HEADERS.join(","));
    for row in rows {
        lines.push(row.iter().map(|value| escape(value)).collect::<Vec<_>>().join(","));
    }

    let mut out = String::new();
    out.push(BOM);
    out.push_str(&lines.join("\n"));
    out
}

/// Records of a CSV document; quoted fields may span lines. Blank lines are skipped.
pub(crate) fn parse(text: &str) -> Vec<Vec<String>> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    let mut finish_record = |record: &mut Vec<String>, field: &mut String| {
        record.push(std::mem::take(field));
        let row = std::mem::take(record);
        if !(row.len() == 1 && row[0].trim().is_empty()) {
            records.push(row);
        }
    };

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => record.push(std::mem::take(&mut field)),
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' if !in_quotes => finish_record(&mut record, &mut field),
            _ => field.push(ch),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        finish_record(&mut record, &mut field);
    }

    records
}

fn column(cols: &[String], index: usize) -> String {
    cols.get(index).cloned().unwrap_or_default()
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

/// Rebuilds an insertable question from an exported row. Rows without a usable
/// question number are rejected.
pub(crate) fn row_to_question(
    cols: &[String],
    pdf_filename: &str,
    image_path: impl Fn(&str) -> Option<String>,
) -> Option<NewQuestion> {
    let question_number = column(cols, 8).trim().parse::<i32>().ok()?;
    let image_url = column(cols, 18);

    Some(NewQuestion {
        type1: column(cols, 0),
        type2: column(cols, 1),
        type3: column(cols, 2),
        source_year: column(cols, 3).trim().parse().ok(),
        source_month: non_empty(column(cols, 4)),
        source_grade: non_empty(column(cols, 5)),
        source_org: non_empty(column(cols, 6)),
        source_number: column(cols, 7).trim().parse().ok(),
        question_number,
        question_text: column(cols, 9),
        passage: column(cols, 10),
        choices: [
            column(cols, 11),
            column(cols, 12),
            column(cols, 13),
            column(cols, 14),
            column(cols, 15),
        ],
        correct_answer: column(cols, 16),
        model_translation: column(cols, 17),
        image_path: if image_url.is_empty() { None } else { image_path(&image_url) },
        pdf_filename: pdf_filename.to_string(),
    })
}

/// Keeps the first row for each question number not already stored; returns the kept
/// rows and how many were dropped.
pub(crate) fn skip_stored_numbers(
    questions: Vec<NewQuestion>,
    stored: impl IntoIterator<Item = i32>,
) -> (Vec<NewQuestion>, u32) {
    let mut seen: HashSet<i32> = stored.into_iter().collect();
    let total = questions.len();
    let kept: Vec<NewQuestion> =
        questions.into_iter().filter(|question| seen.insert(question.question_number)).collect();
    let skipped = u32::try_from(total - kept.len()).unwrap_or(u32::MAX);
    (kept, skipped)
}
