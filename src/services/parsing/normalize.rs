use serde_json::Value;

use crate::repositories::questions::NewQuestion;
use crate::services::type_classifier::{self, TypeMapping};

/// Per-file context applied to every item of a model reply.
pub(crate) struct ItemContext<'a> {
    pub(crate) pdf_filename: &'a str,
    pub(crate) hint_type3: &'a str,
    pub(crate) hint_mapping: TypeMapping,
}

fn text(item: &Value, key: &str) -> String {
    match item.get(key) {
        Some(Value::String(value)) => value.trim().to_string(),
        Some(Value::Number(value)) => value.to_string(),
        _ => String::new(),
    }
}

fn optional_text(item: &Value, key: &str) -> Option<String> {
    Some(text(item, key)).filter(|value| !value.is_empty())
}

fn number(item: &Value, key: &str) -> Option<i32> {
    match item.get(key)? {
        Value::Number(value) => value.as_i64().and_then(|raw| i32::try_from(raw).ok()),
        Value::String(value) => value.trim().parse().ok(),
        _ => None,
    }
}

fn first_non_empty(candidates: [&str; 3]) -> String {
    candidates.into_iter().find(|value| !value.is_empty()).unwrap_or_default().to_string()
}

/// Converts one reply item into an insertable row. Non-object items are dropped;
/// a missing `question_number` becomes `default_number`.
pub(crate) fn normalize_item(
    item: &Value,
    default_number: i32,
    ctx: &ItemContext<'_>,
) -> Option<NewQuestion> {
    if !item.is_object() {
        return None;
    }

    let item_type3 = text(item, "type3");
    let type3 = if item_type3.is_empty() { ctx.hint_type3.trim().to_string() } else { item_type3 };
    let mapping = if type3.is_empty() { ctx.hint_mapping } else { type_classifier::classify(&type3) };
    let item_type1 = text(item, "type1");
    let item_type2 = text(item, "type2");

    Some(NewQuestion {
        type1: first_non_empty([mapping.type1, ctx.hint_mapping.type1, item_type1.as_str()]),
        type2: first_non_empty([mapping.type2, ctx.hint_mapping.type2, item_type2.as_str()]),
        type3,
        source_year: number(item, "source_year"),
        source_month: optional_text(item, "source_month"),
        source_grade: optional_text(item, "source_grade"),
        source_org: optional_text(item, "source_org"),
        source_number: number(item, "source_number"),
        question_number: number(item, "question_number").unwrap_or(default_number),
        question_text: text(item, "question_text"),
        passage: text(item, "passage"),
        choices: [
            text(item, "choice_1"),
            text(item, "choice_2"),
            text(item, "choice_3"),
            text(item, "choice_4"),
            text(item, "choice_5"),
        ],
        correct_answer: text(item, "correct_answer"),
        model_translation: text(item, "model_translation"),
        image_path: None,
        pdf_filename: ctx.pdf_filename.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(hint: &str) -> ItemContext<'_> {
        ItemContext {
            pdf_filename: "a.pdf",
            hint_type3: hint,
            hint_mapping: type_classifier::classify(hint),
        }
    }

    #[test]
    fn model_type3_takes_precedence_over_hint() {
        let item = json!({"type3": "어법", "question_number": "7", "source_year": 2020});
        let question = normalize_item(&item, 1, &ctx("도표")).expect("question");

        assert_eq!(question.type3, "어법");
        assert_eq!((question.type1.as_str(), question.type2.as_str()), ("어법", "어법"));
        assert_eq!(question.question_number, 7);
        assert_eq!(question.source_year, Some(2020));
        assert_eq!(question.pdf_filename, "a.pdf");
    }

    #[test]
    fn hint_fills_missing_type_and_defaults() {
        let item = json!({"question_text": "  다음 도표의 내용과 일치하지 않는 것은?  "});
        let question = normalize_item(&item, 31, &ctx("도표")).expect("question");

        assert_eq!(question.type3, "도표");
        assert_eq!(question.type1, "내용추론");
        assert_eq!(question.question_number, 31);
        assert_eq!(question.question_text, "다음 도표의 내용과 일치하지 않는 것은?");
        assert_eq!(question.source_month, None);
        assert_eq!(question.choices[4], "");
    }

    #[test]
    fn unknown_type_falls_back_to_model_categories() {
        let item = json!({"type3": "영작", "type1": "기타", "type2": "서술형"});
        let question = normalize_item(&item, 1, &ctx("")).expect("question");
        assert_eq!((question.type1.as_str(), question.type2.as_str()), ("기타", "서술형"));
    }

    #[test]
    fn non_objects_are_dropped() {
        assert!(normalize_item(&json!("text"), 1, &ctx("")).is_none());
    }
}
