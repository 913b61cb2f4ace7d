use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

static RE_FENCED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").expect("fenced block pattern"));

#[derive(Debug, Error)]
pub(crate) enum ReplyJsonError {
    #[error("no JSON array found in model reply")]
    NotFound,
    #[error("invalid JSON in model reply: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// End offset (exclusive) of the bracketed value opening at `start`, ignoring brackets
/// inside string literals.
fn matching_close(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + ch.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

/// First complete `[...]` that parses as a JSON array.
fn scan_for_array(text: &str) -> Result<Vec<Value>, ReplyJsonError> {
    let mut last_error = None;

    for (start, _) in text.match_indices('[') {
        let Some(end) = matching_close(text, start) else {
            continue;
        };
        match serde_json::from_str::<Value>(&text[start..end]) {
            Ok(Value::Array(items)) => return Ok(items),
            Ok(_) => {}
            Err(err) => last_error = Some(err),
        }
    }

    match last_error {
        Some(err) => Err(ReplyJsonError::Invalid(err)),
        None => Err(ReplyJsonError::NotFound),
    }
}

/// Items of the JSON array in a model reply. Fenced code blocks take precedence over
/// bare text; a lone object is treated as a one-item array.
pub(crate) fn extract_items(reply: &str) -> Result<Vec<Value>, ReplyJsonError> {
    let candidate = RE_FENCED
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|body| body.as_str().trim())
        .unwrap_or_else(|| reply.trim());

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Array(items)) => return Ok(items),
        Ok(object @ Value::Object(_)) => return Ok(vec![object]),
        _ => {}
    }

    scan_for_array(candidate)
}

/// First `limit` characters of a reply, for error reports.
pub(crate) fn excerpt(reply: &str, limit: usize) -> String {
    reply.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_block_is_preferred() {
        let reply = "Here you go:\n```json\n[{\"question_number\": 1}]\n```\n[9]";
        let items = extract_items(reply).expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["question_number"], 1);
    }

    #[test]
    fn bare_array_with_surrounding_prose() {
        let reply = "결과입니다 [참고] 아래 배열:\n[{\"passage\": \"a ] tricky [ string\"}, {\"passage\": \"b\"}] 끝";
        let items = extract_items(reply).expect("items");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["passage"], "a ] tricky [ string");
    }

    #[test]
    fn single_object_becomes_one_item() {
        let items = extract_items("{\"question_number\": 3}").expect("items");
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn truncated_reply_is_an_error() {
        let result = extract_items("[{\"question_number\": 1}, {\"question_");
        assert!(matches!(result, Err(ReplyJsonError::NotFound)));
        assert!(extract_items("no json at all").is_err());
    }

    #[test]
    fn malformed_array_reports_parse_error() {
        let result = extract_items("[1, 2,, 3]");
        assert!(matches!(result, Err(ReplyJsonError::Invalid(_))));
    }

    #[test]
    fn excerpt_counts_characters() {
        assert_eq!(excerpt("가나다라", 2), "가나");
    }
}
