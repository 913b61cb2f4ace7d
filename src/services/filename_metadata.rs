use std::sync::LazyLock;

use regex::Regex;

static RE_COLLECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)모음집[_\s]*(\d+)?[_\s]+(.+)\.pdf$").expect("collection pattern")
});
static RE_PAST_NUMBERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)기출[_\s]+\d+\.(.+)\.pdf$").expect("numbered pattern"));
static RE_PAST_PLAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)기출[_\s]+([^_\d][^_]+)\.pdf$").expect("plain pattern"));
static RE_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*").expect("comma pattern"));
static RE_REVISION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\d+수정\)").expect("revision pattern"));
static RE_GRADE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"고(\d)").expect("grade pattern"));
static RE_YEARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})[-~]?(\d{4})?년?").expect("years pattern"));

const SOURCES: &[(&str, &str)] =
    &[("평가원", "평가원"), ("모평", "평가원"), ("수능", "수능"), ("교육청", "교육청")];

/// Advisory hints recovered from an upload's filename. Empty strings mean "not found".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FilenameMetadata {
    pub(crate) type3: String,
    pub(crate) grade: String,
    pub(crate) years: String,
    pub(crate) source: String,
}

fn type_hint(filename: &str) -> String {
    let raw = RE_COLLECTION
        .captures(filename)
        .and_then(|caps| caps.get(2))
        .or_else(|| RE_PAST_NUMBERED.captures(filename).and_then(|caps| caps.get(1)))
        .or_else(|| RE_PAST_PLAIN.captures(filename).and_then(|caps| caps.get(1)))
        .map(|found| found.as_str())
        .unwrap_or_default();

    if raw.is_empty() {
        return String::new();
    }

    let slashed = raw.replace('_', "/");
    let slashed = RE_COMMA.replace_all(&slashed, "/");
    RE_REVISION.replace_all(&slashed, "").trim().to_string()
}

pub(crate) fn extract(filename: &str) -> FilenameMetadata {
    let grade = RE_GRADE
        .captures(filename)
        .and_then(|caps| caps.get(1))
        .map(|digit| format!("고{}", digit.as_str()))
        .unwrap_or_default();

    let years = RE_YEARS
        .captures(filename)
        .map(|caps| match (caps.get(1), caps.get(2)) {
            (Some(from), Some(to)) => format!("{}-{}", from.as_str(), to.as_str()),
            (Some(from), None) => from.as_str().to_string(),
            _ => String::new(),
        })
        .unwrap_or_default();

    let source = SOURCES
        .iter()
        .find(|(needle, _)| filename.contains(needle))
        .map(|(_, label)| label.to_string())
        .unwrap_or_default();

    FilenameMetadata { type3: type_hint(filename), grade, years, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_pattern_with_number() {
        let meta = extract("고2 2019-2023 모음집 3_빈칸추론.pdf");
        assert_eq!(meta.type3, "빈칸추론");
        assert_eq!(meta.grade, "고2");
        assert_eq!(meta.years, "2019-2023");
    }

    #[test]
    fn numbered_past_exam_pattern() {
        let meta = extract("기출_11.장문독해.pdf");
        assert_eq!(meta.type3, "장문독해");
    }

    #[test]
    fn plain_past_exam_pattern() {
        let meta = extract("교육청 기출_도표.PDF");
        assert_eq!(meta.type3, "도표");
        assert_eq!(meta.source, "교육청");
    }

    #[test]
    fn type_hint_post_processing() {
        let meta = extract("모음집_주제_제목, 요지(2수정).pdf");
        assert_eq!(meta.type3, "주제/제목/요지");
    }

    #[test]
    fn source_priority_and_single_year() {
        assert_eq!(extract("2021년 모평 수능.pdf").source, "평가원");
        assert_eq!(extract("2021년 수능.pdf").years, "2021");
    }

    #[test]
    fn unrelated_name_yields_empty_fields() {
        assert_eq!(extract("scan.pdf"), FilenameMetadata::default());
    }
}
