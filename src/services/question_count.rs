use std::sync::LazyLock;

use regex::Regex;

static RE_ANSWER_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3})\s*\)?\s*[①②③④⑤]").expect("answer key pattern"));
static RE_ITEM_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(\d{1,3})\s*[.)]").expect("item header pattern"));

/// Best-effort item count for a document's extracted text.
///
/// The answer key ("29 ③" or "29) ③") is preferred: its largest number is normally the
/// final item. Without one, lines opening with `N.` or `N)` are counted instead, which
/// over-counts numbered lists inside passages.
pub(crate) fn estimate(text: &str) -> u32 {
    let answer_key_max = RE_ANSWER_KEY
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .max();

    if let Some(max) = answer_key_max {
        return max;
    }

    RE_ITEM_HEADER.find_iter(text).count() as u32
}

#[cfg(test)]
mod tests {
    use super::estimate;

    #[test]
    fn answer_key_maximum_wins() {
        let text = "1. first item\n2. second\n\n정답\n1 ② 2) ③ 3 ⑤\n45 ①";
        assert_eq!(estimate(text), 45);
    }

    #[test]
    fn falls_back_to_line_headers() {
        let text = "1. What is the purpose?\n  2) Which is true?\nnot 3. a header\n4. Last";
        assert_eq!(estimate(text), 3);
    }

    #[test]
    fn empty_text_is_zero() {
        assert_eq!(estimate(""), 0);
        assert_eq!(estimate("no numbers here"), 0);
    }
}
