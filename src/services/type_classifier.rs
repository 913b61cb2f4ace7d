//! Maps a fine-grained question type label (type3) onto the two-level
//! category pair (type1/type2) used for browsing and export.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TypeMapping {
    pub(crate) type1: &'static str,
    pub(crate) type2: &'static str,
}

impl TypeMapping {
    pub(crate) const UNCLASSIFIED: TypeMapping = TypeMapping { type1: "", type2: "" };

    pub(crate) fn is_classified(&self) -> bool {
        !self.type1.is_empty()
    }
}

const CONTENT: &str = "내용추론";
const GIST: &str = "대의추론";
const BLANK: &str = "빈칸추론";
const LOGIC: &str = "논리추론";
const FLOW: &str = "글의흐름(순서/삽입/무관)";

/// Ordered table; the substring pass walks it top to bottom.
const TABLE: &[(&str, &str, &str)] = &[
    ("글의 목적", CONTENT, "글의 목적"),
    ("글의목적", CONTENT, "글의 목적"),
    ("감정/심경/분위기", CONTENT, "감정/심경/분위기"),
    ("감정_심경_분위기", CONTENT, "감정/심경/분위기"),
    ("지칭추론", CONTENT, "지칭추론"),
    ("내용일치", CONTENT, "내용일치/불일치"),
    ("내용불일치", CONTENT, "내용일치/불일치"),
    ("내용일치/불일치", CONTENT, "내용일치/불일치"),
    ("실용문", CONTENT, "내용일치/불일치"),
    ("도표", CONTENT, "도표"),
    ("주제", GIST, "주제/제목/요지"),
    ("제목", GIST, "주제/제목/요지"),
    ("요지", GIST, "주제/제목/요지"),
    ("주장", GIST, "주제/제목/요지"),
    ("요지/주장", GIST, "주제/제목/요지"),
    ("요약문", GIST, "요약문완성"),
    ("요약문완성", GIST, "요약문완성"),
    ("요약문 완성", GIST, "요약문완성"),
    ("함의추론", BLANK, "함의추론"),
    ("함축의미추론", BLANK, "함의추론"),
    ("빈칸추론", BLANK, "빈칸추론"),
    ("짧은빈칸추론", BLANK, "빈칸추론"),
    ("긴빈칸추론", BLANK, "빈칸추론"),
    ("접속사", BLANK, "접속사/연결사"),
    ("연결사", BLANK, "접속사/연결사"),
    ("접속사/연결사", BLANK, "접속사/연결사"),
    ("접속사+연결사", BLANK, "접속사/연결사"),
    ("무관한 문장", LOGIC, FLOW),
    ("무관한문장", LOGIC, FLOW),
    ("글의 순서", LOGIC, FLOW),
    ("글의순서", LOGIC, FLOW),
    ("순서", LOGIC, FLOW),
    ("문장 삽입", LOGIC, FLOW),
    ("문장삽입", LOGIC, FLOW),
    ("삽입문장", LOGIC, FLOW),
    ("장문독해", LOGIC, "장문독해"),
    ("장문", LOGIC, "장문독해"),
    ("어법", "어법", "어법"),
    ("문법", "어법", "어법"),
    ("어휘", "어휘", "어휘"),
    ("어휘영영풀이", "어휘", "어휘영영풀이"),
    ("어휘 영영풀이", "어휘", "어휘영영풀이"),
    ("빈칸 넣기", BLANK, "빈칸추론"),
];

fn exact(label: &str) -> Option<TypeMapping> {
    TABLE
        .iter()
        .find(|(key, _, _)| *key == label)
        .map(|(_, type1, type2)| TypeMapping { type1, type2 })
}

/// Exact key, then each `/`-separated part, then substring containment in either
/// direction in table order. Blank labels stay unclassified.
pub(crate) fn classify(type3: &str) -> TypeMapping {
    let label = type3.trim();
    if label.is_empty() {
        return TypeMapping::UNCLASSIFIED;
    }

    if let Some(mapping) = exact(label) {
        return mapping;
    }

    if let Some(mapping) = label.split('/').map(str::trim).find_map(exact) {
        return mapping;
    }

    TABLE
        .iter()
        .find(|(key, _, _)| label.contains(key) || key.contains(label))
        .map(|(_, type1, type2)| TypeMapping { type1, type2 })
        .unwrap_or(TypeMapping::UNCLASSIFIED)
}
