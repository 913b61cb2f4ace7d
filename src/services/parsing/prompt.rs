use std::borrow::Cow;

use regex::Regex;

use crate::services::chunk_plan::ChunkRange;

pub(crate) const SYSTEM_PROMPT: &str = r#"당신은 교육청·평가원 영어 모의고사 PDF에서 추출한 텍스트를 구조화된 JSON으로 변환하는 전문가입니다.

## 작업
주어진 텍스트에서 문항을 하나씩 찾아 JSON 배열로 반환하세요.

## 출력 형식
배열의 각 원소는 다음 필드를 가집니다:
{
  "source_year": 출제년도 (숫자, 예: 2019),
  "source_month": "출제월 (예: 6월)",
  "source_grade": "출제학년 (예: 고2)",
  "source_org": "출제기관 (예: 경기교육청)",
  "source_number": 원 시험지 문항번호 (숫자),
  "question_number": 현재 PDF 안에서의 문항 순번 (숫자),
  "type3": "문제 유형 (아래 목록 참고)",
  "question_text": "발문 (번호, 배점 표시 제외)",
  "passage": "지문 (아래 변환 규칙 적용)",
  "choice_1": "① 선지",
  "choice_2": "② 선지",
  "choice_3": "③ 선지",
  "choice_4": "④ 선지",
  "choice_5": "⑤ 선지",
  "correct_answer": "정답 (①~⑤)",
  "model_translation": "모범해석 ([해석]과 어휘 설명 포함)"
}

## 유형 목록 (type3)
파일명에 유형 힌트가 있으면 참고하세요.
글의 목적, 감정/심경/분위기, 지칭추론, 내용일치/불일치, 도표, 주제, 제목, 요지/주장,
요약문완성, 함의추론, 빈칸추론, 접속사/연결사, 무관한 문장, 글의 순서, 문장 삽입,
장문독해, 어법, 어휘

## 출처 표시
"2019_6월_고2_경기교육청_31" 같은 형식은 '_'로 나누어 각 출처 필드에 넣으세요.

## 변환 규칙
1. 밑줄 친 부분 → [텍스트]
2. 빈칸 → ________
3. <내용> → (내용)
4. 단 폭 때문에 생긴 줄바꿈은 제거하고 문장을 잇습니다
5. 의도된 문단 구분은 유지합니다
6. *단어: 뜻 형식의 어휘 설명은 그대로 둡니다

## 주의
- 정답은 문서 뒤쪽 정답표에서 문항번호로 찾아 넣으세요
- 해석은 문서 뒤쪽 해석 부분에서 문항번호로 찾아 넣으세요
- 선지가 5개보다 적으면 나머지는 빈 문자열로 둡니다
- 설명 없이 JSON 배열만 출력하세요
"#;

/// Bytes kept before the first header and after the last one of a slice.
const SLICE_MARGIN: usize = 2_000;

fn floor_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Byte offset where the last `chars` characters begin.
fn tail_offset(text: &str, chars: usize) -> usize {
    if chars == 0 {
        return text.len();
    }
    text.char_indices().rev().nth(chars - 1).map(|(index, _)| index).unwrap_or(0)
}

fn header_position(text: &str, number: u32, from: usize) -> Option<usize> {
    let pattern = Regex::new(&format!(r"(?m)^\s*{number}\s*[.)]")).ok()?;
    pattern.find_at(text, from).map(|found| found.start())
}

/// The part of a large document that covers `range`: from shortly before the range's
/// first item header to shortly after the next range's header, followed by the
/// document tail where the answer key and translations live.
pub(crate) fn text_window<'a>(text: &'a str, range: Option<ChunkRange>, limit: usize) -> Cow<'a, str> {
    let Some(range) = range else {
        return Cow::Borrowed(text);
    };
    if text.chars().count() <= limit {
        return Cow::Borrowed(text);
    }

    let Some(start) = header_position(text, range.start, 0) else {
        return Cow::Borrowed(text);
    };
    let end = header_position(text, range.end + 1, start).unwrap_or(text.len());

    let slice_start = floor_boundary(text, start.saturating_sub(SLICE_MARGIN));
    let slice_end = floor_boundary(text, end.saturating_add(SLICE_MARGIN));
    let tail_start = tail_offset(text, limit / 3);

    if tail_start <= slice_end {
        return Cow::Borrowed(&text[slice_start..]);
    }

    Cow::Owned(format!(
        "{}\n\n...(중략)...\n\n{}",
        &text[slice_start..slice_end],
        &text[tail_start..]
    ))
}

pub(crate) struct UserMessage<'a> {
    pub(crate) filename: &'a str,
    pub(crate) text: &'a str,
    pub(crate) range: Option<ChunkRange>,
    /// Item numbers already stored; the model is told to skip them.
    pub(crate) exclude: &'a [i32],
}

impl UserMessage<'_> {
    pub(crate) fn render(&self) -> String {
        let mut out = format!("## 파일명 (유형 힌트)\n{}\n\n", self.filename);

        if let Some(range) = self.range {
            out.push_str(&format!(
                "## 추출 범위\n{}번부터 {}번까지의 문항만 추출하세요. 범위 밖 문항은 출력하지 마세요.\n\n",
                range.start, range.end
            ));
        }

        if !self.exclude.is_empty() {
            let numbers =
                self.exclude.iter().map(|number| number.to_string()).collect::<Vec<_>>().join(", ");
            out.push_str(&format!(
                "## 제외할 문항\n이미 저장된 문항 번호: {numbers}\n위 번호를 제외하고 누락된 문항만 추출하세요.\n\n"
            ));
        }

        out.push_str("## PDF 텍스트\n");
        out.push_str(self.text);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_document(items: u32, filler: usize) -> String {
        let mut text = String::new();
        for number in 1..=items {
            text.push_str(&format!("{number}. 다음 글의 목적으로 가장 적절한 것은?\n"));
            text.push_str(&"가".repeat(filler));
            text.push('\n');
        }
        text.push_str("정답\n1 ③ 2 ① 3 ⑤\n해석 끝");
        text
    }

    #[test]
    fn small_documents_are_sent_whole() {
        let text = long_document(3, 10);
        let range = Some(ChunkRange { start: 1, end: 2 });
        assert!(matches!(text_window(&text, range, 100_000), Cow::Borrowed(_)));
        assert_eq!(text_window(&text, None, 1), text);
    }

    #[test]
    fn large_documents_are_sliced_around_the_range() {
        let text = long_document(60, 3_000);
        let window = text_window(&text, Some(ChunkRange { start: 31, end: 45 }), 60_000);

        assert!(window.len() < text.len());
        assert!(window.contains("31. 다음"));
        assert!(window.contains("45. 다음"));
        assert!(!window.contains("\n10. 다음"));
        assert!(window.ends_with("해석 끝"));
    }

    #[test]
    fn missing_header_falls_back_to_whole_text() {
        let text = "가나다 본문만 있고 문항 번호가 없다.\n".repeat(4_000);
        assert!(text.chars().count() > 60_000);

        let window = text_window(&text, Some(ChunkRange { start: 1, end: 30 }), 60_000);
        assert!(matches!(window, Cow::Borrowed(_)));
        assert_eq!(window, text);
    }

    #[test]
    fn user_message_includes_range_and_exclusions() {
        let message = UserMessage {
            filename: "모음집_도표.pdf",
            text: "본문",
            range: Some(ChunkRange { start: 31, end: 45 }),
            exclude: &[1, 2],
        }
        .render();

        assert!(message.starts_with("## 파일명 (유형 힌트)\n모음집_도표.pdf"));
        assert!(message.contains("31번부터 45번까지"));
        assert!(message.contains("이미 저장된 문항 번호: 1, 2"));
        assert!(message.ends_with("## PDF 텍스트\n본문"));
    }
}
