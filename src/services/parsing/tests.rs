use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

use super::*;
use crate::services::parsing::store::ClaimedRecord;

const FILENAME: &str = "고2_2024_9월_모의고사.pdf";

#[derive(Default)]
struct StoreState {
    status: Option<QueueStatus>,
    questions: Vec<NewQuestion>,
    expected: Option<u32>,
    progress: Vec<(u32, u32)>,
    outcome: Option<RunOutcome>,
    failure: Option<String>,
    writes: usize,
}

struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    fn with_status(status: QueueStatus) -> Self {
        Self { state: Mutex::new(StoreState { status: Some(status), ..StoreState::default() }) }
    }

    fn numbers(&self) -> Vec<i32> {
        let state = self.state.lock().expect("store lock");
        let mut numbers: Vec<i32> = state.questions.iter().map(|q| q.question_number).collect();
        numbers.sort_unstable();
        numbers
    }
}

#[async_trait]
impl ParseStore for FakeStore {
    async fn claim(&self, _queue_id: &str, rule: &ClaimRule) -> anyhow::Result<Option<ClaimedRecord>> {
        let mut state = self.state.lock().expect("store lock");
        match state.status {
            Some(status) if rule.allowed.contains(&status) => {
                state.status = Some(QueueStatus::Processing);
                state.writes += 1;
                Ok(Some(ClaimedRecord { filename: FILENAME.to_string(), extracted_type3: None }))
            }
            _ => Ok(None),
        }
    }

    async fn current_status(&self, _queue_id: &str) -> anyhow::Result<Option<QueueStatus>> {
        Ok(self.state.lock().expect("store lock").status)
    }

    async fn set_expected(&self, _queue_id: &str, expected: u32) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("store lock");
        state.expected = Some(expected);
        state.writes += 1;
        Ok(())
    }

    async fn update_progress(&self, _queue_id: &str, processed: u32, progress: u32) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("store lock");
        state.progress.push((processed, progress));
        state.writes += 1;
        Ok(())
    }

    async fn saved_numbers(&self, pdf_filename: &str) -> anyhow::Result<Vec<i32>> {
        let state = self.state.lock().expect("store lock");
        Ok(state
            .questions
            .iter()
            .filter(|q| q.pdf_filename == pdf_filename)
            .map(|q| q.question_number)
            .collect())
    }

    async fn count_saved(&self, pdf_filename: &str) -> anyhow::Result<u32> {
        Ok(self.saved_numbers(pdf_filename).await?.len() as u32)
    }

    async fn delete_saved(&self, pdf_filename: &str) -> anyhow::Result<u64> {
        let mut state = self.state.lock().expect("store lock");
        let before = state.questions.len();
        state.questions.retain(|q| q.pdf_filename != pdf_filename);
        state.writes += 1;
        Ok((before - state.questions.len()) as u64)
    }

    async fn insert_questions(&self, questions: &[NewQuestion]) -> anyhow::Result<u32> {
        let mut state = self.state.lock().expect("store lock");
        state.questions.extend_from_slice(questions);
        state.writes += 1;
        Ok(questions.len() as u32)
    }

    async fn finish(&self, _queue_id: &str, outcome: &RunOutcome) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("store lock");
        state.status = Some(outcome.status);
        state.outcome = Some(outcome.clone());
        state.writes += 1;
        Ok(())
    }

    async fn fail(&self, _queue_id: &str, message: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("store lock");
        state.status = Some(QueueStatus::Failed);
        state.failure = Some(message.to_string());
        state.writes += 1;
        Ok(())
    }
}

struct FakeClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeClient {
    fn new(replies: Vec<Result<String, String>>) -> Self {
        Self { replies: Mutex::new(replies.into()), requests: Mutex::new(Vec::new()) }
    }

    fn calls(&self) -> usize {
        self.requests.lock().expect("client lock").len()
    }
}

#[async_trait]
impl CompletionClient for FakeClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
        streamed_chars: &AtomicUsize,
    ) -> Result<Completion, LlmError> {
        self.requests.lock().expect("client lock").push(request.clone());
        let reply = self.replies.lock().expect("client lock").pop_front();
        match reply {
            Some(Ok(text)) => {
                streamed_chars.store(text.len(), Ordering::Relaxed);
                Ok(Completion { text, usage: Default::default() })
            }
            Some(Err(message)) => Err(LlmError::Stream(message)),
            None => Err(LlmError::Stream("no scripted reply".to_string())),
        }
    }
}

fn items(numbers: std::ops::RangeInclusive<i32>) -> String {
    let items: Vec<serde_json::Value> = numbers
        .map(|number| {
            json!({
                "question_number": number,
                "type3": "빈칸 추론",
                "question_text": format!("다음 빈칸에 들어갈 말로 가장 적절한 것은? ({number})"),
                "passage": "The passage.",
                "choice_1": "a", "choice_2": "b", "choice_3": "c", "choice_4": "d", "choice_5": "e",
                "correct_answer": "③",
            })
        })
        .collect();
    format!("```json\n{}\n```", serde_json::Value::Array(items))
}

fn document(expected: u32) -> String {
    format!("18. 다음 글의 목적으로 가장 적절한 것은?\n...\n\n정답\n1 ② 2 ③\n{expected} ①")
}

fn options() -> ParserOptions {
    ParserOptions {
        chunk_size: 30,
        chunk_delay: Duration::ZERO,
        heartbeat: Duration::from_secs(60),
        stale_processing_minutes: 5,
        large_document_chars: 60_000,
    }
}

fn request(mode: ParseMode, expected: u32) -> ParseRequest {
    ParseRequest {
        queue_id: "queue-1".to_string(),
        pdf_text: document(expected),
        filename: FILENAME.to_string(),
        extracted_type3: None,
        mode,
        reanalyze: false,
        chunk_size: None,
    }
}

fn drain(mut rx: UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn last(events: &[ProgressEvent]) -> &ProgressEvent {
    events.last().expect("at least one event")
}

#[test]
fn ratio_rounds_half_up() {
    assert_eq!(extraction_ratio(20, 45), 44);
    assert_eq!(extraction_ratio(45, 45), 100);
    assert_eq!(extraction_ratio(1, 8), 13);
    assert_eq!(extraction_ratio(0, 0), 100);
    assert_eq!(extraction_ratio(3, 0), 100);
}

#[test]
fn claim_rules_follow_mode() {
    let now = primitive_now_utc();
    assert_eq!(ParseMode::Full.claim_rule(now).allowed, vec![QueueStatus::Pending]);
    assert!(ParseMode::Full.claim_rule(now).stale_before.is_none());
    let resume = ParseMode::Resume.claim_rule(now);
    assert!(resume.allowed.contains(&QueueStatus::Failed));
    assert_eq!(resume.stale_before, Some(now));
    assert_eq!(ParseMode::Additional.claim_rule(now).allowed, vec![QueueStatus::Warning]);
}

#[test]
fn mode_deserializes_lowercase() {
    let mode: ParseMode = serde_json::from_str("\"resume\"").expect("mode");
    assert_eq!(mode, ParseMode::Resume);
}

#[tokio::test]
async fn chunked_run_stores_every_item_and_completes() {
    let store = FakeStore::with_status(QueueStatus::Pending);
    let client = FakeClient::new(vec![Ok(items(1..=30)), Ok(items(31..=45))]);
    let (sink, rx) = ProgressSink::channel();

    let report = run(&store, &client, &options(), &request(ParseMode::Full, 45), &sink).await;

    let RunReport::Finished(outcome) = report else { panic!("run aborted") };
    assert_eq!(outcome.status, QueueStatus::Completed);
    assert_eq!(outcome.saved, 45);
    assert_eq!(outcome.ratio, 100);
    assert_eq!(client.calls(), 2);
    assert_eq!(store.numbers(), (1..=45).collect::<Vec<_>>());

    let first_call = &client.requests.lock().expect("client lock")[0];
    assert!(first_call.user.contains("1번부터 30번까지"));

    let events = drain(rx);
    assert!(events.iter().any(|event| matches!(
        event,
        ProgressEvent::ChunkInfo(info) if info.total_chunks == 2 && info.expected_questions == 45
    )));
    match last(&events) {
        ProgressEvent::Complete(payload) => {
            assert_eq!(payload.questions_count, 45);
            assert_eq!(payload.extraction_ratio, 100);
            assert!(payload.warning.is_none());
        }
        other => panic!("unexpected final event {other:?}"),
    }
}

#[tokio::test]
async fn low_extraction_ratio_finishes_with_warning() {
    let store = FakeStore::with_status(QueueStatus::Pending);
    let client = FakeClient::new(vec![Ok(items(1..=20)), Ok("[]".to_string())]);
    let (sink, rx) = ProgressSink::channel();

    let report = run(&store, &client, &options(), &request(ParseMode::Full, 45), &sink).await;

    let RunReport::Finished(outcome) = report else { panic!("run aborted") };
    assert_eq!(outcome.status, QueueStatus::Warning);
    assert_eq!(outcome.ratio, 44);
    let message = outcome.message.expect("warning message");
    assert!(message.contains("44"));
    assert!(message.contains("20/45"));

    match last(&drain(rx)) {
        ProgressEvent::Complete(payload) => {
            assert_eq!(payload.warning.as_deref(), Some("추출 비율 낮음 (44%)"));
        }
        other => panic!("unexpected final event {other:?}"),
    }
}

#[tokio::test]
async fn reply_without_json_fails_the_run_with_an_excerpt() {
    let store = FakeStore::with_status(QueueStatus::Pending);
    let client = FakeClient::new(vec![Ok("죄송합니다. 이 문서를 처리할 수 없습니다.".to_string())]);
    let (sink, rx) = ProgressSink::channel();

    let report = run(&store, &client, &options(), &request(ParseMode::Full, 20), &sink).await;

    let RunReport::Finished(outcome) = report else { panic!("run aborted") };
    assert_eq!(outcome.status, QueueStatus::Failed);
    assert_eq!(outcome.saved, 0);

    let events = drain(rx);
    assert!(events.iter().any(|event| matches!(event, ProgressEvent::Warning(_))));
    match last(&events) {
        ProgressEvent::Error(notice) => {
            assert!(notice.details.as_deref().unwrap_or_default().contains("죄송합니다"));
        }
        other => panic!("unexpected final event {other:?}"),
    }
}

#[tokio::test]
async fn lost_claim_aborts_without_writes() {
    let store = FakeStore::with_status(QueueStatus::Processing);
    let client = FakeClient::new(vec![Ok(items(1..=5))]);
    let (sink, rx) = ProgressSink::channel();

    let report = run(&store, &client, &options(), &request(ParseMode::Full, 5), &sink).await;

    assert!(matches!(report, RunReport::Aborted { ref reason } if reason.contains("already processing")));
    assert_eq!(client.calls(), 0);
    assert_eq!(store.state.lock().expect("store lock").writes, 0);
    assert!(matches!(last(&drain(rx)), ProgressEvent::Error(_)));
}

#[tokio::test]
async fn upstream_error_marks_record_failed() {
    let store = FakeStore::with_status(QueueStatus::Pending);
    let client = FakeClient::new(vec![Err("overloaded".to_string())]);
    let (sink, rx) = ProgressSink::channel();

    run(&store, &client, &options(), &request(ParseMode::Full, 10), &sink).await;

    let state = store.state.lock().expect("store lock");
    assert_eq!(state.status, Some(QueueStatus::Failed));
    assert!(state.failure.as_deref().unwrap_or_default().contains("overloaded"));
    drop(state);
    assert!(matches!(last(&drain(rx)), ProgressEvent::Error(_)));
}

#[tokio::test]
async fn duplicate_numbers_are_stored_once() {
    let store = FakeStore::with_status(QueueStatus::Pending);
    let client = FakeClient::new(vec![Ok(items(1..=10)), Ok(items(1..=10))]);

    run(&store, &client, &options(), &request(ParseMode::Full, 10), &ProgressSink::detached()).await;
    store.state.lock().expect("store lock").status = Some(QueueStatus::Warning);
    run(&store, &client, &options(), &request(ParseMode::Additional, 10), &ProgressSink::detached())
        .await;

    assert_eq!(store.numbers(), (1..=10).collect::<Vec<_>>());
    let second = &client.requests.lock().expect("client lock")[1];
    assert!(second.user.contains("이미 저장된 문항 번호: 1, 2, 3"));
}

#[tokio::test]
async fn failed_additional_pass_keeps_the_partial_result() {
    let store = FakeStore::with_status(QueueStatus::Pending);
    let first = FakeClient::new(vec![Ok(items(1..=20)), Ok("[]".to_string())]);
    run(&store, &first, &options(), &request(ParseMode::Full, 45), &ProgressSink::detached()).await;
    assert_eq!(store.state.lock().expect("store lock").status, Some(QueueStatus::Warning));

    let second = FakeClient::new(vec![Err("overloaded".to_string())]);
    let (sink, rx) = ProgressSink::channel();
    let report = run(&store, &second, &options(), &request(ParseMode::Additional, 45), &sink).await;

    let RunReport::Finished(outcome) = report else { panic!("run aborted") };
    assert_eq!(outcome.status, QueueStatus::Warning);
    assert_eq!((outcome.saved, outcome.expected, outcome.ratio), (20, 45, 44));
    assert!(outcome.message.as_deref().unwrap_or_default().starts_with("추가 추출 실패: "));

    let state = store.state.lock().expect("store lock");
    assert_eq!(state.status, Some(QueueStatus::Warning));
    assert!(state.failure.is_none());
    assert_eq!(state.questions.len(), 20);
    drop(state);
    assert!(matches!(last(&drain(rx)), ProgressEvent::Error(_)));
}

#[tokio::test]
async fn additional_pass_without_stored_items_is_refused() {
    let store = FakeStore::with_status(QueueStatus::Warning);
    let client = FakeClient::new(vec![Ok(items(1..=5))]);
    let (sink, rx) = ProgressSink::channel();

    let report = run(&store, &client, &options(), &request(ParseMode::Additional, 5), &sink).await;

    assert!(matches!(report, RunReport::Aborted { .. }));
    assert_eq!(client.calls(), 0);
    let state = store.state.lock().expect("store lock");
    assert_eq!(state.writes, 0);
    assert_eq!(state.status, Some(QueueStatus::Warning));
    drop(state);
    match last(&drain(rx)) {
        ProgressEvent::Error(notice) => assert!(notice.message.contains("일반 처리를 사용하세요")),
        other => panic!("unexpected final event {other:?}"),
    }
}

#[tokio::test]
async fn dropped_items_are_not_counted_as_duplicates() {
    let store = FakeStore::with_status(QueueStatus::Pending);
    let reply = json!([
        {"question_number": 1, "type3": "어법", "question_text": "어법상 틀린 것은?"},
        "junk",
        7
    ])
    .to_string();
    let client = FakeClient::new(vec![Ok(reply)]);
    let (sink, rx) = ProgressSink::channel();

    run(&store, &client, &options(), &request(ParseMode::Full, 3), &sink).await;

    let summary = drain(rx)
        .into_iter()
        .find_map(|event| match event {
            ProgressEvent::Progress(payload) if payload.message.starts_with("청크 1/1 완료") => {
                Some(payload.message)
            }
            _ => None,
        })
        .expect("chunk summary");
    assert_eq!(summary, "청크 1/1 완료: 파싱 3개, 저장 1개, 중복 0개, 무시 2개");
    assert_eq!(store.numbers(), vec![1]);
}

#[tokio::test]
async fn resume_skips_chunks_already_stored() {
    let store = FakeStore::with_status(QueueStatus::Pending);
    let first = FakeClient::new(vec![Ok(items(1..=30)), Err("timeout".to_string())]);
    run(&store, &first, &options(), &request(ParseMode::Full, 45), &ProgressSink::detached()).await;
    assert_eq!(store.state.lock().expect("store lock").status, Some(QueueStatus::Failed));

    let second = FakeClient::new(vec![Ok(items(31..=45))]);
    let report =
        run(&store, &second, &options(), &request(ParseMode::Resume, 45), &ProgressSink::detached())
            .await;

    let RunReport::Finished(outcome) = report else { panic!("run aborted") };
    assert_eq!(outcome.status, QueueStatus::Completed);
    assert_eq!(second.calls(), 1);
    assert!(second.requests.lock().expect("client lock")[0].user.contains("31번부터 45번까지"));
}

#[tokio::test]
async fn reanalyze_replaces_stored_questions() {
    let store = FakeStore::with_status(QueueStatus::Pending);
    let client = FakeClient::new(vec![Ok(items(1..=3)), Ok(items(1..=3))]);
    run(&store, &client, &options(), &request(ParseMode::Full, 3), &ProgressSink::detached()).await;

    store.state.lock().expect("store lock").status = Some(QueueStatus::Pending);
    let mut again = request(ParseMode::Full, 3);
    again.reanalyze = true;
    let report = run(&store, &client, &options(), &again, &ProgressSink::detached()).await;

    let RunReport::Finished(outcome) = report else { panic!("run aborted") };
    assert_eq!(outcome.saved, 3);
    assert_eq!(client.calls(), 2);
    assert_eq!(store.numbers(), vec![1, 2, 3]);
}

#[tokio::test]
async fn status_change_mid_run_stops_before_the_next_chunk() {
    struct CancellingClient<'a> {
        store: &'a FakeStore,
        inner: FakeClient,
    }

    #[async_trait]
    impl CompletionClient for CancellingClient<'_> {
        async fn complete(
            &self,
            request: &CompletionRequest,
            streamed_chars: &AtomicUsize,
        ) -> Result<Completion, LlmError> {
            let reply = self.inner.complete(request, streamed_chars).await;
            self.store.state.lock().expect("store lock").status = Some(QueueStatus::Pending);
            reply
        }
    }

    let store = FakeStore::with_status(QueueStatus::Pending);
    let client = CancellingClient {
        store: &store,
        inner: FakeClient::new(vec![Ok(items(1..=30)), Ok(items(31..=45))]),
    };
    let (sink, rx) = ProgressSink::channel();

    let report = run(&store, &client, &options(), &request(ParseMode::Full, 45), &sink).await;

    assert!(matches!(report, RunReport::Aborted { .. }));
    assert_eq!(client.inner.calls(), 1);
    assert!(store.state.lock().expect("store lock").outcome.is_none());
    assert!(matches!(last(&drain(rx)), ProgressEvent::Error(_)));
}
