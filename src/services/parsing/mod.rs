//! A single parse run over one queue record: claim, chunked model calls, dedup and
//! insert, then the end-of-run status decision.

pub(crate) mod events;
mod normalize;
pub(crate) mod prompt;
pub(crate) mod store;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::Instrument;

use crate::core::config::ParsingSettings;
use crate::core::metrics;
use crate::core::time::{minutes_before, primitive_now_utc};
use crate::db::types::QueueStatus;
use crate::repositories::questions::NewQuestion;
use crate::repositories::queue::ClaimRule;
use crate::services::chunk_plan::{Chunk, ChunkPlan};
use crate::services::llm::{Completion, CompletionClient, CompletionRequest, LlmError};
use crate::services::{question_count, reply_json, type_classifier};

use events::{ChunkInfoPayload, CompletePayload, HeartbeatPayload, ProgressEvent, ProgressSink};
use normalize::{normalize_item, ItemContext};
use prompt::{text_window, UserMessage, SYSTEM_PROMPT};
use store::{ParseStore, RunOutcome};

const EXCERPT_CHARS: usize = 500;
const LOW_RATIO_PERCENT: u32 = 80;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ParseMode {
    #[default]
    Full,
    Resume,
    Additional,
}

impl ParseMode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Resume => "resume",
            Self::Additional => "additional",
        }
    }

    /// Source states this mode may claim from.
    pub(crate) fn claim_rule(self, stale_before: time::PrimitiveDateTime) -> ClaimRule {
        match self {
            Self::Full => ClaimRule { allowed: vec![QueueStatus::Pending], stale_before: None },
            Self::Resume => ClaimRule {
                allowed: vec![QueueStatus::Pending, QueueStatus::Failed],
                stale_before: Some(stale_before),
            },
            Self::Additional => ClaimRule { allowed: vec![QueueStatus::Warning], stale_before: None },
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ParseRequest {
    pub(crate) queue_id: String,
    pub(crate) pdf_text: String,
    pub(crate) filename: String,
    pub(crate) extracted_type3: Option<String>,
    pub(crate) mode: ParseMode,
    /// Full mode only: drop the file's stored questions before parsing.
    pub(crate) reanalyze: bool,
    pub(crate) chunk_size: Option<u32>,
}

#[derive(Debug, Clone)]
pub(crate) struct ParserOptions {
    pub(crate) chunk_size: u32,
    pub(crate) chunk_delay: Duration,
    pub(crate) heartbeat: Duration,
    pub(crate) stale_processing_minutes: u64,
    pub(crate) large_document_chars: usize,
}

impl ParserOptions {
    pub(crate) fn from_settings(settings: &ParsingSettings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            chunk_delay: Duration::from_millis(settings.chunk_delay_ms),
            heartbeat: Duration::from_secs(settings.heartbeat_seconds.max(1)),
            stale_processing_minutes: settings.stale_processing_minutes,
            large_document_chars: settings.large_document_chars,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RunReport {
    /// The record was not ours to change; nothing was written.
    Aborted { reason: String },
    Finished(RunOutcome),
}

/// `round(100 * saved / expected)` with half-up rounding; 100 when nothing was expected.
pub(crate) fn extraction_ratio(saved: u32, expected: u32) -> u32 {
    if expected == 0 {
        return 100;
    }
    let saved = u64::from(saved);
    let expected = u64::from(expected);
    ((200 * saved + expected) / (2 * expected)) as u32
}

pub(crate) fn low_ratio_message(saved: u32, expected: u32, ratio: u32) -> String {
    format!("추출 비율 낮음: {saved}/{expected} ({ratio}%)")
}

async fn call_with_heartbeat(
    client: &dyn CompletionClient,
    request: &CompletionRequest,
    sink: &ProgressSink,
    every: Duration,
    chunk: u32,
) -> Result<Completion, LlmError> {
    let streamed = AtomicUsize::new(0);
    let started = Instant::now();
    let call = client.complete(request, &streamed);
    tokio::pin!(call);

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    loop {
        tokio::select! {
            result = &mut call => return result,
            _ = ticker.tick() => {
                sink.emit(ProgressEvent::Heartbeat(HeartbeatPayload {
                    chunk,
                    elapsed_seconds: started.elapsed().as_secs(),
                    streamed_chars: streamed.load(Ordering::Relaxed),
                }));
            }
        }
    }
}

struct Run<'a> {
    store: &'a dyn ParseStore,
    client: &'a dyn CompletionClient,
    options: &'a ParserOptions,
    sink: &'a ProgressSink,
    request: &'a ParseRequest,
}

impl Run<'_> {
    fn abort(&self, message: &str, details: Option<String>) -> RunReport {
        self.sink.error(message, details.clone());
        metrics::record_parse_run("aborted", Duration::ZERO);
        RunReport::Aborted { reason: details.unwrap_or_else(|| message.to_string()) }
    }

    async fn fail(&self, started: Instant, message: &str, details: String) -> RunReport {
        if let Err(err) = self.store.fail(&self.request.queue_id, &details).await {
            tracing::error!(queue_id = %self.request.queue_id, error = %err, "Failed to mark queue record failed");
        }
        self.sink.error(message, Some(details.clone()));
        metrics::record_parse_run("failed", started.elapsed());
        RunReport::Finished(RunOutcome {
            status: QueueStatus::Failed,
            saved: 0,
            expected: 0,
            ratio: 0,
            message: Some(details),
        })
    }

    /// Ends a run on an error after the claim. Additional passes restore `warning` with
    /// the stored count; other modes fail the record.
    async fn stop(
        &self,
        started: Instant,
        filename: &str,
        expected: u32,
        message: &str,
        details: String,
    ) -> RunReport {
        if self.request.mode != ParseMode::Additional {
            return self.fail(started, message, details).await;
        }

        let queue_id = self.request.queue_id.as_str();
        let saved = match self.store.count_saved(filename).await {
            Ok(saved) => saved,
            Err(err) => {
                tracing::warn!(queue_id, error = %err, "Failed to count stored questions");
                return self.fail(started, message, details).await;
            }
        };
        let outcome = RunOutcome {
            status: QueueStatus::Warning,
            saved,
            expected,
            ratio: extraction_ratio(saved, expected),
            message: Some(format!("추가 추출 실패: {details}")),
        };
        if let Err(err) = self.store.finish(queue_id, &outcome).await {
            tracing::error!(queue_id, error = %err, "Failed to restore warning status");
        }
        self.sink.error(message, Some(details));
        metrics::record_parse_run("warning", started.elapsed());
        RunReport::Finished(outcome)
    }

    async fn execute(&self) -> RunReport {
        let started = Instant::now();
        let request = self.request;
        let queue_id = request.queue_id.as_str();
        self.sink.progress(1, "처리 시작...");

        if request.mode == ParseMode::Additional {
            match self.store.saved_numbers(&request.filename).await {
                Ok(numbers) if numbers.is_empty() => {
                    return self.abort(
                        "기존 추출된 문항이 없습니다. 일반 처리를 사용하세요",
                        Some("no stored questions for additional extraction".to_string()),
                    );
                }
                Ok(_) => {}
                Err(err) => return self.abort("기존 문항 조회 실패", Some(err.to_string())),
            }
        }

        let stale_before =
            minutes_before(primitive_now_utc(), self.options.stale_processing_minutes);
        let rule = request.mode.claim_rule(stale_before);
        let claimed = match self.store.claim(queue_id, &rule).await {
            Ok(Some(claimed)) => claimed,
            Ok(None) => {
                let status = self.store.current_status(queue_id).await.ok().flatten();
                let details = match status {
                    Some(status) => format!("already processing or not claimable (status: {})", status.as_str()),
                    None => "queue record not found".to_string(),
                };
                return self.abort("이미 처리 중이거나 처리할 수 없는 항목입니다", Some(details));
            }
            Err(err) => return self.abort("큐 상태 변경 실패", Some(err.to_string())),
        };

        let filename = if request.filename.trim().is_empty() {
            claimed.filename.clone()
        } else {
            request.filename.clone()
        };
        let hint_type3 = request
            .extracted_type3
            .clone()
            .filter(|value| !value.trim().is_empty())
            .or(claimed.extracted_type3.clone())
            .unwrap_or_default();
        let ctx = ItemContext {
            pdf_filename: &filename,
            hint_type3: &hint_type3,
            hint_mapping: type_classifier::classify(&hint_type3),
        };

        let expected = question_count::estimate(&request.pdf_text);
        if let Err(err) = self.store.set_expected(queue_id, expected).await {
            tracing::warn!(queue_id, error = %err, "Failed to record expected question count");
        }

        if request.mode == ParseMode::Full && request.reanalyze {
            match self.store.delete_saved(&filename).await {
                Ok(removed) => tracing::info!(queue_id, filename = %filename, removed, "Cleared stored questions for reanalysis"),
                Err(err) => return self.fail(started, "기존 문항 삭제 실패", err.to_string()).await,
            }
        }

        let mut seen: HashSet<i32> = match self.store.saved_numbers(&filename).await {
            Ok(numbers) => numbers.into_iter().collect(),
            Err(err) => {
                return self.stop(started, &filename, expected, "기존 문항 조회 실패", err.to_string())
                    .await
            }
        };

        let chunk_size = request.chunk_size.filter(|size| *size > 0).unwrap_or(self.options.chunk_size);
        let plan = ChunkPlan::new(expected, chunk_size);
        let chunks: Vec<Chunk> = match request.mode {
            ParseMode::Additional => vec![Chunk { index: 0, range: None }],
            ParseMode::Resume => {
                let saved = u32::try_from(seen.len()).unwrap_or(u32::MAX);
                plan.chunks_from(plan.start_index_for_saved(saved)).collect()
            }
            ParseMode::Full => plan.chunks_from(0).collect(),
        };
        let total_chunks = if request.mode == ParseMode::Additional { 1 } else { plan.total_chunks() };
        let start_chunk = chunks.first().map(|chunk| chunk.index).unwrap_or(total_chunks);

        self.sink.emit(ProgressEvent::ChunkInfo(ChunkInfoPayload {
            expected_questions: expected,
            total_chunks,
            chunk_size: plan.chunk_size(),
            start_chunk,
        }));
        self.sink.progress(2, format!("유형 매핑 완료 (예상 문항: {expected}개)"));
        tracing::info!(
            queue_id,
            filename = %filename,
            mode = request.mode.as_str(),
            expected,
            total_chunks,
            start_chunk,
            "Parse run started"
        );

        let exclude: Vec<i32> = if request.mode == ParseMode::Additional {
            let mut numbers: Vec<i32> = seen.iter().copied().collect();
            numbers.sort_unstable();
            numbers
        } else {
            Vec::new()
        };

        let mut last_excerpt: Option<String> = None;
        for (position, chunk) in chunks.iter().enumerate() {
            if position > 0 && !self.options.chunk_delay.is_zero() {
                tokio::time::sleep(self.options.chunk_delay).await;
            }

            match self.store.current_status(queue_id).await {
                Ok(Some(QueueStatus::Processing)) => {}
                Ok(status) => {
                    let details = format!(
                        "status changed to {} during run",
                        status.map(QueueStatus::as_str).unwrap_or("deleted")
                    );
                    return self.abort("처리 상태가 변경되어 중단되었습니다", Some(details));
                }
                Err(err) => return self.abort("큐 상태 확인 실패", Some(err.to_string())),
            }

            let chunk_no = chunk.index + 1;
            self.sink.chunk_progress(
                3,
                format!("AI 분석 중... ({chunk_no}/{total_chunks})"),
                chunk_no,
                total_chunks,
            );

            let window = text_window(&request.pdf_text, chunk.range, self.options.large_document_chars);
            let completion_request = CompletionRequest {
                system: SYSTEM_PROMPT.to_string(),
                user: UserMessage {
                    filename: &filename,
                    text: &window,
                    range: chunk.range,
                    exclude: &exclude,
                }
                .render(),
                label: filename.clone(),
            };

            let completion = match call_with_heartbeat(
                self.client,
                &completion_request,
                self.sink,
                self.options.heartbeat,
                chunk_no,
            )
            .await
            {
                Ok(completion) => completion,
                Err(err) => {
                    metrics::record_chunk("upstream_error");
                    return self
                        .stop(started, &filename, expected, "AI 호출 실패", err.to_string())
                        .await;
                }
            };

            let items = match reply_json::extract_items(&completion.text) {
                Ok(items) => items,
                Err(err) => {
                    metrics::record_chunk("malformed");
                    tracing::warn!(queue_id, chunk = chunk_no, error = %err, "Model reply had no usable JSON");
                    let excerpt = reply_json::excerpt(&completion.text, EXCERPT_CHARS);
                    self.sink.warning("JSON 파싱 실패", Some(excerpt.clone()), Some(chunk_no));
                    last_excerpt = Some(excerpt);
                    continue;
                }
            };

            let first_number = chunk.range.map(|range| range.start).unwrap_or(1);
            let parsed = items.len();
            let normalized: Vec<NewQuestion> = items
                .iter()
                .enumerate()
                .filter_map(|(index, item)| {
                    let default_number = i32::try_from(first_number as usize + index).unwrap_or(i32::MAX);
                    normalize_item(item, default_number, &ctx)
                })
                .collect();
            let dropped = parsed - normalized.len();
            let fresh: Vec<NewQuestion> = normalized
                .into_iter()
                .filter(|question| seen.insert(question.question_number))
                .collect();
            let duplicates = parsed - dropped - fresh.len();

            let inserted = if fresh.is_empty() {
                0
            } else {
                match self.store.insert_questions(&fresh).await {
                    Ok(count) => count,
                    Err(err) => {
                        for question in &fresh {
                            seen.remove(&question.question_number);
                        }
                        metrics::record_chunk("insert_failed");
                        self.sink.warning("DB 저장 실패", Some(err.to_string()), Some(chunk_no));
                        continue;
                    }
                }
            };
            metrics::record_chunk("ok");

            let processed = u32::try_from(seen.len()).unwrap_or(u32::MAX);
            let percent = chunk_no * 100 / total_chunks.max(1);
            if let Err(err) = self.store.update_progress(queue_id, processed, percent).await {
                tracing::warn!(queue_id, error = %err, "Failed to update queue progress");
            }

            let mut summary = format!(
                "청크 {chunk_no}/{total_chunks} 완료: 파싱 {parsed}개, 저장 {inserted}개, 중복 {duplicates}개"
            );
            if dropped > 0 {
                summary.push_str(&format!(", 무시 {dropped}개"));
            }
            self.sink.chunk_progress(4, summary, chunk_no, total_chunks);
        }

        self.finish(started, &filename, expected, seen.len(), last_excerpt).await
    }

    async fn finish(
        &self,
        started: Instant,
        filename: &str,
        expected: u32,
        seen: usize,
        last_excerpt: Option<String>,
    ) -> RunReport {
        let queue_id = self.request.queue_id.as_str();
        let saved = match self.store.count_saved(filename).await {
            Ok(saved) => saved,
            Err(err) => {
                tracing::warn!(queue_id, error = %err, "Falling back to in-memory saved count");
                u32::try_from(seen).unwrap_or(u32::MAX)
            }
        };
        let ratio = extraction_ratio(saved, expected);

        let (status, message) = if saved == 0 {
            (QueueStatus::Failed, Some("추출된 문항이 없습니다".to_string()))
        } else if ratio < LOW_RATIO_PERCENT && expected > 0 {
            (QueueStatus::Warning, Some(low_ratio_message(saved, expected, ratio)))
        } else {
            (QueueStatus::Completed, None)
        };

        let outcome = RunOutcome { status, saved, expected, ratio, message: message.clone() };
        if let Err(err) = self.store.finish(queue_id, &outcome).await {
            tracing::error!(queue_id, error = %err, "Failed to persist run outcome");
            self.sink.error("결과 저장 실패", Some(err.to_string()));
            metrics::record_parse_run("failed", started.elapsed());
            return RunReport::Finished(outcome);
        }

        tracing::info!(
            queue_id,
            filename,
            status = status.as_str(),
            saved,
            expected,
            ratio,
            elapsed_seconds = started.elapsed().as_secs_f64(),
            "Parse run finished"
        );
        metrics::record_parse_run(status.as_str(), started.elapsed());

        if status == QueueStatus::Failed {
            self.sink.error(message.unwrap_or_default(), last_excerpt);
        } else {
            self.sink.emit(ProgressEvent::Complete(CompletePayload {
                success: true,
                questions_count: saved,
                expected_questions: expected,
                extraction_ratio: ratio,
                warning: (status == QueueStatus::Warning)
                    .then(|| format!("추출 비율 낮음 ({ratio}%)")),
                message: format!("{saved}개 문제 저장 완료"),
            }));
        }

        RunReport::Finished(outcome)
    }
}

/// Drives one parse run to its terminal event. Never panics on store or model errors;
/// they end up in the record's status and the event stream.
pub(crate) async fn run(
    store: &dyn ParseStore,
    client: &dyn CompletionClient,
    options: &ParserOptions,
    request: &ParseRequest,
    sink: &ProgressSink,
) -> RunReport {
    let span = tracing::info_span!("parse_run", queue_id = %request.queue_id, mode = request.mode.as_str());
    Run { store, client, options, sink, request }.execute().instrument(span).await
}

#[cfg(test)]
mod tests;
