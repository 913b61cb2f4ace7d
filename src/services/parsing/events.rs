use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProgressPayload {
    pub(crate) step: u32,
    pub(crate) message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) current_chunk: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) total_chunks: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HeartbeatPayload {
    pub(crate) chunk: u32,
    pub(crate) elapsed_seconds: u64,
    pub(crate) streamed_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NoticePayload {
    pub(crate) message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) chunk: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChunkInfoPayload {
    pub(crate) expected_questions: u32,
    pub(crate) total_chunks: u32,
    pub(crate) chunk_size: u32,
    pub(crate) start_chunk: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CompletePayload {
    pub(crate) success: bool,
    pub(crate) questions_count: u32,
    pub(crate) expected_questions: u32,
    pub(crate) extraction_ratio: u32,
    pub(crate) warning: Option<String>,
    pub(crate) message: String,
}

/// Named events of a parse run. Observational only: nothing reads them back.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ProgressEvent {
    Progress(ProgressPayload),
    Heartbeat(HeartbeatPayload),
    Warning(NoticePayload),
    Error(NoticePayload),
    ChunkInfo(ChunkInfoPayload),
    Complete(CompletePayload),
}

impl ProgressEvent {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Progress(_) => "progress",
            Self::Heartbeat(_) => "heartbeat",
            Self::Warning(_) => "warning",
            Self::Error(_) => "error",
            Self::ChunkInfo(_) => "chunk_info",
            Self::Complete(_) => "complete",
        }
    }

    pub(crate) fn data(&self) -> serde_json::Value {
        let value = match self {
            Self::Progress(payload) => serde_json::to_value(payload),
            Self::Heartbeat(payload) => serde_json::to_value(payload),
            Self::Warning(payload) | Self::Error(payload) => serde_json::to_value(payload),
            Self::ChunkInfo(payload) => serde_json::to_value(payload),
            Self::Complete(payload) => serde_json::to_value(payload),
        };
        value.unwrap_or(serde_json::Value::Null)
    }

    /// `complete` and `error` close the stream.
    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error(_))
    }
}

/// Fire-and-forget event outlet. A closed receiver never affects the run.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Sink without a listener; events only reach the log.
    pub(crate) fn detached() -> Self {
        Self { tx: None }
    }

    pub(crate) fn emit(&self, event: ProgressEvent) {
        match &event {
            ProgressEvent::Warning(notice) | ProgressEvent::Error(notice) => {
                tracing::warn!(event = event.name(), message = %notice.message, "parse event");
            }
            ProgressEvent::Heartbeat(_) => {}
            _ => tracing::debug!(event = event.name(), data = %event.data(), "parse event"),
        }

        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub(crate) fn progress(&self, step: u32, message: impl Into<String>) {
        self.emit(ProgressEvent::Progress(ProgressPayload {
            step,
            message: message.into(),
            current_chunk: None,
            total_chunks: None,
        }));
    }

    pub(crate) fn chunk_progress(
        &self,
        step: u32,
        message: impl Into<String>,
        current_chunk: u32,
        total_chunks: u32,
    ) {
        self.emit(ProgressEvent::Progress(ProgressPayload {
            step,
            message: message.into(),
            current_chunk: Some(current_chunk),
            total_chunks: Some(total_chunks),
        }));
    }

    pub(crate) fn warning(&self, message: impl Into<String>, details: Option<String>, chunk: Option<u32>) {
        self.emit(ProgressEvent::Warning(NoticePayload { message: message.into(), details, chunk }));
    }

    pub(crate) fn error(&self, message: impl Into<String>, details: Option<String>) {
        self.emit(ProgressEvent::Error(NoticePayload { message: message.into(), details, chunk: None }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_use_camel_case() {
        let event = ProgressEvent::Complete(CompletePayload {
            success: true,
            questions_count: 20,
            expected_questions: 45,
            extraction_ratio: 44,
            warning: Some("추출 비율 낮음 (44%)".to_string()),
            message: "20개 문제 저장 완료".to_string(),
        });

        let data = event.data();
        assert_eq!(event.name(), "complete");
        assert_eq!(data["questionsCount"], 20);
        assert_eq!(data["extractionRatio"], 44);
        assert!(event.is_terminal());
    }

    #[test]
    fn closed_receiver_is_ignored() {
        let (sink, rx) = ProgressSink::channel();
        drop(rx);
        sink.progress(1, "처리 시작...");
        sink.error("boom", None);
    }

    #[test]
    fn chunk_info_event_name() {
        let event = ProgressEvent::ChunkInfo(ChunkInfoPayload {
            expected_questions: 45,
            total_chunks: 2,
            chunk_size: 30,
            start_chunk: 0,
        });
        assert_eq!(event.name(), "chunk_info");
        assert_eq!(event.data()["totalChunks"], 2);
        assert!(!event.is_terminal());
    }
}
