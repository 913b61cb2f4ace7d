use std::convert::Infallible;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::post;
use axum::{Json, Router};
use futures_util::stream::{self, Stream};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::AdminAccess;
use crate::core::state::AppState;
use crate::schemas::parse::ParseRequestBody;
use crate::services::parsing::events::{ProgressEvent, ProgressSink};
use crate::services::parsing::store::PgParseStore;
use crate::services::parsing::{self, ParserOptions};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/parse-mock-exam", post(parse_mock_exam))
}

fn to_sse(event: &ProgressEvent) -> Event {
    Event::default().event(event.name()).data(event.data().to_string())
}

/// Starts a parse run and streams its events. The run is spawned, so it finishes even
/// when the client goes away.
async fn parse_mock_exam(
    _admin: AdminAccess,
    State(state): State<AppState>,
    payload: Result<Json<ParseRequestBody>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(body) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    body.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let request = body.into_request().map_err(|message| ApiError::BadRequest(message.to_string()))?;

    let limit = state.settings().parsing().parse_rate_limit_per_minute;
    match state.redis().allow_parse_request(&request.queue_id, limit).await {
        Ok(true) => {}
        Ok(false) => {
            return Err(ApiError::TooManyRequests("Too many parse requests for this queue item"))
        }
        Err(err) => tracing::warn!(error = %err, "Parse rate limit check failed"),
    }

    let (sink, rx) = ProgressSink::channel();
    let store = PgParseStore::new(state.db().clone());
    let client = state.llm();
    let options = ParserOptions::from_settings(state.settings().parsing());

    tracing::info!(
        queue_id = %request.queue_id,
        mode = request.mode.as_str(),
        text_chars = request.pdf_text.chars().count(),
        "Parse request accepted"
    );
    tokio::spawn(async move {
        parsing::run(&store, client.as_ref(), &options, &request, &sink).await;
    });

    let events = stream::unfold((rx, false), |(mut rx, finished)| async move {
        if finished {
            return None;
        }
        let event = rx.recv().await?;
        let terminal = event.is_terminal();
        Some((Ok(to_sse(&event)), (rx, terminal)))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
