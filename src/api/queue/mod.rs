mod handlers;

use axum::{
    routing::{get, post},
    Router,
};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_queue).post(handlers::upload_pdfs))
        .route("/stats", get(handlers::queue_stats))
        .route("/reset-stalled", post(handlers::reset_stalled))
        .route("/:id", get(handlers::get_queue_item).delete(handlers::delete_queue_item))
        .route("/:id/retry", post(handlers::retry_queue_item))
        .route("/:id/pdf-url", get(handlers::pdf_url))
}
