mod handlers;
mod transfer;

use axum::{
    routing::{get, post},
    Router,
};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_questions))
        .route("/filters", get(handlers::filter_options))
        .route("/export.csv", get(transfer::export_csv))
        .route("/import", post(transfer::import_csv))
        .route(
            "/:id",
            get(handlers::get_question)
                .patch(handlers::update_question)
                .delete(handlers::delete_question),
        )
        .route("/:id/image", post(transfer::upload_image))
}
