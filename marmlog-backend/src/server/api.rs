use axum::{
    Router,
    routing::{get, post},
};

use super::AppState;

mod error;
mod handler;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async {}))
        .route("/submit", post(handler::submit))
        .route("/download", get(handler::download))
        .route(
            "/counter",
            get(handler::get_counter).post(handler::update_counter),
        )
}
