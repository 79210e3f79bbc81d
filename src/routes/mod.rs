pub mod outbox;

use axum::routing::{get, post};
use axum::Router;

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/api/v1/outbox", post(outbox::enqueue))
        .route("/api/v1/outbox/pending", get(outbox::list_pending))
        .route("/api/v1/outbox/stats", get(outbox::stats))
        .route("/api/v1/outbox/{id}", get(outbox::get))
        .route("/api/v1/outbox/{id}/retry", post(outbox::retry))
        .route("/api/v1/outbox/{id}/abandon", post(outbox::abandon))
}
