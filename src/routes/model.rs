//! Model routes under the REST root. Paths are parameterized by the model's plural.

use crate::handlers::model::{count, create, delete as delete_handler, list, login, me, read, update};
use crate::state::AppState;
use axum::{routing::get, routing::post, Router};
use tower_http::limit::RequestBodyLimitLayer;

/// Request bodies above this size are rejected.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn model_routes(state: AppState) -> Router {
    let root = state.runtime.settings.rest_api_root.trim_end_matches('/').to_string();
    let routes = Router::new()
        .route("/:plural", get(list).post(create))
        .route("/:plural/count", get(count))
        .route("/:plural/login", post(login))
        .route("/:plural/me", get(me))
        .route(
            "/:plural/:id",
            get(read).patch(update).delete(delete_handler),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state);
    if root.is_empty() {
        routes
    } else {
        Router::new().nest(&root, routes)
    }
}
