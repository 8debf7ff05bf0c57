pub mod store;

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::api::store::{get_store_handler, post_store_handler, put_store_handler};
use crate::utils::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { StatusCode::OK.into_response() }))
        .nest("/v1", store_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn store_router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/store/{*path}",
        get(get_store_handler)
            .post(post_store_handler)
            .put(put_store_handler),
    )
}
