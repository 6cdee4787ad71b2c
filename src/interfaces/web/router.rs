use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{chat, workflows};

pub(crate) fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/api/chatflow", post(chat::chatflow_endpoint))
        .route("/api/workflows/execute", post(workflows::execute_endpoint))
        .route("/api/workflows/start", post(workflows::start_endpoint))
        .route(
            "/api/workflows/status/{job_id}",
            get(workflows::status_endpoint),
        )
        .layer(cors)
        .with_state(state)
}
