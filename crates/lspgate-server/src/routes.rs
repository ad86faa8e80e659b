//! HTTP routes for the gateway.

use crate::state::AppState;
use crate::ws::ws_handler;
use axum::{
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/languages", get(languages))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(cors)
}

/// Health check endpoint.
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "healthy": true,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Languages the gateway can serve, with their sharing policy.
async fn languages(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    let languages: Vec<serde_json::Value> = state
        .registry
        .languages()
        .into_iter()
        .filter_map(|name| {
            state.registry.spec(&name).map(|spec| {
                serde_json::json!({
                    "language": name,
                    "shared_per_room": spec.shared_per_room,
                })
            })
        })
        .collect();
    Json(serde_json::json!({ "languages": languages }))
}
