//! Assembles every resource router into one `Router<AppState>`, split
//! into public and authenticated groups the way
//! `mockforge-collab::api::create_router` does.

mod auth;
mod coder;
mod deployment;
mod messages;
mod submissions;
mod tests;
mod ws;

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::middleware::auth_middleware;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub fn router(state: AppState) -> Router {
    // `/ws` performs its own token-query authentication:
    // a browser cannot attach an `Authorization` header to the upgrade
    // request, so it cannot sit behind `auth_middleware`.
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(health))
        .merge(auth::router())
        .merge(ws::router());

    let protected_routes = Router::new()
        .merge(submissions::router())
        .merge(deployment::router())
        .merge(tests::router())
        .merge(messages::router())
        .merge(coder::router())
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
