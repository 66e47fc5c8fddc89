//! `POST /coder/workspaces/provision`.
//!
//! Coder's own workspace-provisioning wire protocol is explicitly out of
//! scope; this route exists only so the path is
//! reserved and returns a well-formed error instead of a 404.

use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use computor_core::ApiError;

use crate::middleware::CurrentPrincipal;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/coder/workspaces/provision", post(provision))
}

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    #[allow(dead_code)]
    pub course_member_id: Option<uuid::Uuid>,
}

async fn provision(
    CurrentPrincipal(_principal): CurrentPrincipal,
    Json(_body): Json<ProvisionRequest>,
) -> Result<(), ApiError> {
    Err(ApiError::not_implemented("Coder workspace provisioning is not implemented by this service"))
}
