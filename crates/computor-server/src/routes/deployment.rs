//! `POST /course-contents/{id}/assign-example`, `DELETE .../example`.

use axum::extract::{Path, State};
use axum::routing::{delete, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use computor_core::{ApiError, CourseContentDeployment, DeploymentHistory};
use computor_deployment::{AssignExampleRequest, ExampleResolution};
use computor_permissions::{Action, ResourceKind};

use crate::middleware::CurrentPrincipal;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/course-contents/{id}/assign-example", post(assign_example))
        .route("/course-contents/{id}/example", delete(unassign_example))
}

#[derive(Debug, Deserialize)]
pub struct AssignExampleBody {
    pub example_version_id: Option<Uuid>,
    pub example_identifier: Option<String>,
    pub version_tag: Option<String>,
    pub deployment_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AssignExampleResponse {
    pub deployment: CourseContentDeployment,
    pub history: Vec<DeploymentHistory>,
}

async fn assign_example(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(content_id): Path<Uuid>,
    Json(body): Json<AssignExampleBody>,
) -> Result<Json<AssignExampleResponse>, ApiError> {
    let allowed = state
        .permissions
        .can_perform(
            &principal,
            ResourceKind::CourseContent,
            Action::Update,
            Some(content_id),
            None,
            "course_content",
            "update",
        )
        .await?;
    if !allowed {
        return Err(ApiError::forbidden("not authorized to deploy to this content"));
    }

    let resolution = match (body.example_version_id, body.example_identifier, body.version_tag) {
        (Some(id), _, _) => ExampleResolution::ByVersionId(id),
        (None, Some(example_identifier), Some(version_tag)) => {
            ExampleResolution::ByIdentifierAndTag { example_identifier, version_tag }
        }
        _ => {
            return Err(ApiError::validation(
                "either example_version_id or (example_identifier, version_tag) is required",
            ))
        }
    };

    let deployment = state
        .deployments
        .assign(AssignExampleRequest {
            content_id,
            actor_user_id: Some(principal.user_id),
            resolution,
            deployment_message: body.deployment_message,
        })
        .await?;

    let history = state.repositories.list_deployment_history(deployment.id).await?;

    Ok(Json(AssignExampleResponse { deployment, history }))
}

#[derive(Debug, Serialize)]
pub struct UnassignResponse {
    pub status: &'static str,
}

async fn unassign_example(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(content_id): Path<Uuid>,
) -> Result<Json<UnassignResponse>, ApiError> {
    let allowed = state
        .permissions
        .can_perform(
            &principal,
            ResourceKind::CourseContent,
            Action::Update,
            Some(content_id),
            None,
            "course_content",
            "update",
        )
        .await?;
    if !allowed {
        return Err(ApiError::forbidden("not authorized to unassign this content"));
    }

    state.deployments.unassign(content_id, Some(principal.user_id)).await?;
    Ok(Json(UnassignResponse { status: "unassigned" }))
}
