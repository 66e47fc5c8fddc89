//! `POST /tests`, `GET /tests/status/{result_id}`.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use computor_core::{ApiError, CourseRole, TestResult};
use computor_messages::MessageRepository;
use computor_permissions::handlers::ResourceResolver;
use computor_testing::{ArtifactSelector, CreateTestRequest, TestSchedulerRepository};

use crate::middleware::CurrentPrincipal;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tests", post(create_test))
        .route("/tests/status/{result_id}", get(test_status))
}

#[derive(Debug, Deserialize)]
pub struct CreateTestBody {
    pub artifact_id: Option<Uuid>,
    pub submission_group_id: Option<Uuid>,
    pub version_identifier: Option<String>,
}

async fn create_test(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(body): Json<CreateTestBody>,
) -> Result<Json<TestResult>, ApiError> {
    let selector = match (body.artifact_id, body.submission_group_id, body.version_identifier) {
        (Some(artifact_id), _, _) => ArtifactSelector::ArtifactId(artifact_id),
        (None, Some(submission_group_id), Some(version_identifier)) => {
            ArtifactSelector::GroupAndVersion { submission_group_id, version_identifier }
        }
        (None, Some(submission_group_id), None) => ArtifactSelector::LatestInGroup(submission_group_id),
        (None, None, _) => {
            return Err(ApiError::validation("either artifact_id or submission_group_id is required"))
        }
    };

    let submission_group_id = resolve_group_id(&state, &selector).await?;
    let course_id = state.repositories.course_id_of_submission_group(submission_group_id).await?;
    let course_member_id = state
        .repositories
        .course_member_id_of(principal.user_id, course_id)
        .await?
        .ok_or_else(|| ApiError::validation("principal is not a member of this submission group's course"))?;
    let principal_is_elevated =
        principal.is_admin || principal.has_course_role_at_least(course_id, CourseRole::Tutor);

    let result = state
        .tests
        .create_test(CreateTestRequest {
            selector,
            requesting_course_member_id: course_member_id,
            principal_is_elevated,
        })
        .await?;
    Ok(Json(result))
}

/// The submission group a selector targets, resolved without fetching
/// the full artifact context twice.
async fn resolve_group_id(state: &AppState, selector: &ArtifactSelector) -> Result<Uuid, ApiError> {
    match selector {
        ArtifactSelector::ArtifactId(id) => Ok(state
            .repositories
            .resolve_artifact_context(&ArtifactSelector::ArtifactId(*id))
            .await?
            .artifact
            .submission_group_id),
        ArtifactSelector::GroupAndVersion { submission_group_id, .. } => Ok(*submission_group_id),
        ArtifactSelector::LatestInGroup(id) => Ok(*id),
    }
}

async fn test_status(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(result_id): Path<Uuid>,
) -> Result<Json<TestResult>, ApiError> {
    let result = state
        .repositories
        .find_result(result_id)
        .await?
        .ok_or_else(|| ApiError::not_found("test result not found"))?;

    if !principal.is_admin {
        let course_id = state.repositories.course_id_of_course_content(result.course_content_id).await?;
        let is_owner = state
            .repositories
            .owns_result_via_submission_group(&principal, result.id)
            .await?;
        if !is_owner && !principal.has_course_role_at_least(course_id, CourseRole::Tutor) {
            return Err(ApiError::forbidden("not authorized to view this test result"));
        }
    }

    let reconciled = state.tests.reconcile(&result).await?;
    Ok(Json(reconciled))
}
