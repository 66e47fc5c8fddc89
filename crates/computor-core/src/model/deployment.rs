//! The assignment -> example binding state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExampleVersion {
    pub id: Uuid,
    /// Opaque path-like identifier for the example, e.g. `"lib.sort"`.
    pub example_identifier: String,
    /// Normalized semantic version, e.g. `"1.2.0"`.
    pub version_tag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "deployment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Deploying,
    Deployed,
    Failed,
    Unassigned,
}

/// 1-1 with a submittable `CourseContent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CourseContentDeployment {
    pub id: Uuid,
    pub course_content_id: Uuid,
    pub example_version_id: Option<Uuid>,
    pub example_identifier: Option<String>,
    pub version_tag: Option<String>,
    pub deployment_status: DeploymentStatus,
    pub deployment_path: Option<String>,
    pub version_identifier: Option<String>,
    pub workflow_id: Option<String>,
    /// The `deployment_message` of the most recent history entry, carried
    /// alongside the deployment row so the no-op check can compare it
    /// without a second query.
    pub last_deployment_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CourseContentDeployment {
    /// "assignment not released": whether the content has a usable
    /// reference for scheduling a test.
    pub fn is_released(&self) -> bool {
        self.deployment_path.is_some() && self.version_identifier.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "deployment_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeploymentAction {
    Assigned,
    Reassigned,
    Updated,
    Unassigned,
    DeployStarted,
    DeploySucceeded,
    DeployFailed,
}

/// Append-only log of deployment transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeploymentHistory {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub action: DeploymentAction,
    pub actor_user_id: Option<Uuid>,
    pub prior_example_version_id: Option<Uuid>,
    pub new_example_version_id: Option<Uuid>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}
