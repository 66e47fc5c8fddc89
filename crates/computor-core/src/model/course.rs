//! Organization / CourseFamily / Course containers, the CourseContent
//! tree, and course membership.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ltree::LtreePath;
use crate::model::identity::CourseRole;

/// Optional provider-integration properties carried by Organization,
/// CourseFamily, and Course (GitLab URL, encrypted token, group path).
/// The provider's own wire protocol is out of scope; this crate only
/// stores the opaque fields the core needs for cache tags and display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProperties {
    pub gitlab_url: Option<String>,
    pub gitlab_token_encrypted: Option<String>,
    pub gitlab_group_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organization {
    pub id: Uuid,
    pub path: String,
    pub title: String,
    #[sqlx(json)]
    pub provider_properties: sqlx::types::Json<ProviderProperties>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CourseFamily {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub path: String,
    pub title: String,
    #[sqlx(json)]
    pub provider_properties: sqlx::types::Json<ProviderProperties>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Course {
    pub id: Uuid,
    pub course_family_id: Uuid,
    pub path: String,
    pub title: String,
    #[sqlx(json)]
    pub provider_properties: sqlx::types::Json<ProviderProperties>,
    pub created_at: DateTime<Utc>,
}

/// Whether a `CourseContentType`'s items can receive submissions
/// (assignment) or are purely structural (unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "course_content_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CourseContentKind {
    Unit,
    Assignment,
}

impl CourseContentKind {
    pub fn is_submittable(&self) -> bool {
        matches!(self, CourseContentKind::Assignment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CourseContentType {
    pub id: Uuid,
    pub course_id: Uuid,
    pub slug: String,
    pub title: String,
    pub course_content_kind: CourseContentKind,
}

/// A node in the course's content tree, keyed by Ltree path. Only
/// submittable content (via its `CourseContentType`) can receive
/// submissions and deployments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CourseContent {
    pub id: Uuid,
    pub course_id: Uuid,
    #[sqlx(try_from = "String")]
    pub path: LtreePath,
    pub title: String,
    pub course_content_type_id: Uuid,
    pub execution_backend_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl CourseContent {
    pub fn has_execution_backend(&self) -> bool {
        self.execution_backend_id.is_some()
    }
}

/// Membership of a user in a course with exactly one role from the
/// fixed ordered set. Unique on `(user_id, course_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CourseMember {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub course_role: CourseRole,
    pub course_group_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_assignment_kind_is_submittable() {
        assert!(CourseContentKind::Assignment.is_submittable());
        assert!(!CourseContentKind::Unit.is_submittable());
    }
}
