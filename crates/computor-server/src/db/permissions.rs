use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use computor_core::{ApiError, Principal};
use computor_permissions::handlers::ResourceResolver;
use computor_permissions::ResourceKind;

use super::PgRepositories;

#[async_trait]
impl ResourceResolver for PgRepositories {
    async fn course_id_of(&self, kind: ResourceKind, resource_id: Uuid) -> Result<Option<Uuid>, ApiError> {
        let query = match kind {
            ResourceKind::Course => {
                let row: Option<(Uuid,)> =
                    sqlx::query_as("SELECT id FROM courses WHERE id = $1")
                        .bind(resource_id)
                        .fetch_optional(&self.pool)
                        .await?;
                return Ok(row.map(|(id,)| id));
            }
            ResourceKind::CourseContent | ResourceKind::CourseContentType => {
                "SELECT course_id FROM course_contents WHERE id = $1"
            }
            ResourceKind::CourseMember => "SELECT course_id FROM course_members WHERE id = $1",
            ResourceKind::Result => {
                let row: Option<(Uuid,)> = sqlx::query_as(
                    "SELECT cc.course_id FROM results r \
                     JOIN course_contents cc ON cc.id = r.course_content_id \
                     WHERE r.id = $1",
                )
                .bind(resource_id)
                .fetch_optional(&self.pool)
                .await?;
                return Ok(row.map(|(id,)| id));
            }
            ResourceKind::Message => "SELECT course_id FROM messages WHERE id = $1",
            ResourceKind::ApiToken => {
                let row: Option<(Uuid,)> =
                    sqlx::query_as("SELECT user_id FROM api_tokens WHERE id = $1")
                        .bind(resource_id)
                        .fetch_optional(&self.pool)
                        .await?;
                return Ok(row.map(|(id,)| id));
            }
            ResourceKind::CourseFamily | ResourceKind::Organization | ResourceKind::Example | ResourceKind::StudentProfile => {
                return Ok(None);
            }
        };
        let row: Option<(Option<Uuid>,)> = sqlx::query_as(query)
            .bind(resource_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|(id,)| id))
    }

    async fn own_course_member_ids(&self, principal: &Principal) -> Result<HashSet<Uuid>, ApiError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM course_members WHERE user_id = $1")
            .bind(principal.user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn owns_result_via_submission_group(
        &self,
        principal: &Principal,
        result_id: Uuid,
    ) -> Result<bool, ApiError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT sgm.id FROM results r \
             JOIN submission_artifacts sa ON sa.id = r.submission_artifact_id \
             JOIN submission_group_members sgm ON sgm.submission_group_id = sa.submission_group_id \
             JOIN course_members cm ON cm.id = sgm.course_member_id \
             WHERE r.id = $1 AND cm.user_id = $2",
        )
        .bind(result_id)
        .bind(principal.user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}
