use async_trait::async_trait;
use uuid::Uuid;

use computor_core::ApiError;
use computor_submissions::{SubmissionRepository, UploadContext};

use super::PgRepositories;

#[async_trait]
impl SubmissionRepository for PgRepositories {
    async fn context_for_group(
        &self,
        submission_group_id: Uuid,
        principal_user_id: Uuid,
        principal_is_elevated: bool,
    ) -> Result<UploadContext, ApiError> {
        let row: (bool, bool, Option<i32>, Uuid, Uuid) = sqlx::query_as(
            "SELECT ct.course_content_kind = 'assignment', cc.execution_backend_id IS NOT NULL, \
                    sg.max_submissions, sg.course_id, sg.course_content_id \
             FROM submission_groups sg \
             JOIN course_contents cc ON cc.id = sg.course_content_id \
             JOIN course_content_types ct ON ct.id = cc.course_content_type_id \
             WHERE sg.id = $1",
        )
        .bind(submission_group_id)
        .fetch_one(&self.pool)
        .await?;
        let (content_is_submittable, content_has_execution_backend, group_max_submissions, course_id, course_content_id) =
            row;

        let uploader_course_member_id: Option<(Uuid,)> = sqlx::query_as(
            "SELECT cm.id FROM submission_group_members sgm \
             JOIN course_members cm ON cm.id = sgm.course_member_id \
             WHERE sgm.submission_group_id = $1 AND cm.user_id = $2",
        )
        .bind(submission_group_id)
        .bind(principal_user_id)
        .fetch_optional(&self.pool)
        .await?;

        // The principal is a member of the group, or is elevated: an
        // elevated principal need only hold a course membership, not a
        // group one, to upload on the group's behalf.
        let uploader_course_member_id = match uploader_course_member_id {
            Some((id,)) => Some(id),
            None if principal_is_elevated => {
                sqlx::query_as(
                    "SELECT cm.id FROM course_members cm WHERE cm.user_id = $1 AND cm.course_id = $2",
                )
                .bind(principal_user_id)
                .bind(course_id)
                .fetch_optional(&self.pool)
                .await?
                .map(|(id,): (Uuid,)| id)
            }
            None => None,
        };

        let existing_submission_count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM submission_artifacts WHERE submission_group_id = $1 AND submit = true",
        )
        .bind(submission_group_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(UploadContext {
            content_is_submittable,
            content_has_execution_backend,
            uploader_course_member_id,
            group_max_submissions,
            existing_submission_count: existing_submission_count.0,
            course_id,
            course_content_id,
        })
    }

    async fn insert_artifact(
        &self,
        submission_group_id: Uuid,
        uploader_course_member_id: Uuid,
        bucket: &str,
        object_key: &str,
        version_identifier: &str,
        size_bytes: i64,
        submit: bool,
    ) -> Result<Uuid, ApiError> {
        let row: (Uuid,) = sqlx::query_as(
            "INSERT INTO submission_artifacts \
             (id, submission_group_id, uploader_course_member_id, bucket, object_key, \
              version_identifier, size_bytes, submit, properties) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, '{}'::jsonb) RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(submission_group_id)
        .bind(uploader_course_member_id)
        .bind(bucket)
        .bind(object_key)
        .bind(version_identifier)
        .bind(size_bytes)
        .bind(submit)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}

/// Outcome of `POST /submission-groups/{id}/join`.
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
}

impl PgRepositories {
    /// Joins `user_id` to a submission group if its `join_code` (when
    /// set) matches, the group has not reached `max_group_size`, and the
    /// user holds a course membership in the group's course.
    pub async fn join_submission_group(
        &self,
        submission_group_id: Uuid,
        user_id: Uuid,
        join_code: Option<&str>,
    ) -> Result<JoinOutcome, ApiError> {
        let group: Option<(Uuid, Option<String>, Option<i32>)> = sqlx::query_as(
            "SELECT course_id, join_code, max_group_size FROM submission_groups WHERE id = $1",
        )
        .bind(submission_group_id)
        .fetch_optional(&self.pool)
        .await?;
        let (course_id, expected_code, max_group_size) =
            group.ok_or_else(|| ApiError::not_found("submission group not found"))?;

        if let Some(expected) = expected_code.as_deref() {
            if join_code != Some(expected) {
                return Err(ApiError::forbidden("join code does not match"));
            }
        }

        let course_member_id: (Uuid,) =
            sqlx::query_as("SELECT id FROM course_members WHERE user_id = $1 AND course_id = $2")
                .bind(user_id)
                .bind(course_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|_| ApiError::validation("not a member of this course"))?;

        let already: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM submission_group_members WHERE submission_group_id = $1 AND course_member_id = $2)",
        )
        .bind(submission_group_id)
        .bind(course_member_id.0)
        .fetch_one(&self.pool)
        .await?;
        if already.0 {
            return Ok(JoinOutcome::AlreadyMember);
        }

        if let Some(max) = max_group_size {
            let count: (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM submission_group_members WHERE submission_group_id = $1")
                    .bind(submission_group_id)
                    .fetch_one(&self.pool)
                    .await?;
            if count.0 >= max as i64 {
                return Err(ApiError::validation("submission group has reached max_group_size"));
            }
        }

        sqlx::query(
            "INSERT INTO submission_group_members (submission_group_id, course_member_id) VALUES ($1, $2)",
        )
        .bind(submission_group_id)
        .bind(course_member_id.0)
        .execute(&self.pool)
        .await?;

        Ok(JoinOutcome::Joined)
    }
}
