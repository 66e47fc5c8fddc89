use async_trait::async_trait;
use uuid::Uuid;

use computor_core::{ApiError, GradeStatus, SubmissionGrade};
use computor_submissions::{GradeContext, GradeRepository};

use super::PgRepositories;

#[async_trait]
impl GradeRepository for PgRepositories {
    async fn context_for_artifact(&self, submission_artifact_id: Uuid) -> Result<GradeContext, ApiError> {
        let row: Option<(Uuid, Uuid, Uuid)> = sqlx::query_as(
            "SELECT sg.course_id, sg.course_content_id, sg.id \
             FROM submission_artifacts sa \
             JOIN submission_groups sg ON sg.id = sa.submission_group_id \
             WHERE sa.id = $1",
        )
        .bind(submission_artifact_id)
        .fetch_optional(&self.pool)
        .await?;
        let (course_id, course_content_id, submission_group_id) =
            row.ok_or_else(|| ApiError::not_found("submission artifact not found"))?;
        Ok(GradeContext { course_id, course_content_id, submission_group_id })
    }

    async fn insert_grade(
        &self,
        submission_artifact_id: Uuid,
        author_course_member_id: Uuid,
        grade: f64,
        status: GradeStatus,
        comment: Option<String>,
    ) -> Result<SubmissionGrade, ApiError> {
        let inserted = sqlx::query_as::<_, SubmissionGrade>(
            "INSERT INTO submission_grades \
             (id, submission_artifact_id, author_course_member_id, grade, status, comment) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(submission_artifact_id)
        .bind(author_course_member_id)
        .bind(grade)
        .bind(status)
        .bind(comment)
        .fetch_one(&self.pool)
        .await?;
        Ok(inserted)
    }
}
