use async_trait::async_trait;
use uuid::Uuid;

use computor_core::{ApiError, CourseContentDeployment, ResultStatus, SubmissionArtifact, TestResult};
use computor_testing::{ArtifactContext, ArtifactSelector, NewTestResult, TestSchedulerRepository};

use super::PgRepositories;

#[async_trait]
impl TestSchedulerRepository for PgRepositories {
    async fn resolve_artifact_context(
        &self,
        selector: &ArtifactSelector,
    ) -> Result<ArtifactContext, ApiError> {
        let artifact = match selector {
            ArtifactSelector::ArtifactId(id) => {
                sqlx::query_as::<_, SubmissionArtifact>("SELECT * FROM submission_artifacts WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            ArtifactSelector::GroupAndVersion { submission_group_id, version_identifier } => {
                sqlx::query_as::<_, SubmissionArtifact>(
                    "SELECT * FROM submission_artifacts \
                     WHERE submission_group_id = $1 AND version_identifier = $2",
                )
                .bind(submission_group_id)
                .bind(version_identifier)
                .fetch_optional(&self.pool)
                .await?
            }
            ArtifactSelector::LatestInGroup(submission_group_id) => {
                sqlx::query_as::<_, SubmissionArtifact>(
                    "SELECT * FROM submission_artifacts WHERE submission_group_id = $1 \
                     ORDER BY created_at DESC LIMIT 1",
                )
                .bind(submission_group_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        let artifact = artifact.ok_or_else(|| ApiError::not_found("submission artifact not found"))?;

        let row: (Uuid, Option<Uuid>) = sqlx::query_as(
            "SELECT cc.id, cc.execution_backend_id FROM submission_groups sg \
             JOIN course_contents cc ON cc.id = sg.course_content_id \
             WHERE sg.id = $1",
        )
        .bind(artifact.submission_group_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(ArtifactContext {
            artifact,
            course_content_id: row.0,
            execution_backend_id: row.1,
        })
    }

    async fn is_group_member(
        &self,
        submission_group_id: Uuid,
        course_member_id: Uuid,
    ) -> Result<bool, ApiError> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM submission_group_members \
             WHERE submission_group_id = $1 AND course_member_id = $2)",
        )
        .bind(submission_group_id)
        .bind(course_member_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn non_terminal_result(
        &self,
        submission_artifact_id: Uuid,
        course_member_id: Uuid,
    ) -> Result<Option<TestResult>, ApiError> {
        let result = sqlx::query_as::<_, TestResult>(
            "SELECT * FROM results WHERE submission_artifact_id = $1 AND course_member_id = $2 \
             AND status NOT IN (1, 2, 6)",
        )
        .bind(submission_artifact_id)
        .bind(course_member_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(result)
    }

    async fn finished_result_exists(
        &self,
        course_member_id: Uuid,
        course_content_id: Uuid,
        version_identifier: &str,
    ) -> Result<bool, ApiError> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM results \
             WHERE course_member_id = $1 AND course_content_id = $2 \
             AND version_identifier = $3 AND status = 0)",
        )
        .bind(course_member_id)
        .bind(course_content_id)
        .bind(version_identifier)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn count_test_runs(
        &self,
        submission_group_id: Uuid,
        submission_artifact_id: Uuid,
    ) -> Result<i64, ApiError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM results r \
             JOIN submission_artifacts sa ON sa.id = r.submission_artifact_id \
             WHERE sa.submission_group_id = $1 AND r.submission_artifact_id = $2 \
             AND r.status != 6",
        )
        .bind(submission_group_id)
        .bind(submission_artifact_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn max_test_runs(&self, submission_group_id: Uuid) -> Result<Option<i32>, ApiError> {
        let row: (Option<i32>,) =
            sqlx::query_as("SELECT max_test_runs FROM submission_groups WHERE id = $1")
                .bind(submission_group_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    async fn deployment_reference(
        &self,
        course_content_id: Uuid,
    ) -> Result<Option<CourseContentDeployment>, ApiError> {
        let deployment = sqlx::query_as::<_, CourseContentDeployment>(
            "SELECT * FROM course_content_deployments WHERE course_content_id = $1",
        )
        .bind(course_content_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(deployment)
    }

    async fn insert_scheduled_result(&self, new_result: NewTestResult) -> Result<TestResult, ApiError> {
        let inserted = sqlx::query_as::<_, TestResult>(
            "INSERT INTO results \
             (id, submission_artifact_id, course_member_id, course_content_id, execution_backend_id, \
              test_system_id, status, version_identifier, reference_version_identifier) \
             VALUES ($1, $2, $3, $4, $5, $6, 3, $7, $8) RETURNING *",
        )
        .bind(new_result.id)
        .bind(new_result.submission_artifact_id)
        .bind(new_result.course_member_id)
        .bind(new_result.course_content_id)
        .bind(new_result.execution_backend_id)
        .bind(&new_result.test_system_id)
        .bind(&new_result.version_identifier)
        .bind(&new_result.reference_version_identifier)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db_err) if db_err.constraint().is_some() => {
                ApiError::test_already_running("a non-terminal result already exists for this artifact")
            }
            _ => ApiError::from(err),
        })?;
        Ok(inserted)
    }

    async fn update_result_status(
        &self,
        result_id: Uuid,
        status: ResultStatus,
        error: Option<String>,
    ) -> Result<TestResult, ApiError> {
        let updated = sqlx::query_as::<_, TestResult>(
            "UPDATE results SET status = $1, log_text = COALESCE($2, log_text), updated_at = now() \
             WHERE id = $3 RETURNING *",
        )
        .bind(i32::from(status))
        .bind(error)
        .bind(result_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(updated)
    }
}

impl PgRepositories {
    /// `GET /tests/status/{result_id}` lookup, prior to reconciliation.
    pub async fn find_result(&self, result_id: Uuid) -> Result<Option<TestResult>, ApiError> {
        let result = sqlx::query_as::<_, TestResult>("SELECT * FROM results WHERE id = $1")
            .bind(result_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(result)
    }
}
