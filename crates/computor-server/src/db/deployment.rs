use async_trait::async_trait;
use uuid::Uuid;

use computor_core::{
    ApiError, CourseContentDeployment, DeploymentAction, DeploymentHistory, DeploymentStatus, ExampleVersion,
};
use computor_deployment::{DeploymentRepository, ExampleResolution};

use super::PgRepositories;

#[async_trait]
impl DeploymentRepository for PgRepositories {
    async fn is_submittable(&self, content_id: Uuid) -> Result<bool, ApiError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT ct.course_content_kind FROM course_contents cc \
             JOIN course_content_types ct ON ct.id = cc.course_content_type_id \
             WHERE cc.id = $1",
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(matches!(row, Some((kind,)) if kind == "assignment"))
    }

    async fn course_id_of_content(&self, content_id: Uuid) -> Result<Uuid, ApiError> {
        let row: (Uuid,) = sqlx::query_as("SELECT course_id FROM course_contents WHERE id = $1")
            .bind(content_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    async fn resolve_example_version(
        &self,
        resolution: &ExampleResolution,
    ) -> Result<ExampleVersion, ApiError> {
        let version = match resolution {
            ExampleResolution::ByVersionId(id) => {
                sqlx::query_as::<_, ExampleVersion>("SELECT * FROM example_versions WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            ExampleResolution::ByIdentifierAndTag { example_identifier, version_tag } => {
                sqlx::query_as::<_, ExampleVersion>(
                    "SELECT * FROM example_versions WHERE example_identifier = $1 AND version_tag = $2",
                )
                .bind(example_identifier)
                .bind(version_tag)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        version.ok_or_else(|| ApiError::not_found("example version not found"))
    }

    async fn find_deployment(
        &self,
        content_id: Uuid,
    ) -> Result<Option<CourseContentDeployment>, ApiError> {
        let deployment = sqlx::query_as::<_, CourseContentDeployment>(
            "SELECT ccd.*, dh.message AS last_deployment_message \
             FROM course_content_deployments ccd \
             LEFT JOIN LATERAL ( \
                 SELECT message FROM deployment_history \
                 WHERE deployment_id = ccd.id ORDER BY created_at DESC LIMIT 1 \
             ) dh ON true \
             WHERE ccd.course_content_id = $1",
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(deployment)
    }

    async fn insert_deployment(
        &self,
        content_id: Uuid,
        example_version: &ExampleVersion,
    ) -> Result<CourseContentDeployment, ApiError> {
        let deployment = sqlx::query_as::<_, CourseContentDeployment>(
            "INSERT INTO course_content_deployments \
             (id, course_content_id, example_version_id, example_identifier, version_tag, deployment_status) \
             VALUES ($1, $2, $3, $4, $5, 'pending') RETURNING *, NULL::text AS last_deployment_message",
        )
        .bind(Uuid::new_v4())
        .bind(content_id)
        .bind(example_version.id)
        .bind(&example_version.example_identifier)
        .bind(&example_version.version_tag)
        .fetch_one(&self.pool)
        .await?;
        Ok(deployment)
    }

    async fn update_deployment_example(
        &self,
        deployment_id: Uuid,
        example_version: &ExampleVersion,
        status: DeploymentStatus,
    ) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE course_content_deployments \
             SET example_version_id = $1, example_identifier = $2, version_tag = $3, \
                 deployment_status = $4, updated_at = now() \
             WHERE id = $5",
        )
        .bind(example_version.id)
        .bind(&example_version.example_identifier)
        .bind(&example_version.version_tag)
        .bind(status)
        .bind(deployment_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(&self, deployment_id: Uuid, status: DeploymentStatus) -> Result<(), ApiError> {
        sqlx::query("UPDATE course_content_deployments SET deployment_status = $1, updated_at = now() WHERE id = $2")
            .bind(status)
            .bind(deployment_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_history(
        &self,
        deployment_id: Uuid,
        action: DeploymentAction,
        actor_user_id: Option<Uuid>,
        prior_example_version_id: Option<Uuid>,
        new_example_version_id: Option<Uuid>,
        message: Option<String>,
    ) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO deployment_history \
             (id, deployment_id, action, actor_user_id, prior_example_version_id, new_example_version_id, message) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(Uuid::new_v4())
        .bind(deployment_id)
        .bind(action)
        .bind(actor_user_id)
        .bind(prior_example_version_id)
        .bind(new_example_version_id)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn identifier_and_version_exist(
        &self,
        example_identifier: &str,
        version_tag: &str,
    ) -> Result<(bool, bool), ApiError> {
        let identifier_exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM examples WHERE identifier = $1)")
                .bind(example_identifier)
                .fetch_one(&self.pool)
                .await?;
        let version_exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM example_versions WHERE example_identifier = $1 AND version_tag = $2)",
        )
        .bind(example_identifier)
        .bind(version_tag)
        .fetch_one(&self.pool)
        .await?;
        Ok((identifier_exists.0, version_exists.0))
    }
}

impl PgRepositories {
    /// The full transition log for a deployment, newest first, returned
    /// alongside `POST /course-contents/{id}/assign-example`.
    pub async fn list_deployment_history(&self, deployment_id: Uuid) -> Result<Vec<DeploymentHistory>, ApiError> {
        let history = sqlx::query_as::<_, DeploymentHistory>(
            "SELECT * FROM deployment_history WHERE deployment_id = $1 ORDER BY created_at DESC",
        )
        .bind(deployment_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(history)
    }
}
