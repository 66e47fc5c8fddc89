//! Assignment (phase 1, DB-only) and unassignment. The
//! release workflow (phase 2) is driven externally by the task executor;
//! this engine only reads the resulting status.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use computor_cache::ViewCache;
use computor_core::{
    ApiError, CourseContentDeployment, DeploymentAction, DeploymentStatus, ExampleVersion,
};

use crate::version::normalize_version_tag;

#[derive(Debug, Clone)]
pub enum ExampleResolution {
    ByVersionId(Uuid),
    ByIdentifierAndTag { example_identifier: String, version_tag: String },
}

#[derive(Debug, Clone)]
pub struct AssignExampleRequest {
    pub content_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub resolution: ExampleResolution,
    pub deployment_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BatchValidationItem {
    pub content_id: Uuid,
    pub example_identifier: String,
    pub version_tag: String,
}

#[derive(Debug, Clone)]
pub struct BatchValidationResult {
    pub content_id: Uuid,
    pub example_exists: bool,
    pub version_exists: bool,
    pub error_message: Option<String>,
}

#[async_trait]
pub trait DeploymentRepository: Send + Sync {
    async fn is_submittable(&self, content_id: Uuid) -> Result<bool, ApiError>;

    async fn course_id_of_content(&self, content_id: Uuid) -> Result<Uuid, ApiError>;

    async fn resolve_example_version(
        &self,
        resolution: &ExampleResolution,
    ) -> Result<ExampleVersion, ApiError>;

    async fn find_deployment(
        &self,
        content_id: Uuid,
    ) -> Result<Option<CourseContentDeployment>, ApiError>;

    async fn insert_deployment(
        &self,
        content_id: Uuid,
        example_version: &ExampleVersion,
    ) -> Result<CourseContentDeployment, ApiError>;

    async fn update_deployment_example(
        &self,
        deployment_id: Uuid,
        example_version: &ExampleVersion,
        status: DeploymentStatus,
    ) -> Result<(), ApiError>;

    async fn set_status(&self, deployment_id: Uuid, status: DeploymentStatus) -> Result<(), ApiError>;

    async fn append_history(
        &self,
        deployment_id: Uuid,
        action: DeploymentAction,
        actor_user_id: Option<Uuid>,
        prior_example_version_id: Option<Uuid>,
        new_example_version_id: Option<Uuid>,
        message: Option<String>,
    ) -> Result<(), ApiError>;

    async fn identifier_and_version_exist(
        &self,
        example_identifier: &str,
        version_tag: &str,
    ) -> Result<(bool, bool), ApiError>;
}

pub struct DeploymentEngine<R: DeploymentRepository> {
    repository: R,
    cache: Arc<ViewCache<serde_json::Value>>,
}

impl<R: DeploymentRepository> DeploymentEngine<R> {
    pub fn new(repository: R, cache: Arc<ViewCache<serde_json::Value>>) -> Self {
        Self { repository, cache }
    }

    async fn invalidate_content_views(&self, content_id: Uuid) -> Result<(), ApiError> {
        let course_id = self.repository.course_id_of_content(content_id).await?;
        self.cache.invalidate_tags([
            format!("course:{course_id}").as_str(),
            format!("course_content:{content_id}").as_str(),
        ]);
        Ok(())
    }

    /// `assign_example_to_content`.
    pub async fn assign(
        &self,
        request: AssignExampleRequest,
    ) -> Result<CourseContentDeployment, ApiError> {
        if !self.repository.is_submittable(request.content_id).await? {
            return Err(ApiError::validation("content is not submittable"));
        }

        let resolution = match request.resolution {
            ExampleResolution::ByVersionId(id) => ExampleResolution::ByVersionId(id),
            ExampleResolution::ByIdentifierAndTag { example_identifier, version_tag } => {
                let normalized = normalize_version_tag(&version_tag)?;
                ExampleResolution::ByIdentifierAndTag {
                    example_identifier,
                    version_tag: normalized,
                }
            }
        };
        let example_version = self.repository.resolve_example_version(&resolution).await?;

        match self.repository.find_deployment(request.content_id).await? {
            None => {
                let deployment = self
                    .repository
                    .insert_deployment(request.content_id, &example_version)
                    .await?;
                self.repository
                    .append_history(
                        deployment.id,
                        DeploymentAction::Assigned,
                        request.actor_user_id,
                        None,
                        Some(example_version.id),
                        request.deployment_message,
                    )
                    .await?;
                self.invalidate_content_views(request.content_id).await?;
                Ok(deployment)
            }
            Some(existing) => {
                let same_example = existing.example_version_id == Some(example_version.id);
                let same_message = existing.last_deployment_message == request.deployment_message;
                if same_example && same_message {
                    // L1: identical re-assignment is a no-op — no history, no status change.
                    return Ok(existing);
                }

                let same_identifier = existing.example_identifier.as_deref()
                    == Some(example_version.example_identifier.as_str());

                if existing.deployment_status == DeploymentStatus::Deployed && !same_identifier {
                    return Err(ApiError::deployment_identity_violation(
                        "a deployed deployment can only be reassigned within the same example identifier",
                    ));
                }

                let action = if same_identifier {
                    DeploymentAction::Updated
                } else {
                    DeploymentAction::Reassigned
                };

                self.repository
                    .update_deployment_example(existing.id, &example_version, DeploymentStatus::Pending)
                    .await?;
                self.repository
                    .append_history(
                        existing.id,
                        action,
                        request.actor_user_id,
                        existing.example_version_id,
                        Some(example_version.id),
                        request.deployment_message.clone(),
                    )
                    .await?;
                self.invalidate_content_views(request.content_id).await?;

                Ok(CourseContentDeployment {
                    example_version_id: Some(example_version.id),
                    example_identifier: Some(example_version.example_identifier.clone()),
                    version_tag: Some(example_version.version_tag.clone()),
                    deployment_status: DeploymentStatus::Pending,
                    last_deployment_message: request.deployment_message,
                    ..existing
                })
            }
        }
    }

    /// Allowed only if status is not `deploying` or `deployed`.
    pub async fn unassign(
        &self,
        content_id: Uuid,
        actor_user_id: Option<Uuid>,
    ) -> Result<(), ApiError> {
        let deployment = self
            .repository
            .find_deployment(content_id)
            .await?
            .ok_or_else(|| ApiError::not_found("no deployment exists for this content"))?;

        if matches!(
            deployment.deployment_status,
            DeploymentStatus::Deploying | DeploymentStatus::Deployed
        ) {
            return Err(ApiError::conflict(
                "cannot unassign a deployment that is deploying or already deployed",
            ));
        }

        self.repository
            .set_status(deployment.id, DeploymentStatus::Unassigned)
            .await?;
        self.repository
            .append_history(
                deployment.id,
                DeploymentAction::Unassigned,
                actor_user_id,
                deployment.example_version_id,
                None,
                None,
            )
            .await?;
        self.invalidate_content_views(content_id).await?;
        Ok(())
    }

    /// Resolves all identifiers and tags in two set-lookups, returning
    /// per-item existence facts.
    pub async fn batch_validate(
        &self,
        items: Vec<BatchValidationItem>,
    ) -> Result<Vec<BatchValidationResult>, ApiError> {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let normalized = normalize_version_tag(&item.version_tag);
            let (example_identifier, version_tag, mut error_message) = match normalized {
                Ok(v) => (item.example_identifier.clone(), v, None),
                Err(e) => (item.example_identifier.clone(), item.version_tag.clone(), Some(e.to_string())),
            };

            let (example_exists, version_exists) = if error_message.is_none() {
                self.repository
                    .identifier_and_version_exist(&example_identifier, &version_tag)
                    .await?
            } else {
                (false, false)
            };

            if error_message.is_none() && !example_exists {
                error_message = Some(format!("unknown example identifier {example_identifier:?}"));
            } else if error_message.is_none() && !version_exists {
                error_message = Some(format!("unknown version tag {version_tag:?} for {example_identifier:?}"));
            }

            results.push(BatchValidationResult {
                content_id: item.content_id,
                example_exists,
                version_exists,
                error_message,
            });
        }
        Ok(results)
    }
}
