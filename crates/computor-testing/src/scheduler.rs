//! The test scheduler: resolves an artifact, runs the
//! gating checks in order, and submits a workflow via the task executor.

use async_trait::async_trait;
use computor_core::{ApiError, CourseContentDeployment, ResultStatus, SubmissionArtifact, TestResult};
use serde_json::json;
use uuid::Uuid;

use crate::executor::{TaskExecutorAdapter, WorkflowStatus};

#[derive(Debug, Clone)]
pub enum ArtifactSelector {
    ArtifactId(Uuid),
    GroupAndVersion { submission_group_id: Uuid, version_identifier: String },
    LatestInGroup(Uuid),
}

#[derive(Debug, Clone)]
pub struct CreateTestRequest {
    pub selector: ArtifactSelector,
    pub requesting_course_member_id: Uuid,
    /// True if the principal holds a non-student role in the course
    /// (bypasses the membership check).
    pub principal_is_elevated: bool,
}

/// Everything the scheduler needs about the resolved artifact, assembled
/// by the repository in one round trip.
#[derive(Debug, Clone)]
pub struct ArtifactContext {
    pub artifact: SubmissionArtifact,
    pub course_content_id: Uuid,
    pub execution_backend_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewTestResult {
    pub id: Uuid,
    pub submission_artifact_id: Uuid,
    pub course_member_id: Uuid,
    pub course_content_id: Uuid,
    pub execution_backend_id: Uuid,
    pub test_system_id: String,
    pub version_identifier: String,
    pub reference_version_identifier: Option<String>,
}

#[async_trait]
pub trait TestSchedulerRepository: Send + Sync {
    async fn resolve_artifact_context(
        &self,
        selector: &ArtifactSelector,
    ) -> Result<ArtifactContext, ApiError>;

    async fn is_group_member(
        &self,
        submission_group_id: Uuid,
        course_member_id: Uuid,
    ) -> Result<bool, ApiError>;

    /// Non-terminal results for `(artifact_id, course_member_id)`; the
    /// partial uniqueness index guarantees at most one.
    async fn non_terminal_result(
        &self,
        submission_artifact_id: Uuid,
        course_member_id: Uuid,
    ) -> Result<Option<TestResult>, ApiError>;

    async fn finished_result_exists(
        &self,
        course_member_id: Uuid,
        course_content_id: Uuid,
        version_identifier: &str,
    ) -> Result<bool, ApiError>;

    async fn count_test_runs(
        &self,
        submission_group_id: Uuid,
        submission_artifact_id: Uuid,
    ) -> Result<i64, ApiError>;

    async fn max_test_runs(&self, submission_group_id: Uuid) -> Result<Option<i32>, ApiError>;

    async fn deployment_reference(
        &self,
        course_content_id: Uuid,
    ) -> Result<Option<CourseContentDeployment>, ApiError>;

    /// Must translate a unique-constraint violation on the partial index
    /// into `ApiError::test_already_running`.
    async fn insert_scheduled_result(&self, new_result: NewTestResult) -> Result<TestResult, ApiError>;

    async fn update_result_status(
        &self,
        result_id: Uuid,
        status: ResultStatus,
        error: Option<String>,
    ) -> Result<TestResult, ApiError>;
}

pub struct TestScheduler<R: TestSchedulerRepository, T: TaskExecutorAdapter> {
    repository: R,
    executor: T,
}

fn reconciled_status(workflow_status: WorkflowStatus) -> ResultStatus {
    match workflow_status {
        WorkflowStatus::Finished => ResultStatus::Finished,
        WorkflowStatus::Failed => ResultStatus::Failed,
        WorkflowStatus::Cancelled => ResultStatus::Cancelled,
        // Unknown/timed-out/terminated workflows are indistinguishable
        // from a crash at the Result layer.
        WorkflowStatus::TimedOut | WorkflowStatus::Terminated | WorkflowStatus::NotFound => {
            ResultStatus::Crashed
        }
        WorkflowStatus::Queued | WorkflowStatus::Started => ResultStatus::Scheduled,
    }
}

impl<R: TestSchedulerRepository, T: TaskExecutorAdapter> TestScheduler<R, T> {
    pub fn new(repository: R, executor: T) -> Self {
        Self { repository, executor }
    }

    pub async fn create_test(&self, request: CreateTestRequest) -> Result<TestResult, ApiError> {
        let context = self.repository.resolve_artifact_context(&request.selector).await?;
        let artifact = &context.artifact;

        // Gating 1: membership or elevated role.
        if !request.principal_is_elevated
            && !self
                .repository
                .is_group_member(artifact.submission_group_id, request.requesting_course_member_id)
                .await?
        {
            return Err(ApiError::forbidden("not a member of this submission group"));
        }

        // Gating 2: content has a configured execution backend.
        let execution_backend_id = context
            .execution_backend_id
            .ok_or_else(|| ApiError::validation("content has no configured execution backend"))?;

        // Gating 3: reconcile any in-flight result for this member/artifact.
        if let Some(existing) = self
            .repository
            .non_terminal_result(artifact.id, request.requesting_course_member_id)
            .await?
        {
            let workflow_status = self.executor.get_task_status(&existing.test_system_id).await?;
            if workflow_status.is_in_flight() {
                return Ok(existing);
            }
            let reconciled = reconciled_status(workflow_status);
            self.repository
                .update_result_status(existing.id, reconciled, None)
                .await?;
        }

        // Gating 4: already finished for this member/content/version.
        if self
            .repository
            .finished_result_exists(
                request.requesting_course_member_id,
                context.course_content_id,
                &artifact.version_identifier,
            )
            .await?
        {
            return Err(ApiError::test_already_finished(
                "already tested; only crashed/cancelled runs may be retried",
            ));
        }

        // Gating 5: max_test_runs quota, honoring None = unlimited.
        let max_test_runs = self.repository.max_test_runs(artifact.submission_group_id).await?;
        if let Some(max) = max_test_runs {
            let run_count = self
                .repository
                .count_test_runs(artifact.submission_group_id, artifact.id)
                .await?;
            if run_count >= max as i64 {
                return Err(ApiError::validation("max_test_runs quota reached for this submission group"));
            }
        }

        // Reference resolution: the content must have a released deployment.
        let deployment = self
            .repository
            .deployment_reference(context.course_content_id)
            .await?;
        let reference_version_identifier = match deployment {
            Some(d) if d.is_released() => d.version_identifier.clone(),
            _ => return Err(ApiError::validation("assignment not released")),
        };

        // Workflow submission: pre-mint the id, write the Result row, then submit.
        let workflow_id = format!("student-testing-{}", Uuid::new_v4());
        let new_result = NewTestResult {
            id: Uuid::new_v4(),
            submission_artifact_id: artifact.id,
            course_member_id: request.requesting_course_member_id,
            course_content_id: context.course_content_id,
            execution_backend_id,
            test_system_id: workflow_id.clone(),
            version_identifier: artifact.version_identifier.clone(),
            reference_version_identifier: Some(reference_version_identifier),
        };
        let result = self.repository.insert_scheduled_result(new_result).await?;

        let submission = self
            .executor
            .submit_task(
                "student_testing",
                &workflow_id,
                json!({
                    "submission_artifact_id": artifact.id,
                    "course_member_id": request.requesting_course_member_id,
                }),
                "computor",
            )
            .await;

        match submission {
            Ok(_) => Ok(result),
            Err(e) => {
                self.repository
                    .update_result_status(result.id, ResultStatus::Failed, Some(e.to_string()))
                    .await
            }
        }
    }

    /// `GET /tests/status/{result_id}` reconciliation path.
    pub async fn reconcile(&self, result: &TestResult) -> Result<TestResult, ApiError> {
        if result.status.is_terminal() {
            return Ok(result.clone());
        }
        let workflow_status = self.executor.get_task_status(&result.test_system_id).await?;
        if workflow_status.is_in_flight() {
            return Ok(result.clone());
        }
        let status = reconciled_status(workflow_status);
        self.repository.update_result_status(result.id, status, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use computor_core::{ApiError as CoreError};
    use std::sync::Mutex;

    fn artifact(group_id: Uuid, version: &str) -> SubmissionArtifact {
        SubmissionArtifact {
            id: Uuid::new_v4(),
            submission_group_id: group_id,
            uploader_course_member_id: Uuid::new_v4(),
            bucket: "bucket".to_string(),
            object_key: "key".to_string(),
            version_identifier: version.to_string(),
            size_bytes: 10,
            submit: false,
            properties: serde_json::json!({}),
            created_at: chrono::Utc::now(),
        }
    }

    struct FakeRepository {
        artifact: SubmissionArtifact,
        course_content_id: Uuid,
        backend: Option<Uuid>,
        is_member: bool,
        non_terminal: Mutex<Option<TestResult>>,
        already_finished: bool,
        max_test_runs: Option<i32>,
        run_count: i64,
        deployment: Option<CourseContentDeployment>,
        inserted: Mutex<Vec<NewTestResult>>,
    }

    #[async_trait]
    impl TestSchedulerRepository for FakeRepository {
        async fn resolve_artifact_context(&self, _selector: &ArtifactSelector) -> Result<ArtifactContext, CoreError> {
            Ok(ArtifactContext {
                artifact: self.artifact.clone(),
                course_content_id: self.course_content_id,
                execution_backend_id: self.backend,
            })
        }

        async fn is_group_member(&self, _group: Uuid, _member: Uuid) -> Result<bool, CoreError> {
            Ok(self.is_member)
        }

        async fn non_terminal_result(&self, _artifact_id: Uuid, _member: Uuid) -> Result<Option<TestResult>, CoreError> {
            Ok(self.non_terminal.lock().unwrap().clone())
        }

        async fn finished_result_exists(&self, _member: Uuid, _content: Uuid, _version: &str) -> Result<bool, CoreError> {
            Ok(self.already_finished)
        }

        async fn count_test_runs(&self, _group: Uuid, _artifact: Uuid) -> Result<i64, CoreError> {
            Ok(self.run_count)
        }

        async fn max_test_runs(&self, _group: Uuid) -> Result<Option<i32>, CoreError> {
            Ok(self.max_test_runs)
        }

        async fn deployment_reference(&self, _content: Uuid) -> Result<Option<CourseContentDeployment>, CoreError> {
            Ok(self.deployment.clone())
        }

        async fn insert_scheduled_result(&self, new_result: NewTestResult) -> Result<TestResult, CoreError> {
            self.inserted.lock().unwrap().push(new_result.clone());
            Ok(TestResult {
                id: new_result.id,
                submission_artifact_id: new_result.submission_artifact_id,
                course_member_id: new_result.course_member_id,
                course_content_id: new_result.course_content_id,
                execution_backend_id: new_result.execution_backend_id,
                test_system_id: new_result.test_system_id,
                status: ResultStatus::Scheduled,
                grade: None,
                result_json: None,
                log_text: None,
                version_identifier: new_result.version_identifier,
                reference_version_identifier: new_result.reference_version_identifier,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            })
        }

        async fn update_result_status(&self, result_id: Uuid, status: ResultStatus, error: Option<String>) -> Result<TestResult, CoreError> {
            Ok(TestResult {
                id: result_id,
                submission_artifact_id: Uuid::new_v4(),
                course_member_id: Uuid::new_v4(),
                course_content_id: Uuid::new_v4(),
                execution_backend_id: Uuid::new_v4(),
                test_system_id: "wf".to_string(),
                status,
                grade: None,
                result_json: error.map(|e| serde_json::json!({"error": e})),
                log_text: None,
                version_identifier: "1".to_string(),
                reference_version_identifier: None,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            })
        }
    }

    struct FakeExecutor {
        status: WorkflowStatus,
        submit_fails: bool,
    }

    #[async_trait]
    impl TaskExecutorAdapter for FakeExecutor {
        async fn submit_task(&self, _name: &str, workflow_id: &str, _parameters: serde_json::Value, _queue: &str) -> Result<String, CoreError> {
            if self.submit_fails {
                Err(CoreError::external("submission failed"))
            } else {
                Ok(workflow_id.to_string())
            }
        }

        async fn get_task_status(&self, _workflow_id: &str) -> Result<WorkflowStatus, CoreError> {
            Ok(self.status)
        }

        async fn get_task_result(&self, _workflow_id: &str) -> Result<crate::executor::TaskResult, CoreError> {
            Ok(crate::executor::TaskResult { status: self.status, error: None, result_json: None })
        }
    }

    fn released_deployment(content_id: Uuid) -> CourseContentDeployment {
        CourseContentDeployment {
            id: Uuid::new_v4(),
            course_content_id: content_id,
            example_version_id: Some(Uuid::new_v4()),
            example_identifier: Some("lib.sort".to_string()),
            version_tag: Some("1.0.0".to_string()),
            deployment_status: computor_core::DeploymentStatus::Deployed,
            deployment_path: Some("/deployments/lib.sort".to_string()),
            version_identifier: Some("abc123".to_string()),
            workflow_id: None,
            last_deployment_message: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn happy_path_creates_scheduled_result_and_submits() {
        let content_id = Uuid::new_v4();
        let group_id = Uuid::new_v4();
        let repository = FakeRepository {
            artifact: artifact(group_id, "v1"),
            course_content_id: content_id,
            backend: Some(Uuid::new_v4()),
            is_member: true,
            non_terminal: Mutex::new(None),
            already_finished: false,
            max_test_runs: Some(5),
            run_count: 0,
            deployment: Some(released_deployment(content_id)),
            inserted: Mutex::new(vec![]),
        };
        let executor = FakeExecutor { status: WorkflowStatus::Queued, submit_fails: false };
        let scheduler = TestScheduler::new(repository, executor);
        let result = scheduler
            .create_test(CreateTestRequest {
                selector: ArtifactSelector::LatestInGroup(group_id),
                requesting_course_member_id: Uuid::new_v4(),
                principal_is_elevated: false,
            })
            .await
            .unwrap();
        assert_eq!(result.status, ResultStatus::Scheduled);
        assert!(result.test_system_id.starts_with("student-testing-"));
        assert_eq!(result.reference_version_identifier.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn non_member_is_forbidden() {
        let content_id = Uuid::new_v4();
        let group_id = Uuid::new_v4();
        let repository = FakeRepository {
            artifact: artifact(group_id, "v1"),
            course_content_id: content_id,
            backend: Some(Uuid::new_v4()),
            is_member: false,
            non_terminal: Mutex::new(None),
            already_finished: false,
            max_test_runs: None,
            run_count: 0,
            deployment: Some(released_deployment(content_id)),
            inserted: Mutex::new(vec![]),
        };
        let executor = FakeExecutor { status: WorkflowStatus::Queued, submit_fails: false };
        let scheduler = TestScheduler::new(repository, executor);
        let err = scheduler
            .create_test(CreateTestRequest {
                selector: ArtifactSelector::LatestInGroup(group_id),
                requesting_course_member_id: Uuid::new_v4(),
                principal_is_elevated: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AUTHZ_001");
    }

    #[tokio::test]
    async fn in_flight_existing_run_is_returned_without_resubmitting() {
        let content_id = Uuid::new_v4();
        let group_id = Uuid::new_v4();
        let existing_id = Uuid::new_v4();
        let existing = TestResult {
            id: existing_id,
            submission_artifact_id: Uuid::new_v4(),
            course_member_id: Uuid::new_v4(),
            course_content_id: content_id,
            execution_backend_id: Uuid::new_v4(),
            test_system_id: "student-testing-old".to_string(),
            status: ResultStatus::Running,
            grade: None,
            result_json: None,
            log_text: None,
            version_identifier: "v1".to_string(),
            reference_version_identifier: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let repository = FakeRepository {
            artifact: artifact(group_id, "v1"),
            course_content_id: content_id,
            backend: Some(Uuid::new_v4()),
            is_member: true,
            non_terminal: Mutex::new(Some(existing)),
            already_finished: false,
            max_test_runs: None,
            run_count: 0,
            deployment: Some(released_deployment(content_id)),
            inserted: Mutex::new(vec![]),
        };
        let executor = FakeExecutor { status: WorkflowStatus::Started, submit_fails: false };
        let scheduler = TestScheduler::new(repository, executor);
        let result = scheduler
            .create_test(CreateTestRequest {
                selector: ArtifactSelector::LatestInGroup(group_id),
                requesting_course_member_id: Uuid::new_v4(),
                principal_is_elevated: false,
            })
            .await
            .unwrap();
        assert_eq!(result.id, existing_id);
    }

    #[tokio::test]
    async fn unreleased_assignment_is_rejected() {
        let content_id = Uuid::new_v4();
        let group_id = Uuid::new_v4();
        let repository = FakeRepository {
            artifact: artifact(group_id, "v1"),
            course_content_id: content_id,
            backend: Some(Uuid::new_v4()),
            is_member: true,
            non_terminal: Mutex::new(None),
            already_finished: false,
            max_test_runs: None,
            run_count: 0,
            deployment: None,
            inserted: Mutex::new(vec![]),
        };
        let executor = FakeExecutor { status: WorkflowStatus::Queued, submit_fails: false };
        let scheduler = TestScheduler::new(repository, executor);
        let err = scheduler
            .create_test(CreateTestRequest {
                selector: ArtifactSelector::LatestInGroup(group_id),
                requesting_course_member_id: Uuid::new_v4(),
                principal_is_elevated: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_001");
    }

    #[tokio::test]
    async fn quota_reached_is_rejected() {
        let content_id = Uuid::new_v4();
        let group_id = Uuid::new_v4();
        let repository = FakeRepository {
            artifact: artifact(group_id, "v1"),
            course_content_id: content_id,
            backend: Some(Uuid::new_v4()),
            is_member: true,
            non_terminal: Mutex::new(None),
            already_finished: false,
            max_test_runs: Some(3),
            run_count: 3,
            deployment: Some(released_deployment(content_id)),
            inserted: Mutex::new(vec![]),
        };
        let executor = FakeExecutor { status: WorkflowStatus::Queued, submit_fails: false };
        let scheduler = TestScheduler::new(repository, executor);
        let err = scheduler
            .create_test(CreateTestRequest {
                selector: ArtifactSelector::LatestInGroup(group_id),
                requesting_course_member_id: Uuid::new_v4(),
                principal_is_elevated: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_001");
    }

    #[tokio::test]
    async fn submission_failure_marks_result_failed() {
        let content_id = Uuid::new_v4();
        let group_id = Uuid::new_v4();
        let repository = FakeRepository {
            artifact: artifact(group_id, "v1"),
            course_content_id: content_id,
            backend: Some(Uuid::new_v4()),
            is_member: true,
            non_terminal: Mutex::new(None),
            already_finished: false,
            max_test_runs: None,
            run_count: 0,
            deployment: Some(released_deployment(content_id)),
            inserted: Mutex::new(vec![]),
        };
        let executor = FakeExecutor { status: WorkflowStatus::Queued, submit_fails: true };
        let scheduler = TestScheduler::new(repository, executor);
        let result = scheduler
            .create_test(CreateTestRequest {
                selector: ArtifactSelector::LatestInGroup(group_id),
                requesting_course_member_id: Uuid::new_v4(),
                principal_is_elevated: false,
            })
            .await
            .unwrap();
        assert_eq!(result.status, ResultStatus::Failed);
    }
}
