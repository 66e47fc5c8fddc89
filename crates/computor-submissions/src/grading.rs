//! Tutor-authored grades for a `SubmissionArtifact`. A grade is never
//! mutated in place: `create_grade` always inserts a fresh row, authored
//! by the grading principal's own course-member id, so "immutable except
//! by its author" holds trivially — there is nothing to overwrite.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use computor_cache::ViewCache;
use computor_core::{ApiError, GradeStatus, SubmissionGrade};

#[derive(Debug, Clone)]
pub struct CreateGradeRequest {
    pub submission_artifact_id: Uuid,
    pub author_course_member_id: Uuid,
    pub grade: f64,
    pub status: GradeStatus,
    pub comment: Option<String>,
}

/// The artifact's course context, resolved once and used both to mint the
/// row and to invalidate the views it feeds.
pub struct GradeContext {
    pub course_id: Uuid,
    pub course_content_id: Uuid,
    pub submission_group_id: Uuid,
}

#[async_trait]
pub trait GradeRepository: Send + Sync {
    async fn context_for_artifact(&self, submission_artifact_id: Uuid) -> Result<GradeContext, ApiError>;

    async fn insert_grade(
        &self,
        submission_artifact_id: Uuid,
        author_course_member_id: Uuid,
        grade: f64,
        status: GradeStatus,
        comment: Option<String>,
    ) -> Result<SubmissionGrade, ApiError>;
}

pub struct GradingService<R: GradeRepository> {
    repository: R,
    cache: Arc<ViewCache<serde_json::Value>>,
}

impl<R: GradeRepository> GradingService<R> {
    pub fn new(repository: R, cache: Arc<ViewCache<serde_json::Value>>) -> Self {
        Self { repository, cache }
    }

    /// `create_artifact_grade`. Permission gating (`_tutor`-or-above in
    /// the artifact's course) is the caller's responsibility.
    pub async fn create_grade(&self, request: CreateGradeRequest) -> Result<SubmissionGrade, ApiError> {
        if !SubmissionGrade::grade_in_range(request.grade) {
            return Err(ApiError::validation("grade must be within [0.0, 1.0]"));
        }

        let context = self.repository.context_for_artifact(request.submission_artifact_id).await?;

        let grade = self
            .repository
            .insert_grade(
                request.submission_artifact_id,
                request.author_course_member_id,
                request.grade,
                request.status,
                request.comment,
            )
            .await?;

        self.cache.invalidate_tags([
            format!("course:{}", context.course_id).as_str(),
            format!("course_content:{}", context.course_content_id).as_str(),
            format!("submission_group:{}", context.submission_group_id).as_str(),
        ]);

        Ok(grade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    struct FakeRepository {
        context: GradeContext,
        inserted: Mutex<Vec<(Uuid, Uuid, f64)>>,
    }

    #[async_trait]
    impl GradeRepository for FakeRepository {
        async fn context_for_artifact(&self, _submission_artifact_id: Uuid) -> Result<GradeContext, ApiError> {
            Ok(GradeContext {
                course_id: self.context.course_id,
                course_content_id: self.context.course_content_id,
                submission_group_id: self.context.submission_group_id,
            })
        }

        async fn insert_grade(
            &self,
            submission_artifact_id: Uuid,
            author_course_member_id: Uuid,
            grade: f64,
            status: GradeStatus,
            comment: Option<String>,
        ) -> Result<SubmissionGrade, ApiError> {
            self.inserted.lock().unwrap().push((submission_artifact_id, author_course_member_id, grade));
            Ok(SubmissionGrade {
                id: Uuid::new_v4(),
                submission_artifact_id,
                author_course_member_id,
                grade,
                status,
                comment,
                created_at: Utc::now(),
            })
        }
    }

    fn service() -> (GradingService<FakeRepository>, Arc<ViewCache<serde_json::Value>>, Uuid, Uuid) {
        let course_id = Uuid::new_v4();
        let course_content_id = Uuid::new_v4();
        let cache = Arc::new(ViewCache::new());
        let service = GradingService::new(
            FakeRepository {
                context: GradeContext { course_id, course_content_id, submission_group_id: Uuid::new_v4() },
                inserted: Mutex::new(Vec::new()),
            },
            cache.clone(),
        );
        (service, cache, course_id, course_content_id)
    }

    #[tokio::test]
    async fn creating_a_grade_attributes_it_to_the_grading_principal() {
        let (service, _cache, _course_id, _course_content_id) = service();
        let author_id = Uuid::new_v4();
        let grade = service
            .create_grade(CreateGradeRequest {
                submission_artifact_id: Uuid::new_v4(),
                author_course_member_id: author_id,
                grade: 0.8,
                status: GradeStatus::Corrected,
                comment: Some("nice work".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(grade.author_course_member_id, author_id);
        assert_eq!(grade.grade, 0.8);
    }

    #[tokio::test]
    async fn out_of_range_grade_is_rejected() {
        let (service, _cache, _course_id, _course_content_id) = service();
        let err = service
            .create_grade(CreateGradeRequest {
                submission_artifact_id: Uuid::new_v4(),
                author_course_member_id: Uuid::new_v4(),
                grade: 1.5,
                status: GradeStatus::NotReviewed,
                comment: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_001");
    }

    #[tokio::test]
    async fn creating_a_grade_invalidates_course_and_content_views() {
        let (service, cache, course_id, _course_content_id) = service();
        cache.set(
            "stale_student_view",
            serde_json::json!({}),
            std::time::Duration::from_secs(60),
            [format!("course:{course_id}")],
        );
        service
            .create_grade(CreateGradeRequest {
                submission_artifact_id: Uuid::new_v4(),
                author_course_member_id: Uuid::new_v4(),
                grade: 0.5,
                status: GradeStatus::ImprovementPossible,
                comment: None,
            })
            .await
            .unwrap();
        assert_eq!(cache.get("stale_student_view"), None);
    }
}
