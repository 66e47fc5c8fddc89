//! Upload flow: preconditions, object-key minting, artifact creation,
//! and the cache tags it invalidates.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::RngCore;
use uuid::Uuid;

use computor_cache::ViewCache;
use computor_core::ApiError;

use crate::sanitize::{require_zip_extension, sanitize_archive_path};

/// Total uncompressed size ceiling.
pub const MAX_UPLOAD_SIZE: u64 = 200 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub principal_user_id: Uuid,
    pub submission_group_id: Uuid,
    pub filename: String,
    pub file_bytes_len: u64,
    pub archive_entry_count: usize,
    pub archive_non_empty_entry_count: usize,
    pub version_identifier: Option<String>,
    pub submit: bool,
    /// True if the principal holds a non-student role in the group's
    /// course (bypasses the group-membership requirement).
    pub principal_is_elevated: bool,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub artifact_id: Uuid,
    pub uploader_course_member_id: Uuid,
    pub size_bytes: u64,
    pub version_identifier: String,
}

/// What the service needs to know about the content/group/membership
/// before it may accept an upload.
pub struct UploadContext {
    pub content_is_submittable: bool,
    pub content_has_execution_backend: bool,
    pub uploader_course_member_id: Option<Uuid>,
    pub group_max_submissions: Option<i32>,
    pub existing_submission_count: i64,
    pub course_id: Uuid,
    pub course_content_id: Uuid,
}

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    async fn context_for_group(
        &self,
        submission_group_id: Uuid,
        principal_user_id: Uuid,
        principal_is_elevated: bool,
    ) -> Result<UploadContext, ApiError>;

    async fn insert_artifact(
        &self,
        submission_group_id: Uuid,
        uploader_course_member_id: Uuid,
        bucket: &str,
        object_key: &str,
        version_identifier: &str,
        size_bytes: i64,
        submit: bool,
    ) -> Result<Uuid, ApiError>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, bucket: &str, object_key: &str, bytes: Vec<u8>) -> Result<(), ApiError>;
}

pub struct SubmissionService<R: SubmissionRepository, B: BlobStore> {
    repository: R,
    blob_store: B,
    cache: Arc<ViewCache<serde_json::Value>>,
}

impl<R: SubmissionRepository, B: BlobStore> SubmissionService<R, B> {
    pub fn new(repository: R, blob_store: B, cache: Arc<ViewCache<serde_json::Value>>) -> Self {
        Self { repository, blob_store, cache }
    }

    /// Mints `"submission-{utc timestamp}-{rand hex}/{filename}"`
    /// (original_source `submissions.py::upload_submission_artifact`).
    fn mint_object_key(filename: &str) -> String {
        let timestamp = Utc::now().format("%Y%m%dT%H%M%S%.fZ");
        let mut rand_bytes = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut rand_bytes);
        format!("submission-{timestamp}-{}/{filename}", hex::encode(rand_bytes))
    }

    pub async fn upload(
        &self,
        request: UploadRequest,
        file_bytes: Vec<u8>,
    ) -> Result<UploadOutcome, ApiError> {
        require_zip_extension(&request.filename)?;
        let filename = sanitize_archive_path(&request.filename)?;

        if request.file_bytes_len == 0 {
            return Err(ApiError::validation("uploaded file is empty"));
        }
        if request.file_bytes_len > MAX_UPLOAD_SIZE {
            return Err(ApiError::validation("uploaded archive exceeds the maximum size"));
        }
        if request.archive_non_empty_entry_count == 0 {
            return Err(ApiError::validation("archive contains no non-empty files"));
        }

        let context = self
            .repository
            .context_for_group(
                request.submission_group_id,
                request.principal_user_id,
                request.principal_is_elevated,
            )
            .await?;

        let uploader_course_member_id = context
            .uploader_course_member_id
            .ok_or_else(|| ApiError::validation("principal is not a member of this submission group"))?;
        if !context.content_is_submittable {
            return Err(ApiError::validation("content does not accept submissions"));
        }
        if !context.content_has_execution_backend {
            return Err(ApiError::validation("content has no execution backend configured"));
        }
        if let Some(max) = context.group_max_submissions {
            if context.existing_submission_count >= max as i64 {
                return Err(ApiError::validation("submission group has reached max_submissions"));
            }
        }

        let version_identifier = request.version_identifier.unwrap_or_else(|| Uuid::new_v4().to_string());
        let bucket = request.submission_group_id.to_string().to_lowercase();
        let object_key = Self::mint_object_key(&filename);

        self.blob_store.put(&bucket, &object_key, file_bytes).await?;

        let artifact_id = self
            .repository
            .insert_artifact(
                request.submission_group_id,
                uploader_course_member_id,
                &bucket,
                &object_key,
                &version_identifier,
                request.file_bytes_len as i64,
                request.submit,
            )
            .await?;

        self.cache.invalidate_tags([
            format!("course:{}", context.course_id).as_str(),
            format!("course_content:{}", context.course_content_id).as_str(),
            format!("submission_group:{}", request.submission_group_id).as_str(),
        ]);

        Ok(UploadOutcome {
            artifact_id,
            uploader_course_member_id,
            size_bytes: request.file_bytes_len,
            version_identifier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeRepository {
        context: UploadContext,
    }

    #[async_trait]
    impl SubmissionRepository for FakeRepository {
        async fn context_for_group(
            &self,
            _submission_group_id: Uuid,
            _principal_user_id: Uuid,
            _principal_is_elevated: bool,
        ) -> Result<UploadContext, ApiError> {
            Ok(UploadContext {
                content_is_submittable: self.context.content_is_submittable,
                content_has_execution_backend: self.context.content_has_execution_backend,
                uploader_course_member_id: self.context.uploader_course_member_id,
                group_max_submissions: self.context.group_max_submissions,
                existing_submission_count: self.context.existing_submission_count,
                course_id: self.context.course_id,
                course_content_id: self.context.course_content_id,
            })
        }

        async fn insert_artifact(
            &self,
            _submission_group_id: Uuid,
            uploader_course_member_id: Uuid,
            _bucket: &str,
            _object_key: &str,
            _version_identifier: &str,
            _size_bytes: i64,
            _submit: bool,
        ) -> Result<Uuid, ApiError> {
            Ok(uploader_course_member_id)
        }
    }

    struct FakeBlobStore {
        puts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl BlobStore for FakeBlobStore {
        async fn put(&self, bucket: &str, object_key: &str, _bytes: Vec<u8>) -> Result<(), ApiError> {
            self.puts.lock().unwrap().push((bucket.to_string(), object_key.to_string()));
            Ok(())
        }
    }

    fn valid_request() -> UploadRequest {
        UploadRequest {
            principal_user_id: Uuid::new_v4(),
            submission_group_id: Uuid::new_v4(),
            filename: "sub.zip".to_string(),
            file_bytes_len: 128,
            archive_entry_count: 3,
            archive_non_empty_entry_count: 2,
            version_identifier: Some("abc123".to_string()),
            submit: true,
            principal_is_elevated: false,
        }
    }

    fn service_with(context: UploadContext) -> SubmissionService<FakeRepository, FakeBlobStore> {
        SubmissionService::new(
            FakeRepository { context },
            FakeBlobStore { puts: Mutex::new(Vec::new()) },
            Arc::new(ViewCache::new()),
        )
    }

    fn happy_context() -> UploadContext {
        UploadContext {
            content_is_submittable: true,
            content_has_execution_backend: true,
            uploader_course_member_id: Some(Uuid::new_v4()),
            group_max_submissions: None,
            existing_submission_count: 0,
            course_id: Uuid::new_v4(),
            course_content_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn successful_upload_returns_outcome() {
        let service = service_with(happy_context());
        let outcome = service.upload(valid_request(), vec![1, 2, 3]).await.unwrap();
        assert_eq!(outcome.version_identifier, "abc123");
        assert_eq!(outcome.size_bytes, 128);
    }

    #[tokio::test]
    async fn successful_upload_invalidates_course_and_content_views() {
        let context = happy_context();
        let course_id = context.course_id;
        let cache: Arc<ViewCache<serde_json::Value>> = Arc::new(ViewCache::new());
        cache.set(
            "stale_view",
            serde_json::json!({}),
            std::time::Duration::from_secs(60),
            [format!("course:{course_id}")],
        );
        let service = SubmissionService::new(
            FakeRepository { context },
            FakeBlobStore { puts: Mutex::new(Vec::new()) },
            cache.clone(),
        );
        service.upload(valid_request(), vec![1, 2, 3]).await.unwrap();
        assert_eq!(cache.get("stale_view"), None);
    }

    #[tokio::test]
    async fn zero_byte_file_is_rejected() {
        let service = service_with(happy_context());
        let mut request = valid_request();
        request.file_bytes_len = 0;
        let err = service.upload(request, vec![]).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_001");
    }

    #[tokio::test]
    async fn non_zip_filename_is_rejected() {
        let service = service_with(happy_context());
        let mut request = valid_request();
        request.filename = "sub.tar.gz".to_string();
        assert!(service.upload(request, vec![1]).await.is_err());
    }

    #[tokio::test]
    async fn max_submissions_reached_is_rejected() {
        let mut context = happy_context();
        context.group_max_submissions = Some(1);
        context.existing_submission_count = 1;
        let service = service_with(context);
        assert!(service.upload(valid_request(), vec![1]).await.is_err());
    }

    #[tokio::test]
    async fn none_max_submissions_means_unlimited() {
        let mut context = happy_context();
        context.group_max_submissions = None;
        context.existing_submission_count = 1_000_000;
        let service = service_with(context);
        assert!(service.upload(valid_request(), vec![1]).await.is_ok());
    }

    #[tokio::test]
    async fn non_member_is_rejected() {
        let mut context = happy_context();
        context.uploader_course_member_id = None;
        let service = service_with(context);
        assert!(service.upload(valid_request(), vec![1]).await.is_err());
    }

    #[tokio::test]
    async fn path_traversal_filename_is_rejected() {
        let service = service_with(happy_context());
        let mut request = valid_request();
        request.filename = "../etc/passwd.zip".to_string();
        assert!(service.upload(request, vec![1]).await.is_err());
    }
}
