//! `POST /submissions/{group_id}/upload`, `POST /submissions/artifacts/{artifact_id}/grade`.

use std::io::Cursor;

use axum::extract::{Multipart, Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use computor_core::{ApiError, CourseRole, GradeStatus, SubmissionGrade};
use computor_messages::MessageRepository;
use computor_submissions::service::MAX_UPLOAD_SIZE;
use computor_submissions::{CreateGradeRequest, GradeRepository, UploadRequest};

use crate::middleware::CurrentPrincipal;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/submissions/{group_id}/upload", post(upload))
        .route("/submissions/artifacts/{artifact_id}/grade", post(create_grade))
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub artifact_ids: Vec<Uuid>,
    pub total_size: u64,
    pub files_count: usize,
    pub version_identifier: String,
}

/// Counts entries in the archive's central directory without extracting
/// any file content.
fn count_archive_entries(bytes: &[u8]) -> Result<(usize, usize), ApiError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ApiError::validation(format!("not a valid ZIP archive: {e}")))?;
    let total = archive.len();
    let mut non_empty = 0usize;
    for i in 0..total {
        let entry = archive
            .by_index(i)
            .map_err(|e| ApiError::validation(format!("corrupt ZIP entry: {e}")))?;
        if !entry.is_dir() && entry.size() > 0 {
            non_empty += 1;
        }
    }
    Ok((total, non_empty))
}

async fn upload(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(submission_group_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut filename = None;
    let mut file_bytes = None;
    let mut version_identifier = None;
    let mut submit = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                filename = field.file_name().map(str::to_string);
                file_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::validation(format!("failed to read upload: {e}")))?,
                );
            }
            Some("version_identifier") => {
                version_identifier = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::validation(format!("invalid version_identifier field: {e}")))?,
                );
            }
            Some("submit") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("invalid submit field: {e}")))?;
                submit = text == "true" || text == "1";
            }
            _ => {}
        }
    }

    let filename = filename.ok_or_else(|| ApiError::validation("multipart body is missing the 'file' field"))?;
    let file_bytes = file_bytes.ok_or_else(|| ApiError::validation("multipart body is missing file contents"))?;

    if file_bytes.len() as u64 > MAX_UPLOAD_SIZE {
        return Err(ApiError::validation("uploaded archive exceeds the maximum size"));
    }
    let (entry_count, non_empty_entry_count) = count_archive_entries(&file_bytes)?;

    let course_id = state.repositories.course_id_of_submission_group(submission_group_id).await?;
    let principal_is_elevated =
        principal.is_admin || principal.has_course_role_at_least(course_id, CourseRole::Tutor);

    let request = UploadRequest {
        principal_user_id: principal.user_id,
        submission_group_id,
        filename,
        file_bytes_len: file_bytes.len() as u64,
        archive_entry_count: entry_count,
        archive_non_empty_entry_count: non_empty_entry_count,
        version_identifier,
        submit,
        principal_is_elevated,
    };

    let outcome = state.submissions.upload(request, file_bytes.to_vec()).await?;

    Ok(Json(UploadResponse {
        artifact_ids: vec![outcome.artifact_id],
        total_size: outcome.size_bytes,
        files_count: non_empty_entry_count,
        version_identifier: outcome.version_identifier,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateGradeBody {
    pub grade: f64,
    pub status: GradeStatus,
    pub comment: Option<String>,
}

async fn create_grade(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(submission_artifact_id): Path<Uuid>,
    Json(body): Json<CreateGradeBody>,
) -> Result<Json<SubmissionGrade>, ApiError> {
    let context = state.repositories.context_for_artifact(submission_artifact_id).await?;

    if !(principal.is_admin || principal.has_course_role_at_least(context.course_id, CourseRole::Tutor)) {
        return Err(ApiError::forbidden("grading requires a tutor role or above in this course"));
    }

    let author_course_member_id = state
        .repositories
        .course_member_id_of(principal.user_id, context.course_id)
        .await?
        .ok_or_else(|| ApiError::forbidden("grading principal has no membership in this course"))?;

    let grade = state
        .grading
        .create_grade(CreateGradeRequest {
            submission_artifact_id,
            author_course_member_id,
            grade: body.grade,
            status: body.status,
            comment: body.comment,
        })
        .await?;

    Ok(Json(grade))
}
