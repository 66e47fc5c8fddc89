//! Submission groups, their members, and the artifacts/grades they own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A group of 1..N course members for a given course content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubmissionGroup {
    pub id: Uuid,
    pub course_id: Uuid,
    pub course_content_id: Uuid,
    pub max_group_size: i32,
    /// `None` means unlimited (original_source only enforces when set).
    pub max_submissions: Option<i32>,
    /// `None` means unlimited.
    pub max_test_runs: Option<i32>,
    pub join_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SubmissionGroup {
    pub fn submissions_exhausted(&self, current_count: i64) -> bool {
        self.max_submissions
            .map(|max| current_count >= max as i64)
            .unwrap_or(false)
    }

    pub fn test_runs_exhausted(&self, current_count: i64) -> bool {
        self.max_test_runs
            .map(|max| current_count >= max as i64)
            .unwrap_or(false)
    }
}

/// A course member may belong to at most one group per course content;
/// the group's `course_id` must equal the parent content's course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubmissionGroupMember {
    pub id: Uuid,
    pub submission_group_id: Uuid,
    pub course_member_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

/// One uploaded ZIP archive, keyed by its blob storage location plus a
/// `version_identifier`. Immutable once created except `submit` and
/// `properties`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubmissionArtifact {
    pub id: Uuid,
    pub submission_group_id: Uuid,
    pub uploader_course_member_id: Uuid,
    pub bucket: String,
    pub object_key: String,
    pub version_identifier: String,
    pub size_bytes: i64,
    /// Distinguishes official submissions from test/practice runs.
    pub submit: bool,
    pub properties: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Tutor-supplied grade for a `SubmissionArtifact`; immutable except by
/// its author. The *latest by timestamp* among all grades for an
/// artifact is the effective grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "grade_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GradeStatus {
    NotReviewed,
    ImprovementPossible,
    Corrected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubmissionGrade {
    pub id: Uuid,
    pub submission_artifact_id: Uuid,
    pub author_course_member_id: Uuid,
    pub grade: f64,
    pub status: GradeStatus,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SubmissionGrade {
    pub fn grade_in_range(grade: f64) -> bool {
        (0.0..=1.0).contains(&grade)
    }
}

/// Picks the effective grade: latest by timestamp. `average_grade` is a separate display
/// helper, not the effective grade.
pub fn latest_grade(grades: &[SubmissionGrade]) -> Option<&SubmissionGrade> {
    grades.iter().max_by_key(|g| g.created_at)
}

pub fn average_grade(grades: &[SubmissionGrade]) -> Option<f64> {
    if grades.is_empty() {
        return None;
    }
    Some(grades.iter().map(|g| g.grade).sum::<f64>() / grades.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grade(days_ago: i64, value: f64) -> SubmissionGrade {
        SubmissionGrade {
            id: Uuid::new_v4(),
            submission_artifact_id: Uuid::new_v4(),
            author_course_member_id: Uuid::new_v4(),
            grade: value,
            status: GradeStatus::Corrected,
            comment: None,
            created_at: Utc::now() - chrono::Duration::days(days_ago),
        }
    }

    #[test]
    fn latest_grade_picks_most_recent_timestamp() {
        let grades = vec![grade(5, 0.5), grade(1, 0.9), grade(10, 0.2)];
        assert_eq!(latest_grade(&grades).unwrap().grade, 0.9);
    }

    #[test]
    fn average_grade_is_separate_from_latest() {
        let grades = vec![grade(5, 0.5), grade(1, 0.9)];
        assert_eq!(average_grade(&grades), Some(0.7));
        assert_ne!(average_grade(&grades), latest_grade(&grades).map(|g| g.grade));
    }

    #[test]
    fn none_max_submissions_means_unlimited() {
        let group = SubmissionGroup {
            id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            course_content_id: Uuid::new_v4(),
            max_group_size: 1,
            max_submissions: None,
            max_test_runs: None,
            join_code: None,
            created_at: Utc::now(),
        };
        assert!(!group.submissions_exhausted(1_000_000));
        assert!(!group.test_runs_exhausted(1_000_000));
    }
}
