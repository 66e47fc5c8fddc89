//! The outcome of one test execution against a `SubmissionArtifact`
//!. Status ints are pinned by the original
//! implementation (`ctutor_backend/api/tests.py`), not invented here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use uuid::Uuid;

/// `Result.status`, stored as `int` in the original system. Values are
/// load-bearing wire constants, not an arbitrary enum ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum ResultStatus {
    Finished = 0,
    Failed = 1,
    Cancelled = 2,
    Scheduled = 3,
    Pending = 4,
    Running = 5,
    Crashed = 6,
    Paused = 7,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown result status int: {0}")]
pub struct UnknownStatusInt(pub i32);

impl TryFrom<i32> for ResultStatus {
    type Error = UnknownStatusInt;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ResultStatus::Finished),
            1 => Ok(ResultStatus::Failed),
            2 => Ok(ResultStatus::Cancelled),
            3 => Ok(ResultStatus::Scheduled),
            4 => Ok(ResultStatus::Pending),
            5 => Ok(ResultStatus::Running),
            6 => Ok(ResultStatus::Crashed),
            7 => Ok(ResultStatus::Paused),
            other => Err(UnknownStatusInt(other)),
        }
    }
}

impl From<ResultStatus> for i32 {
    fn from(status: ResultStatus) -> Self {
        status as i32
    }
}

impl ResultStatus {
    /// Terminal states: `{0, 1, 2, 6}`.
    pub const TERMINAL: [ResultStatus; 4] = [
        ResultStatus::Finished,
        ResultStatus::Failed,
        ResultStatus::Cancelled,
        ResultStatus::Crashed,
    ];

    /// Non-terminal states eligible for the reconcile-on-query branch:
    /// `{3, 4, 5, 7}`.
    pub const NON_TERMINAL: [ResultStatus; 4] = [
        ResultStatus::Scheduled,
        ResultStatus::Pending,
        ResultStatus::Running,
        ResultStatus::Paused,
    ];

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    pub fn is_non_terminal(&self) -> bool {
        !self.is_terminal()
    }

    /// Excluded from the partial uniqueness index:
    /// `WHERE status NOT IN (1,2,6)`.
    pub fn counts_toward_uniqueness(&self) -> bool {
        !matches!(
            self,
            ResultStatus::Failed | ResultStatus::Cancelled | ResultStatus::Crashed
        )
    }

    pub fn as_wire_str(&self) -> &'static str {
        match self {
            ResultStatus::Finished => "finished",
            ResultStatus::Failed => "failed",
            ResultStatus::Cancelled => "cancelled",
            ResultStatus::Scheduled => "scheduled",
            ResultStatus::Pending => "pending",
            ResultStatus::Running => "running",
            ResultStatus::Crashed => "crashed",
            ResultStatus::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TestResult {
    pub id: Uuid,
    pub submission_artifact_id: Uuid,
    pub course_member_id: Uuid,
    pub course_content_id: Uuid,
    pub execution_backend_id: Uuid,
    /// Opaque workflow id in the task executor.
    pub test_system_id: String,
    #[sqlx(try_from = "i32")]
    pub status: ResultStatus,
    pub grade: Option<f64>,
    pub result_json: Option<serde_json::Value>,
    pub log_text: Option<String>,
    pub version_identifier: String,
    pub reference_version_identifier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TestResult {
    pub fn grade_in_range(grade: f64) -> bool {
        (0.0..=1.0).contains(&grade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ints_match_the_source_system() {
        assert_eq!(ResultStatus::Finished as i32, 0);
        assert_eq!(ResultStatus::Failed as i32, 1);
        assert_eq!(ResultStatus::Cancelled as i32, 2);
        assert_eq!(ResultStatus::Scheduled as i32, 3);
        assert_eq!(ResultStatus::Pending as i32, 4);
        assert_eq!(ResultStatus::Running as i32, 5);
        assert_eq!(ResultStatus::Crashed as i32, 6);
        assert_eq!(ResultStatus::Paused as i32, 7);
    }

    #[test]
    fn terminal_and_non_terminal_partition_all_states() {
        let all = [
            ResultStatus::Finished,
            ResultStatus::Failed,
            ResultStatus::Cancelled,
            ResultStatus::Scheduled,
            ResultStatus::Pending,
            ResultStatus::Running,
            ResultStatus::Crashed,
            ResultStatus::Paused,
        ];
        for status in all {
            assert_ne!(status.is_terminal(), status.is_non_terminal());
        }
    }

    #[test]
    fn uniqueness_excludes_failed_cancelled_crashed() {
        assert!(!ResultStatus::Failed.counts_toward_uniqueness());
        assert!(!ResultStatus::Cancelled.counts_toward_uniqueness());
        assert!(!ResultStatus::Crashed.counts_toward_uniqueness());
        assert!(ResultStatus::Running.counts_toward_uniqueness());
        assert!(ResultStatus::Finished.counts_toward_uniqueness());
    }

    #[test]
    fn try_from_rejects_unknown_ints() {
        assert!(ResultStatus::try_from(42).is_err());
        assert_eq!(ResultStatus::try_from(5), Ok(ResultStatus::Running));
    }
}
