//! The task executor adapter: an opaque capability
//! interface to a workflow engine. Nothing in this crate depends on the
//! engine's internals beyond this trait.

use async_trait::async_trait;
use computor_core::ApiError;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Queued,
    Started,
    Finished,
    Failed,
    Cancelled,
    TimedOut,
    Terminated,
    NotFound,
}

impl WorkflowStatus {
    /// Whether the scheduler should keep waiting rather than reconcile.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, WorkflowStatus::Queued | WorkflowStatus::Started)
    }
}

#[derive(Debug, Clone)]
pub struct TaskResult {
    pub status: WorkflowStatus,
    pub error: Option<String>,
    pub result_json: Option<Value>,
}

#[async_trait]
pub trait TaskExecutorAdapter: Send + Sync {
    /// Must be idempotent on `workflow_id`: submitting the same id twice
    /// is a no-op on the second call.
    async fn submit_task(
        &self,
        name: &str,
        workflow_id: &str,
        parameters: Value,
        queue: &str,
    ) -> Result<String, ApiError>;

    async fn get_task_status(&self, workflow_id: &str) -> Result<WorkflowStatus, ApiError>;

    async fn get_task_result(&self, workflow_id: &str) -> Result<TaskResult, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_and_started_are_in_flight() {
        assert!(WorkflowStatus::Queued.is_in_flight());
        assert!(WorkflowStatus::Started.is_in_flight());
        assert!(!WorkflowStatus::Finished.is_in_flight());
    }
}
