//! HTTP-facing implementation of [`TaskExecutorAdapter`]. The wire
//! protocol to Temporal itself is opaque; this talks
//! to a REST gateway sidecar in front of it.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use computor_core::{ApiError, ComputorConfig};
use computor_testing::{TaskExecutorAdapter, TaskResult, WorkflowStatus};

pub struct HttpTaskExecutor {
    client: reqwest::Client,
    base_url: String,
    namespace: String,
}

impl HttpTaskExecutor {
    pub fn new(config: &ComputorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://{}:{}", config.temporal_host, config.temporal_port),
            namespace: config.temporal_namespace.clone(),
        }
    }
}

#[derive(Deserialize)]
struct SubmitResponse {
    workflow_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
}

#[derive(Deserialize)]
struct ResultResponse {
    status: String,
    error: Option<String>,
    result: Option<Value>,
}

fn parse_status(raw: &str) -> WorkflowStatus {
    match raw {
        "QUEUED" => WorkflowStatus::Queued,
        "STARTED" | "RUNNING" => WorkflowStatus::Started,
        "FINISHED" | "COMPLETED" => WorkflowStatus::Finished,
        "FAILED" => WorkflowStatus::Failed,
        "CANCELLED" => WorkflowStatus::Cancelled,
        "TIMED_OUT" => WorkflowStatus::TimedOut,
        "TERMINATED" => WorkflowStatus::Terminated,
        _ => WorkflowStatus::NotFound,
    }
}

#[async_trait]
impl TaskExecutorAdapter for HttpTaskExecutor {
    async fn submit_task(
        &self,
        name: &str,
        workflow_id: &str,
        parameters: Value,
        queue: &str,
    ) -> Result<String, ApiError> {
        let response = self
            .client
            .post(format!("{}/namespaces/{}/workflows", self.base_url, self.namespace))
            .json(&serde_json::json!({
                "workflow_type": name,
                "workflow_id": workflow_id,
                "task_queue": queue,
                "input": parameters,
            }))
            .send()
            .await
            .map_err(|err| ApiError::external(format!("task executor submit failed: {err}")))?;

        if !response.status().is_success() {
            return Err(ApiError::external(format!(
                "task executor rejected submission with status {}",
                response.status()
            )));
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|err| ApiError::external(format!("malformed submit response: {err}")))?;
        Ok(body.workflow_id)
    }

    async fn get_task_status(&self, workflow_id: &str) -> Result<WorkflowStatus, ApiError> {
        let response = self
            .client
            .get(format!(
                "{}/namespaces/{}/workflows/{workflow_id}/status",
                self.base_url, self.namespace
            ))
            .send()
            .await
            .map_err(|err| ApiError::external(format!("task executor status query failed: {err}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(WorkflowStatus::NotFound);
        }
        if !response.status().is_success() {
            return Err(ApiError::external(format!(
                "task executor status query returned {}",
                response.status()
            )));
        }

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|err| ApiError::external(format!("malformed status response: {err}")))?;
        Ok(parse_status(&body.status))
    }

    async fn get_task_result(&self, workflow_id: &str) -> Result<TaskResult, ApiError> {
        let response = self
            .client
            .get(format!(
                "{}/namespaces/{}/workflows/{workflow_id}/result",
                self.base_url, self.namespace
            ))
            .send()
            .await
            .map_err(|err| ApiError::external(format!("task executor result query failed: {err}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::workflow_not_found(workflow_id));
        }
        if !response.status().is_success() {
            return Err(ApiError::external(format!(
                "task executor result query returned {}",
                response.status()
            )));
        }

        let body: ResultResponse = response
            .json()
            .await
            .map_err(|err| ApiError::external(format!("malformed result response: {err}")))?;
        Ok(TaskResult {
            status: parse_status(&body.status),
            error: body.error,
            result_json: body.result,
        })
    }
}
