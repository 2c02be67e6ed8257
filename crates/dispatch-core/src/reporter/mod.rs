//! Execution lifecycle state machine. Every transition is emitted through
//! the Job API client; the cross-effect that patches the owning job on
//! `failed`/`cancelled`/`in-progress` executions lives here rather than in
//! the raw client, since it's the reporter's concern, not the transport's.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::jobapi::JobApi;
use crate::model::{
    ExecutionId, JobExecution, JobExecutionCreateRequest, JobExecutionStatus, JobExecutionUpdateRequest,
    JobId, JobStatus, JobUpdateRequest,
};
use crate::Result;

/// Outcome of one runner attempt, passed to [`Reporter::complete_execution`].
pub struct RunnerResponse {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub output: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct Reporter {
    api: Arc<dyn JobApi>,
    worker_id: String,
}

impl Reporter {
    pub fn new(api: Arc<dyn JobApi>, worker_id: impl Into<String>) -> Self {
        Self {
            api,
            worker_id: worker_id.into(),
        }
    }

    /// `RegisterExecution`: POSTs `{job_id, worker_id, status=scheduled}`.
    pub async fn register_execution(&self, job_id: JobId) -> Result<JobExecution> {
        self.api
            .create_execution(&JobExecutionCreateRequest {
                job_id,
                worker_id: self.worker_id.clone(),
                status: JobExecutionStatus::Scheduled,
            })
            .await
    }

    /// `StartExecution`: PATCHes `status=in-progress`, then patches the
    /// owning job to `in-progress` too.
    pub async fn start_execution(&self, execution: &JobExecution) -> Result<JobExecution> {
        let updated = self
            .api
            .update_execution(
                execution.execution_id,
                &JobExecutionUpdateRequest {
                    status: Some(JobExecutionStatus::InProgress),
                    ..Default::default()
                },
            )
            .await?;
        self.api
            .update_job(execution.job_id, &JobUpdateRequest::status(JobStatus::InProgress))
            .await?;
        Ok(updated)
    }

    /// `CompleteExecution`: PATCHes `{start_time, end_time, status, output,
    /// error_message}`, where `status` is `completed` if `response.error`
    /// is `None`, else `failed`. On `failed` (or `cancelled`, which the
    /// core itself never produces but a future caller might), the owning
    /// job is patched back to `ready` so it can be re-armed.
    pub async fn complete_execution(
        &self,
        execution_id: ExecutionId,
        job_id: JobId,
        response: RunnerResponse,
    ) -> Result<JobExecution> {
        let status = if response.error.is_none() {
            JobExecutionStatus::Completed
        } else {
            JobExecutionStatus::Failed
        };

        let updated = self
            .api
            .update_execution(
                execution_id,
                &JobExecutionUpdateRequest {
                    start_time: Some(response.start_time),
                    end_time: Some(response.end_time),
                    status: Some(status),
                    output: response.output,
                    error_message: response.error,
                },
            )
            .await?;

        if matches!(status, JobExecutionStatus::Failed | JobExecutionStatus::Cancelled) {
            self.api
                .update_job(job_id, &JobUpdateRequest::status(JobStatus::Ready))
                .await?;
        }

        Ok(updated)
    }
}
