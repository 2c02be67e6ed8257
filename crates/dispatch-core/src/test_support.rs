//! Stub [`crate::jobapi::JobApi`] shared by the scheduler and runner test
//! suites, standing in for the real `reqwest`-backed client the way the
//! teacher's `MockHandler` stands in for a real `JobHandler`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::jobapi::JobApi;
use crate::model::{
    Job, JobExecution, JobExecutionCreateRequest, JobExecutionUpdateRequest, JobId, JobSchedule, JobUpdateRequest,
};
use crate::{Error, Result};

#[derive(Default)]
pub struct StubJobApi {
    pub schedules: Mutex<Vec<JobSchedule>>,
    pub jobs: Mutex<HashMap<JobId, Job>>,
    pub executions: Mutex<HashMap<Uuid, JobExecution>>,
    pub update_job_calls: Mutex<Vec<(JobId, JobUpdateRequest)>>,
}

impl StubJobApi {
    pub fn with_job(job: Job) -> Self {
        let stub = Self::default();
        stub.jobs.lock().unwrap().insert(job.job_id, job);
        stub
    }

    pub fn update_job_call_count(&self) -> usize {
        self.update_job_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl JobApi for StubJobApi {
    async fn get_schedules(&self, _t0: DateTime<Utc>, _t1: DateTime<Utc>) -> Result<Vec<JobSchedule>> {
        Ok(self.schedules.lock().unwrap().clone())
    }

    async fn get_job(&self, job_id: JobId) -> Result<Job> {
        self.jobs
            .lock()
            .unwrap()
            .get(&job_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("job {job_id}")))
    }

    async fn update_job(&self, job_id: JobId, body: &JobUpdateRequest) -> Result<Job> {
        self.update_job_calls.lock().unwrap().push((job_id, body.clone()));
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::not_found(format!("job {job_id}")))?;
        if let Some(status) = body.status {
            job.status = status;
        }
        if let Some(retry_count) = body.retry_count {
            job.retry_count = retry_count;
        }
        Ok(job.clone())
    }

    async fn create_execution(&self, body: &JobExecutionCreateRequest) -> Result<JobExecution> {
        let execution = JobExecution {
            execution_id: Uuid::new_v4(),
            job_id: body.job_id,
            worker_id: body.worker_id.clone(),
            start_time: None,
            end_time: None,
            status: body.status,
            output: None,
            error_message: None,
        };
        self.executions.lock().unwrap().insert(execution.execution_id, execution.clone());
        Ok(execution)
    }

    async fn update_execution(
        &self,
        execution_id: Uuid,
        body: &JobExecutionUpdateRequest,
    ) -> Result<JobExecution> {
        let mut executions = self.executions.lock().unwrap();
        let execution = executions
            .get_mut(&execution_id)
            .ok_or_else(|| Error::not_found(format!("execution {execution_id}")))?;
        if let Some(start_time) = body.start_time {
            execution.start_time = Some(start_time);
        }
        if let Some(end_time) = body.end_time {
            execution.end_time = Some(end_time);
        }
        if let Some(status) = body.status {
            execution.status = status;
        }
        if body.output.is_some() {
            execution.output = body.output.clone();
        }
        if body.error_message.is_some() {
            execution.error_message = body.error_message.clone();
        }
        Ok(execution.clone())
    }
}
