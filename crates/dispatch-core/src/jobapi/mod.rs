//! Typed wrapper over the Job API's REST surface, the only way the
//! scheduler and worker touch job/schedule/execution state (no direct
//! store access from either subsystem). Bearer token acquired lazily via
//! OAuth2 client-credentials and refreshed once on a `401`.

mod auth;

pub use auth::Auth0Client;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::model::{
    Job, JobExecution, JobExecutionCreateRequest, JobExecutionUpdateRequest, JobId, JobSchedule,
    JobUpdateRequest,
};
use crate::{Error, Result};

/// Standard `{ message, data }` response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[allow(dead_code)]
    message: String,
    data: T,
}

/// The scheduler/reporter's view of the Job API, factored out so tests can
/// swap a stub in for the real `reqwest`-backed client.
#[async_trait::async_trait]
pub trait JobApi: Send + Sync {
    async fn get_schedules(&self, t0: DateTime<Utc>, t1: DateTime<Utc>) -> Result<Vec<JobSchedule>>;
    async fn get_job(&self, job_id: JobId) -> Result<Job>;
    async fn update_job(&self, job_id: JobId, body: &JobUpdateRequest) -> Result<Job>;
    async fn create_execution(&self, body: &JobExecutionCreateRequest) -> Result<JobExecution>;
    async fn update_execution(
        &self,
        execution_id: uuid::Uuid,
        body: &JobExecutionUpdateRequest,
    ) -> Result<JobExecution>;
}

pub struct JobApiClient {
    http: reqwest::Client,
    base_url: String,
    auth: Auth0Client,
}

impl JobApiClient {
    pub fn new(base_url: impl Into<String>, auth: Auth0Client) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            auth,
        }
    }

    /// Sends one request, retrying exactly once with a freshly acquired
    /// token if the first attempt comes back `401`.
    async fn send<T: DeserializeOwned>(
        &self,
        build: impl Fn(&str) -> reqwest::RequestBuilder,
    ) -> Result<T> {
        let token = self.auth.token().await?;
        let response = build(&token).send().await?;

        let response = if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            let token = self.auth.refresh_token().await?;
            build(&token).send().await?
        } else {
            response
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::transport(format!("job api {}: {}", status, body)));
        }

        let envelope: ApiResponse<T> = response.json().await?;
        Ok(envelope.data)
    }

    /// `GET /schedules?next_run_time[gte]=t0&next_run_time[lt]=t1`
    pub async fn get_schedules(&self, t0: DateTime<Utc>, t1: DateTime<Utc>) -> Result<Vec<JobSchedule>> {
        let url = format!("{}/api/v1/schedules", self.base_url);
        self.send(|token| {
            self.http
                .get(&url)
                .bearer_auth(token)
                .query(&[
                    ("next_run_time[gte]", t0.to_rfc3339()),
                    ("next_run_time[lt]", t1.to_rfc3339()),
                ])
        })
        .await
    }

    /// `GET /jobs/{id}`
    pub async fn get_job(&self, job_id: JobId) -> Result<Job> {
        let url = format!("{}/api/v1/jobs/{}", self.base_url, job_id);
        self.send(|token| self.http.get(&url).bearer_auth(token)).await
    }

    /// `PATCH /jobs/{id}`
    pub async fn update_job(&self, job_id: JobId, body: &JobUpdateRequest) -> Result<Job> {
        let url = format!("{}/api/v1/jobs/{}", self.base_url, job_id);
        self.send(|token| self.http.patch(&url).bearer_auth(token).json(body)).await
    }

    /// `POST /executions`
    pub async fn create_execution(&self, body: &JobExecutionCreateRequest) -> Result<JobExecution> {
        let url = format!("{}/api/v1/executions", self.base_url);
        self.send(|token| self.http.post(&url).bearer_auth(token).json(body)).await
    }

    /// `PATCH /executions/{id}`
    pub async fn update_execution(
        &self,
        execution_id: uuid::Uuid,
        body: &JobExecutionUpdateRequest,
    ) -> Result<JobExecution> {
        let url = format!("{}/api/v1/executions/{}", self.base_url, execution_id);
        self.send(|token| self.http.patch(&url).bearer_auth(token).json(body)).await
    }
}

#[async_trait::async_trait]
impl JobApi for JobApiClient {
    async fn get_schedules(&self, t0: DateTime<Utc>, t1: DateTime<Utc>) -> Result<Vec<JobSchedule>> {
        JobApiClient::get_schedules(self, t0, t1).await
    }

    async fn get_job(&self, job_id: JobId) -> Result<Job> {
        JobApiClient::get_job(self, job_id).await
    }

    async fn update_job(&self, job_id: JobId, body: &JobUpdateRequest) -> Result<Job> {
        JobApiClient::update_job(self, job_id, body).await
    }

    async fn create_execution(&self, body: &JobExecutionCreateRequest) -> Result<JobExecution> {
        JobApiClient::create_execution(self, body).await
    }

    async fn update_execution(
        &self,
        execution_id: uuid::Uuid,
        body: &JobExecutionUpdateRequest,
    ) -> Result<JobExecution> {
        JobApiClient::update_execution(self, execution_id, body).await
    }
}

/// Filter-encoding builder for `<column>[<op>]=<value>` query keys, per the
/// `GET /schedules`/`GET /jobs` filter grammar. Only `GetSchedules` above
/// needs `gte`/`lt`, but the grammar supports all five operators.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterBuilder {
    #[serde(flatten)]
    params: std::collections::HashMap<String, String>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.params.insert(column.to_string(), value.to_string());
        self
    }

    fn op(mut self, column: &str, op: &str, value: impl ToString) -> Self {
        self.params.insert(format!("{}[{}]", column, op), value.to_string());
        self
    }

    pub fn gte(self, column: &str, value: impl ToString) -> Self {
        self.op(column, "gte", value)
    }
    pub fn lte(self, column: &str, value: impl ToString) -> Self {
        self.op(column, "lte", value)
    }
    pub fn gt(self, column: &str, value: impl ToString) -> Self {
        self.op(column, "gt", value)
    }
    pub fn lt(self, column: &str, value: impl ToString) -> Self {
        self.op(column, "lt", value)
    }
    pub fn contains(self, column: &str, value: impl ToString) -> Self {
        self.op(column, "contains", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_builder_encodes_bracketed_operators() {
        let filter = FilterBuilder::new().gte("next_run_time", "t0").lt("next_run_time", "t1");
        assert_eq!(filter.params.get("next_run_time[gte]").unwrap(), "t0");
        assert_eq!(filter.params.get("next_run_time[lt]").unwrap(), "t1");
    }

    #[test]
    fn bare_column_means_equality() {
        let filter = FilterBuilder::new().eq("status", "pending");
        assert_eq!(filter.params.get("status").unwrap(), "pending");
    }
}
