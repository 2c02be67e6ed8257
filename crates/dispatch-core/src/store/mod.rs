//! Process-wide CQL session singleton plus thin per-table repositories.
//!
//! This is the store side of the Job API's persistence (the HTTP CRUD
//! surface built on top is out of core scope, per the purpose statement).
//! Session initialization mirrors the lazily-cached connection shape used
//! for the AMQP pool: `{host, port, keyspace}` in, one shared session out.
//! Discipline: one query per operation, no multi-statement transactions;
//! because `status` participates in the primary key of `jobs` (and
//! `worker_id, status` in `job_executions`), updates to those columns are
//! implemented as delete-then-insert.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use scylla::{Session, SessionBuilder};
use tokio::sync::OnceCell;
use tracing::info;

use crate::model::{Job, JobExecution, JobExecutionStatus, JobFrequency, JobId, JobSchedule, JobStatus};
use crate::{config::CassandraConfig, Error, Result};

/// Lexicographic job rows are stored with millisecond-resolution bigints;
/// this is the one place that conversion happens in both directions.
fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| Error::other("timestamp out of range"))
}

/// Lazily-initialized, process-wide CQL session.
#[derive(Clone)]
pub struct CqlStore {
    config: Arc<CassandraConfig>,
    session: Arc<OnceCell<Session>>,
}

impl CqlStore {
    pub fn new(config: CassandraConfig) -> Self {
        Self {
            config: Arc::new(config),
            session: Arc::new(OnceCell::new()),
        }
    }

    async fn session(&self) -> Result<&Session> {
        self.session
            .get_or_try_init(|| async {
                let uri = format!("{}:{}", self.config.host, self.config.port);
                info!(host = %self.config.host, keyspace = %self.config.keyspace, "opening cql session");
                let session = SessionBuilder::new()
                    .known_node(uri)
                    .use_keyspace(&self.config.keyspace, false)
                    .build()
                    .await?;
                Ok::<_, Error>(session)
            })
            .await
    }

    /// `GET /schedules?next_run_time[gte]=t0&next_run_time[lt]=t1` at the
    /// storage layer: a clustering-key range scan over `job_schedules`.
    pub async fn get_schedules_in_window(
        &self,
        t0: DateTime<Utc>,
        t1: DateTime<Utc>,
    ) -> Result<Vec<JobSchedule>> {
        let session = self.session().await?;
        let query = "SELECT job_id, next_run_time, last_run_time FROM job_schedules \
                      WHERE next_run_time >= ? AND next_run_time < ? ALLOW FILTERING";
        let result = session
            .query(query, (t0.timestamp_millis(), t1.timestamp_millis()))
            .await?;

        let rows = result.rows_typed::<(String, i64, Option<i64>)>()?;
        let mut schedules = Vec::new();
        for row in rows {
            let (job_id, next_run_time, last_run_time) = row?;
            schedules.push(JobSchedule {
                job_id: JobId::from_str(&job_id)?,
                next_run_time: millis_to_datetime(next_run_time)?,
                last_run_time: last_run_time.map(millis_to_datetime).transpose()?,
            });
        }
        Ok(schedules)
    }

    pub async fn get_job(&self, user_id: &str, job_id: JobId) -> Result<Option<Job>> {
        let session = self.session().await?;
        let query = "SELECT user_id, job_id, status, job_name, job_description, job_metadata, \
                      frequency, execution_time, max_retries, retry_count, payload, created_at, updated_at \
                      FROM jobs WHERE user_id = ? AND job_id = ?";
        let result = session.query(query, (user_id, job_id.to_string())).await?;

        let mut rows = result.rows_typed::<(
            String,
            String,
            String,
            String,
            String,
            Option<String>,
            String,
            i64,
            i32,
            i32,
            String,
            i64,
            i64,
        )>()?;

        let Some(row) = rows.next() else {
            return Ok(None);
        };
        let (
            user_id,
            job_id,
            status,
            job_name,
            job_description,
            job_metadata,
            frequency,
            execution_time,
            max_retries,
            retry_count,
            payload,
            created_at,
            updated_at,
        ) = row?;

        Ok(Some(Job {
            job_id: JobId::from_str(&job_id)?,
            user_id,
            job_name,
            job_description,
            job_metadata: job_metadata
                .map(|raw| serde_json::from_str(&raw))
                .transpose()?
                .unwrap_or(serde_json::Value::Null),
            frequency: JobFrequency::from_str(&frequency)?,
            execution_time: millis_to_datetime(execution_time)?,
            max_retries: max_retries as u32,
            retry_count: retry_count as u32,
            payload,
            status: JobStatus::from_str(&status)?,
            created_at: millis_to_datetime(created_at)?,
            updated_at: millis_to_datetime(updated_at)?,
        }))
    }

    /// `status` is part of `jobs`' primary key, so an update that changes it
    /// is a delete of the old row followed by an insert of the new one.
    pub async fn update_job_status(&self, job: &Job, previous_status: JobStatus) -> Result<()> {
        let session = self.session().await?;
        session
            .query(
                "DELETE FROM jobs WHERE user_id = ? AND job_id = ? AND status = ?",
                (&job.user_id, job.job_id.to_string(), previous_status.to_string()),
            )
            .await?;
        session
            .query(
                "INSERT INTO jobs (user_id, job_id, status, job_name, job_description, job_metadata, \
                 frequency, execution_time, max_retries, retry_count, payload, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &job.user_id,
                    job.job_id.to_string(),
                    job.status.to_string(),
                    &job.job_name,
                    &job.job_description,
                    serde_json::to_string(&job.job_metadata)?,
                    job.frequency.to_string(),
                    job.execution_time.timestamp_millis(),
                    job.max_retries,
                    job.retry_count,
                    &job.payload,
                    job.created_at.timestamp_millis(),
                    job.updated_at.timestamp_millis(),
                ),
            )
            .await?;
        Ok(())
    }

    pub async fn create_execution(&self, execution: &JobExecution) -> Result<()> {
        let session = self.session().await?;
        session
            .query(
                "INSERT INTO job_executions (job_id, worker_id, status, execution_id, start_time, end_time, output, error_message) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    execution.job_id.to_string(),
                    &execution.worker_id,
                    execution.status.to_string(),
                    execution.execution_id.to_string(),
                    execution.start_time.map(|t| t.timestamp_millis()),
                    execution.end_time.map(|t| t.timestamp_millis()),
                    execution.output.clone(),
                    execution.error_message.clone(),
                ),
            )
            .await?;
        Ok(())
    }

    /// `worker_id, status` is `job_executions`' clustering key, so a status
    /// change is delete-then-insert exactly as for `jobs`.
    pub async fn update_execution_status(
        &self,
        execution: &JobExecution,
        previous_status: JobExecutionStatus,
    ) -> Result<()> {
        let session = self.session().await?;
        session
            .query(
                "DELETE FROM job_executions WHERE job_id = ? AND worker_id = ? AND status = ?",
                (
                    execution.job_id.to_string(),
                    &execution.worker_id,
                    previous_status.to_string(),
                ),
            )
            .await?;
        self.create_execution(execution).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_round_trips_through_datetime() {
        let now = Utc::now();
        // truncate to millisecond precision, same as the wire format
        let millis = now.timestamp_millis();
        let recovered = millis_to_datetime(millis).unwrap();
        assert_eq!(recovered.timestamp_millis(), millis);
    }

    #[test]
    fn rejects_out_of_range_timestamps() {
        assert!(millis_to_datetime(i64::MAX).is_err());
    }
}
