use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Lexicographically sortable, base32-rendered job identifier.
pub type JobId = Ulid;

/// How often a job's schedule rearms after a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobFrequency {
    OneTime,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for JobFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobFrequency::OneTime => "one-time",
            JobFrequency::Hourly => "hourly",
            JobFrequency::Daily => "daily",
            JobFrequency::Weekly => "weekly",
            JobFrequency::Monthly => "monthly",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for JobFrequency {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one-time" => Ok(JobFrequency::OneTime),
            "hourly" => Ok(JobFrequency::Hourly),
            "daily" => Ok(JobFrequency::Daily),
            "weekly" => Ok(JobFrequency::Weekly),
            "monthly" => Ok(JobFrequency::Monthly),
            other => Err(crate::Error::other(format!("unknown job frequency: {}", other))),
        }
    }
}

/// A job's position in the status graph described in the reporter (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Ready,
    Pending,
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

impl JobStatus {
    /// Jobs only dispatch out of `pending`; every other status means a tick
    /// must skip the row (duplicate-dispatch guard, §4.5 step 3b).
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, JobStatus::Pending)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Ready => "ready",
            JobStatus::Pending => "pending",
            JobStatus::Scheduled => "scheduled",
            JobStatus::InProgress => "in-progress",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for JobStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(JobStatus::Ready),
            "pending" => Ok(JobStatus::Pending),
            "scheduled" => Ok(JobStatus::Scheduled),
            "in-progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "cancelled" => Ok(JobStatus::Cancelled),
            "failed" => Ok(JobStatus::Failed),
            other => Err(crate::Error::other(format!("unknown job status: {}", other))),
        }
    }
}

/// The user's declarative work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub user_id: String,
    pub job_name: String,
    pub job_description: String,
    #[serde(default)]
    pub job_metadata: serde_json::Value,
    pub frequency: JobFrequency,
    pub execution_time: DateTime<Utc>,
    pub max_retries: u32,
    #[serde(default)]
    pub retry_count: u32,
    /// Opaque HTML document; [`crate::extract::extract`] pulls fenced code
    /// blocks out of it.
    pub payload: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn can_retry(&self) -> bool {
        self.retry_count <= self.max_retries
    }
}

/// Partial-update body sent to `PATCH /jobs/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobUpdateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

impl JobUpdateRequest {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            retry_count: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_display_and_from_str() {
        for status in [
            JobStatus::Ready,
            JobStatus::Pending,
            JobStatus::Scheduled,
            JobStatus::InProgress,
            JobStatus::Completed,
            JobStatus::Cancelled,
            JobStatus::Failed,
        ] {
            let rendered = status.to_string();
            assert_eq!(JobStatus::from_str(&rendered).unwrap(), status);
        }
    }

    #[test]
    fn only_pending_is_dispatchable() {
        assert!(JobStatus::Pending.is_dispatchable());
        assert!(!JobStatus::Scheduled.is_dispatchable());
        assert!(!JobStatus::Ready.is_dispatchable());
    }

    #[test]
    fn can_retry_respects_max() {
        let mut job = sample_job();
        job.max_retries = 2;
        job.retry_count = 2;
        assert!(job.can_retry());
        job.retry_count = 3;
        assert!(!job.can_retry());
    }

    fn sample_job() -> Job {
        let now = Utc::now();
        Job {
            job_id: Ulid::new(),
            user_id: "u1".into(),
            job_name: "test".into(),
            job_description: String::new(),
            job_metadata: serde_json::Value::Null,
            frequency: JobFrequency::OneTime,
            execution_time: now,
            max_retries: 0,
            retry_count: 0,
            payload: String::new(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}
