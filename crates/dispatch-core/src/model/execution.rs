use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::job::JobId;

pub type ExecutionId = Uuid;

/// States and allowed transitions, per the reporter's state machine:
///
/// ```text
/// scheduled --start--> in-progress --complete(ok)--> completed
///                                  --complete(err)--> failed
/// scheduled --complete(err)-------> failed   (runner failure before start)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobExecutionStatus {
    Scheduled,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobExecutionStatus {
    /// `completed`/`failed`/`cancelled` are terminal: no outgoing edges.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobExecutionStatus::Completed | JobExecutionStatus::Failed | JobExecutionStatus::Cancelled
        )
    }
}

impl fmt::Display for JobExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobExecutionStatus::Scheduled => "scheduled",
            JobExecutionStatus::InProgress => "in-progress",
            JobExecutionStatus::Completed => "completed",
            JobExecutionStatus::Failed => "failed",
            JobExecutionStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// One attempted run of a job. Created by the worker on receipt, mutated
/// only by the same worker, never deleted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub execution_id: ExecutionId,
    pub job_id: JobId,
    pub worker_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub status: JobExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobExecution {
    /// `end_time >= start_time` when both are set; `error_message` is
    /// `Some` iff the terminal status is `failed`.
    pub fn is_consistent(&self) -> bool {
        let times_ok = match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end >= start,
            _ => true,
        };
        let error_ok = (self.status == JobExecutionStatus::Failed) == self.error_message.is_some();
        times_ok && error_ok
    }
}

/// Body posted to `POST /executions` (§4.3, §4.4 `RegisterExecution`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionCreateRequest {
    pub job_id: JobId,
    pub worker_id: String,
    pub status: JobExecutionStatus,
}

/// Partial-update body for `PATCH /executions/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobExecutionUpdateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobExecutionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn base() -> JobExecution {
        JobExecution {
            execution_id: Uuid::new_v4(),
            job_id: Ulid::new(),
            worker_id: "w1".into(),
            start_time: None,
            end_time: None,
            status: JobExecutionStatus::Scheduled,
            output: None,
            error_message: None,
        }
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_edges() {
        assert!(JobExecutionStatus::Completed.is_terminal());
        assert!(JobExecutionStatus::Failed.is_terminal());
        assert!(JobExecutionStatus::Cancelled.is_terminal());
        assert!(!JobExecutionStatus::Scheduled.is_terminal());
        assert!(!JobExecutionStatus::InProgress.is_terminal());
    }

    #[test]
    fn consistency_requires_error_message_iff_failed() {
        let mut e = base();
        e.status = JobExecutionStatus::Failed;
        assert!(!e.is_consistent());
        e.error_message = Some("boom".into());
        assert!(e.is_consistent());

        e.status = JobExecutionStatus::Completed;
        assert!(!e.is_consistent());
        e.error_message = None;
        assert!(e.is_consistent());
    }

    #[test]
    fn consistency_requires_end_after_start() {
        let mut e = base();
        let now = Utc::now();
        e.start_time = Some(now);
        e.end_time = Some(now - chrono::Duration::seconds(1));
        assert!(!e.is_consistent());
        e.end_time = Some(now + chrono::Duration::seconds(1));
        assert!(e.is_consistent());
    }
}
