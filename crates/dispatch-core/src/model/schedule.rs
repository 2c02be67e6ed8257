use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::JobId;

/// A dispatch cursor: exactly one active row per job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSchedule {
    pub job_id: JobId,
    pub next_run_time: DateTime<Utc>,
    pub last_run_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn schedule_serializes_with_job_id() {
        let s = JobSchedule {
            job_id: Ulid::new(),
            next_run_time: Utc::now(),
            last_run_time: None,
        };
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("job_id"));
        assert!(json.contains("next_run_time"));
    }
}
