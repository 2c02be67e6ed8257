//! Periodic window query + enqueue + status transition
//! `pending` -> `scheduled`.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{error, info, warn};

use crate::jobapi::JobApi;
use crate::model::JobUpdateRequest;
use crate::queue::QueuePool;

const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);
const LOOKAHEAD: Duration = Duration::seconds(60);
const WINDOW_WIDTH: Duration = Duration::seconds(60);

pub struct Scheduler {
    api: Arc<dyn JobApi>,
    queue: QueuePool,
}

impl Scheduler {
    pub fn new(api: Arc<dyn JobApi>, queue: QueuePool) -> Self {
        Self { api, queue }
    }

    /// Runs until a shutdown signal is observed. Ticks every 30s (and once
    /// immediately at startup), stopping the ticker and returning once
    /// in-flight work for the current tick completes.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        self.tick().await;

        let mut interval = tokio::time::interval(TICK_INTERVAL);
        // the startup tick above already consumed one period's worth of work
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    info!("scheduler received shutdown signal, stopping");
                    return;
                }
            }
        }
    }

    /// One pass: `t0 = now+60s`, `t1 = t0+60s`; fetch schedules in
    /// `[t0, t1)`, publish each still-`pending` job, and mark it
    /// `scheduled`.
    ///
    /// A failure handling one row is logged and the loop continues to the
    /// next row within the same tick — unlike the earlier implementation,
    /// which aborted the whole tick on the first error.
    pub async fn tick(&self) {
        let now = Utc::now();
        let t0 = now + LOOKAHEAD;
        let t1 = t0 + WINDOW_WIDTH;

        let schedules = match self.api.get_schedules(t0, t1).await {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to fetch schedules for window");
                return;
            }
        };

        for schedule in schedules {
            if let Err(e) = self.dispatch_one(schedule.job_id).await {
                warn!(job_id = %schedule.job_id, error = %e, "failed to dispatch schedule row, continuing tick");
            }
        }
    }

    async fn dispatch_one(&self, job_id: crate::model::JobId) -> crate::Result<()> {
        let job = self.api.get_job(job_id).await?;

        if !job.status.is_dispatchable() {
            return Ok(());
        }

        let body = serde_json::to_vec(&job)?;
        self.queue.publish(&body).await?;
        self.api
            .update_job(job.job_id, &JobUpdateRequest::status(crate::model::JobStatus::Scheduled))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RabbitConfig;
    use crate::model::{Job, JobFrequency, JobId, JobSchedule, JobStatus};
    use crate::test_support::StubJobApi;
    use ulid::Ulid;

    fn sample_job(job_id: JobId, status: JobStatus) -> Job {
        let now = Utc::now();
        Job {
            job_id,
            user_id: "u1".into(),
            job_name: "test".into(),
            job_description: String::new(),
            job_metadata: serde_json::Value::Null,
            frequency: JobFrequency::OneTime,
            execution_time: now,
            max_retries: 0,
            retry_count: 0,
            payload: String::new(),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Dialing a real broker is required to exercise `publish`, matching
    /// the teacher's `if let Ok(pool) = pool { ... }` pattern for tests
    /// that need live infrastructure; absent a broker the test is a no-op.
    async fn queue_or_skip() -> Option<QueuePool> {
        let queue = QueuePool::new(RabbitConfig::default());
        match queue.publish(b"probe").await {
            Ok(()) => Some(queue),
            Err(_) => None,
        }
    }

    #[tokio::test]
    async fn schedule_hit_window_dispatches_pending_job() {
        let Some(queue) = queue_or_skip().await else { return };

        let job_id = Ulid::new();
        let api = Arc::new(StubJobApi::with_job(sample_job(job_id, JobStatus::Pending)));
        api.schedules.lock().unwrap().push(JobSchedule {
            job_id,
            next_run_time: Utc::now(),
            last_run_time: None,
        });

        let scheduler = Scheduler::new(api.clone(), queue);
        scheduler.dispatch_one(job_id).await.unwrap();

        assert_eq!(api.update_job_call_count(), 1);
        assert_eq!(api.jobs.lock().unwrap().get(&job_id).unwrap().status, JobStatus::Scheduled);
    }

    #[tokio::test]
    async fn schedule_miss_window_no_schedules_dispatches_nothing() {
        // An empty schedule window never reaches `queue.publish`, so this
        // doesn't need a live broker the way the dispatch tests below do.
        let queue = QueuePool::new(RabbitConfig::default());
        let api = Arc::new(StubJobApi::default());
        let scheduler = Scheduler::new(api.clone(), queue);
        scheduler.tick().await;

        assert_eq!(api.update_job_call_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_tick_suppresses_second_dispatch() {
        let Some(queue) = queue_or_skip().await else { return };

        let job_id = Ulid::new();
        let api = Arc::new(StubJobApi::with_job(sample_job(job_id, JobStatus::Pending)));
        let scheduler = Scheduler::new(api.clone(), queue);

        scheduler.dispatch_one(job_id).await.unwrap();
        assert_eq!(api.update_job_call_count(), 1);

        // Second tick over the same row: the job is now `scheduled`, not
        // `pending`, so the at-most-once-per-window invariant holds and the
        // row is skipped without another publish or patch.
        scheduler.dispatch_one(job_id).await.unwrap();
        assert_eq!(api.update_job_call_count(), 1);
    }

    #[tokio::test]
    async fn non_pending_job_is_never_dispatched() {
        // `dispatch_one` returns before touching the queue for a non-pending
        // row, so no live broker is needed here.
        let queue = QueuePool::new(RabbitConfig::default());
        let job_id = Ulid::new();
        let api = Arc::new(StubJobApi::with_job(sample_job(job_id, JobStatus::InProgress)));
        let scheduler = Scheduler::new(api.clone(), queue);

        scheduler.dispatch_one(job_id).await.unwrap();
        assert_eq!(api.update_job_call_count(), 0);
    }
}
