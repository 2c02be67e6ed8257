//! Consumes the job queue, reserves a sandbox, waits to start, runs the
//! first extracted code block under `isolate`, and reports the outcome.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::extract::{self, CodeBlock};
use crate::model::{Job, JobId};
use crate::queue::QueuePool;
use crate::reporter::{Reporter, RunnerResponse};
use crate::sandbox::SandboxPool;
use crate::{Error, Result};

const EXECUTION_DEADLINE: Duration = Duration::from_secs(120);
const ISOLATE_WAIT_DELAY: Duration = Duration::from_secs(110);
const START_LEAD_IN: chrono::Duration = chrono::Duration::seconds(10);

pub struct WorkerService {
    queue: QueuePool,
    pool: Arc<SandboxPool>,
    reporter: Reporter,
    worker_id: String,
    temp_dir: String,
}

impl WorkerService {
    pub fn new(queue: QueuePool, pool: Arc<SandboxPool>, reporter: Reporter, worker_id: impl Into<String>, temp_dir: impl Into<String>) -> Self {
        Self {
            queue,
            pool,
            reporter,
            worker_id: worker_id.into(),
            temp_dir: temp_dir.into(),
        }
    }

    /// Dials AMQP, consumes with auto-ack, and processes each delivery
    /// inline (no per-job task) — at most one sandbox per user is held
    /// concurrently by this process.
    pub async fn run(&self) -> Result<()> {
        let mut consumer = self.queue.consume(&self.worker_id).await?;
        info!(worker_id = %self.worker_id, "worker consuming from queue");

        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(d) => d,
                Err(e) => {
                    error!(error = %e, "amqp delivery error");
                    continue;
                }
            };

            if let Err(e) = self.process_message(&delivery.data).await {
                error!(error = %e, "failed to process job message");
            }
        }

        Ok(())
    }

    async fn process_message(&self, body: &[u8]) -> Result<()> {
        let job: Job = serde_json::from_slice(body)?;
        self.process_job(job).await
    }

    async fn process_job(&self, job: Job) -> Result<()> {
        let execution = self.reporter.register_execution(job.job_id).await?;

        let blocks = extract::extract(&job.payload);
        let Some(block) = blocks.into_iter().next() else {
            // Nothing to run; report a failed execution without touching the pool.
            self.reporter
                .complete_execution(
                    execution.execution_id,
                    job.job_id,
                    RunnerResponse {
                        start_time: Utc::now(),
                        end_time: Utc::now(),
                        output: None,
                        error: Some("no code blocks found in payload".into()),
                    },
                )
                .await?;
            return Ok(());
        };

        let sandbox = match self.pool.reserve(&job.user_id) {
            Ok(s) => s,
            Err(Error::SandboxBusy) => {
                self.reporter
                    .complete_execution(
                        execution.execution_id,
                        job.job_id,
                        RunnerResponse {
                            start_time: Utc::now(),
                            end_time: Utc::now(),
                            output: None,
                            error: Some("sandbox busy".into()),
                        },
                    )
                    .await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let result = self.run_in_sandbox(&job, execution.execution_id, sandbox.id, &block).await;
        self.pool.release(&job.user_id);

        match result {
            Ok(response) => {
                self.reporter
                    .complete_execution(execution.execution_id, job.job_id, response)
                    .await?;
            }
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "execution attempt errored before completion could be reported");
                self.reporter
                    .complete_execution(
                        execution.execution_id,
                        job.job_id,
                        RunnerResponse {
                            start_time: Utc::now(),
                            end_time: Utc::now(),
                            output: None,
                            error: Some(e.to_string()),
                        },
                    )
                    .await?;
            }
        }

        Ok(())
    }

    async fn run_in_sandbox(
        &self,
        job: &Job,
        execution_id: uuid::Uuid,
        box_id: u32,
        block: &CodeBlock,
    ) -> Result<RunnerResponse> {
        let ext = extract::extension_for_language(&block.language).unwrap_or("txt");
        let file_path = write_temp_file(&self.temp_dir, &block.content, ext).await?;

        let expected_start = job.execution_time;
        let now = Utc::now();
        if expected_start - now > START_LEAD_IN {
            let sleep_until = expected_start - START_LEAD_IN;
            let delay = (sleep_until - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(delay).await;
        }

        self.reporter.start_execution(&dummy_execution(job.job_id, execution_id)).await?;

        let start_time = Utc::now();
        let outcome = run_isolate(box_id, &self.temp_dir, &file_path).await;
        let end_time = Utc::now();

        let _ = tokio::fs::remove_file(&file_path).await;

        let (output, error) = match outcome {
            Ok(stdout) => (Some(stdout), None),
            Err(e) => (None, Some(e.to_string())),
        };

        Ok(RunnerResponse {
            start_time,
            end_time,
            output,
            error,
        })
    }
}

/// `start_execution` only needs `job_id`/`execution_id` to build its PATCH;
/// this avoids threading the full registered `JobExecution` back through
/// the sandbox-reservation branch above.
fn dummy_execution(job_id: JobId, execution_id: uuid::Uuid) -> crate::model::JobExecution {
    crate::model::JobExecution {
        execution_id,
        job_id,
        worker_id: String::new(),
        start_time: None,
        end_time: None,
        status: crate::model::JobExecutionStatus::Scheduled,
        output: None,
        error_message: None,
    }
}

async fn write_temp_file(temp_dir: &str, content: &str, ext: &str) -> Result<std::path::PathBuf> {
    tokio::fs::create_dir_all(temp_dir).await?;
    let unescaped = html_escape::decode_html_entities(content).into_owned();
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let path = std::path::Path::new(temp_dir).join(format!("{}.{}", nanos, ext));
    tokio::fs::write(&path, unescaped).await?;
    Ok(path)
}

/// Launches the wire-exact `isolate` invocation with a 120s deadline and a
/// 110s wait-delay so isolate can clean up its box before the deadline
/// reaps the process group.
async fn run_isolate(box_id: u32, temp_dir: &str, file_path: &std::path::Path) -> Result<String> {
    let file_name = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::execution("temp file has no name"))?;

    let mut command = Command::new("isolate");
    command
        .arg(format!("--box-id={}", box_id))
        .arg("--fsize=5120")
        .arg(format!("--dir={}", temp_dir))
        .arg("--dir=/root/.cache/go-build:rw")
        .arg("--wait")
        .arg("--share-net")
        .arg("--processes=100")
        .arg("--open-files=0")
        .arg("--env=GOROOT")
        .arg("--env=GOPATH")
        .arg("--env=GO111MODULE=on")
        .arg("--env=HOME")
        .arg("--env=PATH")
        .arg("--stderr-to-stdout")
        .arg("--run")
        .arg("--")
        .arg("/usr/local/go/bin/go")
        .arg("run")
        .arg(file_name)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(Error::Io)?;
    let mut stdout = child.stdout.take().expect("stdout piped above");

    let wait = async {
        let mut buf = String::new();
        stdout.read_to_string(&mut buf).await.ok();
        let status = child.wait().await?;
        Ok::<_, std::io::Error>((status, buf))
    };

    let (status, output) = match tokio::time::timeout(EXECUTION_DEADLINE, wait).await {
        Ok(res) => res.map_err(Error::Io)?,
        Err(_) => {
            // Deadline hit: kill the process group and give it up to
            // ISOLATE_WAIT_DELAY to actually exit before giving up on the
            // wait, mirroring a context-cancel-then-WaitDelay shutdown.
            let _ = child.start_kill();
            let _ = tokio::time::timeout(ISOLATE_WAIT_DELAY, child.wait()).await;
            return Err(Error::execution("isolate execution timed out after 120s"));
        }
    };

    if output.contains("box is currently in use by another process") {
        return Err(Error::SandboxBusy);
    }
    if !status.success() {
        return Err(Error::execution(format!("isolate error: {}", output)));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RabbitConfig;
    use crate::model::{Job, JobExecutionStatus, JobFrequency, JobStatus};
    use crate::test_support::StubJobApi;
    use ulid::Ulid;

    fn sample_job(payload: &str) -> Job {
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
            payload: payload.into(),
            status: JobStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }

    fn worker_with(pool: Arc<SandboxPool>, api: Arc<StubJobApi>) -> WorkerService {
        let queue = QueuePool::new(RabbitConfig::default());
        let reporter = Reporter::new(api, "w1");
        WorkerService::new(queue, pool, reporter, "w1", std::env::temp_dir().to_string_lossy().into_owned())
    }

    #[tokio::test]
    async fn no_code_blocks_completes_execution_without_reserving_sandbox() {
        let job = sample_job("<html><body>no fenced code here</body></html>");
        let api = Arc::new(StubJobApi::with_job(job.clone()));
        let pool = Arc::new(SandboxPool::new(0).await.unwrap());
        let worker = worker_with(pool.clone(), api.clone());

        worker.process_job(job.clone()).await.unwrap();

        let executions = api.executions.lock().unwrap();
        let execution = executions.values().next().expect("one execution registered");
        assert_eq!(execution.status, JobExecutionStatus::Failed);
        assert_eq!(execution.error_message.as_deref(), Some("no code blocks found in payload"));
        assert_eq!(pool.available_count(), 0);
    }

    #[tokio::test]
    async fn sandbox_exhaustion_completes_execution_as_busy() {
        let job = sample_job("<pre><code class=\"language-go\">package main</code></pre>");
        let api = Arc::new(StubJobApi::with_job(job.clone()));
        // zero boxes means reserve() fails immediately with SandboxBusy
        let pool = Arc::new(SandboxPool::new(0).await.unwrap());
        let worker = worker_with(pool.clone(), api.clone());

        worker.process_job(job.clone()).await.unwrap();

        let executions = api.executions.lock().unwrap();
        let execution = executions.values().next().expect("one execution registered");
        assert_eq!(execution.status, JobExecutionStatus::Failed);
        assert_eq!(execution.error_message.as_deref(), Some("sandbox busy"));
    }

    #[tokio::test]
    async fn write_temp_file_decodes_html_entities() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp_file(dir.path().to_str().unwrap(), "fmt.Println(&quot;hi&quot;)", "go")
            .await
            .unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "fmt.Println(\"hi\")");
    }
}
