use std::sync::Arc;

use clap::Parser;
use dispatch_core::config::Config;
use dispatch_core::jobapi::{Auth0Client, JobApiClient};
use dispatch_core::queue::QueuePool;
use dispatch_core::reporter::Reporter;
use dispatch_core::runner::WorkerService;
use dispatch_core::sandbox::SandboxPool;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "dispatch-worker", about = "Runs the execution runner")]
struct Cli {
    /// Enable debug-level logging
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let log_directive = if verbose {
        "dispatch_core=debug,dispatch_worker=debug"
    } else {
        "dispatch_core=info,dispatch_worker=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_directive)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::from_env().unwrap_or_else(|e| {
        error!(error = %e, "failed to load configuration, cannot start");
        std::process::exit(1);
    });

    let auth = Auth0Client::new(
        config.auth0.domain.clone(),
        config.auth0.audience.clone(),
        config.worker_auth0_client.client_id.clone(),
        config.worker_auth0_client.client_secret.clone(),
    );
    let api: Arc<dyn dispatch_core::jobapi::JobApi> =
        Arc::new(JobApiClient::new(config.reporter_url.clone(), auth));
    let queue = QueuePool::new(config.rabbit.clone());
    let reporter = Reporter::new(api, config.worker_id.clone());

    let pool = match SandboxPool::new(config.sandbox_count).await {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            error!(error = %e, "failed to construct sandbox pool, cannot start");
            std::process::exit(1);
        }
    };
    pool.clone().schedule_cleanup();

    let worker = WorkerService::new(queue, pool, reporter, config.worker_id.clone(), config.temp_dir.clone());

    info!(worker_id = %config.worker_id, "starting worker service");
    worker.run().await?;

    Ok(())
}
