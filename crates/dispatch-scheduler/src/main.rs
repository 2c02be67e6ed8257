use std::sync::Arc;

use clap::Parser;
use dispatch_core::config::Config;
use dispatch_core::jobapi::{Auth0Client, JobApiClient};
use dispatch_core::queue::QueuePool;
use dispatch_core::scheduler::Scheduler;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "dispatch-scheduler", about = "Runs the scheduling loop")]
struct Cli {
    /// Enable debug-level logging
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let log_directive = if verbose {
        "dispatch_core=debug,dispatch_scheduler=debug"
    } else {
        "dispatch_core=info,dispatch_scheduler=info"
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
        config.scheduling_auth0_client.client_id.clone(),
        config.scheduling_auth0_client.client_secret.clone(),
    );
    let api: Arc<dyn dispatch_core::jobapi::JobApi> =
        Arc::new(JobApiClient::new(config.reporter_url.clone(), auth));
    let queue = QueuePool::new(config.rabbit.clone());
    let scheduler = Arc::new(Scheduler::new(api, queue));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    let run_handle = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run(shutdown_rx).await }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM");
        }
    }
    let _ = shutdown_tx.send(true);
    let _ = run_handle.await;

    Ok(())
}
