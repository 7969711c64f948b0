use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use taskhub::api;
use taskhub::config::ServiceConfig;
use taskhub::jobs::{JobExecutor, JobRegistry, JobService};
use taskhub::notify::{Notifier, SmtpConfig, SmtpNotifier};
use taskhub::step::{CommandStepRunner, StepRunner};
use taskhub::storage::UploadStore;
use taskhub::worker::WorkerPool;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "Failed to install rustls crypto provider")?;

    let config = ServiceConfig::from_env()?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("📋 taskhub v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Step: {} {}", config.step.program, config.step.args.join(" "));
    eprintln!("   Uploads: {}", config.upload_dir.display());
    eprintln!("   Outputs: {}", config.step.output_dir.display());
    eprintln!("   Workers: {}", config.pool.max_concurrent_jobs);
    eprintln!("   API: http://0.0.0.0:{}/tasks\n", config.port);

    // ── Job core ────────────────────────────────────────────────────────
    let registry = Arc::new(JobRegistry::new());
    let runner: Arc<dyn StepRunner> = Arc::new(CommandStepRunner::new(config.step.clone()));

    let notifier: Option<Arc<dyn Notifier>> = match SmtpConfig::from_env()? {
        Some(smtp) => {
            info!(host = %smtp.host, port = smtp.port, "SMTP notifications enabled");
            Some(Arc::new(SmtpNotifier::new(smtp)))
        }
        None => {
            warn!("SMTP_HOST not set, completion notifications disabled");
            None
        }
    };

    let executor = Arc::new(JobExecutor::new(Arc::clone(&registry), runner, notifier));
    let pool = WorkerPool::new(config.pool.clone());
    let jobs = Arc::new(JobService::new(registry, executor, pool));
    let store = Arc::new(UploadStore::new(&config.upload_dir));

    // ── HTTP ────────────────────────────────────────────────────────────
    let app = api::routes(Arc::clone(&jobs), store);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Draining accepted jobs");
    jobs.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

/// Console logging plus optional daily-rolling files. Keep the guard alive
/// for the life of the process or buffered file output is lost.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "taskhub.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
