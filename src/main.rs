//! jobline command-line client.
//!
//! Loads configuration, connects the configured backend and enqueues a
//! single job, printing the result as JSON.

use std::{process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use jobline_core::{JobSubmission, TaskIdentifier};
use jobline_queue::{
    backend::{PgBackend, PostgrestBackend, QueueBackend},
    config::BackendKind,
    Config, EnqueueClient,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "jobline", version, about = "Enqueue jobs into a Postgres-backed work queue")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit one job and wait for the outcome
    Enqueue {
        /// Task handler name
        task: String,

        /// JSON object passed to the handler
        #[arg(long, short)]
        payload: Option<String>,

        /// Earliest run time (RFC 3339)
        #[arg(long)]
        run_at: Option<DateTime<Utc>>,

        /// Backend worker attempts hint
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Print the effective configuration with secrets masked
    Config,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;

    init_tracing(&config.rust_log)?;
    install_panic_hook();

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            Ok(ExitCode::SUCCESS)
        },
        Command::Enqueue { task, payload, run_at, max_attempts } => {
            let job = build_submission(&task, payload.as_deref(), run_at, max_attempts)?;
            let backend = connect_backend(&config).await?;
            let client = EnqueueClient::new(backend, config.to_retry_config())
                .context("failed to build enqueue client")?;

            info!(task = %job.task_identifier, backend = ?config.backend, "Enqueueing job");
            let result = client.enqueue(job).await;
            println!("{}", serde_json::to_string_pretty(&result)?);

            Ok(if result.succeeded { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        },
    }
}

/// Initializes tracing; `RUST_LOG` wins over the configured directive.
fn init_tracing(default_directive: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .context("invalid log filter directive")?;

    let fmt_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    Ok(())
}

/// Routes panic reports, including contained strategy panics, through tracing.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        tracing::error!(panic = %info, "Panicked");
    }));
}

fn build_submission(
    task: &str,
    payload: Option<&str>,
    run_at: Option<DateTime<Utc>>,
    max_attempts: Option<u32>,
) -> Result<JobSubmission> {
    let mut job = JobSubmission::new(TaskIdentifier::new(task)?);

    if let Some(raw) = payload {
        let value: serde_json::Value =
            serde_json::from_str(raw).context("--payload is not valid JSON")?;
        job = job.with_payload_value(value)?;
    }
    if let Some(run_at) = run_at {
        job = job.with_run_at(run_at);
    }
    if let Some(max_attempts) = max_attempts {
        job = job.with_max_attempts(max_attempts);
    }

    Ok(job)
}

async fn connect_backend(config: &Config) -> Result<Arc<dyn QueueBackend>> {
    match config.backend {
        BackendKind::Postgrest => {
            let backend = PostgrestBackend::new(config.to_postgrest_config())
                .context("failed to configure PostgREST backend")?;
            info!(base_url = %config.base_url, "PostgREST backend ready");
            Ok(Arc::new(backend))
        },
        BackendKind::Postgres => {
            let backend = PgBackend::connect(&config.to_pg_config())
                .await
                .context("failed to connect to PostgreSQL")?;
            info!(database_url = %config.database_url_masked(), "PostgreSQL backend ready");
            Ok(Arc::new(backend))
        },
    }
}
