use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tunegen_core::task::TaskStatus;
use tokio::sync::watch;
use tunegen_events::{NotificationEvent, Severity};
use tunegen_pipeline::{
    Collaborators, CreditGate, EntitlementGate, FsArtifactStore, GenerationService, Unmetered,
};
use tunegen_provider::HttpProviderClient;
use tunegen_worker::intake::parse_line;
use tunegen_worker::{LogFormat, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env().context("invalid worker configuration")?;
    init_tracing(config.log_format);

    let http = reqwest::Client::builder()
        .timeout(config.provider_timeout)
        .build()
        .context("failed to build HTTP client")?;

    let gate: Arc<dyn EntitlementGate> = match config.generation_credits {
        Some(credits) => Arc::new(CreditGate::new(credits)),
        None => Arc::new(Unmetered),
    };
    let deps = Collaborators {
        provider: Arc::new(HttpProviderClient::with_client(
            http.clone(),
            config.provider_url.clone(),
            config.provider_api_key.clone(),
        )),
        artifacts: Arc::new(FsArtifactStore::new(http, config.artifact_dir.clone())),
        gate,
    };

    tracing::info!(
        provider = %config.provider_url,
        artifact_dir = %config.artifact_dir.display(),
        concurrency_limit = config.orchestrator.concurrency_limit,
        "Worker starting",
    );

    let service = GenerationService::start(config.orchestrator.clone(), deps);
    tokio::spawn(log_notifications(service.watch_notifications()));

    let mut submitted = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0;
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        line_no += 1;
        let request = match parse_line(line_no, &line) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed request");
                continue;
            }
        };
        match service.enqueue(request).await {
            Ok(task_id) => submitted.push(task_id),
            Err(e) => tracing::warn!(line = line_no, error = %e, "Request rejected"),
        }
    }

    tracing::info!(tasks = submitted.len(), "Input drained, waiting for tasks");

    let mut failed = 0usize;
    for task_id in submitted {
        let task = service
            .wait(task_id)
            .await
            .with_context(|| format!("lost track of task {task_id}"))?;
        match (task.status(), task.tracks(), task.error()) {
            (TaskStatus::Completed, Some(tracks), _) => {
                for track in tracks {
                    println!(
                        "{}",
                        serde_json::json!({ "task_id": task_id, "track": track })
                    );
                }
            }
            (_, _, error) => {
                failed += 1;
                println!(
                    "{}",
                    serde_json::json!({ "task_id": task_id, "error": error })
                );
            }
        }
    }

    service.shutdown().await;
    tracing::info!(failed, "Worker finished");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tunegen_worker=info,tunegen_pipeline=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

/// Log each notification once, as it appears.
async fn log_notifications(mut rx: watch::Receiver<Vec<NotificationEvent>>) {
    let mut seen = HashSet::new();
    loop {
        for event in rx.borrow_and_update().iter() {
            if !seen.insert(event.id) {
                continue;
            }
            match event.severity {
                Severity::Error => tracing::error!(title = %event.title, "{}", event.message),
                Severity::Warning => tracing::warn!(title = %event.title, "{}", event.message),
                Severity::Info | Severity::Success => {
                    tracing::info!(title = %event.title, "{}", event.message)
                }
            }
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}
