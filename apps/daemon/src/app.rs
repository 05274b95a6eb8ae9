//! Application orchestrator: wires the pipeline to the local gateway, the
//! console notifier and the stdin command intake.

use std::path::Path;
use std::sync::Arc;

use mediadrop_pipeline::{
    CancelOutcome, CancelRequest, ConversationRef, Dispatcher, InboundEvent, JobId, JobQueue,
    MediaSubmission, PipelineError, QueueSnapshot, SourceRef, StatusReporter, TransferWorker,
    UserId, WorkerEvent,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::console::ConsoleNotifier;
use crate::fs_gateway::LocalDriveGateway;

/// One line of input, standing in for an update from the chat platform.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// A message carrying media.
    Media {
        user: i64,
        chat_id: i64,
        #[serde(default)]
        message_id: Option<i64>,
        source: String,
        #[serde(default)]
        name: Option<String>,
    },
    /// A message without media.
    Text {
        user: i64,
        chat_id: i64,
        #[serde(default)]
        message_id: Option<i64>,
    },
    Cancel {
        user: i64,
        job_id: JobId,
    },
    /// A pressed inline control, carrying its raw payload.
    Callback {
        user: i64,
        data: String,
    },
    Queue,
}

/// Runs the daemon until stdin closes and the queue drains, or until
/// Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    for dir in [&config.spool_dir, &config.staging_dir, &config.drive_root] {
        tokio::fs::create_dir_all(dir).await?;
    }
    let swept = sweep_staging(&config.staging_dir).await?;
    if swept > 0 {
        tracing::warn!(files = swept, "removed leftover staging files");
    }

    // -- Pipeline --
    let queue = Arc::new(JobQueue::new());
    let credentials = Arc::new(config.credentials());
    let reporter = StatusReporter::new(Arc::new(ConsoleNotifier::stdout()));
    let gateway = Arc::new(LocalDriveGateway::new(
        &config.spool_dir,
        &config.staging_dir,
        &config.drive_root,
        config.public_base_url.clone(),
        config.chunk_size,
    ));
    let dispatcher = Dispatcher::new(queue.clone(), credentials.clone(), reporter.clone());

    let mut worker = TransferWorker::new(queue.clone(), gateway, credentials, reporter)
        .with_progress_interval(config.progress_interval());
    if let Some(mut events) = worker.take_events() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                log_event(&event);
            }
        });
    }

    let stop_worker = CancellationToken::new();
    let worker_task = tokio::spawn(worker.run(stop_worker.clone()));

    let updates = queue
        .take_position_updates()
        .ok_or_else(|| anyhow::anyhow!("position updates already taken"))?;
    let refresher = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.run_position_refresher(updates).await })
    };

    tracing::info!(name = %config.name, "daemon ready");

    // -- Main loop: read commands until EOF or Ctrl-C --
    tokio::select! {
        result = intake(&dispatcher) => {
            result?;
            tracing::info!("input closed, waiting for queued jobs");
            tokio::select! {
                _ = queue.wait_idle() => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("SIGINT received, shutting down");
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
        }
    }

    // -- Graceful shutdown --
    tracing::info!("stopping services...");
    dispatcher.shutdown().await;
    stop_worker.cancel();
    worker_task.await?;
    refresher.abort();

    Ok(())
}

/// Reads JSON-line commands from stdin until EOF.
async fn intake(dispatcher: &Dispatcher) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<Command>(line) {
            Ok(command) => handle_command(dispatcher, command).await,
            Err(e) => json!({ "event": "error", "message": format!("invalid command: {e}") }),
        };
        println!("{reply}");
    }
    Ok(())
}

/// Executes one command and returns the reply line.
pub async fn handle_command(dispatcher: &Dispatcher, command: Command) -> Value {
    match command {
        Command::Media {
            user,
            chat_id,
            message_id,
            source,
            name,
        } => {
            let event = InboundEvent::Media(MediaSubmission {
                owner: UserId(user),
                conversation: ConversationRef {
                    chat_id,
                    message_id,
                },
                display_name: name.unwrap_or_else(|| source.clone()),
                source: SourceRef(source),
            });
            match dispatcher.admit(event).await {
                Ok(admission) => json!({
                    "event": "admitted",
                    "job_id": admission.job_id,
                    "position": admission.position,
                }),
                Err(e) => error_reply(&e),
            }
        }
        Command::Text {
            user,
            chat_id,
            message_id,
        } => {
            let event = InboundEvent::NotMedia {
                owner: UserId(user),
                conversation: ConversationRef {
                    chat_id,
                    message_id,
                },
            };
            match dispatcher.admit(event).await {
                Ok(admission) => json!({ "event": "admitted", "job_id": admission.job_id }),
                Err(e) => error_reply(&e),
            }
        }
        Command::Cancel { user, job_id } => {
            let request = CancelRequest {
                job_id,
                requester: UserId(user),
            };
            cancel_reply(dispatcher.cancel(request).await)
        }
        Command::Callback { user, data } => {
            match dispatcher.handle_callback(UserId(user), &data).await {
                Some(result) => cancel_reply(result),
                None => json!({ "event": "error", "message": "unknown callback" }),
            }
        }
        Command::Queue => snapshot_reply(&dispatcher.queue().snapshot()),
    }
}

fn error_reply(error: &PipelineError) -> Value {
    json!({ "event": "error", "message": error.to_string() })
}

fn outcome_name(outcome: CancelOutcome) -> &'static str {
    match outcome {
        CancelOutcome::Dequeued => "dequeued",
        CancelOutcome::Signalled => "signalled",
    }
}

fn cancel_reply(result: Result<CancelOutcome, PipelineError>) -> Value {
    match result {
        Ok(outcome) => json!({ "event": "cancel", "outcome": outcome_name(outcome) }),
        Err(e) => error_reply(&e),
    }
}

fn snapshot_reply(snapshot: &QueueSnapshot) -> Value {
    let active = snapshot.active.as_ref().map(|a| {
        json!({
            "job_id": a.job_id,
            "owner": a.owner,
            "name": a.display_name,
            "state": a.state,
        })
    });
    let queued: Vec<Value> = snapshot
        .queued
        .iter()
        .map(|q| {
            json!({
                "job_id": q.job_id,
                "owner": q.owner,
                "name": q.display_name,
                "position": q.position,
            })
        })
        .collect();
    json!({ "event": "queue", "active": active, "queued": queued })
}

fn log_event(event: &WorkerEvent) {
    match event {
        WorkerEvent::Started { job_id, owner } => {
            tracing::debug!(job = %job_id, owner = %owner, "worker picked up job")
        }
        WorkerEvent::Phase { job_id, state } => {
            tracing::debug!(job = %job_id, phase = %state, "worker phase")
        }
        WorkerEvent::Milestone {
            job_id,
            state,
            percent,
        } => tracing::trace!(job = %job_id, phase = %state, percent, "milestone"),
        WorkerEvent::Finished { job_id, outcome } => {
            tracing::debug!(job = %job_id, outcome = %outcome.state(), "worker finished job")
        }
    }
}

/// Deletes `*.part` files left behind by a previous run.
async fn sweep_staging(dir: &Path) -> anyhow::Result<usize> {
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "part") && entry.file_type().await?.is_file()
        {
            tokio::fs::remove_file(&path).await?;
            removed += 1;
        }
    }
    Ok(removed)
}
