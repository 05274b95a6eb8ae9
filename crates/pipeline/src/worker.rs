//! Single transfer worker.
//!
//! Takes one job at a time from the [`JobQueue`], runs fetch then store
//! through the [`StorageGateway`], turns raw progress into milestone status
//! updates, and cleans up on every exit path.

use std::sync::Arc;
use std::time::Duration;

use mediadrop_transfer::{
    Progress, ProgressGate, ProgressReceiver, ProgressThrottle, TempFile, TransferError,
    checkpoint, progress_channel, remote_object_name,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth::CredentialStore;
use crate::error::PipelineError;
use crate::gateway::{GatewayFuture, StorageGateway};
use crate::job::{ConversationRef, JobId, JobState, MessageRef, RemoteId, TransferJob};
use crate::notifier::StatusReporter;
use crate::queue::JobQueue;
use crate::status;
use crate::types::{JobOutcome, WorkerEvent};

/// Buffered worker events before new ones are dropped.
const EVENT_CAPACITY: usize = 256;

/// Releases the active slot when dropped, including on unwind.
struct ActiveLease<'a> {
    queue: &'a JobQueue,
    id: JobId,
}

impl Drop for ActiveLease<'_> {
    fn drop(&mut self) {
        self.queue.finish_active(self.id);
    }
}

/// Per-phase milestone state.
struct PhaseProgress {
    gate: ProgressGate,
    throttle: ProgressThrottle,
}

/// Runs queued jobs one at a time.
pub struct TransferWorker {
    queue: Arc<JobQueue>,
    gateway: Arc<dyn StorageGateway>,
    credentials: Arc<dyn CredentialStore>,
    reporter: StatusReporter,
    progress_interval: Option<Duration>,
    events_tx: mpsc::Sender<WorkerEvent>,
    events_rx: Option<mpsc::Receiver<WorkerEvent>>,
}

impl TransferWorker {
    pub fn new(
        queue: Arc<JobQueue>,
        gateway: Arc<dyn StorageGateway>,
        credentials: Arc<dyn CredentialStore>,
        reporter: StatusReporter,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        Self {
            queue,
            gateway,
            credentials,
            reporter,
            progress_interval: None,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Minimum spacing between two progress edits of a status message.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = Some(interval);
        self
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<WorkerEvent>> {
        self.events_rx.take()
    }

    /// Processes jobs until `shutdown` fires or the queue is closed.
    ///
    /// `shutdown` is only observed between jobs; close the queue to stop an
    /// in-flight transfer.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("transfer worker started");
        loop {
            let job = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                job = self.queue.dequeue() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            self.process(job).await;
        }
        info!("transfer worker stopped");
    }

    /// Waits for the next job and processes it.
    ///
    /// Returns `None` once the queue is closed.
    pub async fn run_once(&self) -> Option<JobOutcome> {
        let job = self.queue.dequeue().await?;
        Some(self.process(job).await)
    }

    async fn process(&self, mut job: TransferJob) -> JobOutcome {
        let lease = ActiveLease {
            queue: &self.queue,
            id: job.id,
        };
        let cancel = job.cancel_token();
        info!(job = %job.id, owner = %job.owner, name = %job.display_name, "job started");
        self.emit(WorkerEvent::Started {
            job_id: job.id,
            owner: job.owner,
        });

        let mut scratch: Option<TempFile> = None;
        let result = self.execute(&mut job, &cancel, &mut scratch).await;
        let outcome = self.settle(&job, &cancel, result);

        self.report(&mut job, &outcome).await;

        if let Some(file) = scratch.take() {
            let path = file.path().to_path_buf();
            if let Err(e) = file.remove().await {
                warn!(job = %job.id, path = %path.display(), error = %e, "failed to remove temp file");
            }
        }
        drop(lease);

        self.emit(WorkerEvent::Finished {
            job_id: job.id,
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Runs re-check, fetch and store. The fetched file is handed to
    /// `scratch` as soon as it exists.
    async fn execute(
        &self,
        job: &mut TransferJob,
        cancel: &CancellationToken,
        scratch: &mut Option<TempFile>,
    ) -> Result<RemoteId, PipelineError> {
        checkpoint(cancel)?;
        self.credentials.check(job.owner)?;

        // 1. Fetch
        self.enter_phase(job, JobState::Downloading).await;
        let (sink, rx) = progress_channel();
        let fetch = self
            .gateway
            .fetch_to_local(&job.source, sink, cancel.clone());
        let local = self
            .drive_phase(
                job.id,
                JobState::Downloading,
                &job.conversation,
                &mut job.status_message,
                fetch,
                rx,
            )
            .await?;
        let local = scratch.insert(TempFile::new(local));
        checkpoint(cancel)?;

        // 2. Store
        self.enter_phase(job, JobState::Uploading).await;
        let name = remote_object_name(job.source.as_str(), &job.display_name);
        let (sink, rx) = progress_channel();
        let store = self
            .gateway
            .store_from_local(job.owner, local.path(), &name, sink, cancel.clone());
        let remote = self
            .drive_phase(
                job.id,
                JobState::Uploading,
                &job.conversation,
                &mut job.status_message,
                store,
                rx,
            )
            .await?;
        checkpoint(cancel)?;

        debug!(job = %job.id, remote = %remote, "stored");
        Ok(remote)
    }

    async fn enter_phase(&self, job: &mut TransferJob, state: JobState) {
        job.state = state;
        self.queue.set_active_state(job.id, state);
        info!(job = %job.id, phase = %state, "phase started");
        self.emit(WorkerEvent::Phase {
            job_id: job.id,
            state,
        });
        self.reporter
            .post(
                job.id,
                &job.conversation,
                &mut job.status_message,
                &status::phase(state, None),
                true,
            )
            .await;
    }

    /// Polls a gateway call to completion while forwarding its progress.
    ///
    /// Progress samples arrive through the watch channel and are posted from
    /// this task; the gateway never touches the notifier.
    async fn drive_phase<T>(
        &self,
        id: JobId,
        state: JobState,
        conversation: &ConversationRef,
        message: &mut Option<MessageRef>,
        mut work: GatewayFuture<'_, T>,
        mut progress: ProgressReceiver,
    ) -> Result<T, TransferError> {
        let mut phase = PhaseProgress {
            gate: ProgressGate::new(self.progress_interval),
            throttle: ProgressThrottle::new(),
        };
        let mut reporting = true;

        let result = loop {
            tokio::select! {
                biased;
                result = &mut work => break result,
                changed = progress.changed(), if reporting => {
                    if changed.is_err() {
                        reporting = false;
                        continue;
                    }
                    let sample = *progress.borrow_and_update();
                    self.milestone(id, state, conversation, message, &mut phase, sample)
                        .await;
                }
            }
        };

        if result.is_ok() {
            let last = progress.borrow().finished();
            self.milestone(id, state, conversation, message, &mut phase, last)
                .await;
        }
        result
    }

    async fn milestone(
        &self,
        id: JobId,
        state: JobState,
        conversation: &ConversationRef,
        message: &mut Option<MessageRef>,
        phase: &mut PhaseProgress,
        sample: Progress,
    ) {
        if !phase.gate.allow(sample) {
            return;
        }
        let Some(percent) = phase.throttle.consume(sample.current, sample.total) else {
            return;
        };
        phase.gate.record();
        debug!(job = %id, phase = %state, percent, "milestone");
        self.emit(WorkerEvent::Milestone {
            job_id: id,
            state,
            percent,
        });
        self.reporter
            .post(
                id,
                conversation,
                message,
                &status::phase(state, Some(percent)),
                true,
            )
            .await;
    }

    /// Maps the pipeline result to a terminal outcome.
    ///
    /// A set token wins over everything else, so a cancelled job never
    /// reports success.
    fn settle(
        &self,
        job: &TransferJob,
        cancel: &CancellationToken,
        result: Result<RemoteId, PipelineError>,
    ) -> JobOutcome {
        let outcome = match result {
            _ if cancel.is_cancelled() => JobOutcome::Cancelled,
            Err(e) if e.is_cancelled() => JobOutcome::Cancelled,
            Ok(remote_id) => {
                let url = self.gateway.remote_url(&remote_id);
                JobOutcome::Succeeded { remote_id, url }
            }
            Err(PipelineError::Auth(e)) => JobOutcome::Failed {
                error: e.to_string(),
                reauthenticate: true,
            },
            Err(PipelineError::Transfer(e)) => JobOutcome::Failed {
                error: e.to_string(),
                reauthenticate: false,
            },
            Err(e) => JobOutcome::Failed {
                error: e.to_string(),
                reauthenticate: false,
            },
        };

        match &outcome {
            JobOutcome::Succeeded { url, .. } => {
                info!(job = %job.id, owner = %job.owner, url = %url, "job succeeded")
            }
            JobOutcome::Cancelled => {
                info!(job = %job.id, owner = %job.owner, phase = %job.state, "job cancelled")
            }
            JobOutcome::Failed { error, .. } => error!(
                job = %job.id,
                owner = %job.owner,
                phase = %job.state,
                source = %job.source,
                error = %error,
                "job failed"
            ),
        }
        outcome
    }

    async fn report(&self, job: &mut TransferJob, outcome: &JobOutcome) {
        job.state = outcome.state();
        let text = match outcome {
            JobOutcome::Succeeded { url, .. } => status::succeeded(&job.display_name, url),
            JobOutcome::Cancelled => status::cancelled(),
            JobOutcome::Failed {
                error,
                reauthenticate: true,
            } => status::reauthenticate(error),
            JobOutcome::Failed { error, .. } => status::failed(error),
        };
        self.reporter
            .post(
                job.id,
                &job.conversation,
                &mut job.status_message,
                &text,
                false,
            )
            .await;
    }

    fn emit(&self, event: WorkerEvent) {
        // Nobody may be listening; never stall a transfer on a full channel.
        match self.events_tx.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(event @ WorkerEvent::Finished { .. })) => {
                warn!(?event, "event channel full, terminal event dropped");
            }
            Err(TrySendError::Full(event)) => {
                debug!(?event, "event channel full, event dropped");
            }
        }
    }
}
