//! Admission and cancel requests.
//!
//! The dispatcher is the entry point for everything the chat platform
//! delivers: media submissions, cancel controls and shutdown. It never runs
//! transfers itself; that is the worker's job.

use std::sync::Arc;

use mediadrop_transfer::sanitize_display_name;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::auth::CredentialStore;
use crate::callback::CallbackAction;
use crate::error::PipelineError;
use crate::job::{TransferJob, UserId};
use crate::notifier::StatusReporter;
use crate::queue::{CancelEffect, JobQueue};
use crate::status;
use crate::types::{Admission, CancelOutcome, CancelRequest, InboundEvent, PositionUpdate};

/// Front door of the pipeline.
#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<JobQueue>,
    credentials: Arc<dyn CredentialStore>,
    reporter: StatusReporter,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<JobQueue>,
        credentials: Arc<dyn CredentialStore>,
        reporter: StatusReporter,
    ) -> Self {
        Self {
            queue,
            credentials,
            reporter,
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Admits an inbound event as a queued job.
    ///
    /// Non-media events and users without valid credentials are answered
    /// with a message and rejected before any job exists.
    pub async fn admit(&self, event: InboundEvent) -> Result<Admission, PipelineError> {
        let mut submission = match event {
            InboundEvent::Media(submission) => submission,
            InboundEvent::NotMedia {
                owner,
                conversation,
            } => {
                debug!(owner = %owner, "ignoring message without media");
                self.reporter
                    .announce(&conversation, &status::rejected_not_media())
                    .await;
                return Err(PipelineError::NotMedia);
            }
        };

        if let Err(e) = self.credentials.check(submission.owner) {
            info!(owner = %submission.owner, error = %e, "submission rejected");
            self.reporter
                .announce(
                    &submission.conversation,
                    &status::rejected_unauthorized(&e.to_string()),
                )
                .await;
            return Err(e.into());
        }

        if self.queue.is_closed() {
            self.reporter
                .announce(&submission.conversation, &status::shutting_down())
                .await;
            return Err(PipelineError::QueueClosed);
        }

        submission.display_name = sanitize_display_name(&submission.display_name);
        let mut job = TransferJob::new(submission);
        let job_id = job.id;
        self.reporter
            .post(
                job_id,
                &job.conversation,
                &mut job.status_message,
                &status::received(&job.display_name),
                true,
            )
            .await;

        let owner = job.owner;
        let conversation = job.conversation.clone();
        let status_message = job.status_message.clone();

        match self.queue.enqueue(job) {
            Ok(position) => {
                info!(job = %job_id, owner = %owner, position, "job admitted");
                let update = PositionUpdate {
                    job_id,
                    owner,
                    conversation,
                    status_message,
                    position,
                };
                self.reporter.show_position(&self.queue, &update).await;
                Ok(Admission { job_id, position })
            }
            Err(e) => {
                // Closed between the check above and now.
                if let Some(message) = &status_message {
                    self.reporter.discard(job_id, message).await;
                }
                self.reporter
                    .announce(&conversation, &status::shutting_down())
                    .await;
                Err(e)
            }
        }
    }

    /// Cancels a job on behalf of the requester.
    ///
    /// Owners may cancel their own jobs; operators may cancel any job.
    pub async fn cancel(&self, request: CancelRequest) -> Result<CancelOutcome, PipelineError> {
        let operator = self.credentials.is_operator(request.requester);
        let effect = self
            .queue
            .cancel(request.job_id, request.requester, operator)?;
        let outcome = effect.outcome();

        if let CancelEffect::Dequeued(mut job) = effect {
            self.reporter
                .post(
                    job.id,
                    &job.conversation,
                    &mut job.status_message,
                    &status::cancelled(),
                    false,
                )
                .await;
        }
        Ok(outcome)
    }

    /// Handles a pressed inline control.
    ///
    /// Unknown payloads are ignored and yield `None`.
    pub async fn handle_callback(
        &self,
        requester: UserId,
        data: &str,
    ) -> Option<Result<CancelOutcome, PipelineError>> {
        match CallbackAction::parse(data)? {
            CallbackAction::Cancel(job_id) => {
                Some(self.cancel(CancelRequest { job_id, requester }).await)
            }
        }
    }

    /// Edits status messages as queued jobs move up.
    ///
    /// Runs until the queue side of the channel is dropped.
    pub async fn run_position_refresher(
        &self,
        mut updates: mpsc::UnboundedReceiver<PositionUpdate>,
    ) {
        while let Some(update) = updates.recv().await {
            self.reporter.show_position(&self.queue, &update).await;
        }
        debug!("position refresher stopped");
    }

    /// Closes the queue and tells the owners of still-queued jobs.
    ///
    /// The active job, if any, is signalled and finishes as cancelled.
    /// Returns the number of queued jobs that were dropped.
    pub async fn shutdown(&self) -> usize {
        let drained = self.queue.close();
        let count = drained.len();
        for mut job in drained {
            self.reporter
                .post(
                    job.id,
                    &job.conversation,
                    &mut job.status_message,
                    &status::shutting_down(),
                    false,
                )
                .await;
        }
        if count > 0 {
            warn!(dropped = count, "queue closed with pending jobs");
        } else {
            info!("queue closed");
        }
        count
    }
}
