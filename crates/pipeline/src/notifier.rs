//! Status delivery to the originating conversation.
//!
//! `StatusNotifier` is implemented by the host on top of the chat platform.
//! `StatusReporter` wraps it with the delivery policy the pipeline relies on:
//! one message per job, identical edits ignored, failures logged and
//! swallowed.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::NotifierError;
use crate::job::{ConversationRef, JobId, MessageRef};
use crate::queue::JobQueue;
use crate::status;
use crate::types::PositionUpdate;

/// Boxed future returned by [`StatusNotifier`] methods.
pub type NotifierFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, NotifierError>> + Send + 'a>>;

/// Chat-side surface used to show job status.
///
/// `cancel` asks for a cancel control keyed by that job id; `None` renders
/// the message without one.
pub trait StatusNotifier: Send + Sync {
    /// Posts a new status message and returns a handle for later edits.
    fn create_status_message<'a>(
        &'a self,
        conversation: &'a ConversationRef,
        text: &'a str,
        cancel: Option<JobId>,
    ) -> NotifierFuture<'a, MessageRef>;

    /// Replaces the text of an existing status message.
    ///
    /// Returns [`NotifierError::NotModified`] if the text is unchanged.
    fn update_status_message<'a>(
        &'a self,
        message: &'a MessageRef,
        text: &'a str,
        cancel: Option<JobId>,
    ) -> NotifierFuture<'a, ()>;

    /// Removes a status message.
    fn delete_status_message<'a>(&'a self, message: &'a MessageRef) -> NotifierFuture<'a, ()>;
}

/// Delivery policy over a [`StatusNotifier`].
///
/// Edits are serialized so that a position refresh checked against the
/// queue can never land after the worker has moved the job on.
#[derive(Clone)]
pub struct StatusReporter {
    notifier: Arc<dyn StatusNotifier>,
    order: Arc<Mutex<()>>,
}

impl StatusReporter {
    pub fn new(notifier: Arc<dyn StatusNotifier>) -> Self {
        Self {
            notifier,
            order: Arc::new(Mutex::new(())),
        }
    }

    /// Shows `text` in the job's status message, creating it on first use.
    ///
    /// Never fails: a failed create leaves `message` as `None` so the next
    /// call tries again.
    pub async fn post(
        &self,
        job: JobId,
        conversation: &ConversationRef,
        message: &mut Option<MessageRef>,
        text: &str,
        cancellable: bool,
    ) {
        let cancel = cancellable.then_some(job);
        let _order = self.order.lock().await;

        match message {
            Some(existing) => {
                let result = self
                    .notifier
                    .update_status_message(existing, text, cancel)
                    .await;
                self.absorb(job, result);
            }
            None => match self
                .notifier
                .create_status_message(conversation, text, cancel)
                .await
            {
                Ok(created) => *message = Some(created),
                Err(e) => warn!(job = %job, error = %e, "failed to create status message"),
            },
        }
    }

    /// Edits a queued job's message to show its new position.
    ///
    /// Skipped if the job is no longer at that position, so stale updates
    /// are dropped.
    pub async fn show_position(&self, queue: &JobQueue, update: &PositionUpdate) {
        let Some(message) = &update.status_message else {
            return;
        };
        let _order = self.order.lock().await;

        if queue.position_of(update.job_id) != Some(update.position) {
            debug!(job = %update.job_id, position = update.position, "stale position update");
            return;
        }
        let text = status::queued(update.position);
        let result = self
            .notifier
            .update_status_message(message, &text, Some(update.job_id))
            .await;
        self.absorb(update.job_id, result);
    }

    /// Removes a status message, logging failures.
    pub async fn discard(&self, job: JobId, message: &MessageRef) {
        let _order = self.order.lock().await;
        if let Err(e) = self.notifier.delete_status_message(message).await {
            warn!(job = %job, error = %e, "failed to delete status message");
        }
    }

    /// Posts a one-off message that is not tied to a job.
    pub async fn announce(&self, conversation: &ConversationRef, text: &str) {
        let _order = self.order.lock().await;
        if let Err(e) = self
            .notifier
            .create_status_message(conversation, text, None)
            .await
        {
            warn!(chat = conversation.chat_id, error = %e, "failed to send message");
        }
    }

    fn absorb(&self, job: JobId, result: Result<(), NotifierError>) {
        match result {
            Ok(()) | Err(NotifierError::NotModified) => {}
            Err(e) => warn!(job = %job, error = %e, "failed to update status message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockNotifier, NotifierCall, conversation, job};

    #[tokio::test]
    async fn post_creates_then_edits_one_message() {
        let mock = Arc::new(MockNotifier::new());
        let reporter = StatusReporter::new(mock.clone());
        let id = JobId::new();
        let conv = conversation(1);
        let mut message = None;

        reporter.post(id, &conv, &mut message, "first", true).await;
        reporter.post(id, &conv, &mut message, "second", false).await;

        assert!(message.is_some());
        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], NotifierCall::Create { text, cancel: Some(c), .. } if text == "first" && *c == id));
        assert!(matches!(&calls[1], NotifierCall::Update { text, cancel: None, .. } if text == "second"));
    }

    #[tokio::test]
    async fn identical_edit_is_silent() {
        let mock = Arc::new(MockNotifier::new());
        let reporter = StatusReporter::new(mock.clone());
        let id = JobId::new();
        let mut message = None;

        reporter.post(id, &conversation(1), &mut message, "same", false).await;
        reporter.post(id, &conversation(1), &mut message, "same", false).await;
        reporter.post(id, &conversation(1), &mut message, "same", false).await;

        assert_eq!(mock.text_of(message.as_ref().unwrap()).as_deref(), Some("same"));
        assert_eq!(mock.not_modified_count(), 2);
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let mock = Arc::new(MockNotifier::failing());
        let reporter = StatusReporter::new(mock.clone());
        let mut message = None;

        reporter
            .post(JobId::new(), &conversation(1), &mut message, "lost", false)
            .await;
        assert!(message.is_none());
        reporter.announce(&conversation(1), "also lost").await;
    }

    #[tokio::test]
    async fn stale_position_update_is_skipped() {
        let mock = Arc::new(MockNotifier::new());
        let reporter = StatusReporter::new(mock.clone());
        let queue = JobQueue::new();

        let mut j = job(1, "a");
        let msg = mock
            .create_status_message(&j.conversation, "received", None)
            .await
            .unwrap();
        j.status_message = Some(msg.clone());
        let id = j.id;
        queue.enqueue(j).unwrap();

        let update = PositionUpdate {
            job_id: id,
            owner: crate::job::UserId(1),
            conversation: conversation(1),
            status_message: Some(msg.clone()),
            position: 3,
        };
        reporter.show_position(&queue, &update).await;
        assert_eq!(mock.text_of(&msg).as_deref(), Some("received"));

        let current = PositionUpdate {
            position: 1,
            ..update
        };
        reporter.show_position(&queue, &current).await;
        assert_eq!(mock.text_of(&msg), Some(status::queued(1)));
    }
}
