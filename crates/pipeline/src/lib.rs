//! Queued media transfer pipeline.
//!
//! Users submit media from a chat conversation; each submission becomes a
//! [`TransferJob`] that waits in a strict FIFO [`JobQueue`] until the single
//! [`TransferWorker`] moves it into the owner's cloud storage. The chat
//! platform and the storage backend stay behind the [`StatusNotifier`] and
//! [`StorageGateway`] traits, so this crate has no transport dependencies.
//!
//! # Pipeline
//!
//! 1. **Admit**: [`Dispatcher::admit`] validates the inbound event and the
//!    owner's credentials, posts a status message and enqueues the job
//! 2. **Dequeue**: the worker takes the head job; the jobs behind it move up
//! 3. **Re-check**: credentials are validated again before any I/O
//! 4. **Fetch**: source bytes are downloaded to a local temp file
//! 5. **Store**: the temp file is uploaded under a deterministic name
//! 6. **Report**: success link, cancellation or the error text
//! 7. **Clean up**: temp file deleted and active slot released on every path

pub mod auth;
pub mod callback;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod job;
pub mod notifier;
pub mod queue;
pub mod status;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

// Re-export primary types for convenience.
pub use auth::{Credential, CredentialStore, StaticCredentials};
pub use callback::CallbackAction;
pub use dispatcher::Dispatcher;
pub use error::{AuthError, NotifierError, PipelineError};
pub use gateway::{GatewayFuture, StorageGateway};
pub use job::{
    ConversationRef, JobId, JobState, MessageRef, RemoteId, SourceRef, TransferJob, UserId,
};
pub use notifier::{NotifierFuture, StatusNotifier, StatusReporter};
pub use queue::{CancelEffect, JobQueue};
pub use types::{
    ActiveEntry, Admission, CancelOutcome, CancelRequest, InboundEvent, JobOutcome,
    MediaSubmission, PositionUpdate, QueueSnapshot, QueuedEntry, WorkerEvent,
};
pub use worker::TransferWorker;
