//! Pipeline error types.

use crate::job::{JobId, UserId};

/// The requesting user may not do what they asked.
///
/// Recoverable by the user: authenticate again, or act on their own jobs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("user {0} has no storage credentials")]
    NotAuthorized(UserId),

    #[error("storage credentials for user {0} have expired")]
    CredentialsExpired(UserId),

    #[error("user {user} does not own job {job}")]
    NotOwner { job: JobId, user: UserId },
}

/// A status message could not be delivered.
///
/// Never affects the outcome of a job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifierError {
    /// The edit would leave the message unchanged.
    #[error("message not modified")]
    NotModified,

    #[error("status delivery failed: {0}")]
    Delivery(String),
}

/// Errors produced by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("authorization error: {0}")]
    Auth(#[from] AuthError),

    #[error("transfer error: {0}")]
    Transfer(#[from] mediadrop_transfer::TransferError),

    #[error("message does not contain media")]
    NotMedia,

    #[error("unknown job: {0}")]
    UnknownJob(JobId),

    #[error("queue is closed")]
    QueueClosed,
}

impl PipelineError {
    /// Returns `true` if this error is the cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Transfer(e) if e.is_cancelled())
    }
}
