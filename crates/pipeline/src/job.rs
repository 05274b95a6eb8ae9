//! The unit of work and its identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::types::MediaSubmission;

/// Unique job identifier, generated at admission.
///
/// Used as the key for cancel requests and for status-message correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Chat-platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Where status updates for a job are delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRef {
    pub chat_id: i64,
    /// The user's message the status should reply to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i64>,
}

/// Handle to an already delivered status message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

/// Opaque source handle understood by the storage gateway's fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRef(pub String);

impl SourceRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a stored remote object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub String);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Downloading,
    Uploading,
    Succeeded,
    Cancelled,
    Failed,
}

impl JobState {
    /// `Downloading` or `Uploading`: the job holds the active slot.
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Downloading | JobState::Uploading)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Cancelled | JobState::Failed
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Queued => "queued",
            JobState::Downloading => "downloading",
            JobState::Uploading => "uploading",
            JobState::Succeeded => "succeeded",
            JobState::Cancelled => "cancelled",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One user's request to move one media object into their storage.
#[derive(Debug)]
pub struct TransferJob {
    pub id: JobId,
    pub owner: UserId,
    pub conversation: ConversationRef,
    pub source: SourceRef,
    pub display_name: String,
    pub state: JobState,
    /// 1-based rank among queued jobs; only meaningful while `Queued`.
    pub queue_position: usize,
    /// The single status message reused across all transitions.
    pub status_message: Option<MessageRef>,
    cancel: CancellationToken,
}

impl TransferJob {
    /// Builds a fresh job from an admitted submission.
    pub fn new(submission: MediaSubmission) -> Self {
        Self {
            id: JobId::new(),
            owner: submission.owner,
            conversation: submission.conversation,
            source: submission.source,
            display_name: submission.display_name,
            state: JobState::Queued,
            queue_position: 0,
            status_message: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the cancellation flag. Idempotent; the flag is never cleared.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A handle to this job's token for the step currently running it.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
