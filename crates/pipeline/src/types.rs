//! Data types crossing the pipeline boundary.

use serde::{Deserialize, Serialize};

use crate::job::{ConversationRef, JobId, JobState, MessageRef, RemoteId, SourceRef, UserId};

/// A media object a user asked to store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSubmission {
    pub owner: UserId,
    pub conversation: ConversationRef,
    pub source: SourceRef,
    pub display_name: String,
}

/// Inbound event from the messaging platform, classified once at the
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundEvent {
    Media(MediaSubmission),
    /// Anything that carries no transferable media.
    NotMedia {
        owner: UserId,
        conversation: ConversationRef,
    },
}

impl InboundEvent {
    pub fn owner(&self) -> UserId {
        match self {
            InboundEvent::Media(m) => m.owner,
            InboundEvent::NotMedia { owner, .. } => *owner,
        }
    }

    pub fn conversation(&self) -> &ConversationRef {
        match self {
            InboundEvent::Media(m) => &m.conversation,
            InboundEvent::NotMedia { conversation, .. } => conversation,
        }
    }
}

/// Result of a successful admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub job_id: JobId,
    /// 1-based queue position at insertion time.
    pub position: usize,
}

/// A user asking to stop a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub job_id: JobId,
    pub requester: UserId,
}

/// How a cancel request took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was still queued and has been removed; it never ran.
    Dequeued,
    /// The job is running; its token is set and it stops at the next chunk.
    Signalled,
}

/// A queued job whose displayed position changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionUpdate {
    pub job_id: JobId,
    pub owner: UserId,
    pub conversation: ConversationRef,
    pub status_message: Option<MessageRef>,
    pub position: usize,
}

/// A queued job as seen by [`QueueSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedEntry {
    pub job_id: JobId,
    pub owner: UserId,
    pub display_name: String,
    pub position: usize,
}

/// The job currently holding the active slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEntry {
    pub job_id: JobId,
    pub owner: UserId,
    pub display_name: String,
    pub state: JobState,
}

/// Point-in-time view of the active slot and the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub active: Option<ActiveEntry>,
    pub queued: Vec<QueuedEntry>,
}

/// Terminal result of a processed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded { remote_id: RemoteId, url: String },
    Cancelled,
    Failed {
        error: String,
        /// The owner must authenticate again before resubmitting.
        reauthenticate: bool,
    },
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Succeeded { .. } => JobState::Succeeded,
            JobOutcome::Cancelled => JobState::Cancelled,
            JobOutcome::Failed { .. } => JobState::Failed,
        }
    }
}

/// Event emitted by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// The job left the queue and took the active slot.
    Started { job_id: JobId, owner: UserId },
    /// The job entered `Downloading` or `Uploading`.
    Phase { job_id: JobId, state: JobState },
    /// A progress milestone was reached within the current phase.
    Milestone {
        job_id: JobId,
        state: JobState,
        percent: u8,
    },
    /// The job reached a terminal state and released the active slot.
    Finished { job_id: JobId, outcome: JobOutcome },
}
