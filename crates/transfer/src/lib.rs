//! Cancellable chunked transfer primitives with milestone progress.
//!
//! Everything here is independent of the chat platform and of the storage
//! backend: gateways use [`copy_chunked`] to move bytes, report raw byte
//! counts through a [`ProgressSink`], and the pipeline turns those into
//! sparse milestone updates with [`ProgressThrottle`].

mod chunked;
mod naming;
mod progress;
mod scratch;

pub use chunked::{checkpoint, copy_chunked, copy_file_chunked};
pub use naming::{
    remote_object_name, sanitize_display_name, source_fingerprint, validate_object_name,
};
pub use progress::{
    MILESTONES, Progress, ProgressGate, ProgressReceiver, ProgressSink, ProgressThrottle,
    progress_channel,
};
pub use scratch::TempFile;

/// Default chunk size: 1 MiB.
///
/// Cancellation is observed once per chunk, so this also bounds how much
/// data moves after a cancel request.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Errors produced while moving bytes.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The job's cancellation token was observed set at a chunk boundary.
    #[error("cancelled")]
    Cancelled,

    #[error("source unavailable: {0}")]
    Source(String),

    #[error("storage rejected upload: {0}")]
    Storage(String),

    #[error("invalid name: {0}")]
    InvalidName(String),
}

impl TransferError {
    /// Returns `true` for the cancellation signal, `false` for real failures.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }
}
