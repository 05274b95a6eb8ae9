//! Storage gateway trait.
//!
//! `StorageGateway` is implemented by the host to bridge the pipeline to the
//! chat platform's download API and the user's cloud storage. Using a trait
//! keeps the worker decoupled from both and testable with mocks.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use mediadrop_transfer::{ProgressSink, TransferError};
use tokio_util::sync::CancellationToken;

use crate::job::{RemoteId, SourceRef, UserId};

/// Boxed future returned by [`StorageGateway`] methods.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransferError>> + Send + 'a>>;

/// Fetch-to-local and store-from-local capabilities.
///
/// Both operations must check `cancel` at least once per chunk and fail with
/// [`TransferError::Cancelled`] when it is set. Progress goes to the sink;
/// implementations never talk to the chat platform themselves.
pub trait StorageGateway: Send + Sync {
    /// Downloads the source to a new local file and returns its path.
    ///
    /// On failure no partial file may be left behind.
    fn fetch_to_local<'a>(
        &'a self,
        source: &'a SourceRef,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> GatewayFuture<'a, PathBuf>;

    /// Uploads `local` into `owner`'s storage under `name`.
    fn store_from_local<'a>(
        &'a self,
        owner: UserId,
        local: &'a Path,
        name: &'a str,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> GatewayFuture<'a, RemoteId>;

    /// Shareable reference for a stored object. Pure, no I/O.
    fn remote_url(&self, remote: &RemoteId) -> String;
}
