//! Storage gateway backed by local directories.
//!
//! Sources are files in the spool directory; each user's storage is a
//! subdirectory of the drive root. Good enough for a single host and for
//! exercising the pipeline end to end.

use std::path::{Path, PathBuf};

use mediadrop_pipeline::gateway::GatewayFuture;
use mediadrop_pipeline::{RemoteId, SourceRef, StorageGateway, UserId};
use mediadrop_transfer::{ProgressSink, TransferError, copy_file_chunked, validate_object_name};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct LocalDriveGateway {
    spool_dir: PathBuf,
    staging_dir: PathBuf,
    drive_root: PathBuf,
    public_base_url: String,
    chunk_size: usize,
}

impl LocalDriveGateway {
    pub fn new(
        spool_dir: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
        drive_root: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
        chunk_size: usize,
    ) -> Self {
        Self {
            spool_dir: spool_dir.into(),
            staging_dir: staging_dir.into(),
            drive_root: drive_root.into(),
            public_base_url: public_base_url.into(),
            chunk_size,
        }
    }

    async fn fetch(
        &self,
        source: &SourceRef,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, TransferError> {
        validate_object_name(source.as_str())?;
        let src = self.spool_dir.join(source.as_str());
        if !tokio::fs::try_exists(&src).await? {
            return Err(TransferError::Source(format!("{source} not found")));
        }

        let dst = self
            .staging_dir
            .join(format!("{}.part", uuid::Uuid::new_v4()));
        let bytes = copy_file_chunked(&src, &dst, self.chunk_size, progress, cancel).await?;
        debug!(source = %source, bytes, local = %dst.display(), "fetched");
        Ok(dst)
    }

    async fn store(
        &self,
        owner: UserId,
        local: &Path,
        name: &str,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RemoteId, TransferError> {
        validate_object_name(name)?;
        let dir = self.drive_root.join(owner.to_string());
        let partial = dir.join(format!(".{name}.part"));
        let dst = dir.join(name);

        copy_file_chunked(local, &partial, self.chunk_size, progress, cancel).await?;
        if let Err(e) = tokio::fs::rename(&partial, &dst).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(TransferError::Storage(e.to_string()));
        }
        Ok(RemoteId(format!("{owner}/{name}")))
    }
}

impl StorageGateway for LocalDriveGateway {
    fn fetch_to_local<'a>(
        &'a self,
        source: &'a SourceRef,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> GatewayFuture<'a, PathBuf> {
        Box::pin(async move { self.fetch(source, &progress, &cancel).await })
    }

    fn store_from_local<'a>(
        &'a self,
        owner: UserId,
        local: &'a Path,
        name: &'a str,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> GatewayFuture<'a, RemoteId> {
        Box::pin(async move { self.store(owner, local, name, &progress, &cancel).await })
    }

    fn remote_url(&self, remote: &RemoteId) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), remote)
    }
}
