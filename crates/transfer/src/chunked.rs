use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::progress::ProgressSink;
use crate::scratch::TempFile;
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// Fails with [`TransferError::Cancelled`] if `cancel` is set.
pub fn checkpoint(cancel: &CancellationToken) -> Result<(), TransferError> {
    if cancel.is_cancelled() {
        Err(TransferError::Cancelled)
    } else {
        Ok(())
    }
}

/// Copies `reader` into `writer` one chunk at a time.
///
/// The token is checked before every chunk and progress is reported after
/// every chunk. `total` is only used for progress; the copy runs until EOF.
/// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
pub async fn copy_chunked<R, W>(
    reader: &mut R,
    writer: &mut W,
    total: u64,
    chunk_size: usize,
    progress: &ProgressSink,
    cancel: &CancellationToken,
) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };
    let mut buf = vec![0u8; chunk_size];
    let mut copied: u64 = 0;

    progress.report(0, total);

    loop {
        checkpoint(cancel)?;

        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        copied += n as u64;

        progress.report(copied, total.max(copied));
    }

    writer.flush().await?;
    Ok(copied)
}

/// Copies the file at `src` to `dst` with [`copy_chunked`].
///
/// Parent directories of `dst` are created. A partially written `dst` is
/// removed when the copy fails or is cancelled.
pub async fn copy_file_chunked(
    src: &Path,
    dst: &Path,
    chunk_size: usize,
    progress: &ProgressSink,
    cancel: &CancellationToken,
) -> Result<u64, TransferError> {
    let mut input = tokio::fs::File::open(src).await?;
    let total = input.metadata().await?.len();

    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let partial = TempFile::new(dst);
    let result = async {
        let mut output = tokio::fs::File::create(partial.path()).await?;
        let copied =
            copy_chunked(&mut input, &mut output, total, chunk_size, progress, cancel).await?;
        output.sync_all().await?;
        Ok::<_, TransferError>(copied)
    }
    .await;

    match result {
        Ok(copied) => {
            debug!(src = %src.display(), dst = %dst.display(), bytes = copied, "file copied");
            partial.keep();
            Ok(copied)
        }
        Err(e) => {
            if let Err(remove_err) = partial.remove().await {
                warn!(path = %dst.display(), error = %remove_err, "failed to remove partial file");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{Progress, progress_channel};
    use tempfile::TempDir;

    #[tokio::test]
    async fn copies_all_bytes_and_reports_completion() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut reader = std::io::Cursor::new(data.clone());
        let mut writer = Vec::new();
        let (sink, rx) = progress_channel();
        let cancel = CancellationToken::new();

        let n = copy_chunked(&mut reader, &mut writer, data.len() as u64, 1024, &sink, &cancel)
            .await
            .unwrap();

        assert_eq!(n, data.len() as u64);
        assert_eq!(writer, data);
        assert_eq!(
            *rx.borrow(),
            Progress {
                current: 10_000,
                total: 10_000
            }
        );
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_first_chunk() {
        let mut reader = std::io::Cursor::new(vec![1u8; 4096]);
        let mut writer = Vec::new();
        let (sink, _rx) = progress_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = copy_chunked(&mut reader, &mut writer, 4096, 1024, &sink, &cancel).await;
        assert!(matches!(result, Err(TransferError::Cancelled)));
        assert!(writer.is_empty());
    }

    #[tokio::test]
    async fn zero_chunk_size_uses_default() {
        let mut reader = std::io::Cursor::new(vec![7u8; 10]);
        let mut writer = Vec::new();
        let (sink, _rx) = progress_channel();
        let cancel = CancellationToken::new();

        let n = copy_chunked(&mut reader, &mut writer, 10, 0, &sink, &cancel)
            .await
            .unwrap();
        assert_eq!(n, 10);
    }

    #[tokio::test]
    async fn file_copy_creates_parents() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("in.bin");
        std::fs::write(&src, b"payload").unwrap();
        let dst = dir.path().join("a/b/out.bin");
        let (sink, _rx) = progress_channel();

        let n = copy_file_chunked(&src, &dst, 3, &sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(n, 7);
        assert_eq!(std::fs::read(&dst).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn cancelled_file_copy_leaves_no_partial_output() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("in.bin");
        std::fs::write(&src, vec![0u8; 8192]).unwrap();
        let dst = dir.path().join("out.bin");
        let (sink, _rx) = progress_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = copy_file_chunked(&src, &dst, 1024, &sink, &cancel).await;
        assert!(matches!(result, Err(TransferError::Cancelled)));
        assert!(!dst.exists());
    }

    #[tokio::test]
    async fn cancel_mid_copy_removes_partial_output() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("in.bin");
        std::fs::write(&src, vec![5u8; 8192]).unwrap();
        let dst = dir.path().join("out.bin");
        let (sink, mut rx) = progress_channel();
        let cancel = CancellationToken::new();

        let (result, ()) = tokio::join!(
            copy_file_chunked(&src, &dst, 16, &sink, &cancel),
            async {
                while rx.changed().await.is_ok() {
                    if rx.borrow_and_update().current > 0 {
                        cancel.cancel();
                        break;
                    }
                }
            }
        );

        assert!(matches!(result, Err(TransferError::Cancelled)));
        assert!(!dst.exists());
    }

    #[tokio::test]
    async fn missing_source_is_io_error() {
        let dir = TempDir::new().unwrap();
        let (sink, _rx) = progress_channel();
        let result = copy_file_chunked(
            &dir.path().join("nope"),
            &dir.path().join("out"),
            0,
            &sink,
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(TransferError::Io(_))));
    }
}
