//! Shared fixtures and mock collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use mediadrop_transfer::{ProgressSink, TransferError, checkpoint};
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::NotifierError;
use crate::gateway::{GatewayFuture, StorageGateway};
use crate::job::{ConversationRef, JobId, MessageRef, RemoteId, SourceRef, TransferJob, UserId};
use crate::notifier::{NotifierFuture, StatusNotifier};
use crate::types::MediaSubmission;

pub(crate) fn conversation(chat_id: i64) -> ConversationRef {
    ConversationRef {
        chat_id,
        message_id: Some(1),
    }
}

pub(crate) fn submission(owner: i64, name: &str) -> MediaSubmission {
    MediaSubmission {
        owner: UserId(owner),
        conversation: conversation(owner),
        source: SourceRef(format!("src-{name}")),
        display_name: name.to_string(),
    }
}

pub(crate) fn job(owner: i64, name: &str) -> TransferJob {
    TransferJob::new(submission(owner, name))
}

// ---------------------------------------------------------------------------
// MockNotifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NotifierCall {
    Create {
        conversation: ConversationRef,
        text: String,
        cancel: Option<JobId>,
    },
    Update {
        message: MessageRef,
        text: String,
        cancel: Option<JobId>,
    },
    Delete {
        message: MessageRef,
    },
}

/// Records every call and behaves like a chat platform: identical edits
/// fail with `NotModified`.
pub(crate) struct MockNotifier {
    calls: Mutex<Vec<NotifierCall>>,
    texts: Mutex<HashMap<MessageRef, String>>,
    next_id: AtomicI64,
    not_modified: AtomicUsize,
    fail: bool,
}

impl MockNotifier {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            texts: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(100),
            not_modified: AtomicUsize::new(0),
            fail: false,
        }
    }

    /// Every delivery fails.
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub(crate) fn calls(&self) -> Vec<NotifierCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn text_of(&self, message: &MessageRef) -> Option<String> {
        self.texts.lock().unwrap().get(message).cloned()
    }

    /// Every text ever shown, in order.
    pub(crate) fn texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                NotifierCall::Create { text, .. } | NotifierCall::Update { text, .. } => Some(text),
                NotifierCall::Delete { .. } => None,
            })
            .collect()
    }

    pub(crate) fn not_modified_count(&self) -> usize {
        self.not_modified.load(Ordering::SeqCst)
    }

    fn record(&self, call: NotifierCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl StatusNotifier for MockNotifier {
    fn create_status_message<'a>(
        &'a self,
        conversation: &'a ConversationRef,
        text: &'a str,
        cancel: Option<JobId>,
    ) -> NotifierFuture<'a, MessageRef> {
        Box::pin(async move {
            self.record(NotifierCall::Create {
                conversation: conversation.clone(),
                text: text.to_string(),
                cancel,
            });
            if self.fail {
                return Err(NotifierError::Delivery("offline".into()));
            }
            let message = MessageRef {
                chat_id: conversation.chat_id,
                message_id: self.next_id.fetch_add(1, Ordering::SeqCst),
            };
            self.texts
                .lock()
                .unwrap()
                .insert(message.clone(), text.to_string());
            Ok(message)
        })
    }

    fn update_status_message<'a>(
        &'a self,
        message: &'a MessageRef,
        text: &'a str,
        cancel: Option<JobId>,
    ) -> NotifierFuture<'a, ()> {
        Box::pin(async move {
            self.record(NotifierCall::Update {
                message: message.clone(),
                text: text.to_string(),
                cancel,
            });
            if self.fail {
                return Err(NotifierError::Delivery("offline".into()));
            }
            let mut texts = self.texts.lock().unwrap();
            if texts.get(message).map(String::as_str) == Some(text) {
                self.not_modified.fetch_add(1, Ordering::SeqCst);
                return Err(NotifierError::NotModified);
            }
            texts.insert(message.clone(), text.to_string());
            Ok(())
        })
    }

    fn delete_status_message<'a>(&'a self, message: &'a MessageRef) -> NotifierFuture<'a, ()> {
        Box::pin(async move {
            self.record(NotifierCall::Delete {
                message: message.clone(),
            });
            self.texts.lock().unwrap().remove(message);
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// MockGateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GatewayCall {
    Fetch(String),
    Store { owner: UserId, name: String },
}

/// Fetch writes a real file into a private temp dir; store records the
/// upload. Individual sources can be told to fail or to block until
/// cancelled.
pub(crate) struct MockGateway {
    dir: TempDir,
    calls: Mutex<Vec<GatewayCall>>,
    fetched: Mutex<Vec<PathBuf>>,
    fail_fetch: Mutex<HashSet<String>>,
    fail_store: Mutex<HashSet<String>>,
    block_fetch: Mutex<HashSet<String>>,
    block_store: Mutex<HashSet<String>>,
    /// `(delay, current, total)` samples replacing the default 0/30/60/100.
    script: Mutex<Option<Vec<(Duration, u64, u64)>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    /// Signalled whenever a blocking call starts waiting.
    pub(crate) entered: Notify,
}

impl MockGateway {
    pub(crate) fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            calls: Mutex::new(Vec::new()),
            fetched: Mutex::new(Vec::new()),
            fail_fetch: Mutex::new(HashSet::new()),
            fail_store: Mutex::new(HashSet::new()),
            block_fetch: Mutex::new(HashSet::new()),
            block_store: Mutex::new(HashSet::new()),
            script: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            entered: Notify::new(),
        }
    }

    pub(crate) fn fail_fetch(&self, name: &str) {
        self.fail_fetch.lock().unwrap().insert(format!("src-{name}"));
    }

    pub(crate) fn fail_store(&self, name: &str) {
        self.fail_store.lock().unwrap().insert(format!("src-{name}"));
    }

    pub(crate) fn block_fetch(&self, name: &str) {
        self.block_fetch.lock().unwrap().insert(format!("src-{name}"));
    }

    pub(crate) fn block_store(&self, name: &str) {
        self.block_store.lock().unwrap().insert(format!("src-{name}"));
    }

    /// Makes every fetch and store report `steps`, sleeping before each.
    pub(crate) fn script_progress(&self, steps: &[(u64, u64, u64)]) {
        let steps = steps
            .iter()
            .map(|&(delay_ms, current, total)| (Duration::from_millis(delay_ms), current, total))
            .collect();
        *self.script.lock().unwrap() = Some(steps);
    }

    pub(crate) fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Local files produced by fetch, whether or not they still exist.
    pub(crate) fn fetched_paths(&self) -> Vec<PathBuf> {
        self.fetched.lock().unwrap().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, call: GatewayCall) {
        self.calls.lock().unwrap().push(call);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn source_of(local: &Path) -> String {
        std::fs::read_to_string(local).unwrap_or_default()
    }

    async fn report_steps(
        &self,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let script = self.script.lock().unwrap().clone();
        let Some(script) = script else {
            for step in [0u64, 30, 60, 100] {
                checkpoint(cancel)?;
                progress.report(step, 100);
                tokio::task::yield_now().await;
            }
            return Ok(());
        };
        for (delay, current, total) in script {
            tokio::time::sleep(delay).await;
            checkpoint(cancel)?;
            progress.report(current, total);
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

impl StorageGateway for MockGateway {
    fn fetch_to_local<'a>(
        &'a self,
        source: &'a SourceRef,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> GatewayFuture<'a, PathBuf> {
        Box::pin(async move {
            let key = source.as_str().to_string();
            self.enter(GatewayCall::Fetch(key.clone()));

            let result = async {
                if self.fail_fetch.lock().unwrap().contains(&key) {
                    return Err(TransferError::Source(format!("{key} is gone")));
                }
                let path = self.dir.path().join(format!("{}.part", JobId::new()));
                tokio::fs::write(&path, key.as_bytes()).await?;
                self.fetched.lock().unwrap().push(path.clone());

                if self.block_fetch.lock().unwrap().contains(&key) {
                    progress.report(10, 100);
                    self.entered.notify_one();
                    cancel.cancelled().await;
                    // A well-behaved gateway cleans up its own partial output.
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(TransferError::Cancelled);
                }
                if let Err(e) = self.report_steps(&progress, &cancel).await {
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(e);
                }
                Ok(path)
            }
            .await;

            self.leave();
            result
        })
    }

    fn store_from_local<'a>(
        &'a self,
        owner: UserId,
        local: &'a Path,
        name: &'a str,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> GatewayFuture<'a, RemoteId> {
        Box::pin(async move {
            self.enter(GatewayCall::Store {
                owner,
                name: name.to_string(),
            });
            let key = Self::source_of(local);

            let result = async {
                if self.fail_store.lock().unwrap().contains(&key) {
                    return Err(TransferError::Storage("quota exceeded".into()));
                }
                if self.block_store.lock().unwrap().contains(&key) {
                    progress.report(10, 100);
                    self.entered.notify_one();
                    cancel.cancelled().await;
                    return Err(TransferError::Cancelled);
                }
                self.report_steps(&progress, &cancel).await?;
                Ok(RemoteId(format!("{owner}/{name}")))
            }
            .await;

            self.leave();
            result
        })
    }

    fn remote_url(&self, remote: &RemoteId) -> String {
        format!("https://drive.test/{remote}")
    }
}
