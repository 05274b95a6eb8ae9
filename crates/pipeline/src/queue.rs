//! Strict FIFO job queue with a single active slot.
//!
//! The pending jobs and the active-job registry live behind one mutex so a
//! job id is never visible in both at once. Positions are 1-based ranks
//! among pending jobs only; the active job is tracked separately.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{AuthError, PipelineError};
use crate::job::{JobId, JobState, TransferJob, UserId};
use crate::types::{ActiveEntry, CancelOutcome, PositionUpdate, QueueSnapshot, QueuedEntry};

/// Registry entry for the job holding the active slot.
#[derive(Debug)]
struct ActiveJob {
    id: JobId,
    owner: UserId,
    display_name: String,
    state: JobState,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct QueueInner {
    pending: VecDeque<TransferJob>,
    active: Option<ActiveJob>,
    closed: bool,
}

impl QueueInner {
    /// Moves every job behind `removed` up by one and returns one update per
    /// moved job.
    fn positions_after_removal(&mut self, removed: usize) -> Vec<PositionUpdate> {
        let mut updates = Vec::new();
        for job in self.pending.iter_mut() {
            if job.queue_position > removed {
                job.queue_position -= 1;
                updates.push(PositionUpdate {
                    job_id: job.id,
                    owner: job.owner,
                    conversation: job.conversation.clone(),
                    status_message: job.status_message.clone(),
                    position: job.queue_position,
                });
            }
        }
        debug_assert!(
            self.pending
                .iter()
                .enumerate()
                .all(|(i, job)| job.queue_position == i + 1)
        );
        updates
    }

    /// Registers the popped head as the active job.
    fn activate(&mut self, mut job: TransferJob) -> (TransferJob, Vec<PositionUpdate>) {
        let updates = self.positions_after_removal(job.queue_position);
        job.queue_position = 0;
        job.state = JobState::Downloading;
        self.active = Some(ActiveJob {
            id: job.id,
            owner: job.owner,
            display_name: job.display_name.clone(),
            state: job.state,
            cancel: job.cancel_token(),
        });
        (job, updates)
    }

    fn take(&mut self, id: JobId) -> Option<(TransferJob, Vec<PositionUpdate>)> {
        let index = self.pending.iter().position(|job| job.id == id)?;
        let mut job = self.pending.remove(index)?;
        let updates = self.positions_after_removal(job.queue_position);
        job.queue_position = 0;
        Some((job, updates))
    }
}

/// What a successful [`JobQueue::cancel`] did.
#[derive(Debug)]
pub enum CancelEffect {
    /// The job was removed while still queued and is handed back.
    Dequeued(TransferJob),
    /// The active job's token was set.
    Signalled,
}

impl CancelEffect {
    pub fn outcome(&self) -> CancelOutcome {
        match self {
            CancelEffect::Dequeued(_) => CancelOutcome::Dequeued,
            CancelEffect::Signalled => CancelOutcome::Signalled,
        }
    }
}

/// Unbounded FIFO of pending jobs plus the active-job registry.
///
/// Safe to share behind an `Arc`: many admission paths may enqueue while a
/// single worker dequeues.
pub struct JobQueue {
    inner: Mutex<QueueInner>,
    ready: Notify,
    idle: Notify,
    positions_tx: mpsc::UnboundedSender<PositionUpdate>,
    positions_rx: Mutex<Option<mpsc::UnboundedReceiver<PositionUpdate>>>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        let (positions_tx, positions_rx) = mpsc::unbounded_channel();
        Self {
            inner: Mutex::new(QueueInner::default()),
            ready: Notify::new(),
            idle: Notify::new(),
            positions_tx,
            positions_rx: Mutex::new(Some(positions_rx)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, updates: Vec<PositionUpdate>) {
        for update in updates {
            // Nobody listening is fine; the next refresh reads fresh state.
            let _ = self.positions_tx.send(update);
        }
    }

    /// Takes the position-update receiver. Can only be called once.
    ///
    /// One update is sent for every queued job whose position changed
    /// because a job ahead of it left the queue.
    pub fn take_position_updates(&self) -> Option<mpsc::UnboundedReceiver<PositionUpdate>> {
        self.positions_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Appends `job` and returns its 1-based position among queued jobs.
    pub fn enqueue(&self, mut job: TransferJob) -> Result<usize, PipelineError> {
        let position = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(PipelineError::QueueClosed);
            }
            let position = inner.pending.len() + 1;
            job.state = JobState::Queued;
            job.queue_position = position;
            info!(job = %job.id, owner = %job.owner, position, "job queued");
            inner.pending.push_back(job);
            position
        };
        self.ready.notify_one();
        Ok(position)
    }

    /// Waits for the head job and moves it into the active slot.
    ///
    /// Suspends while the queue is empty or another job is active. Returns
    /// `None` once the queue is closed. Cancel-safe: no job is lost if the
    /// returned future is dropped.
    pub async fn dequeue(&self) -> Option<TransferJob> {
        loop {
            {
                let mut inner = self.lock();
                if inner.closed {
                    return None;
                }
                if inner.active.is_none()
                    && let Some(job) = inner.pending.pop_front()
                {
                    let (job, updates) = inner.activate(job);
                    drop(inner);
                    self.publish(updates);
                    debug!(job = %job.id, "job dequeued");
                    return Some(job);
                }
            }
            self.ready.notified().await;
        }
    }

    /// Removes a queued job anywhere in the queue and returns it.
    pub fn take_by_id(&self, id: JobId) -> Option<TransferJob> {
        let (job, updates) = self.lock().take(id)?;
        self.publish(updates);
        self.idle.notify_waiters();
        Some(job)
    }

    /// Removes a queued job; returns whether it was present.
    pub fn remove_by_id(&self, id: JobId) -> bool {
        self.take_by_id(id).is_some()
    }

    /// Cancels a queued or active job on behalf of `requester`.
    ///
    /// Only the owner may cancel unless `operator` is set. A queued job is
    /// removed and returned with its token set; an active job only has its
    /// token set.
    pub fn cancel(
        &self,
        id: JobId,
        requester: UserId,
        operator: bool,
    ) -> Result<CancelEffect, PipelineError> {
        let not_owner = || {
            PipelineError::Auth(AuthError::NotOwner {
                job: id,
                user: requester,
            })
        };

        let mut inner = self.lock();

        if let Some(active) = inner.active.as_ref().filter(|a| a.id == id) {
            if active.owner != requester && !operator {
                return Err(not_owner());
            }
            active.cancel.cancel();
            info!(job = %id, by = %requester, "active job signalled");
            return Ok(CancelEffect::Signalled);
        }

        let owner = inner
            .pending
            .iter()
            .find(|job| job.id == id)
            .map(|job| job.owner)
            .ok_or(PipelineError::UnknownJob(id))?;
        if owner != requester && !operator {
            return Err(not_owner());
        }
        let (mut job, updates) = inner.take(id).ok_or(PipelineError::UnknownJob(id))?;
        drop(inner);

        job.cancel();
        job.state = JobState::Cancelled;
        self.publish(updates);
        self.idle.notify_waiters();
        info!(job = %id, by = %requester, "queued job cancelled");
        Ok(CancelEffect::Dequeued(job))
    }

    /// Records a phase change of the active job.
    pub fn set_active_state(&self, id: JobId, state: JobState) {
        if let Some(active) = self.lock().active.as_mut().filter(|a| a.id == id) {
            active.state = state;
        }
    }

    /// Releases the active slot held by `id`. Returns whether it was held.
    pub fn finish_active(&self, id: JobId) -> bool {
        let released = {
            let mut inner = self.lock();
            if inner.active.as_ref().is_some_and(|a| a.id == id) {
                inner.active = None;
                true
            } else {
                false
            }
        };
        if released {
            self.ready.notify_one();
            self.idle.notify_waiters();
        }
        released
    }

    /// Current 1-based position of a queued job.
    pub fn position_of(&self, id: JobId) -> Option<usize> {
        self.lock()
            .pending
            .iter()
            .find(|job| job.id == id)
            .map(|job| job.queue_position)
    }

    /// Id of the job holding the active slot.
    pub fn active_job(&self) -> Option<JobId> {
        self.lock().active.as_ref().map(|a| a.id)
    }

    /// Number of queued jobs, not counting the active one.
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let inner = self.lock();
        QueueSnapshot {
            active: inner.active.as_ref().map(|a| ActiveEntry {
                job_id: a.id,
                owner: a.owner,
                display_name: a.display_name.clone(),
                state: a.state,
            }),
            queued: inner
                .pending
                .iter()
                .map(|job| QueuedEntry {
                    job_id: job.id,
                    owner: job.owner,
                    display_name: job.display_name.clone(),
                    position: job.queue_position,
                })
                .collect(),
        }
    }

    /// Refuses further admissions, signals the active job and hands back
    /// every still-queued job with its token set.
    pub fn close(&self) -> Vec<TransferJob> {
        let drained: Vec<TransferJob> = {
            let mut inner = self.lock();
            inner.closed = true;
            if let Some(active) = &inner.active {
                active.cancel.cancel();
            }
            inner.pending.drain(..).collect()
        };
        self.ready.notify_one();
        self.idle.notify_waiters();

        drained
            .into_iter()
            .map(|mut job| {
                job.cancel();
                job.state = JobState::Cancelled;
                job.queue_position = 0;
                job
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Resolves once nothing is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not lost.
            notified.as_mut().enable();
            {
                let inner = self.lock();
                if inner.active.is_none() && inner.pending.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }
}
