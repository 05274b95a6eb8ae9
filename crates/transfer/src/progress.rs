use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Percentages at which a progress update is surfaced to the user.
pub const MILESTONES: [u8; 5] = [0, 25, 50, 75, 100];

/// Default minimum spacing between two surfaced updates.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Raw byte progress of a single transfer phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub current: u64,
    /// Total bytes expected; `0` means unknown.
    pub total: u64,
}

impl Progress {
    /// Returns `true` once `current` has reached a known `total`.
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.current >= self.total
    }

    /// Floor of the completed percentage, clamped to 100.
    ///
    /// Returns `None` when the total is unknown.
    pub fn percent(&self) -> Option<u8> {
        if self.total == 0 {
            return None;
        }
        let current = self.current.min(self.total) as u128;
        Some((current * 100 / self.total as u128) as u8)
    }

    /// The sample to show once a phase has returned successfully.
    ///
    /// A finished phase is complete even if the backend under-reported or
    /// the source was empty.
    pub fn finished(self) -> Self {
        let total = self.total.max(self.current).max(1);
        Self {
            current: total,
            total,
        }
    }
}

// ---------------------------------------------------------------------------
// ProgressThrottle
// ---------------------------------------------------------------------------

/// Turns a byte-count stream into a deduplicated milestone sequence.
///
/// One throttle tracks one phase; download and upload each get their own.
#[derive(Debug, Default)]
pub struct ProgressThrottle {
    last: Option<u8>,
}

impl ProgressThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a raw progress sample.
    ///
    /// Returns the milestone at or below the current percentage, but only if
    /// it is strictly greater than the last one emitted.
    pub fn consume(&mut self, current: u64, total: u64) -> Option<u8> {
        let percent = Progress { current, total }.percent()?;
        let milestone = MILESTONES
            .iter()
            .rev()
            .copied()
            .find(|m| *m <= percent)
            .unwrap_or(0);

        match self.last {
            Some(last) if milestone <= last => None,
            _ => {
                self.last = Some(milestone);
                Some(milestone)
            }
        }
    }

    /// The highest milestone emitted so far.
    pub fn last_emitted(&self) -> Option<u8> {
        self.last
    }
}

// ---------------------------------------------------------------------------
// ProgressGate
// ---------------------------------------------------------------------------

/// Time-based guard applied before [`ProgressThrottle::consume`].
///
/// The window is measured from the last update actually shown, so a sample
/// that produced no milestone does not hold back the next one. Completion
/// always passes so the final milestone is never swallowed.
#[derive(Debug)]
pub struct ProgressGate {
    interval: Duration,
    last: Option<Instant>,
}

impl Default for ProgressGate {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ProgressGate {
    /// Creates a gate; `None` defaults to 2 s.
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            interval: interval.unwrap_or(DEFAULT_INTERVAL),
            last: None,
        }
    }

    /// Returns `true` if a sample may be forwarded now.
    pub fn allow(&self, progress: Progress) -> bool {
        progress.is_complete()
            || self
                .last
                .is_none_or(|last| last.elapsed() >= self.interval)
    }

    /// Marks an update as shown, restarting the window.
    pub fn record(&mut self) {
        self.last = Some(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// ProgressSink
// ---------------------------------------------------------------------------

/// Receiving half of a progress channel, owned by the task that talks to
/// the chat platform.
pub type ProgressReceiver = watch::Receiver<Progress>;

/// Write side handed to gateways.
///
/// Reporting never blocks and never calls back into the notifier: the
/// newest sample replaces the previous one and the owning task picks it up
/// on its own schedule.
#[derive(Debug)]
pub struct ProgressSink {
    tx: watch::Sender<Progress>,
}

/// Creates a connected sink/receiver pair.
pub fn progress_channel() -> (ProgressSink, ProgressReceiver) {
    let (tx, rx) = watch::channel(Progress::default());
    (ProgressSink { tx }, rx)
}

impl ProgressSink {
    /// Reports `current` of `total` bytes.
    pub fn report(&self, current: u64, total: u64) {
        self.tx.send_replace(Progress { current, total });
    }

    /// Reports a percentage for backends that only expose one.
    pub fn report_percent(&self, percent: u8) {
        self.report(u64::from(percent.min(100)), 100);
    }
}
