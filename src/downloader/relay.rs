// Progress relay - turns transfer callbacks into events for the interface
//
// Callbacks fire on the download worker. They are converted into
// `DownloadEvent`s and handed over through an unbounded channel; nothing on
// the worker side touches interface state. Every job carries the generation
// it was started under and events are dropped once a newer job has begun.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use super::traits::StreamCallbacks;

/// Identity of one user-initiated download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// Percent complete, 0..=100, never decreasing within a job
    Progress(u8),
    /// File path (single video) or destination directory (playlist)
    Completed(PathBuf),
    Failed(String),
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadEvent {
    pub job: JobId,
    pub event: JobEvent,
}

/// `100 - floor(100 * remaining / total)`, held below 100 until nothing remains
pub fn single_stream_percent(bytes_remaining: u64, total_bytes: u64) -> u8 {
    if total_bytes == 0 {
        return if bytes_remaining == 0 { 100 } else { 0 };
    }
    let remaining = bytes_remaining.min(total_bytes);
    let percent = 100 - (100 * remaining as u128 / total_bytes as u128) as u8;
    if remaining > 0 {
        percent.min(99)
    } else {
        percent
    }
}

/// `floor(100 * downloaded / total)`, clamped to 100
pub fn playlist_percent(downloaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    (100 * downloaded.min(total) as u128 / total as u128) as u8
}

#[derive(Clone)]
pub struct ProgressRelay {
    tx: UnboundedSender<DownloadEvent>,
    generation: Arc<AtomicU64>,
}

impl ProgressRelay {
    pub fn channel() -> (Self, UnboundedReceiver<DownloadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let relay = Self {
            tx,
            generation: Arc::new(AtomicU64::new(0)),
        };
        (relay, rx)
    }

    /// Start a new job; every earlier job becomes stale
    pub fn begin_job(&self) -> JobId {
        JobId(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, job: JobId) -> bool {
        self.generation.load(Ordering::SeqCst) == job.0
    }

    /// Per-job tracker handed to the worker
    pub fn open(&self, job: JobId) -> JobTracker {
        JobTracker {
            inner: Arc::new(TrackerInner {
                job,
                relay: self.clone(),
                last_percent: AtomicU8::new(0),
                finished: AtomicBool::new(false),
            }),
        }
    }

    fn forward(&self, job: JobId, event: JobEvent) {
        if !self.is_current(job) {
            trace!(%job, ?event, "dropping event from superseded job");
            return;
        }
        // A closed receiver means the interface is gone
        let _ = self.tx.send(DownloadEvent { job, event });
    }
}

struct TrackerInner {
    job: JobId,
    relay: ProgressRelay,
    last_percent: AtomicU8,
    finished: AtomicBool,
}

/// Enforces the per-job event contract: progress never decreases, and
/// nothing follows the single terminal event.
#[derive(Clone)]
pub struct JobTracker {
    inner: Arc<TrackerInner>,
}

impl JobTracker {
    pub fn job(&self) -> JobId {
        self.inner.job
    }

    pub fn is_current(&self) -> bool {
        self.inner.relay.is_current(self.inner.job)
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::SeqCst)
    }

    /// Announce the job with 0%
    pub fn started(&self) {
        if !self.is_finished() {
            self.inner.relay.forward(self.inner.job, JobEvent::Progress(0));
        }
    }

    pub fn progress(&self, percent: u8) {
        if self.is_finished() {
            return;
        }
        let percent = percent.min(100);
        let previous = self.inner.last_percent.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            self.inner.relay.forward(self.inner.job, JobEvent::Progress(percent));
        }
    }

    pub fn complete(&self, path: &Path) {
        if self.inner.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.inner.last_percent.swap(100, Ordering::SeqCst) < 100 {
            self.inner.relay.forward(self.inner.job, JobEvent::Progress(100));
        }
        self.inner
            .relay
            .forward(self.inner.job, JobEvent::Completed(path.to_path_buf()));
    }

    pub fn fail(&self, message: impl Into<String>) {
        if self.inner.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner
            .relay
            .forward(self.inner.job, JobEvent::Failed(message.into()));
    }
}

/// Callbacks for a single-stream job
pub struct SingleStreamReporter {
    tracker: JobTracker,
    total: AtomicU64,
}

impl SingleStreamReporter {
    /// `declared_size` of 0 means unknown; the total is then taken from
    /// the first callback that still has bytes remaining. Until one arrives
    /// no progress is reported and completion alone moves the job to 100.
    pub fn new(tracker: JobTracker, declared_size: u64) -> Self {
        Self {
            tracker,
            total: AtomicU64::new(declared_size),
        }
    }
}

impl StreamCallbacks for SingleStreamReporter {
    fn on_progress(&self, chunk: &[u8], bytes_remaining: u64) {
        let mut total = self.total.load(Ordering::SeqCst);
        if total == 0 {
            if bytes_remaining == 0 {
                return;
            }
            total = chunk.len() as u64 + bytes_remaining;
            self.total.store(total, Ordering::SeqCst);
        }
        self.tracker.progress(single_stream_percent(bytes_remaining, total));
    }

    fn on_complete(&self, path: &Path) {
        self.tracker.complete(path);
    }
}

/// Callbacks shared by every item of a playlist job
pub struct PlaylistReporter {
    tracker: JobTracker,
    /// prefix[i] = declared bytes of the first i items
    prefix: Vec<u64>,
    destination: PathBuf,
    completed: AtomicUsize,
    item_bytes: AtomicU64,
}

impl PlaylistReporter {
    pub fn new(tracker: JobTracker, item_sizes: &[u64], destination: PathBuf) -> Self {
        let mut prefix = Vec::with_capacity(item_sizes.len() + 1);
        prefix.push(0);
        for size in item_sizes {
            let last = prefix.last().copied().unwrap_or(0);
            prefix.push(last + size);
        }
        Self {
            tracker,
            prefix,
            destination,
            completed: AtomicUsize::new(0),
            item_bytes: AtomicU64::new(0),
        }
    }

    pub fn item_count(&self) -> usize {
        self.prefix.len() - 1
    }

    pub fn total_bytes(&self) -> u64 {
        self.prefix.last().copied().unwrap_or(0)
    }
}

impl StreamCallbacks for PlaylistReporter {
    fn on_progress(&self, chunk: &[u8], _bytes_remaining: u64) {
        let total = self.total_bytes();
        if total == 0 {
            return;
        }
        let index = self.completed.load(Ordering::SeqCst).min(self.item_count());
        let item = self.item_bytes.fetch_add(chunk.len() as u64, Ordering::SeqCst) + chunk.len() as u64;
        let item_size = self.prefix.get(index + 1).map_or(0, |end| end - self.prefix[index]);
        let downloaded = self.prefix[index] + item.min(item_size);
        self.tracker.progress(playlist_percent(downloaded, total));
    }

    fn on_complete(&self, _path: &Path) {
        self.item_bytes.store(0, Ordering::SeqCst);
        let done = (self.completed.fetch_add(1, Ordering::SeqCst) + 1).min(self.item_count());
        let total = self.total_bytes();
        let percent = if total > 0 {
            playlist_percent(self.prefix[done], total)
        } else {
            playlist_percent(done as u64, self.item_count() as u64)
        };
        self.tracker.progress(percent);
        if done == self.item_count() {
            self.tracker.complete(&self.destination);
        }
    }
}
