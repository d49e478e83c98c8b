// Session - the interface-side coordinator
//
// Owns everything the interface reads or mutates: the current video, the
// download directory and the active job. Workers never touch it; they only
// send events through the relay, which the session drains on its own task.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::errors::DownloadError;
use super::links::{self, LinkKind};
use super::models::{DownloadDirectory, DownloadJob, PlaylistJob, Stream, VideoHandle};
use super::relay::{DownloadEvent, JobEvent, JobId, JobTracker, ProgressRelay};
use super::stream_selector::{DownloadRequest, StreamSelector};
use super::traits::VideoSource;
use super::worker::DownloadWorker;
use crate::config::ConfigStore;

/// What the preview pane shows after a search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    /// Video title; `None` for playlists, whose members are resolved later
    pub title: Option<String>,
    pub embed_url: String,
    pub kind: LinkKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistOptions {
    pub audio_only: bool,
    /// Target resolution for every item, e.g. "720p"
    pub resolution: String,
}

impl Default for PlaylistOptions {
    fn default() -> Self {
        Self {
            audio_only: false,
            resolution: "720p".to_string(),
        }
    }
}

/// The job whose events the interface is waiting for
struct ActiveJob {
    id: JobId,
    handle: JoinHandle<()>,
    /// The worker task has ended; only queued events remain
    exited: bool,
}

pub struct Session {
    source: Arc<dyn VideoSource>,
    worker: DownloadWorker,
    config: ConfigStore,
    directory: DownloadDirectory,
    relay: ProgressRelay,
    events: UnboundedReceiver<DownloadEvent>,
    video: Option<VideoHandle>,
    playlist_url: Option<String>,
    preview: Option<Preview>,
    active: Option<ActiveJob>,
}

impl Session {
    pub fn new(source: Arc<dyn VideoSource>, config: ConfigStore) -> Self {
        let directory = config.load();
        let (relay, events) = ProgressRelay::channel();
        info!(source = source.name(), directory = %directory, "session ready");

        Self {
            worker: DownloadWorker::new(source.clone()),
            source,
            config,
            directory,
            relay,
            events,
            video: None,
            playlist_url: None,
            preview: None,
            active: None,
        }
    }

    pub fn download_directory(&self) -> &DownloadDirectory {
        &self.directory
    }

    /// Switch the destination and persist it. A failed write is logged only.
    pub fn set_download_directory(&mut self, directory: DownloadDirectory) {
        if let Err(e) = self.config.save(&directory) {
            warn!(error = %e, "could not persist download directory");
        }
        info!(directory = %directory, "download directory changed");
        self.directory = directory;
    }

    /// Resolve `url` and replace the current video or playlist.
    ///
    /// Nothing changes when the URL is rejected or the lookup fails.
    pub async fn search(&mut self, url: &str, kind: LinkKind) -> Result<Preview, DownloadError> {
        let embed_url = links::embed_url(url, kind)?;
        let preview = match kind {
            LinkKind::Video => {
                let video = self.source.fetch_video(url).await?;
                let preview = Preview {
                    title: Some(video.title.clone()),
                    embed_url,
                    kind,
                };
                self.video = Some(video);
                self.playlist_url = None;
                preview
            }
            LinkKind::Playlist => {
                self.video = None;
                self.playlist_url = Some(url.to_string());
                Preview {
                    title: None,
                    embed_url,
                    kind,
                }
            }
        };

        self.preview = Some(preview.clone());
        Ok(preview)
    }

    pub fn video(&self) -> Option<&VideoHandle> {
        self.video.as_ref()
    }

    /// Streams of the current video in source order; indexes are what
    /// `DownloadRequest::manual` refers to
    pub fn streams(&self) -> &[Stream] {
        self.video.as_ref().map(|v| v.streams.as_slice()).unwrap_or(&[])
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    /// Forget the current search. An in-flight job keeps running.
    pub fn clear(&mut self) {
        self.video = None;
        self.playlist_url = None;
        self.preview = None;
    }

    pub fn active_job(&self) -> Option<JobId> {
        self.active.as_ref().map(|active| active.id)
    }

    /// Select a stream of the current video and start downloading it,
    /// superseding any job still in flight
    pub fn start_download(&mut self, request: DownloadRequest) -> Result<JobId, DownloadError> {
        let video = self
            .video
            .as_ref()
            .ok_or_else(|| DownloadError::NoMatchingStream("no video has been searched".to_string()))?;
        let stream = StreamSelector::select(video, &request)?.clone();
        info!(itag = %stream.itag, title = %stream.title, "stream selected");

        let job = DownloadJob {
            stream,
            destination: self.directory_path(),
        };
        let tracker = self.begin_job();
        let id = tracker.job();
        let handle = self.worker.spawn_single(job, tracker);
        self.track(id, handle);
        Ok(id)
    }

    /// Download every member of the searched playlist
    pub fn start_playlist_download(&mut self, options: PlaylistOptions) -> Result<JobId, DownloadError> {
        let playlist_url = self
            .playlist_url
            .clone()
            .ok_or_else(|| DownloadError::InvalidUrl("no playlist has been searched".to_string()))?;

        let job = PlaylistJob {
            playlist_url,
            destination: self.directory_path(),
            audio_only: options.audio_only,
            resolution: options.resolution,
        };
        let tracker = self.begin_job();
        let id = tracker.job();
        let handle = self.worker.spawn_playlist(job, tracker);
        self.track(id, handle);
        Ok(id)
    }

    /// Next event of the active job. Returns `None` when no job is active.
    ///
    /// Leftovers from superseded jobs are discarded. The active job is
    /// cleared once its terminal event has been handed out. A worker that
    /// ends without one is reported as `Failed`.
    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        loop {
            let active = self.active.as_mut()?;
            let job = active.id;

            let event = if active.exited {
                match self.events.try_recv() {
                    Ok(event) => event,
                    Err(_) => return Some(self.abandon(job)),
                }
            } else {
                tokio::select! {
                    biased;
                    event = self.events.recv() => event?,
                    result = &mut active.handle => {
                        active.exited = true;
                        if let Err(e) = result {
                            error!(%job, error = %e, "download task died");
                        }
                        continue;
                    }
                }
            };

            if let Some(event) = self.accept(job, event) {
                return Some(event);
            }
        }
    }

    /// Non-blocking variant of [`Session::next_event`]
    pub fn try_next_event(&mut self) -> Option<DownloadEvent> {
        loop {
            let active = self.active.as_ref()?;
            let job = active.id;
            let finished = active.exited || active.handle.is_finished();

            let event = match self.events.try_recv() {
                Ok(event) => event,
                Err(_) if finished => return Some(self.abandon(job)),
                Err(_) => return None,
            };
            if let Some(event) = self.accept(job, event) {
                return Some(event);
            }
        }
    }

    fn accept(&mut self, active: JobId, event: DownloadEvent) -> Option<DownloadEvent> {
        if event.job != active {
            return None;
        }
        if event.event.is_terminal() {
            self.active = None;
        }
        Some(event)
    }

    /// Close out a job whose worker stopped without reporting an outcome
    fn abandon(&mut self, job: JobId) -> DownloadEvent {
        warn!(%job, "download task ended without a result");
        self.active = None;
        DownloadEvent {
            job,
            event: JobEvent::Failed("download task ended unexpectedly".to_string()),
        }
    }

    fn begin_job(&mut self) -> JobTracker {
        let job = self.relay.begin_job();
        if let Some(previous) = self.active.take() {
            info!(previous = %previous.id, %job, "superseding active download");
        }
        self.relay.open(job)
    }

    fn track(&mut self, id: JobId, handle: JoinHandle<()>) {
        self.active = Some(ActiveJob {
            id,
            handle,
            exited: false,
        });
    }

    fn directory_path(&self) -> PathBuf {
        self.directory.path().to_path_buf()
    }
}
