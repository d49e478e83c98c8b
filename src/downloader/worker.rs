// Download worker - runs transfers off the interface task
//
// Each job runs on its own tokio task and reports only through its
// `JobTracker`. A superseded job may keep running; its events are dropped
// by the relay.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, Instrument};

use super::errors::DownloadError;
use super::models::{DownloadJob, PlaylistJob, Stream};
use super::relay::{JobTracker, PlaylistReporter, SingleStreamReporter};
use super::stream_selector::StreamSelector;
use super::traits::{StreamCallbacks, VideoSource};

#[derive(Clone)]
pub struct DownloadWorker {
    source: Arc<dyn VideoSource>,
}

impl DownloadWorker {
    pub fn new(source: Arc<dyn VideoSource>) -> Self {
        Self { source }
    }

    /// Transfer one stream into `destination`, creating it when missing
    pub async fn run(
        &self,
        stream: &Stream,
        destination: &Path,
        callbacks: &dyn StreamCallbacks,
    ) -> Result<PathBuf, DownloadError> {
        tokio::fs::create_dir_all(destination).await?;
        self.source.download(stream, destination, callbacks).await
    }

    pub fn spawn_single(&self, job: DownloadJob, tracker: JobTracker) -> JoinHandle<()> {
        let worker = self.clone();
        let span = info_span!("download", job = %tracker.job(), itag = %job.stream.itag);

        tokio::spawn(
            async move {
                tracker.started();
                let reporter =
                    SingleStreamReporter::new(tracker.clone(), job.stream.declared_size());

                match worker.run(&job.stream, &job.destination, &reporter).await {
                    Ok(path) => {
                        info!(path = %path.display(), "download finished");
                        tracker.complete(&path);
                    }
                    Err(e) => {
                        error!(error = %e, "download failed");
                        tracker.fail(e.to_string());
                    }
                }
            }
            .instrument(span),
        )
    }

    pub fn spawn_playlist(&self, job: PlaylistJob, tracker: JobTracker) -> JoinHandle<()> {
        let worker = self.clone();
        let span = info_span!("playlist", job = %tracker.job(), url = %job.playlist_url);

        tokio::spawn(
            async move {
                tracker.started();
                match worker.run_playlist(&job, &tracker).await {
                    Ok(true) => {
                        info!(destination = %job.destination.display(), "playlist finished");
                        tracker.complete(&job.destination);
                    }
                    Ok(false) => debug!("playlist superseded, stopping"),
                    Err(e) => {
                        error!(error = %e, "playlist failed");
                        tracker.fail(e.to_string());
                    }
                }
            }
            .instrument(span),
        )
    }

    /// Resolve every item first so the aggregate total is known, then
    /// download them in order. Returns `Ok(false)` when a newer job took over.
    pub async fn run_playlist(
        &self,
        job: &PlaylistJob,
        tracker: &JobTracker,
    ) -> Result<bool, DownloadError> {
        let playlist = self.source.fetch_playlist(&job.playlist_url).await?;
        if playlist.video_urls.is_empty() {
            return Err(DownloadError::NoMatchingStream(format!(
                "playlist '{}' has no videos",
                playlist.title
            )));
        }

        let mut streams = Vec::with_capacity(playlist.video_urls.len());
        for url in &playlist.video_urls {
            if !tracker.is_current() {
                return Ok(false);
            }
            let video = self.source.fetch_video(url).await?;
            let pick = StreamSelector::select_for_playlist(&video, job.audio_only, &job.resolution)?;
            streams.push(pick.stream().clone());
        }

        let sizes: Vec<u64> = streams.iter().map(Stream::declared_size).collect();
        let reporter = PlaylistReporter::new(tracker.clone(), &sizes, job.destination.clone());
        info!(
            items = reporter.item_count(),
            total_bytes = reporter.total_bytes(),
            "playlist resolved"
        );

        for (index, stream) in streams.iter().enumerate() {
            if !tracker.is_current() {
                return Ok(false);
            }
            debug!(item = index + 1, itag = %stream.itag, title = %stream.title, "downloading item");
            self.run(stream, &job.destination, &reporter).await?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::{Container, PlaylistHandle, VideoHandle};
    use crate::downloader::relay::{DownloadEvent, JobEvent, ProgressRelay};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct StaticSource {
        videos: HashMap<String, VideoHandle>,
        playlist: Vec<String>,
        fail_itag: Option<String>,
    }

    #[async_trait]
    impl VideoSource for StaticSource {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn fetch_video(&self, url: &str) -> Result<VideoHandle, DownloadError> {
            self.videos
                .get(url)
                .cloned()
                .ok_or_else(|| DownloadError::Unknown(format!("unknown video {}", url)))
        }

        async fn fetch_playlist(&self, _url: &str) -> Result<PlaylistHandle, DownloadError> {
            Ok(PlaylistHandle {
                id: "PL1".to_string(),
                title: "List".to_string(),
                video_urls: self.playlist.clone(),
            })
        }

        async fn download(
            &self,
            stream: &Stream,
            destination: &Path,
            callbacks: &dyn StreamCallbacks,
        ) -> Result<PathBuf, DownloadError> {
            if self.fail_itag.as_deref() == Some(stream.itag.as_str()) {
                return Err(DownloadError::Network("connection reset".to_string()));
            }
            let size = stream.declared_size();
            let chunk = vec![0u8; (size / 2) as usize];
            callbacks.on_progress(&chunk, size - chunk.len() as u64);
            callbacks.on_progress(&chunk, 0);
            let path = destination.join(stream.default_filename());
            std::fs::write(&path, b"x")?;
            callbacks.on_complete(&path);
            Ok(path)
        }
    }

    fn stream(itag: &str, title: &str, height: u32, size: u64) -> Stream {
        Stream {
            itag: itag.to_string(),
            container: Container::Mp4,
            ext: "mp4".to_string(),
            resolution: Some(format!("{}p", height)),
            fps: Some(30),
            abr: None,
            has_video: true,
            has_audio: true,
            filesize: Some(size),
            filesize_approx: None,
            url: format!("https://media.example/{}", itag),
            http_headers: Vec::new(),
            title: title.to_string(),
        }
    }

    fn video(id: &str, streams: Vec<Stream>) -> (String, VideoHandle) {
        let url = format!("https://www.youtube.com/watch?v={}", id);
        let handle = VideoHandle {
            id: id.to_string(),
            title: id.to_string(),
            watch_url: url.clone(),
            streams,
        };
        (url, handle)
    }

    fn drain(rx: &mut UnboundedReceiver<DownloadEvent>) -> Vec<JobEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev.event);
        }
        out
    }

    fn source(fail_itag: Option<&str>) -> StaticSource {
        let items = vec![
            video("aaa", vec![stream("22", "First", 720, 100)]),
            video("bbb", vec![stream("18", "Second", 360, 300)]),
        ];
        StaticSource {
            playlist: items.iter().map(|(url, _)| url.clone()).collect(),
            videos: items.into_iter().collect(),
            fail_itag: fail_itag.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_single_job_emits_progress_then_completed() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, mut rx) = ProgressRelay::channel();
        let tracker = relay.open(relay.begin_job());
        let worker = DownloadWorker::new(Arc::new(source(None)));
        let job = DownloadJob {
            stream: stream("22", "Clip", 720, 200),
            destination: dir.path().join("nested"),
        };

        worker.spawn_single(job, tracker).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.first(), Some(&JobEvent::Progress(0)));
        assert!(events.contains(&JobEvent::Progress(50)));
        assert_eq!(
            events.last(),
            Some(&JobEvent::Completed(dir.path().join("nested").join("Clip.mp4")))
        );
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_single_job_failure_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, mut rx) = ProgressRelay::channel();
        let tracker = relay.open(relay.begin_job());
        let worker = DownloadWorker::new(Arc::new(source(Some("22"))));
        let job = DownloadJob {
            stream: stream("22", "Clip", 720, 200),
            destination: dir.path().to_path_buf(),
        };

        worker.spawn_single(job, tracker).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                JobEvent::Progress(0),
                JobEvent::Failed("Network error: connection reset".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_playlist_fallback_and_aggregate() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, mut rx) = ProgressRelay::channel();
        let tracker = relay.open(relay.begin_job());
        let worker = DownloadWorker::new(Arc::new(source(None)));
        let job = PlaylistJob {
            playlist_url: "https://www.youtube.com/playlist?list=PL1".to_string(),
            destination: dir.path().to_path_buf(),
            audio_only: false,
            resolution: "720p".to_string(),
        };

        worker.spawn_playlist(job, tracker).await.unwrap();

        let events = drain(&mut rx);
        let percents: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                JobEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect();
        // 100 + 300 bytes: first item ends at 25%
        assert_eq!(percents, vec![0, 12, 25, 62, 100]);
        assert_eq!(events.last(), Some(&JobEvent::Completed(dir.path().to_path_buf())));
        assert!(dir.path().join("Second.mp4").exists());
    }

    #[tokio::test]
    async fn test_empty_playlist_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (relay, mut rx) = ProgressRelay::channel();
        let tracker = relay.open(relay.begin_job());
        let mut empty = source(None);
        empty.playlist.clear();
        let worker = DownloadWorker::new(Arc::new(empty));
        let job = PlaylistJob {
            playlist_url: "https://www.youtube.com/playlist?list=PL1".to_string(),
            destination: dir.path().to_path_buf(),
            audio_only: true,
            resolution: "720p".to_string(),
        };

        worker.spawn_playlist(job, tracker).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], JobEvent::Failed(_)));
    }
}
