// Video source trait definition

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::errors::DownloadError;
use super::models::{PlaylistHandle, Stream, VideoHandle};

/// Per-transfer callbacks. Invoked on the worker, never on the interface thread.
pub trait StreamCallbacks: Send + Sync {
    /// A chunk was written; `bytes_remaining` counts what is still to come
    fn on_progress(&self, chunk: &[u8], bytes_remaining: u64);

    /// The stream has been fully written to `path`
    fn on_complete(&self, path: &Path);
}

/// Trait for video metadata/download backends
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// Resolve a video URL into its metadata and streams
    async fn fetch_video(&self, url: &str) -> Result<VideoHandle, DownloadError>;

    /// Resolve a playlist URL into its member video URLs
    async fn fetch_playlist(&self, url: &str) -> Result<PlaylistHandle, DownloadError>;

    /// Write `stream` into `destination` using the stream's own file name
    async fn download(
        &self,
        stream: &Stream,
        destination: &Path,
        callbacks: &dyn StreamCallbacks,
    ) -> Result<PathBuf, DownloadError>;
}
