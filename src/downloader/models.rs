// Common data models for downloader

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::utils::sanitize_filename;

/// Media container of a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Container {
    Mp4,
    WebM,
    ThreeGp,
    Other(String),
}

impl Container {
    /// Map a file extension onto a container. `m4a` is MP4 audio.
    pub fn from_ext(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" | "m4a" => Self::Mp4,
            "webm" => Self::WebM,
            "3gp" => Self::ThreeGp,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn subtype(&self) -> &str {
        match self {
            Self::Mp4 => "mp4",
            Self::WebM => "webm",
            Self::ThreeGp => "3gpp",
            Self::Other(s) => s,
        }
    }
}

/// One downloadable representation of a video
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    /// Format id as reported by the source (YouTube itag)
    pub itag: String,
    pub container: Container,
    /// File extension used when saving (mp4, m4a, webm)
    pub ext: String,
    /// Resolution label, e.g. "720p"; `None` for audio-only streams
    pub resolution: Option<String>,
    pub fps: Option<u32>,
    /// Audio bitrate label, e.g. "128kbps"
    pub abr: Option<String>,
    pub has_video: bool,
    pub has_audio: bool,
    /// Exact size in bytes, when the source knows it
    pub filesize: Option<u64>,
    /// Estimated size; used for progress only, never to detect a finished file
    pub filesize_approx: Option<u64>,
    /// Direct media URL
    pub url: String,
    /// Request headers the media URL must be fetched with
    pub http_headers: Vec<(String, String)>,
    /// Title of the owning video, used for naming the file
    pub title: String,
}

impl Stream {
    pub fn is_audio_only(&self) -> bool {
        self.has_audio && !self.has_video
    }

    /// Audio and video in one file
    pub fn is_progressive(&self) -> bool {
        self.has_audio && self.has_video
    }

    pub fn is_mp4(&self) -> bool {
        self.container == Container::Mp4
    }

    /// Vertical resolution parsed from the resolution label
    pub fn height(&self) -> Option<u32> {
        self.resolution
            .as_deref()
            .and_then(|r| r.trim_end_matches('p').parse().ok())
    }

    pub fn mime_type(&self) -> String {
        let kind = if self.has_video { "video" } else { "audio" };
        format!("{}/{}", kind, self.container.subtype())
    }

    /// Size used for progress accounting; 0 when unknown
    pub fn declared_size(&self) -> u64 {
        self.filesize.or(self.filesize_approx).unwrap_or(0)
    }

    pub fn default_filename(&self) -> String {
        format!("{}.{}", sanitize_filename(&self.title), self.ext)
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Stream: itag=\"{}\" mime_type=\"{}\"", self.itag, self.mime_type())?;
        if self.has_video {
            if let Some(res) = &self.resolution {
                write!(f, " res=\"{}\"", res)?;
            }
            if let Some(fps) = self.fps {
                write!(f, " fps=\"{}fps\"", fps)?;
            }
        } else if let Some(abr) = &self.abr {
            write!(f, " abr=\"{}\"", abr)?;
        }
        write!(f, " progressive=\"{}\">", self.is_progressive())
    }
}

/// Metadata and available streams of a single video
#[derive(Debug, Clone)]
pub struct VideoHandle {
    pub id: String,
    pub title: String,
    pub watch_url: String,
    pub streams: Vec<Stream>,
}

/// Ordered member URLs of a playlist
#[derive(Debug, Clone)]
pub struct PlaylistHandle {
    pub id: String,
    pub title: String,
    pub video_urls: Vec<String>,
}

/// Where downloads are written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadDirectory(PathBuf);

impl DownloadDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for DownloadDirectory {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for DownloadDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A single-stream download request handed to the worker
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub stream: Stream,
    pub destination: PathBuf,
}

/// A playlist download request; members are resolved on the worker
#[derive(Debug, Clone)]
pub struct PlaylistJob {
    pub playlist_url: String,
    pub destination: PathBuf,
    pub audio_only: bool,
    /// Target resolution for every item, e.g. "720p"
    pub resolution: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(itag: &str, ext: &str, res: Option<&str>, video: bool, audio: bool) -> Stream {
        Stream {
            itag: itag.to_string(),
            container: Container::from_ext(ext),
            ext: ext.to_string(),
            resolution: res.map(str::to_string),
            fps: res.map(|_| 30),
            abr: if audio && !video { Some("128kbps".to_string()) } else { None },
            has_video: video,
            has_audio: audio,
            filesize: Some(1024),
            filesize_approx: None,
            url: "https://example.com/media".to_string(),
            http_headers: Vec::new(),
            title: "My: Video?".to_string(),
        }
    }

    #[test]
    fn test_container_from_ext() {
        assert_eq!(Container::from_ext("MP4"), Container::Mp4);
        assert_eq!(Container::from_ext("m4a"), Container::Mp4);
        assert_eq!(Container::from_ext("webm"), Container::WebM);
        assert_eq!(Container::from_ext("flv"), Container::Other("flv".to_string()));
    }

    #[test]
    fn test_stream_display_video() {
        let s = stream("22", "mp4", Some("720p"), true, true);
        assert_eq!(
            s.to_string(),
            "<Stream: itag=\"22\" mime_type=\"video/mp4\" res=\"720p\" fps=\"30fps\" progressive=\"true\">"
        );
    }

    #[test]
    fn test_stream_display_audio() {
        let s = stream("140", "m4a", None, false, true);
        assert_eq!(
            s.to_string(),
            "<Stream: itag=\"140\" mime_type=\"audio/mp4\" abr=\"128kbps\" progressive=\"false\">"
        );
        assert!(s.is_audio_only());
        assert!(s.is_mp4());
    }

    #[test]
    fn test_height_and_filename() {
        let s = stream("137", "mp4", Some("1080p"), true, false);
        assert_eq!(s.height(), Some(1080));
        assert_eq!(s.default_filename(), "My Video.mp4");
        assert!(!s.is_progressive());
    }
}
