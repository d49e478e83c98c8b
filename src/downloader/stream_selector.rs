// StreamSelector - picks exactly one stream to download
//
// Priority:
// 1. Explicit pick from the displayed stream list (no filtering)
// 2. Audio-only mode: first MP4 audio-only stream
// 3. Video mode: highest-resolution progressive MP4 stream for a single
//    video, or the requested resolution for a playlist item with a fallback
//    to the first MP4 video stream when the item lacks it. Progressive
//    (audio + video) streams are preferred; video-only streams are a
//    logged last resort.

use tracing::{debug, warn};

use super::errors::DownloadError;
use super::models::{Stream, VideoHandle};

/// How the user asked for a single video to be downloaded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Index into the displayed stream list
    pub manual_selection: Option<usize>,
    pub audio_only: bool,
}

impl DownloadRequest {
    pub fn video() -> Self {
        Self::default()
    }

    pub fn audio_only() -> Self {
        Self {
            manual_selection: None,
            audio_only: true,
        }
    }

    pub fn manual(index: usize) -> Self {
        Self {
            manual_selection: Some(index),
            audio_only: false,
        }
    }

    pub fn with_audio_only(mut self, audio_only: bool) -> Self {
        self.audio_only = audio_only;
        self
    }
}

/// Outcome of a playlist-item selection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaylistPick<'a> {
    /// Stream satisfies the request as asked
    Exact(&'a Stream),
    /// Requested resolution missing; first MP4 stream used instead
    Fallback(&'a Stream),
}

impl<'a> PlaylistPick<'a> {
    pub fn stream(&self) -> &'a Stream {
        match self {
            Self::Exact(s) | Self::Fallback(s) => s,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

pub struct StreamSelector;

impl StreamSelector {
    /// Select the stream for a single-video download
    pub fn select<'a>(
        video: &'a VideoHandle,
        request: &DownloadRequest,
    ) -> Result<&'a Stream, DownloadError> {
        if let Some(index) = request.manual_selection {
            return video.streams.get(index).ok_or_else(|| {
                DownloadError::NoMatchingStream(format!(
                    "stream #{} does not exist ({} listed)",
                    index,
                    video.streams.len()
                ))
            });
        }

        if request.audio_only {
            return Self::first_audio_mp4(&video.streams).ok_or_else(|| {
                DownloadError::NoMatchingStream(format!("no MP4 audio stream for '{}'", video.title))
            });
        }

        if let Some(stream) = Self::highest_resolution_mp4(&video.streams) {
            return Ok(stream);
        }

        match Self::highest_video_only_mp4(&video.streams) {
            Some(stream) => {
                warn!(
                    video = %video.id,
                    itag = %stream.itag,
                    fallback = true,
                    "no progressive MP4 stream, downloading video without audio"
                );
                Ok(stream)
            }
            None => Err(DownloadError::NoMatchingStream(format!(
                "no MP4 video stream for '{}'",
                video.title
            ))),
        }
    }

    /// Select the stream for one playlist item
    pub fn select_for_playlist<'a>(
        video: &'a VideoHandle,
        audio_only: bool,
        resolution: &str,
    ) -> Result<PlaylistPick<'a>, DownloadError> {
        if audio_only {
            return Self::first_audio_mp4(&video.streams)
                .map(PlaylistPick::Exact)
                .ok_or_else(|| {
                    DownloadError::NoMatchingStream(format!(
                        "no MP4 audio stream for '{}'",
                        video.title
                    ))
                });
        }

        let target = normalize_resolution(resolution);
        if let Some(stream) = Self::first_mp4_with_resolution(&video.streams, &target) {
            debug!(video = %video.id, itag = %stream.itag, resolution = %target, "exact resolution match");
            return Ok(PlaylistPick::Exact(stream));
        }

        match Self::first_mp4_video(&video.streams) {
            Some(stream) => {
                warn!(
                    video = %video.id,
                    requested = %target,
                    used = stream.resolution.as_deref().unwrap_or("?"),
                    fallback = true,
                    "requested resolution not offered, falling back to first MP4 stream"
                );
                Ok(PlaylistPick::Fallback(stream))
            }
            None => Err(DownloadError::NoMatchingStream(format!(
                "no MP4 video stream for '{}'",
                video.title
            ))),
        }
    }

    pub fn first_audio_mp4(streams: &[Stream]) -> Option<&Stream> {
        streams.iter().find(|s| s.is_mp4() && s.is_audio_only())
    }

    /// Highest progressive MP4 stream; ties prefer larger files
    pub fn highest_resolution_mp4(streams: &[Stream]) -> Option<&Stream> {
        highest(streams.iter().filter(|s| s.is_mp4() && s.is_progressive()))
    }

    pub fn highest_video_only_mp4(streams: &[Stream]) -> Option<&Stream> {
        highest(streams.iter().filter(|s| s.is_mp4() && s.has_video && !s.has_audio))
    }

    /// First MP4 stream at `resolution`, progressive ones first
    pub fn first_mp4_with_resolution<'a>(streams: &'a [Stream], resolution: &str) -> Option<&'a Stream> {
        first_preferring_progressive(streams, |s| {
            s.is_mp4() && s.has_video && s.resolution.as_deref() == Some(resolution)
        })
    }

    pub fn first_mp4_video(streams: &[Stream]) -> Option<&Stream> {
        first_preferring_progressive(streams, |s| s.is_mp4() && s.has_video)
    }
}

fn highest<'a>(candidates: impl Iterator<Item = &'a Stream>) -> Option<&'a Stream> {
    candidates.max_by(|a, b| {
        a.height()
            .unwrap_or(0)
            .cmp(&b.height().unwrap_or(0))
            .then(a.declared_size().cmp(&b.declared_size()))
            // max_by keeps the last maximum; reverse so the earliest wins
            .then(std::cmp::Ordering::Greater)
    })
}

fn first_preferring_progressive(streams: &[Stream], matches: impl Fn(&Stream) -> bool) -> Option<&Stream> {
    streams
        .iter()
        .find(|s| s.is_progressive() && matches(s))
        .or_else(|| streams.iter().find(|s| matches(s)))
}

/// "720" and "720P" both mean "720p"
fn normalize_resolution(resolution: &str) -> String {
    let trimmed = resolution.trim().trim_end_matches(['p', 'P']);
    format!("{}p", trimmed)
}
