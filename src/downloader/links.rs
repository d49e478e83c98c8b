// YouTube link parsing and player-embed URLs

use regex::Regex;

use super::errors::DownloadError;

const EMBED_BASE: &str = "https://www.youtube.com/embed/";

lazy_static::lazy_static! {
    static ref VIDEO_PARAM_RE: Regex = Regex::new(r"[?&]v=([A-Za-z0-9_-]+)").unwrap();
    static ref SHORT_LINK_RE: Regex = Regex::new(r"^(?:https?://)?youtu\.be/([A-Za-z0-9_-]+)").unwrap();
    static ref LIST_PARAM_RE: Regex = Regex::new(r"[?&]list=([A-Za-z0-9_-]+)").unwrap();
}

/// What a URL is expected to point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkKind {
    #[default]
    Video,
    Playlist,
}

/// Extract the video id from `watch?v=` or `youtu.be/` links
pub fn extract_video_id(url: &str) -> Result<String, DownloadError> {
    let url = url.trim();
    VIDEO_PARAM_RE
        .captures(url)
        .or_else(|| SHORT_LINK_RE.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| DownloadError::InvalidUrl(format!("no video id (v=) in {}", url)))
}

/// Extract the playlist id from a `list=` query parameter
pub fn extract_playlist_id(url: &str) -> Result<String, DownloadError> {
    let url = url.trim();
    LIST_PARAM_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| DownloadError::InvalidUrl(format!("no playlist id (list=) in {}", url)))
}

pub fn video_embed_url(video_id: &str) -> String {
    format!("{}{}", EMBED_BASE, video_id)
}

pub fn playlist_embed_url(playlist_id: &str) -> String {
    format!("{}videoseries?list={}", EMBED_BASE, playlist_id)
}

/// Preview URL for a user-entered link
pub fn embed_url(url: &str, kind: LinkKind) -> Result<String, DownloadError> {
    match kind {
        LinkKind::Video => extract_video_id(url).map(|id| video_embed_url(&id)),
        LinkKind::Playlist => extract_playlist_id(url).map(|id| playlist_embed_url(&id)),
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_id_from_watch_url() {
        let id = extract_video_id("https://www.youtube.com/watch?v=abc123").unwrap();
        assert_eq!(id, "abc123");
        assert_eq!(video_embed_url(&id), "https://www.youtube.com/embed/abc123");
    }

    #[test]
    fn test_video_id_among_other_params() {
        let id = extract_video_id("https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=42").unwrap();
        assert_eq!(id, "dQw4w9WgXcQ");
    }

    #[test]
    fn test_short_link() {
        assert_eq!(extract_video_id("https://youtu.be/XyZ_9-a").unwrap(), "XyZ_9-a");
    }

    #[test]
    fn test_missing_v_is_invalid_url() {
        let err = extract_video_id("https://www.youtube.com/watch?list=PL123").unwrap_err();
        assert!(matches!(err, DownloadError::InvalidUrl(_)));
        assert!(extract_video_id("https://www.youtube.com/watch?v=").is_err());
    }

    #[test]
    fn test_playlist_embed() {
        let url = "https://www.youtube.com/playlist?list=PLabc_123";
        assert_eq!(
            embed_url(url, LinkKind::Playlist).unwrap(),
            "https://www.youtube.com/embed/videoseries?list=PLabc_123"
        );
        assert!(embed_url("https://www.youtube.com/watch?v=abc", LinkKind::Playlist).is_err());
    }

    #[test]
    fn test_list_param_does_not_count_as_video() {
        assert!(extract_video_id("https://www.youtube.com/playlist?list=PLx").is_err());
    }
}
