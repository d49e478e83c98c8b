// yt-dlp backed video source
//
// Metadata comes from `yt-dlp --dump-json` (videos) and
// `yt-dlp --flat-playlist --dump-single-json` (playlists). The tool can be
// the native binary or the `yt_dlp` Python module. Media bytes are fetched
// directly over HTTP so every chunk can be reported.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use super::http;
use crate::downloader::errors::DownloadError;
use crate::downloader::links::watch_url;
use crate::downloader::models::{Container, PlaylistHandle, Stream, VideoHandle};
use crate::downloader::traits::{StreamCallbacks, VideoSource};
use crate::downloader::utils::run_output_with_timeout;

/// How yt-dlp is invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractorMode {
    /// `python3 -m yt_dlp`
    Python,
    /// Native `yt-dlp` binary
    Cli,
    /// Python module when installed, binary otherwise
    #[default]
    Auto,
}

impl fmt::Display for ExtractorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Python => write!(f, "python"),
            Self::Cli => write!(f, "cli"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for ExtractorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "python" => Ok(Self::Python),
            "cli" => Ok(Self::Cli),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown extractor mode '{}' (python, cli, auto)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    pub mode: ExtractorMode,
    /// Explicit path to the yt-dlp binary
    pub binary: Option<String>,
    /// SOCKS5/HTTP proxy URL, used for metadata and media
    pub proxy: Option<String>,
    pub timeout_seconds: u32,
    /// YouTube player client (android, web, tv)
    pub player_client: Option<String>,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            mode: ExtractorMode::Auto,
            binary: None,
            proxy: None,
            timeout_seconds: 30,
            player_client: None,
        }
    }
}

impl YtDlpConfig {
    pub fn with_mode(mut self, mode: ExtractorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_binary(mut self, binary: Option<String>) -> Self {
        self.binary = binary;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_timeout(mut self, seconds: u32) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_player_client(mut self, client: Option<String>) -> Self {
        self.player_client = client;
        self
    }
}

pub struct YtDlpSource {
    config: YtDlpConfig,
    program: String,
    prefix_args: Vec<String>,
    http: reqwest::Client,
}

impl YtDlpSource {
    pub async fn new(config: YtDlpConfig) -> Result<Self, DownloadError> {
        let (program, prefix_args) = Self::resolve_invocation(&config).await;
        let http = http::build_client(config.proxy.as_deref(), config.timeout_seconds as u64)?;
        info!(mode = %config.mode, program = %program, "yt-dlp source ready");
        Ok(Self {
            config,
            program,
            prefix_args,
            http,
        })
    }

    async fn resolve_invocation(config: &YtDlpConfig) -> (String, Vec<String>) {
        let python = || (python_cmd(), vec!["-m".to_string(), "yt_dlp".to_string()]);
        let binary = || (config.binary.clone().unwrap_or_else(find_ytdlp), Vec::new());

        match config.mode {
            ExtractorMode::Python => python(),
            ExtractorMode::Cli => binary(),
            ExtractorMode::Auto if config.binary.is_some() => binary(),
            ExtractorMode::Auto => {
                if python_has_module("yt_dlp").await {
                    python()
                } else {
                    binary()
                }
            }
        }
    }

    fn build_args(&self, mode_args: &[&str], url: &str) -> Vec<String> {
        let mut args = self.prefix_args.clone();
        args.extend(mode_args.iter().map(|s| s.to_string()));
        args.extend([
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.config.timeout_seconds.to_string(),
            "--retries".to_string(),
            "2".to_string(),
        ]);

        if let Some(client) = &self.config.player_client {
            args.push("--extractor-args".to_string());
            args.push(format!("youtube:player_client={}", client));
        }

        if let Some(proxy) = &self.config.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args.push(url.to_string());
        args
    }

    async fn run_json(&self, args: Vec<String>) -> Result<Vec<u8>, DownloadError> {
        debug!(program = %self.program, args = %args.join(" "), "running yt-dlp");
        // Allow yt-dlp its own retries on top of the socket timeout
        let budget = self.config.timeout_seconds as u64 * 3;
        let output = run_output_with_timeout(&self.program, &args, budget).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            warn!(stderr = %stderr.trim(), "yt-dlp failed");
            return Err(DownloadError::from(stderr));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl VideoSource for YtDlpSource {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch_video(&self, url: &str) -> Result<VideoHandle, DownloadError> {
        let args = self.build_args(&["--dump-json", "--no-playlist"], url);
        let stdout = self.run_json(args).await?;
        let video = parse_video_json(&stdout)?;
        info!(id = %video.id, title = %video.title, streams = video.streams.len(), "video resolved");
        Ok(video)
    }

    async fn fetch_playlist(&self, url: &str) -> Result<PlaylistHandle, DownloadError> {
        let args = self.build_args(&["--flat-playlist", "--dump-single-json"], url);
        let stdout = self.run_json(args).await?;
        let playlist = parse_playlist_json(&stdout)?;
        info!(id = %playlist.id, items = playlist.video_urls.len(), "playlist resolved");
        Ok(playlist)
    }

    async fn download(
        &self,
        stream: &Stream,
        destination: &Path,
        callbacks: &dyn StreamCallbacks,
    ) -> Result<PathBuf, DownloadError> {
        http::fetch_stream(&self.http, stream, destination, callbacks).await
    }
}

fn python_cmd() -> String {
    // Allow overriding python interpreter (e.g. venv)
    std::env::var("YTDLP_PYTHON").unwrap_or_else(|_| "python3".to_string())
}

async fn python_has_module(module: &str) -> bool {
    let code = format!("import {}", module);
    let status = TokioCommand::new(python_cmd())
        .args(["-c", &code])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await;
    matches!(status, Ok(status) if status.success())
}

/// Find yt-dlp executable in common paths
fn find_ytdlp() -> String {
    let common_paths = [
        "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
        "/usr/local/bin/yt-dlp",    // Homebrew on Intel Mac
        "/usr/bin/yt-dlp",
    ];

    common_paths
        .iter()
        .find(|p| Path::new(p).exists())
        .map(|p| p.to_string())
        .unwrap_or_else(|| "yt-dlp".to_string())
}

/// Parse `--dump-json` output into a video handle
pub fn parse_video_json(stdout: &[u8]) -> Result<VideoHandle, DownloadError> {
    let json: Value = serde_json::from_slice(stdout)
        .map_err(|e| DownloadError::ParseError(format!("Invalid JSON: {}", e)))?;

    let id = json["id"]
        .as_str()
        .ok_or_else(|| DownloadError::ParseError("No video id in JSON".to_string()))?
        .to_string();
    let title = json["title"].as_str().unwrap_or("Unknown").to_string();
    let formats = json["formats"]
        .as_array()
        .ok_or_else(|| DownloadError::ParseError("No formats array in JSON".to_string()))?;

    let streams = formats
        .iter()
        .filter_map(|f| parse_stream(f, &title))
        .collect();

    Ok(VideoHandle {
        watch_url: json["webpage_url"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| watch_url(&id)),
        id,
        title,
        streams,
    })
}

/// Single-request formats only; segmented (HLS/DASH) formats and
/// storyboards are skipped
fn parse_stream(f: &Value, title: &str) -> Option<Stream> {
    let protocol = f["protocol"].as_str().unwrap_or("https");
    if protocol != "https" && protocol != "http" {
        return None;
    }

    let url = f["url"].as_str()?.to_string();
    let has_video = f["vcodec"].as_str().map_or(false, |v| v != "none");
    let has_audio = f["acodec"].as_str().map_or(false, |a| a != "none");
    if !has_video && !has_audio {
        return None;
    }

    let ext = f["ext"].as_str().unwrap_or("mp4").to_string();
    let http_headers = f["http_headers"]
        .as_object()
        .map(|headers| {
            headers
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();

    Some(Stream {
        itag: f["format_id"].as_str().unwrap_or("").to_string(),
        container: Container::from_ext(&ext),
        ext,
        resolution: if has_video {
            f["height"].as_u64().map(|h| format!("{}p", h))
        } else {
            None
        },
        fps: if has_video {
            f["fps"].as_f64().map(|fps| fps.round() as u32)
        } else {
            None
        },
        abr: f["abr"]
            .as_f64()
            .filter(|abr| *abr > 0.0)
            .map(|abr| format!("{}kbps", abr.round() as u64)),
        has_video,
        has_audio,
        filesize: f["filesize"].as_u64(),
        filesize_approx: f["filesize_approx"].as_u64(),
        url,
        http_headers,
        title: title.to_string(),
    })
}

/// Parse `--flat-playlist --dump-single-json` output
pub fn parse_playlist_json(stdout: &[u8]) -> Result<PlaylistHandle, DownloadError> {
    let json: Value = serde_json::from_slice(stdout)
        .map_err(|e| DownloadError::ParseError(format!("Invalid JSON: {}", e)))?;

    let entries = json["entries"]
        .as_array()
        .ok_or_else(|| DownloadError::ParseError("No entries array in playlist JSON".to_string()))?;

    let video_urls = entries
        .iter()
        .filter_map(|entry| {
            let url = entry["url"].as_str().filter(|u| u.starts_with("http"));
            match (url, entry["id"].as_str()) {
                (Some(url), _) => Some(url.to_string()),
                (None, Some(id)) => Some(watch_url(id)),
                (None, None) => None,
            }
        })
        .collect();

    Ok(PlaylistHandle {
        id: json["id"].as_str().unwrap_or("").to_string(),
        title: json["title"].as_str().unwrap_or("Unknown").to_string(),
        video_urls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIDEO_JSON: &str = r#"{
        "id": "abc123",
        "title": "Computing GCD in ARM Assembly",
        "webpage_url": "https://www.youtube.com/watch?v=abc123",
        "formats": [
            {"format_id": "sb0", "ext": "mhtml", "protocol": "mhtml", "vcodec": "none", "acodec": "none", "url": "https://i.ytimg.com/sb"},
            {"format_id": "139", "ext": "m4a", "protocol": "https", "vcodec": "none", "acodec": "mp4a.40.5", "abr": 48.7, "filesize": 1200000, "url": "https://rr.example/139"},
            {"format_id": "140", "ext": "m4a", "protocol": "https", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.5, "filesize": 3100000, "url": "https://rr.example/140",
             "http_headers": {"User-Agent": "UA", "Accept": "*/*"}},
            {"format_id": "18", "ext": "mp4", "protocol": "https", "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "height": 360, "fps": 30, "filesize_approx": 9000000, "url": "https://rr.example/18"},
            {"format_id": "136", "ext": "mp4", "protocol": "https", "vcodec": "avc1.4d401f", "acodec": "none", "height": 720, "fps": 29.97, "filesize": 30000000, "url": "https://rr.example/136"},
            {"format_id": "96", "ext": "mp4", "protocol": "m3u8_native", "vcodec": "avc1.640028", "acodec": "mp4a.40.2", "height": 1080, "url": "https://manifest.example/96"}
        ]
    }"#;

    #[test]
    fn test_parse_video_json() {
        let video = parse_video_json(VIDEO_JSON.as_bytes()).unwrap();
        assert_eq!(video.id, "abc123");
        assert_eq!(video.title, "Computing GCD in ARM Assembly");

        let itags: Vec<&str> = video.streams.iter().map(|s| s.itag.as_str()).collect();
        assert_eq!(itags, vec!["139", "140", "18", "136"]);

        let audio = &video.streams[1];
        assert!(audio.is_audio_only());
        assert_eq!(audio.container, Container::Mp4);
        assert_eq!(audio.abr.as_deref(), Some("130kbps"));
        assert_eq!(audio.http_headers.len(), 2);

        let progressive = &video.streams[2];
        assert!(progressive.is_progressive());
        assert_eq!(progressive.resolution.as_deref(), Some("360p"));
        assert_eq!(progressive.filesize, None);
        assert_eq!(progressive.filesize_approx, Some(9_000_000));
        assert_eq!(progressive.declared_size(), 9_000_000);

        let video_only = &video.streams[3];
        assert_eq!(video_only.fps, Some(30));
        assert!(!video_only.has_audio);
    }

    #[test]
    fn test_parse_video_json_errors() {
        assert!(matches!(
            parse_video_json(b"not json"),
            Err(DownloadError::ParseError(_))
        ));
        assert!(matches!(
            parse_video_json(br#"{"id": "x", "title": "t"}"#),
            Err(DownloadError::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_playlist_json() {
        let json = r#"{
            "id": "PL123",
            "title": "Assembly course",
            "entries": [
                {"id": "aaa", "url": "https://www.youtube.com/watch?v=aaa"},
                {"id": "bbb", "url": "bbb"},
                {"title": "[Deleted video]"}
            ]
        }"#;
        let playlist = parse_playlist_json(json.as_bytes()).unwrap();
        assert_eq!(playlist.id, "PL123");
        assert_eq!(
            playlist.video_urls,
            vec![
                "https://www.youtube.com/watch?v=aaa".to_string(),
                "https://www.youtube.com/watch?v=bbb".to_string(),
            ]
        );
    }

    #[test]
    fn test_default_pick_from_parsed_formats_has_audio() {
        use crate::downloader::stream_selector::{DownloadRequest, StreamSelector};

        let video = parse_video_json(VIDEO_JSON.as_bytes()).unwrap();
        let stream = StreamSelector::select(&video, &DownloadRequest::video()).unwrap();
        // 136 is a taller MP4 but carries no audio
        assert_eq!(stream.itag, "18");
        assert!(stream.has_audio);
    }

    #[tokio::test]
    async fn test_args_include_proxy_and_timeout() {
        let config = YtDlpConfig::default()
            .with_mode(ExtractorMode::Cli)
            .with_binary(Some("/bin/yt-dlp".to_string()))
            .with_proxy(Some("socks5://127.0.0.1:1080".to_string()))
            .with_timeout(12)
            .with_player_client(Some("web".to_string()));
        let source = YtDlpSource::new(config).await.unwrap();
        let args = source.build_args(&["--dump-json"], "https://youtu.be/abc");

        assert_eq!(source.program, "/bin/yt-dlp");
        assert_eq!(args.first().map(String::as_str), Some("--dump-json"));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/abc"));
        assert!(args.windows(2).any(|w| w[0] == "--socket-timeout" && w[1] == "12"));
        assert!(args.windows(2).any(|w| w[0] == "--proxy" && w[1] == "socks5://127.0.0.1:1080"));
        assert!(args.contains(&"youtube:player_client=web".to_string()));
    }

    #[tokio::test]
    async fn test_missing_python_module_detected() {
        assert!(!python_has_module("no_such_module_for_yt_downloader").await);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("CLI".parse::<ExtractorMode>(), Ok(ExtractorMode::Cli));
        assert_eq!("auto".parse::<ExtractorMode>(), Ok(ExtractorMode::Auto));
        assert!("lux".parse::<ExtractorMode>().is_err());
    }

    #[tokio::test]
    async fn test_python_mode_prefixes_module() {
        let source = YtDlpSource::new(YtDlpConfig::default().with_mode(ExtractorMode::Python))
            .await
            .unwrap();
        let args = source.build_args(&["--dump-json"], "u");
        assert_eq!(&args[..3], &["-m", "yt_dlp", "--dump-json"]);
    }
}
