// Chunked HTTP transfer of a single stream to disk

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::downloader::errors::DownloadError;
use crate::downloader::models::Stream;
use crate::downloader::traits::StreamCallbacks;

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Client used for media transfers. Only connecting is bounded by
/// `timeout_secs`; the body of a large stream may take much longer.
pub fn build_client(proxy: Option<&str>, timeout_secs: u64) -> Result<reqwest::Client, DownloadError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(timeout_secs));

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| DownloadError::Network(format!("invalid proxy {}: {}", proxy_url, e)))?;
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(DownloadError::from)
}

/// Write `stream` to `destination/<title>.<ext>`, reporting every chunk.
///
/// An existing file whose size equals the exact declared size counts as
/// already downloaded; estimated sizes never do. Partially written files are
/// left in place on failure.
///
/// When no size is known at all, every chunk reports 0 bytes remaining.
pub async fn fetch_stream(
    client: &reqwest::Client,
    stream: &Stream,
    destination: &Path,
    callbacks: &dyn StreamCallbacks,
) -> Result<PathBuf, DownloadError> {
    let path = destination.join(stream.default_filename());

    if let Some(declared) = stream.filesize {
        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.is_file() && meta.len() == declared {
                info!(path = %path.display(), "already downloaded, skipping transfer");
                callbacks.on_complete(&path);
                return Ok(path);
            }
        }
    }

    let mut request = client.get(&stream.url);
    for (name, value) in &stream.http_headers {
        request = request.header(name.as_str(), value.as_str());
    }

    let mut response = request.send().await?.error_for_status()?;
    let total = stream
        .filesize
        .or_else(|| response.content_length())
        .or(stream.filesize_approx)
        .unwrap_or(0);
    debug!(itag = %stream.itag, total, "transfer started");

    let mut file = tokio::fs::File::create(&path).await?;
    let mut downloaded: u64 = 0;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        callbacks.on_progress(&chunk, total.saturating_sub(downloaded));
    }
    file.flush().await?;

    debug!(itag = %stream.itag, downloaded, "transfer finished");
    callbacks.on_complete(&path);
    Ok(path)
}
