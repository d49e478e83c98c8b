// Terminal front-end: search, optionally list streams, download with a
// progress line.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;

use yt_downloader_lib::config::ConfigStore;
use yt_downloader_lib::downloader::backends::{ExtractorMode, YtDlpConfig, YtDlpSource};
use yt_downloader_lib::downloader::{
    DownloadDirectory, DownloadRequest, JobEvent, LinkKind, PlaylistOptions, Session,
};
use yt_downloader_lib::logging;

#[derive(Parser)]
#[command(name = "yt-downloader")]
#[command(about = "Download YouTube videos, audio tracks and playlists")]
struct Cli {
    /// Video (watch?v= / youtu.be) or playlist (list=) URL
    url: String,

    /// Treat the URL as a playlist and download every video in it
    #[arg(long)]
    playlist: bool,

    /// Download the first MP4 audio stream instead of video
    #[arg(long)]
    audio_only: bool,

    /// Download the stream with this index from --list
    #[arg(long, value_name = "INDEX", conflicts_with = "playlist")]
    stream: Option<usize>,

    /// Target resolution for playlist items
    #[arg(long, default_value = "720p")]
    resolution: String,

    /// List available streams and exit
    #[arg(long)]
    list: bool,

    /// Download directory; remembered for later runs
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Proxy URL (socks5://host:port or http://host:port)
    #[arg(long)]
    proxy: Option<String>,

    /// Network timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u32,

    /// yt-dlp invocation: auto, python or cli
    #[arg(long, default_value = "auto")]
    mode: ExtractorMode,

    /// Settings file to use instead of the platform default
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();

    let store = match cli.config {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::default_location()?,
    };
    let source = YtDlpSource::new(
        YtDlpConfig::default()
            .with_mode(cli.mode)
            .with_proxy(cli.proxy)
            .with_timeout(cli.timeout),
    )
    .await?;

    let mut session = Session::new(Arc::new(source), store);
    if let Some(dir) = cli.dir {
        session.set_download_directory(DownloadDirectory::new(dir));
    }

    let kind = if cli.playlist {
        LinkKind::Playlist
    } else {
        LinkKind::Video
    };
    let preview = session
        .search(&cli.url, kind)
        .await
        .with_context(|| format!("could not load {}", cli.url))?;

    if let Some(title) = &preview.title {
        println!("{}", title);
    }
    println!("Preview: {}", preview.embed_url);

    if cli.list {
        for (index, stream) in session.streams().iter().enumerate() {
            println!("{:>3}  {}", index, stream);
        }
        return Ok(());
    }

    if cli.playlist {
        session.start_playlist_download(PlaylistOptions {
            audio_only: cli.audio_only,
            resolution: cli.resolution,
        })?;
    } else {
        let request = match cli.stream {
            Some(index) => DownloadRequest::manual(index),
            None => DownloadRequest::video(),
        };
        session.start_download(request.with_audio_only(cli.audio_only))?;
    }
    println!("Saving to {}", session.download_directory());

    while let Some(event) = session.next_event().await {
        match event.event {
            JobEvent::Progress(percent) => print_progress(percent)?,
            JobEvent::Completed(path) => {
                println!();
                println!("Done: {}", path.display());
                return Ok(());
            }
            JobEvent::Failed(message) => {
                println!();
                bail!("download failed: {}", message);
            }
        }
    }
    Ok(())
}

fn print_progress(percent: u8) -> std::io::Result<()> {
    let filled = usize::from(percent / 2);
    let mut stdout = std::io::stdout();
    write!(stdout, "\r[{:<50}] {:>3}%", "#".repeat(filled), percent)?;
    stdout.flush()
}
