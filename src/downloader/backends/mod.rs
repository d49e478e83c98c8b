// Video source backends

pub mod http;
pub mod ytdlp;

pub use ytdlp::{ExtractorMode, YtDlpConfig, YtDlpSource};
