// Downloader module - stream selection, transfer and progress reporting

pub mod backends;
pub mod diagnostics;
pub mod errors;
pub mod links;
pub mod models;
pub mod relay;
pub mod session;
pub mod stream_selector;
pub mod traits;
pub mod utils;
pub mod worker;

pub use errors::{DownloadError, ErrorCategory};
pub use links::LinkKind;
pub use models::{DownloadDirectory, PlaylistHandle, Stream, VideoHandle};
pub use relay::{DownloadEvent, JobEvent, JobId};
pub use session::{PlaylistOptions, Preview, Session};
pub use stream_selector::DownloadRequest;
pub use traits::{StreamCallbacks, VideoSource};
