//! Resilient HTTPS fetch engine: classified errors, bounded retries with
//! exponential backoff, streaming downloads, and concurrent batch fan-out.
//!
//! Certificate validation is disabled by default; that is the point of this
//! tool, not an accident. See `webgrip_core::config::FetcherConfig`.

pub mod batch;
pub mod engine;
pub mod error;
pub mod progress;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testkit;

pub use engine::{AttemptObserver, FetchEngine};
pub use error::{ErrorKind, FetchFailure};
pub use progress::{Progress, ProgressSink};
pub use transport::{HttpTransport, Transport, TransportError, TransportReply};
pub use types::{
    DownloadRequest, DownloadResult, DownloadSuccess, FetchRequest, FetchResult, FetchSuccess,
};
