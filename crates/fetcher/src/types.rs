//! Value types crossing the fetch engine boundary.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use webgrip_core::config::FetcherConfig;

use crate::error::FetchFailure;

/// One logical fetch, immutable once constructed.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    /// Per-request proxy override; the engine-level proxy applies when unset.
    pub proxy: Option<String>,
    pub timeout: Duration,
    pub verify_tls: bool,
}

impl FetchRequest {
    /// Build a request with engine defaults for everything but the URL.
    pub fn new(url: impl Into<String>, config: &FetcherConfig) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            proxy: None,
            timeout: Duration::from_secs(config.timeout_secs),
            verify_tls: config.verify_tls,
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}

/// A completed fetch with a decoded text body.
#[derive(Debug, Clone)]
pub struct FetchSuccess {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// UTF-8 body, or Latin-1 with substitution when the payload was not
    /// valid UTF-8. Decoding never fails.
    pub body: String,
    /// Raw payload length in bytes, before decoding.
    pub size: u64,
    pub elapsed: Duration,
    /// The TLS-verification stance this fetch actually used.
    pub verify_tls: bool,
    /// Parsed body, populated by `fetch_json` only.
    pub json: Option<Value>,
}

/// Outcome of a single logical fetch: exactly one of success or a
/// classified failure.
#[derive(Debug, Clone)]
pub enum FetchResult {
    Success(FetchSuccess),
    Failure(FetchFailure),
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success(_))
    }

    pub fn success(&self) -> Option<&FetchSuccess> {
        match self {
            FetchResult::Success(s) => Some(s),
            FetchResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FetchFailure> {
        match self {
            FetchResult::Success(_) => None,
            FetchResult::Failure(f) => Some(f),
        }
    }
}

/// A fetch whose body streams to disk instead of memory.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub fetch: FetchRequest,
    pub dest: PathBuf,
    pub show_progress: bool,
}

#[derive(Debug, Clone)]
pub struct DownloadSuccess {
    pub url: String,
    pub dest: PathBuf,
    pub bytes_written: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub enum DownloadResult {
    Success(DownloadSuccess),
    Failure(FetchFailure),
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DownloadResult::Success(_))
    }

    pub fn failure(&self) -> Option<&FetchFailure> {
        match self {
            DownloadResult::Success(_) => None,
            DownloadResult::Failure(f) => Some(f),
        }
    }
}
