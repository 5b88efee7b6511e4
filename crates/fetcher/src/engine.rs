//! The retrying fetch engine.
//!
//! One attempt/backoff/classify loop serves both `fetch` and `download`, so
//! the retry policy is defined in a single place. The loop is an explicit
//! state machine over result values: an attempt ends in `Success`, a
//! retryable failure (backoff, then try again), or a fatal failure (stop
//! immediately). Errors never unwind between attempts.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};
use webgrip_core::config::FetcherConfig;

use crate::error::{ErrorKind, FetchFailure};
use crate::progress::ProgressSink;
use crate::transport::{BodyStream, Transport, TransportError, TransportReply};
use crate::types::{
    DownloadRequest, DownloadResult, DownloadSuccess, FetchRequest, FetchResult, FetchSuccess,
};

/// Disk write granularity for downloads.
const DOWNLOAD_CHUNK_SIZE: usize = 8 * 1024;

/// How much of an error response body is kept in the failure message.
const ERROR_BODY_PREVIEW_CHARS: usize = 200;

/// Fire-and-forget observer invoked once per attempt, before the request
/// goes out and after response metadata arrives. Observing can never change
/// the retry outcome; a panicking observer is logged and ignored.
pub trait AttemptObserver: Send + Sync {
    fn on_request(&self, method: &str, url: &str, headers: &HashMap<String, String>);
    fn on_response(&self, url: &str, status: u16, headers: &HashMap<String, String>);
}

/// Where a single attempt landed.
enum AttemptOutcome<T> {
    Success(T),
    Retry(AttemptFailure),
    Fatal(AttemptFailure),
}

struct AttemptFailure {
    kind: ErrorKind,
    message: String,
}

fn outcome_from<T>(err: TransportError) -> AttemptOutcome<T> {
    let failure = AttemptFailure {
        kind: err.kind,
        message: err.message,
    };
    if failure.kind.is_retryable() {
        AttemptOutcome::Retry(failure)
    } else {
        AttemptOutcome::Fatal(failure)
    }
}

pub struct FetchEngine {
    transport: Arc<dyn Transport>,
    config: FetcherConfig,
    observer: Option<Arc<dyn AttemptObserver>>,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl FetchEngine {
    pub fn new(transport: Arc<dyn Transport>, config: FetcherConfig) -> Self {
        info!(
            verify_tls = config.verify_tls,
            max_retries = config.max_retries,
            "Fetch engine initialized"
        );
        Self {
            transport,
            config,
            observer: None,
            progress: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Build a request for this engine's defaults.
    pub fn request(&self, url: impl Into<String>) -> FetchRequest {
        FetchRequest::new(url, &self.config)
    }

    /// Fetch a URL, retrying transient failures under exponential backoff.
    pub async fn fetch(&self, request: &FetchRequest) -> FetchResult {
        let start = Instant::now();
        info!(url = %request.url, "Fetching");

        match self
            .run_with_retry(|attempt| self.fetch_attempt(request, attempt))
            .await
        {
            Ok(mut success) => {
                success.elapsed = start.elapsed();
                info!(
                    url = %success.url,
                    status = success.status,
                    bytes = success.size,
                    elapsed_ms = success.elapsed.as_millis() as u64,
                    "Fetch succeeded"
                );
                FetchResult::Success(success)
            }
            Err(failure) => FetchResult::Failure(FetchFailure {
                kind: failure.kind,
                message: failure.message,
                url: request.url.clone(),
                elapsed: start.elapsed(),
            }),
        }
    }

    /// Fetch and parse the body as JSON. A body that fetched fine but does
    /// not parse is a `Parse` failure, distinct from a failed fetch.
    pub async fn fetch_json(&self, request: &FetchRequest) -> FetchResult {
        match self.fetch(request).await {
            FetchResult::Success(mut success) => match serde_json::from_str(&success.body) {
                Ok(value) => {
                    success.json = Some(value);
                    FetchResult::Success(success)
                }
                Err(err) => {
                    let message = format!("JSON parse error: {}", err);
                    error!(url = %request.url, "{}", message);
                    FetchResult::Failure(FetchFailure {
                        kind: ErrorKind::Parse,
                        message,
                        url: request.url.clone(),
                        elapsed: success.elapsed,
                    })
                }
            },
            failure => failure,
        }
    }

    /// Stream a response body to disk. A mid-stream failure leaves the
    /// partial file in place; callers wanting atomicity wrap this with
    /// their own temp-file-then-rename.
    pub async fn download(&self, request: &DownloadRequest) -> DownloadResult {
        let start = Instant::now();
        info!(
            url = %request.fetch.url,
            dest = %request.dest.display(),
            "Downloading"
        );

        match self
            .run_with_retry(|attempt| self.download_attempt(request, attempt))
            .await
        {
            Ok(bytes_written) => {
                let elapsed = start.elapsed();
                info!(
                    bytes = bytes_written,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Download complete"
                );
                DownloadResult::Success(DownloadSuccess {
                    url: request.fetch.url.clone(),
                    dest: request.dest.clone(),
                    bytes_written,
                    elapsed,
                })
            }
            Err(failure) => {
                error!(url = %request.fetch.url, "Download failed: {}", failure.message);
                DownloadResult::Failure(FetchFailure {
                    kind: failure.kind,
                    message: failure.message,
                    url: request.fetch.url.clone(),
                    elapsed: start.elapsed(),
                })
            }
        }
    }

    /// The shared attempt loop. Runs up to `max_retries` attempts, sleeping
    /// `retry_delay * 2^attempt` between retryable failures (never after the
    /// final attempt). Surfaces the last classified failure on exhaustion.
    async fn run_with_retry<T, F, Fut>(&self, mut attempt_fn: F) -> Result<T, AttemptFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AttemptOutcome<T>>,
    {
        let max = self.config.max_retries.max(1);
        let base_delay = Duration::from_millis(self.config.retry_delay_ms);
        let mut last: Option<AttemptFailure> = None;

        for attempt in 0..max {
            debug!(attempt = attempt + 1, max, "Attempt");
            match attempt_fn(attempt).await {
                AttemptOutcome::Success(value) => return Ok(value),
                AttemptOutcome::Fatal(failure) => {
                    warn!(kind = %failure.kind, error = %failure.message, "Non-retryable failure");
                    return Err(failure);
                }
                AttemptOutcome::Retry(failure) => {
                    warn!(
                        kind = %failure.kind,
                        attempt = attempt + 1,
                        error = %failure.message,
                        "Retryable failure"
                    );
                    last = Some(failure);
                    if attempt + 1 < max {
                        let delay = base_delay * 2u32.saturating_pow(attempt);
                        info!(delay_ms = delay.as_millis() as u64, "Retrying after backoff");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        let failure = last.unwrap_or_else(|| AttemptFailure {
            kind: ErrorKind::ClientProtocol,
            message: "no attempts were made".to_string(),
        });
        error!("All {} attempts failed: {}", max, failure.message);
        Err(failure)
    }

    async fn fetch_attempt(
        &self,
        request: &FetchRequest,
        _attempt: u32,
    ) -> AttemptOutcome<FetchSuccess> {
        self.notify_request(&request.url, &request.headers);

        let reply = match self.transport.execute(request).await {
            Ok(reply) => reply,
            Err(err) => return outcome_from(err),
        };
        self.notify_response(&reply.final_url, reply.status, &reply.headers);

        let TransportReply {
            final_url,
            status,
            headers,
            body,
            ..
        } = reply;

        if status >= 400 {
            let preview = match collect_body(body).await {
                Ok(bytes) => {
                    let text = decode_body(&bytes);
                    truncate_chars(&text, ERROR_BODY_PREVIEW_CHARS).to_string()
                }
                Err(_) => String::new(),
            };
            return AttemptOutcome::Fatal(AttemptFailure {
                kind: ErrorKind::HttpStatus(status),
                message: format!("HTTP {}: {}", status, preview),
            });
        }

        let bytes = match collect_body(body).await {
            Ok(bytes) => bytes,
            Err(err) => return outcome_from(err),
        };
        let text = decode_body(&bytes);

        AttemptOutcome::Success(FetchSuccess {
            url: final_url,
            status,
            headers,
            body: text,
            size: bytes.len() as u64,
            elapsed: Duration::ZERO,
            verify_tls: request.verify_tls,
            json: None,
        })
    }

    async fn download_attempt(&self, request: &DownloadRequest, _attempt: u32) -> AttemptOutcome<u64> {
        self.notify_request(&request.fetch.url, &request.fetch.headers);

        let reply = match self.transport.execute(&request.fetch).await {
            Ok(reply) => reply,
            Err(err) => return outcome_from(err),
        };
        self.notify_response(&reply.final_url, reply.status, &reply.headers);

        if reply.status >= 400 {
            return AttemptOutcome::Fatal(AttemptFailure {
                kind: ErrorKind::HttpStatus(reply.status),
                message: format!("HTTP {}: download failed", reply.status),
            });
        }

        let total = reply.content_length;
        if let Some(parent) = request.dest.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                return AttemptOutcome::Fatal(AttemptFailure {
                    kind: ErrorKind::ClientProtocol,
                    message: format!("Failed to create destination directory: {}", err),
                });
            }
        }

        // The handle closes when `file` drops, on every exit path below.
        let mut file = match tokio::fs::File::create(&request.dest).await {
            Ok(file) => file,
            Err(err) => {
                return AttemptOutcome::Fatal(AttemptFailure {
                    kind: ErrorKind::ClientProtocol,
                    message: format!("Failed to create {}: {}", request.dest.display(), err),
                })
            }
        };

        let mut body = reply.body;
        let mut buffer: Vec<u8> = Vec::with_capacity(DOWNLOAD_CHUNK_SIZE);
        let mut written: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => return outcome_from(err),
            };
            buffer.extend_from_slice(&chunk);
            while buffer.len() >= DOWNLOAD_CHUNK_SIZE {
                let rest = buffer.split_off(DOWNLOAD_CHUNK_SIZE);
                if let Err(err) = file.write_all(&buffer).await {
                    return AttemptOutcome::Fatal(AttemptFailure {
                        kind: ErrorKind::ClientProtocol,
                        message: format!("Write failed: {}", err),
                    });
                }
                written += buffer.len() as u64;
                self.report_progress(request, written, total);
                buffer = rest;
            }
        }

        if !buffer.is_empty() {
            if let Err(err) = file.write_all(&buffer).await {
                return AttemptOutcome::Fatal(AttemptFailure {
                    kind: ErrorKind::ClientProtocol,
                    message: format!("Write failed: {}", err),
                });
            }
            written += buffer.len() as u64;
            self.report_progress(request, written, total);
        }

        if let Err(err) = file.flush().await {
            return AttemptOutcome::Fatal(AttemptFailure {
                kind: ErrorKind::ClientProtocol,
                message: format!("Flush failed: {}", err),
            });
        }

        AttemptOutcome::Success(written)
    }

    fn report_progress(&self, request: &DownloadRequest, written: u64, total: Option<u64>) {
        if !request.show_progress {
            return;
        }
        let Some(total) = total else { return };
        if let Some(sink) = &self.progress {
            sink.advance(written, total);
        }
    }

    fn notify_request(&self, url: &str, headers: &HashMap<String, String>) {
        if let Some(observer) = &self.observer {
            let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                observer.on_request("GET", url, headers)
            }));
            if caught.is_err() {
                warn!("Attempt observer panicked on request; ignoring");
            }
        }
    }

    fn notify_response(&self, url: &str, status: u16, headers: &HashMap<String, String>) {
        if let Some(observer) = &self.observer {
            let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                observer.on_response(url, status, headers)
            }));
            if caught.is_err() {
                warn!("Attempt observer panicked on response; ignoring");
            }
        }
    }
}

async fn collect_body(mut body: BodyStream) -> Result<Vec<u8>, TransportError> {
    let mut data = Vec::new();
    while let Some(chunk) = body.next().await {
        data.extend_from_slice(&chunk?);
    }
    Ok(data)
}

/// UTF-8 first, Latin-1 as fallback. Latin-1 maps every byte to a char, so
/// this always yields text.
fn decode_body(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Truncate to at most `max_chars` characters on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{FakeTransport, RecordingObserver, Script};
    use std::sync::atomic::Ordering;

    fn test_config() -> FetcherConfig {
        FetcherConfig::default()
    }

    fn engine_with(transport: Arc<FakeTransport>) -> FetchEngine {
        FetchEngine::new(transport, test_config())
    }

    #[tokio::test]
    async fn test_fetch_success_decodes_body() {
        let transport = Arc::new(FakeTransport::new());
        transport.push(Script::reply(200, b"hello world"));
        let engine = engine_with(transport.clone());

        let request = engine.request("https://example.com/");
        let result = engine.fetch(&request).await;

        let success = result.success().expect("fetch should succeed");
        assert_eq!(success.status, 200);
        assert_eq!(success.body, "hello world");
        assert_eq!(success.size, 11);
        assert!(!success.verify_tls);
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_latin1_fallback_never_fails() {
        let transport = Arc::new(FakeTransport::new());
        transport.push(Script::reply(200, b"caf\xe9"));
        let engine = engine_with(transport);

        let request = engine.request("https://example.com/");
        let result = engine.fetch(&request).await;

        let success = result.success().unwrap();
        assert_eq!(success.body, "caf\u{e9}");
        assert_eq!(success.size, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_backs_off_then_succeeds() {
        let transport = Arc::new(FakeTransport::new());
        transport.push(Script::error(ErrorKind::Timeout));
        transport.push(Script::error(ErrorKind::Connection));
        transport.push(Script::reply(200, b"ok"));
        let engine = engine_with(transport.clone());

        let started = tokio::time::Instant::now();
        let request = engine.request("https://example.com/");
        let result = engine.fetch(&request).await;

        assert!(result.is_success());
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
        // 1s after attempt 0, 2s after attempt 1.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_surfaces_last_error() {
        let transport = Arc::new(FakeTransport::new());
        for _ in 0..3 {
            transport.push(Script::error(ErrorKind::Connection));
        }
        let engine = engine_with(transport.clone());

        let started = tokio::time::Instant::now();
        let request = engine.request("https://example.com/");
        let result = engine.fetch(&request).await;

        let failure = result.failure().expect("fetch should fail");
        assert_eq!(failure.kind, ErrorKind::Connection);
        assert_eq!(failure.url, "https://example.com/");
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
        // No sleep after the final attempt: 2^0 + 2^1 seconds total.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_http_500_is_not_retried() {
        let transport = Arc::new(FakeTransport::new());
        transport.push(Script::reply(500, b"internal error"));
        let engine = engine_with(transport.clone());

        let request = engine.request("https://example.com/");
        let result = engine.fetch(&request).await;

        let failure = result.failure().unwrap();
        assert_eq!(failure.kind, ErrorKind::HttpStatus(500));
        assert!(failure.message.contains("internal error"));
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_body_preview_truncated() {
        let transport = Arc::new(FakeTransport::new());
        let body = "x".repeat(500);
        transport.push(Script::reply(502, body.as_bytes()));
        let engine = engine_with(transport);

        let request = engine.request("https://example.com/");
        let result = engine.fetch(&request).await;

        let failure = result.failure().unwrap();
        assert_eq!(failure.message, format!("HTTP 502: {}", "x".repeat(200)));
    }

    #[tokio::test]
    async fn test_fetch_json_parses_body() {
        let transport = Arc::new(FakeTransport::new());
        transport.push(Script::reply(200, br#"{"answer": 42}"#));
        let engine = engine_with(transport);

        let request = engine.request("https://api.example.com/data");
        let result = engine.fetch_json(&request).await;

        let success = result.success().unwrap();
        assert_eq!(success.json.as_ref().unwrap()["answer"], 42);
    }

    #[tokio::test]
    async fn test_fetch_json_parse_failure_is_distinct() {
        let transport = Arc::new(FakeTransport::new());
        transport.push(Script::reply(200, b"<html>not json</html>"));
        let engine = engine_with(transport.clone());

        let request = engine.request("https://api.example.com/data");
        let result = engine.fetch_json(&request).await;

        let failure = result.failure().expect("parse should fail");
        assert_eq!(failure.kind, ErrorKind::Parse);
        // The fetch itself succeeded; no retry happened for the parse.
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_download_writes_file_in_chunks() {
        let transport = Arc::new(FakeTransport::new());
        let payload = vec![7u8; 20_000];
        transport.push(Script::reply_with_length(200, &payload));
        let engine = engine_with(transport);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("payload.bin");
        let request = DownloadRequest {
            fetch: engine.request("https://example.com/file"),
            dest: dest.clone(),
            show_progress: false,
        };

        let result = engine.download(&request).await;
        match result {
            DownloadResult::Success(success) => {
                assert_eq!(success.bytes_written, 20_000);
                assert_eq!(std::fs::read(&dest).unwrap(), payload);
            }
            DownloadResult::Failure(failure) => panic!("download failed: {}", failure.message),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_midstream_failure_leaves_partial_file() {
        let transport = Arc::new(FakeTransport::new());
        let prefix = vec![1u8; 10_000];
        for _ in 0..3 {
            transport.push(Script::broken_body(200, &prefix, ErrorKind::Connection));
        }
        let engine = engine_with(transport);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("partial.bin");
        let request = DownloadRequest {
            fetch: engine.request("https://example.com/file"),
            dest: dest.clone(),
            show_progress: false,
        };

        let result = engine.download(&request).await;
        assert!(!result.is_success());
        assert_eq!(result.failure().unwrap().kind, ErrorKind::Connection);
        // One full chunk made it to disk before the stream broke; the
        // partial file is deliberately not rolled back.
        assert_eq!(std::fs::read(&dest).unwrap().len(), 8 * 1024);
    }

    #[tokio::test]
    async fn test_download_http_error_is_fatal() {
        let transport = Arc::new(FakeTransport::new());
        transport.push(Script::reply(404, b"gone"));
        let engine = engine_with(transport.clone());

        let dir = tempfile::tempdir().unwrap();
        let request = DownloadRequest {
            fetch: engine.request("https://example.com/file"),
            dest: dir.path().join("never.bin"),
            show_progress: false,
        };

        let result = engine.download(&request).await;
        assert_eq!(result.failure().unwrap().kind, ErrorKind::HttpStatus(404));
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_every_attempt() {
        let transport = Arc::new(FakeTransport::new());
        transport.push(Script::error(ErrorKind::Timeout));
        transport.push(Script::reply(200, b"ok"));
        let observer = Arc::new(RecordingObserver::default());
        let engine = engine_with(transport).with_observer(observer.clone());

        let request = engine.request("https://example.com/");
        let result = engine.fetch(&request).await;

        assert!(result.is_success());
        assert_eq!(observer.requests.load(Ordering::SeqCst), 2);
        // Only the successful attempt produced response metadata.
        assert_eq!(observer.responses.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("ok", 200), "ok");
    }

    #[test]
    fn test_decode_body_prefers_utf8() {
        assert_eq!(decode_body("héllo".as_bytes()), "héllo");
        assert_eq!(decode_body(b"\xff\xfe"), "\u{ff}\u{fe}");
    }
}
