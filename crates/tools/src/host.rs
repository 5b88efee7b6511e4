//! The long-lived context object behind tool dispatch.
//!
//! One host owns one fetch engine, one session store, one recorder, and at
//! most one browser driver, launched lazily on the first browsing call and
//! shut down explicitly. Nothing here is ambient global state; callers
//! construct a host and pass it around.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::warn;
use webgrip_browser::{BrowserDriver, NetworkRecorder};
use webgrip_core::{Config, Error, Paths, Result};
use webgrip_fetcher::{
    DownloadRequest, DownloadResult, ErrorKind, FetchEngine, FetchFailure, FetchRequest,
    FetchResult, HttpTransport, ProgressSink,
};
use webgrip_storage::SessionStore;

use crate::{FetchArgs, SessionLoadArgs, ToolCall};

pub struct ToolHost {
    config: Config,
    paths: Paths,
    engine: FetchEngine,
    store: SessionStore,
    recorder: Arc<NetworkRecorder>,
    driver: Mutex<Option<BrowserDriver>>,
}

impl ToolHost {
    pub fn new(config: Config, paths: Paths) -> Result<Self> {
        Self::with_progress(config, paths, None)
    }

    /// Like `new`, with a progress sink wired into the engine for download
    /// reporting (the CLI renders it; embedded hosts usually pass `None`).
    pub fn with_progress(
        config: Config,
        paths: Paths,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<Self> {
        paths.ensure_dirs()?;
        let recorder = Arc::new(NetworkRecorder::new(&config.recorder));
        let transport = Arc::new(HttpTransport::new(&config.fetcher)?);
        let mut engine =
            FetchEngine::new(transport, config.fetcher.clone()).with_observer(recorder.clone());
        if let Some(sink) = progress {
            engine = engine.with_progress(sink);
        }
        let store = SessionStore::new(paths.clone());

        Ok(Self {
            config,
            paths,
            engine,
            store,
            recorder,
            driver: Mutex::new(None),
        })
    }

    pub fn engine(&self) -> &FetchEngine {
        &self.engine
    }

    pub fn recorder(&self) -> Arc<NetworkRecorder> {
        self.recorder.clone()
    }

    /// Execute one call. Failures become structured payloads; a single
    /// failed operation never takes the process down.
    pub async fn execute(&self, call: ToolCall) -> Value {
        let name = call.name();
        match self.run(call).await {
            Ok(value) => value,
            Err(err) => {
                warn!(tool = name, error = %err, "Tool call failed");
                json!({ "success": false, "error": err.to_string() })
            }
        }
    }

    /// Close the browser if one is running.
    pub async fn shutdown(&self) {
        let mut guard = self.driver.lock().await;
        if let Some(driver) = guard.take() {
            let _ = driver.close().await;
        }
    }

    async fn run(&self, call: ToolCall) -> Result<Value> {
        match call {
            ToolCall::Fetch(args) => {
                validate_url(&args.url)?;
                let request = self.fetch_request(&args);
                Ok(fetch_result_json(&self.engine.fetch(&request).await))
            }
            ToolCall::FetchJson(args) => {
                validate_url(&args.url)?;
                let request = self.fetch_request(&args);
                Ok(fetch_result_json(&self.engine.fetch_json(&request).await))
            }
            ToolCall::Download(args) => {
                validate_url(&args.url)?;
                let request = DownloadRequest {
                    fetch: self.engine.request(args.url),
                    dest: resolve_dest(&args.filename, &self.paths.downloads_dir()),
                    show_progress: args.show_progress,
                };
                Ok(download_result_json(&self.engine.download(&request).await))
            }
            ToolCall::BatchFetch(args) => {
                // A malformed URL becomes a failure result at its own index;
                // the rest of the batch still runs.
                let checked: Vec<std::result::Result<(), Value>> = args
                    .urls
                    .iter()
                    .map(|url| {
                        validate_url(url).map_err(|err| {
                            failure_json(&FetchFailure {
                                kind: ErrorKind::ClientProtocol,
                                message: err.to_string(),
                                url: url.clone(),
                                elapsed: Duration::ZERO,
                            })
                        })
                    })
                    .collect();
                let valid: Vec<String> = args
                    .urls
                    .iter()
                    .zip(&checked)
                    .filter(|(_, check)| check.is_ok())
                    .map(|(url, _)| url.clone())
                    .collect();

                let mut fetched = self.engine.batch_fetch(&valid).await.into_iter();
                let results = checked
                    .into_iter()
                    .map(|check| match check {
                        Ok(()) => match fetched.next() {
                            Some(result) => fetch_result_json(&result),
                            None => json!({ "success": false, "error": "batch result missing" }),
                        },
                        Err(failure) => failure,
                    })
                    .collect();
                Ok(Value::Array(results))
            }
            ToolCall::SessionSave(args) => self.session_save(&args.name).await,
            ToolCall::SessionLoad(args) => self.session_load(&args).await,
            ToolCall::SessionList => {
                let sessions = self.store.list()?;
                Ok(json!({ "success": true, "sessions": sessions }))
            }
            ToolCall::SessionDelete(args) => {
                let deleted = self.store.delete(&args.name)?;
                Ok(json!({ "success": true, "deleted": deleted }))
            }
            ToolCall::SessionInfo(args) => match self.store.load(&args.name) {
                Ok(record) => Ok(json!({
                    "success": true,
                    "name": record.name,
                    "saved_at": record.saved_at,
                    "cookie_count": record.cookie_count,
                    "domains": record.domains,
                    "current_url": record.current_url,
                })),
                Err(err) if err.is_not_found() => Ok(json!({
                    "success": false,
                    "error": format!("Session not found: {}", args.name),
                })),
                Err(err) => Err(err),
            },
            ToolCall::NetworkSummary => Ok(serde_json::to_value(self.recorder.summary())?),
            ToolCall::NetworkClear => {
                self.recorder.clear();
                Ok(json!({ "success": true }))
            }
            ToolCall::ExportTrace(args) => {
                let dest = resolve_dest(&args.filename, &self.paths.traces_dir());
                let bytes = self.recorder.export_trace_to_file(&dest)?;
                Ok(json!({
                    "success": true,
                    "path": dest.display().to_string(),
                    "bytes": bytes,
                }))
            }
            ToolCall::Navigate(args) => {
                let mut guard = self.driver.lock().await;
                let driver = self.ensure_driver(&mut guard).await?;
                let outcome = driver
                    .navigate(&args.url, Duration::from_secs(args.timeout_secs))
                    .await?;
                Ok(json!({ "success": true, "url": outcome.url, "title": outcome.title }))
            }
            ToolCall::Click(args) => {
                let mut guard = self.driver.lock().await;
                let driver = self.ensure_driver(&mut guard).await?;
                driver.click(&args.selector).await?;
                Ok(json!({ "success": true, "message": format!("Clicked: {}", args.selector) }))
            }
            ToolCall::Fill(args) => {
                let mut guard = self.driver.lock().await;
                let driver = self.ensure_driver(&mut guard).await?;
                driver.fill(&args.selector, &args.text).await?;
                Ok(json!({ "success": true, "message": format!("Filled: {}", args.selector) }))
            }
            ToolCall::Screenshot(args) => {
                let mut guard = self.driver.lock().await;
                let driver = self.ensure_driver(&mut guard).await?;
                let dest = resolve_dest(&args.filename, &self.paths.screenshots_dir());
                let bytes = driver.screenshot(&dest, args.full_page).await?;
                Ok(json!({
                    "success": true,
                    "path": dest.display().to_string(),
                    "bytes": bytes,
                }))
            }
        }
    }

    async fn session_save(&self, name: &str) -> Result<Value> {
        let guard = self.driver.lock().await;
        let Some(driver) = guard.as_ref() else {
            return Ok(json!({
                "success": false,
                "error": "No browser session active. Navigate to a page first.",
            }));
        };

        let cookies = driver.cookies().await?;
        let current_url = driver.current_url().await;
        let path = self.store.save(&cookies, current_url.as_deref(), name)?;

        Ok(json!({
            "success": true,
            "path": path.display().to_string(),
            "cookie_count": cookies.len(),
            "message": format!("Session saved: {}", name),
        }))
    }

    async fn session_load(&self, args: &SessionLoadArgs) -> Result<Value> {
        let record = match self.store.load(&args.name) {
            Ok(record) => record,
            Err(err) if err.is_not_found() => {
                return Ok(json!({
                    "success": false,
                    "error": format!("Session not found: {}", args.name),
                }));
            }
            Err(err) => return Err(err),
        };

        let mut guard = self.driver.lock().await;
        let driver = self.ensure_driver(&mut guard).await?;
        let restored = driver.set_cookies(&record.cookies).await?;

        let mut navigated = None;
        if args.auto_navigate {
            if let Some(url) = &record.current_url {
                let outcome = driver.navigate(url, Duration::from_secs(30)).await?;
                navigated = Some(outcome.url);
            }
        }

        Ok(json!({
            "success": true,
            "cookie_count": record.cookie_count,
            "domains": record.domains,
            "saved_url": record.current_url,
            "saved_at": record.saved_at,
            "restored": restored,
            "navigated": navigated,
        }))
    }

    async fn ensure_driver<'a>(
        &self,
        guard: &'a mut Option<BrowserDriver>,
    ) -> Result<&'a mut BrowserDriver> {
        if guard.is_none() {
            let profile = self.paths.browser_profiles_dir().join("default");
            let driver =
                BrowserDriver::launch(&self.config.browser, &profile, self.recorder.clone())
                    .await?;
            *guard = Some(driver);
        }
        Ok(guard.as_mut().unwrap())
    }

    fn fetch_request(&self, args: &FetchArgs) -> FetchRequest {
        let mut request = self.engine.request(args.url.clone());
        if let Some(headers) = &args.headers {
            request = request.with_headers(headers.clone());
        }
        if let Some(timeout) = args.timeout_secs {
            request.timeout = Duration::from_secs(timeout);
        }
        request
    }
}

fn validate_url(url: &str) -> Result<()> {
    let parsed = url::Url::parse(url)
        .map_err(|e| Error::Validation(format!("Invalid URL '{}': {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::Validation(format!(
            "URL must be http or https, got '{}'",
            other
        ))),
    }
}

fn resolve_dest(filename: &str, default_dir: &Path) -> PathBuf {
    let path = Path::new(filename);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        default_dir.join(filename)
    }
}

fn fetch_result_json(result: &FetchResult) -> Value {
    match result {
        FetchResult::Success(s) => {
            let mut value = json!({
                "success": true,
                "url": s.url,
                "status": s.status,
                "headers": s.headers,
                "content": s.body,
                "size": s.size,
                "elapsed": s.elapsed.as_secs_f64(),
                "ssl_verified": s.verify_tls,
            });
            if let Some(parsed) = &s.json {
                value["json"] = parsed.clone();
            }
            value
        }
        FetchResult::Failure(failure) => failure_json(failure),
    }
}

fn download_result_json(result: &DownloadResult) -> Value {
    match result {
        DownloadResult::Success(s) => json!({
            "success": true,
            "url": s.url,
            "output_path": s.dest.display().to_string(),
            "size": s.bytes_written,
            "elapsed": s.elapsed.as_secs_f64(),
        }),
        DownloadResult::Failure(failure) => failure_json(failure),
    }
}

fn failure_json(failure: &FetchFailure) -> Value {
    let mut value = json!({
        "success": false,
        "error": failure.message,
        "error_type": failure.kind.label(),
        "url": failure.url,
        "elapsed": failure.elapsed.as_secs_f64(),
    });
    if let Some(status) = failure.kind.status() {
        value["status"] = json!(status);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExportTraceArgs, SessionNameArgs};
    use std::collections::HashMap;

    fn test_host() -> (ToolHost, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());
        let host = ToolHost::new(Config::default(), paths).unwrap();
        (host, dir)
    }

    #[tokio::test]
    async fn test_session_list_starts_empty() {
        let (host, _dir) = test_host();
        let value = host.execute(ToolCall::SessionList).await;
        assert_eq!(value["success"], true);
        assert!(value["sessions"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_delete_missing_reports_false() {
        let (host, _dir) = test_host();
        let value = host
            .execute(ToolCall::SessionDelete(SessionNameArgs {
                name: "nope".to_string(),
            }))
            .await;
        assert_eq!(value["success"], true);
        assert_eq!(value["deleted"], false);
    }

    #[tokio::test]
    async fn test_session_save_without_browser_is_soft_error() {
        let (host, _dir) = test_host();
        let value = host
            .execute(ToolCall::SessionSave(crate::SessionSaveArgs {
                name: "default".to_string(),
            }))
            .await;
        assert_eq!(value["success"], false);
        assert!(value["error"]
            .as_str()
            .unwrap()
            .contains("No browser session active"));
    }

    #[tokio::test]
    async fn test_session_info_missing_is_soft_error() {
        let (host, _dir) = test_host();
        let value = host
            .execute(ToolCall::SessionInfo(SessionNameArgs {
                name: "ghost".to_string(),
            }))
            .await;
        assert_eq!(value["success"], false);
    }

    #[tokio::test]
    async fn test_network_summary_and_clear() {
        let (host, _dir) = test_host();
        host.recorder()
            .record_request("GET", "https://example.com/", &HashMap::new(), "fetch");

        let summary = host.execute(ToolCall::NetworkSummary).await;
        assert_eq!(summary["total_requests"], 1);

        host.execute(ToolCall::NetworkClear).await;
        let summary = host.execute(ToolCall::NetworkSummary).await;
        assert_eq!(summary["total_requests"], 0);
    }

    #[tokio::test]
    async fn test_export_trace_writes_into_traces_dir() {
        let (host, dir) = test_host();
        let value = host
            .execute(ToolCall::ExportTrace(ExportTraceArgs {
                filename: "out.har".to_string(),
            }))
            .await;
        assert_eq!(value["success"], true);
        assert!(dir.path().join("traces").join("out.har").exists());
    }

    #[tokio::test]
    async fn test_batch_invalid_url_fails_at_its_index_only() {
        let (host, _dir) = test_host();
        let value = host
            .execute(ToolCall::BatchFetch(crate::BatchArgs {
                urls: vec![
                    "ftp://bad.example/file".to_string(),
                    "not a url".to_string(),
                ],
            }))
            .await;

        let results = value.as_array().expect("batch returns one result per URL");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["success"], false);
        assert_eq!(results[0]["error_type"], "client_protocol_error");
        assert_eq!(results[0]["url"], "ftp://bad.example/file");
        assert_eq!(results[1]["success"], false);
        assert_eq!(results[1]["url"], "not a url");
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_http_url() {
        let (host, _dir) = test_host();
        let value = host
            .execute(ToolCall::Fetch(crate::FetchArgs {
                url: "ftp://example.com/file".to_string(),
                headers: None,
                timeout_secs: None,
            }))
            .await;
        assert_eq!(value["success"], false);
        assert!(value["error"].as_str().unwrap().contains("http"));
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("http://example.com/path?q=1").is_ok());
        assert!(validate_url("file:///etc/passwd").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn test_resolve_dest_relative_and_absolute() {
        let dir = Path::new("/data/downloads");
        assert_eq!(
            resolve_dest("file.bin", dir),
            PathBuf::from("/data/downloads/file.bin")
        );
        assert_eq!(resolve_dest("/tmp/x.bin", dir), PathBuf::from("/tmp/x.bin"));
    }
}
