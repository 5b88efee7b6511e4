//! Chrome driver: launch, navigate, interact, observe.
//!
//! Every operation here is a thin pass-through to the DevTools Protocol;
//! the interesting state lives in the recorder and the session store. The
//! browser runs with certificate errors ignored, matching the fetch side.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use serde_json::{json, Value};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use webgrip_core::config::BrowserConfig;
use webgrip_core::{Error, Result};
use webgrip_storage::Cookie;

use crate::cdp::CdpConnection;
use crate::recorder::NetworkRecorder;

const DEBUGGER_READY_TIMEOUT: Duration = Duration::from_secs(15);

pub struct NavigationOutcome {
    /// URL after redirects, as the page reports it.
    pub url: String,
    pub title: String,
}

pub struct BrowserDriver {
    process: Child,
    cdp: CdpConnection,
    recorder: Arc<NetworkRecorder>,
}

impl BrowserDriver {
    /// Launch a browser, connect to its first page target, and start
    /// feeding Network domain events into the recorder.
    pub async fn launch(
        config: &BrowserConfig,
        profile_dir: &Path,
        recorder: Arc<NetworkRecorder>,
    ) -> Result<Self> {
        let binary = resolve_binary(config)?;
        std::fs::create_dir_all(profile_dir)?;

        let port = free_port().await?;
        let args = launch_args(config, port, profile_dir);

        info!(
            browser = %binary,
            port,
            headless = config.headless,
            "Launching browser (certificate errors ignored)"
        );

        let process = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Browser(format!("Failed to launch {}: {}", binary, e)))?;

        wait_for_debugger(port, DEBUGGER_READY_TIMEOUT).await?;
        let ws_url = page_ws_url(port).await?;
        let cdp = CdpConnection::connect(&ws_url).await?;

        for domain in ["Page", "Runtime", "Network"] {
            cdp.enable_domain(domain).await?;
        }

        spawn_event_pump(&cdp, recorder.clone()).await;
        info!(ws_url = %ws_url, "CDP connection established");

        Ok(Self {
            process,
            cdp,
            recorder,
        })
    }

    pub fn recorder(&self) -> Arc<NetworkRecorder> {
        self.recorder.clone()
    }

    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<NavigationOutcome> {
        info!(url, "Navigating");
        let mut loaded = self.cdp.subscribe("Page.loadEventFired").await;

        self.cdp.call("Page.navigate", json!({ "url": url })).await?;

        if tokio::time::timeout(timeout, loaded.recv()).await.is_err() {
            warn!(url, "Load event not observed before timeout; continuing");
        }

        let title = self
            .eval_string("document.title")
            .await
            .unwrap_or_default();
        let final_url = self
            .eval_string("location.href")
            .await
            .unwrap_or_else(|| url.to_string());

        info!(title = %title, url = %final_url, "Page loaded");
        Ok(NavigationOutcome {
            url: final_url,
            title,
        })
    }

    pub async fn click(&self, selector: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             el.click(); return true; }})()",
            sel = serde_json::to_string(selector)?
        );
        if self.evaluate(&script).await?.as_bool() == Some(true) {
            info!(selector, "Clicked");
            Ok(())
        } else {
            Err(Error::Browser(format!("Element not found: {}", selector)))
        }
    }

    pub async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             el.focus(); el.value = {val}; \
             el.dispatchEvent(new Event('input', {{bubbles: true}})); \
             el.dispatchEvent(new Event('change', {{bubbles: true}})); return true; }})()",
            sel = serde_json::to_string(selector)?,
            val = serde_json::to_string(value)?
        );
        if self.evaluate(&script).await?.as_bool() == Some(true) {
            info!(selector, "Filled");
            Ok(())
        } else {
            Err(Error::Browser(format!("Element not found: {}", selector)))
        }
    }

    /// Capture a PNG screenshot to `dest`.
    pub async fn screenshot(&self, dest: &Path, full_page: bool) -> Result<u64> {
        let mut params = json!({ "format": "png" });
        if full_page {
            params["captureBeyondViewport"] = json!(true);
        }
        let result = self.cdp.call("Page.captureScreenshot", params).await?;
        let data = result
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Browser("No screenshot data returned".to_string()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| Error::Browser(format!("Bad screenshot payload: {}", e)))?;

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, &bytes)?;
        info!(path = %dest.display(), bytes = bytes.len(), "Screenshot saved");
        Ok(bytes.len() as u64)
    }

    /// Copy the context's cookie set out across the boundary.
    pub async fn cookies(&self) -> Result<Vec<Cookie>> {
        let result = self.cdp.call("Network.getCookies", json!({})).await?;
        let raw = result
            .get("cookies")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(raw.iter().map(cookie_from_cdp).collect())
    }

    /// Copy a cookie set into the context, one setCookie per record.
    pub async fn set_cookies(&self, cookies: &[Cookie]) -> Result<usize> {
        let mut restored = 0;
        for cookie in cookies {
            let mut params = json!({
                "name": cookie.name,
                "value": cookie.value,
                "domain": cookie.domain,
                "path": cookie.path,
                "secure": cookie.secure,
                "httpOnly": cookie.http_only,
            });
            if let Some(expires) = cookie.expires {
                params["expires"] = json!(expires);
            }
            match self.cdp.call("Network.setCookie", params).await {
                Ok(_) => restored += 1,
                Err(e) => warn!(cookie = %cookie.name, "Failed to restore cookie: {}", e),
            }
        }
        info!(restored, total = cookies.len(), "Cookies restored");
        Ok(restored)
    }

    pub async fn current_url(&self) -> Option<String> {
        self.eval_string("location.href")
            .await
            .filter(|url| !url.is_empty() && url != "about:blank")
    }

    pub async fn close(mut self) -> Result<()> {
        if let Err(e) = self.cdp.call("Browser.close", json!({})).await {
            debug!("Browser.close failed (may already be gone): {}", e);
        }
        let _ = self.process.kill().await;
        info!("Browser closed");
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .cdp
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .get("text")
                .and_then(|t| t.as_str())
                .unwrap_or("unknown");
            return Err(Error::Browser(format!("JavaScript exception: {}", text)));
        }
        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn eval_string(&self, expression: &str) -> Option<String> {
        self.evaluate(expression)
            .await
            .ok()
            .and_then(|v| v.as_str().map(String::from))
    }
}

/// Forward Network domain events into the recorder, carrying the
/// correlation id from request to response via the protocol's requestId.
async fn spawn_event_pump(cdp: &CdpConnection, recorder: Arc<NetworkRecorder>) {
    let mut requests = cdp.subscribe("Network.requestWillBeSent").await;
    let mut responses = cdp.subscribe("Network.responseReceived").await;

    tokio::spawn(async move {
        let mut inflight: HashMap<String, u64> = HashMap::new();
        loop {
            tokio::select! {
                request = requests.recv() => {
                    let Some(params) = request else { break };
                    let method = params["request"]["method"].as_str().unwrap_or("GET");
                    let url = params["request"]["url"].as_str().unwrap_or_default();
                    let headers = header_map(&params["request"]["headers"]);
                    let resource_type = params["type"].as_str().unwrap_or("other");
                    let id = recorder.record_request(method, url, &headers, resource_type);
                    if let (Some(id), Some(cdp_id)) = (id, params["requestId"].as_str()) {
                        inflight.insert(cdp_id.to_string(), id);
                    }
                }
                response = responses.recv() => {
                    let Some(params) = response else { break };
                    let url = params["response"]["url"].as_str().unwrap_or_default();
                    let status = params["response"]["status"].as_u64().unwrap_or(0) as u16;
                    let headers = header_map(&params["response"]["headers"]);
                    let request_id = params["requestId"]
                        .as_str()
                        .and_then(|cdp_id| inflight.remove(cdp_id));
                    recorder.record_response(url, status, &headers, request_id);
                }
            }
        }
        debug!("Network event pump stopped");
    });
}

fn header_map(value: &Value) -> HashMap<String, String> {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn cookie_from_cdp(value: &Value) -> Cookie {
    let expires = value["expires"].as_f64().filter(|&e| e > 0.0);
    Cookie {
        name: value["name"].as_str().unwrap_or_default().to_string(),
        value: value["value"].as_str().unwrap_or_default().to_string(),
        domain: value["domain"].as_str().unwrap_or_default().to_string(),
        path: value["path"].as_str().unwrap_or("/").to_string(),
        expires,
        secure: value["secure"].as_bool().unwrap_or(false),
        http_only: value["httpOnly"].as_bool().unwrap_or(false),
    }
}

fn resolve_binary(config: &BrowserConfig) -> Result<String> {
    if let Some(binary) = &config.binary {
        return Ok(binary.clone());
    }

    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "linux") {
        &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
        ]
    } else {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Ok(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok()
        {
            return Ok(candidate.to_string());
        }
    }
    Err(Error::Browser(
        "No Chrome/Chromium binary found; set browser.binary in config".to_string(),
    ))
}

fn launch_args(config: &BrowserConfig, port: u16, profile_dir: &Path) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", port),
        format!("--user-data-dir={}", profile_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--ignore-certificate-errors".to_string(),
        "--ignore-certificate-errors-spki-list".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--password-store=basic".to_string(),
    ];
    if let Some(proxy) = &config.proxy {
        args.push(format!("--proxy-server={}", proxy));
    }
    if config.headless {
        args.push("--headless=new".to_string());
    }
    args.push(format!(
        "--window-size={},{}",
        config.viewport_width, config.viewport_height
    ));
    args.push("about:blank".to_string());
    args
}

async fn free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| Error::Browser(format!("Failed to find a free port: {}", e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::Browser(format!("Failed to read local addr: {}", e)))?
        .port();
    drop(listener);
    Ok(port)
}

/// Poll /json/version until the debugging endpoint answers.
async fn wait_for_debugger(port: u16, timeout: Duration) -> Result<()> {
    let url = format!("http://127.0.0.1:{}/json/version", port);
    let start = std::time::Instant::now();

    loop {
        if start.elapsed() > timeout {
            return Err(Error::Browser(format!(
                "Browser debugger not ready after {}s on port {}",
                timeout.as_secs(),
                port
            )));
        }
        if let Ok(resp) = reqwest::get(&url).await {
            if resp.json::<Value>().await.is_ok() {
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Find the first page target's WebSocket URL; the target can take a moment
/// to appear after launch.
async fn page_ws_url(port: u16) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        let Ok(resp) = reqwest::get(&url).await else {
            continue;
        };
        let Ok(targets) = resp.json::<Vec<Value>>().await else {
            continue;
        };
        for target in &targets {
            if target["type"].as_str() == Some("page") {
                if let Some(ws) = target["webSocketDebuggerUrl"].as_str() {
                    return Ok(ws.to_string());
                }
            }
        }
    }
    Err(Error::Browser("No page target found after retries".to_string()))
}
