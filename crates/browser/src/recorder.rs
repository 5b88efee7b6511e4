//! Network activity recording for one browsing context.
//!
//! Request and response events live in two separate ordered sequences.
//! Each request is stamped with a correlation id at record time; sources
//! that can carry the id through (the CDP event pump) echo it on the
//! response. Pairing by position alone is approximate under concurrent
//! navigation and callers must not assume strict 1:1 alignment.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};
use webgrip_core::config::RecorderConfig;
use webgrip_fetcher::AttemptObserver;

#[derive(Debug, Clone, Serialize)]
pub struct RequestEvent {
    /// Correlation id minted at record time.
    pub id: u64,
    pub timestamp: String,
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub resource_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseEvent {
    /// Correlation id of the request this response answers, when the
    /// source could carry it through.
    pub request_id: Option<u64>,
    pub timestamp: String,
    pub url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub ok: bool,
}

/// Display-sized view: O(1) counts plus the most recent N of each sequence.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkSummary {
    pub total_requests: u64,
    pub total_responses: u64,
    pub failed_responses: u64,
    pub requests: Vec<RequestEvent>,
    pub responses: Vec<ResponseEvent>,
}

struct Buffers {
    requests: VecDeque<RequestEvent>,
    responses: VecDeque<ResponseEvent>,
    total_requests: u64,
    total_responses: u64,
    failed_responses: u64,
}

pub struct NetworkRecorder {
    buffers: Mutex<Buffers>,
    enabled: AtomicBool,
    next_id: AtomicU64,
    /// Events per sequence in `summary`.
    recent: usize,
    /// Ring-buffer cap per sequence; oldest events are evicted past it.
    /// Totals keep counting across evictions.
    capacity: usize,
}

impl NetworkRecorder {
    pub fn new(config: &RecorderConfig) -> Self {
        Self {
            buffers: Mutex::new(Buffers {
                requests: VecDeque::new(),
                responses: VecDeque::new(),
                total_requests: 0,
                total_responses: 0,
                failed_responses: 0,
            }),
            enabled: AtomicBool::new(config.enabled),
            next_id: AtomicU64::new(1),
            recent: config.recent,
            capacity: config.capacity.max(1),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Disable during replay or privacy-sensitive flows; both record
    /// operations become no-ops.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Append a request event. Returns the correlation id, or `None` while
    /// disabled.
    pub fn record_request(
        &self,
        method: &str,
        url: &str,
        headers: &HashMap<String, String>,
        resource_type: &str,
    ) -> Option<u64> {
        if !self.is_enabled() {
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        debug!(method, url, "-> request");

        let mut buffers = self.buffers.lock().unwrap();
        if buffers.requests.len() >= self.capacity {
            buffers.requests.pop_front();
        }
        buffers.requests.push_back(RequestEvent {
            id,
            timestamp: Utc::now().to_rfc3339(),
            method: method.to_string(),
            url: url.to_string(),
            headers: headers.clone(),
            resource_type: resource_type.to_string(),
        });
        buffers.total_requests += 1;
        Some(id)
    }

    pub fn record_response(
        &self,
        url: &str,
        status: u16,
        headers: &HashMap<String, String>,
        request_id: Option<u64>,
    ) {
        if !self.is_enabled() {
            return;
        }

        let ok = status < 400;
        debug!(status, url, ok, "<- response");

        let mut buffers = self.buffers.lock().unwrap();
        if buffers.responses.len() >= self.capacity {
            buffers.responses.pop_front();
        }
        buffers.responses.push_back(ResponseEvent {
            request_id,
            timestamp: Utc::now().to_rfc3339(),
            url: url.to_string(),
            status,
            headers: headers.clone(),
            ok,
        });
        buffers.total_responses += 1;
        if !ok {
            buffers.failed_responses += 1;
        }
    }

    /// Counts plus the most recent N of each sequence. Leaves the
    /// underlying buffers untouched. `failed_responses` counts status
    /// >= 400 only; a transport-level failure produces no response event
    /// and shows up as request/response count skew instead.
    pub fn summary(&self) -> NetworkSummary {
        let buffers = self.buffers.lock().unwrap();
        NetworkSummary {
            total_requests: buffers.total_requests,
            total_responses: buffers.total_responses,
            failed_responses: buffers.failed_responses,
            requests: recent_of(&buffers.requests, self.recent),
            responses: recent_of(&buffers.responses, self.recent),
        }
    }

    /// Reset both sequences and all counters. Called between logical
    /// sessions to bound memory growth.
    pub fn clear(&self) {
        let mut buffers = self.buffers.lock().unwrap();
        buffers.requests.clear();
        buffers.responses.clear();
        buffers.total_requests = 0;
        buffers.total_responses = 0;
        buffers.failed_responses = 0;
        info!("Network recorder cleared");
    }

    /// Full copies of both sequences, oldest first, for trace export.
    pub(crate) fn events_snapshot(&self) -> (Vec<RequestEvent>, Vec<ResponseEvent>) {
        let buffers = self.buffers.lock().unwrap();
        (
            buffers.requests.iter().cloned().collect(),
            buffers.responses.iter().cloned().collect(),
        )
    }
}

fn recent_of<T: Clone>(events: &VecDeque<T>, n: usize) -> Vec<T> {
    let skip = events.len().saturating_sub(n);
    events.iter().skip(skip).cloned().collect()
}

/// Lets a fetch engine feed the recorder one event per attempt. The engine
/// side cannot carry the correlation id back, so responses arrive unpaired.
impl AttemptObserver for NetworkRecorder {
    fn on_request(&self, method: &str, url: &str, headers: &HashMap<String, String>) {
        let _ = self.record_request(method, url, headers, "fetch");
    }

    fn on_response(&self, url: &str, status: u16, headers: &HashMap<String, String>) {
        self.record_response(url, status, headers, None);
    }
}
