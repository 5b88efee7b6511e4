//! Scripted transport fake for engine and batch tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use futures::StreamExt;

use crate::engine::AttemptObserver;
use crate::error::ErrorKind;
use crate::transport::{Transport, TransportError, TransportReply};
use crate::types::FetchRequest;

pub(crate) enum Script {
    Reply {
        status: u16,
        body: Vec<u8>,
        content_length: Option<u64>,
    },
    Error(ErrorKind),
    BrokenBody {
        status: u16,
        prefix: Vec<u8>,
        kind: ErrorKind,
    },
}

impl Script {
    pub fn reply(status: u16, body: &[u8]) -> Self {
        Script::Reply {
            status,
            body: body.to_vec(),
            content_length: None,
        }
    }

    pub fn reply_with_length(status: u16, body: &[u8]) -> Self {
        Script::Reply {
            status,
            body: body.to_vec(),
            content_length: Some(body.len() as u64),
        }
    }

    pub fn error(kind: ErrorKind) -> Self {
        Script::Error(kind)
    }

    pub fn broken_body(status: u16, prefix: &[u8], kind: ErrorKind) -> Self {
        Script::BrokenBody {
            status,
            prefix: prefix.to_vec(),
            kind,
        }
    }
}

/// Pops one script per attempt: per-URL queues first, then the shared queue.
pub(crate) struct FakeTransport {
    queue: Mutex<VecDeque<Script>>,
    by_url: Mutex<HashMap<String, VecDeque<Script>>>,
    pub attempts: AtomicU32,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            by_url: Mutex::new(HashMap::new()),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn push(&self, script: Script) {
        self.queue.lock().unwrap().push_back(script);
    }

    pub fn push_for(&self, url: &str, script: Script) {
        self.by_url
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(script);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(
        &self,
        request: &FetchRequest,
    ) -> std::result::Result<TransportReply, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let script = {
            let mut by_url = self.by_url.lock().unwrap();
            match by_url.get_mut(&request.url).and_then(|q| q.pop_front()) {
                Some(script) => script,
                None => self
                    .queue
                    .lock()
                    .unwrap()
                    .pop_front()
                    .expect("fake transport: script queue exhausted"),
            }
        };

        match script {
            Script::Error(kind) => Err(TransportError::new(kind, "scripted failure")),
            Script::Reply {
                status,
                body,
                content_length,
            } => {
                let chunks: Vec<std::result::Result<Bytes, TransportError>> =
                    vec![Ok(Bytes::from(body))];
                Ok(TransportReply {
                    final_url: request.url.clone(),
                    status,
                    headers: HashMap::from([(
                        "content-type".to_string(),
                        "text/plain".to_string(),
                    )]),
                    content_length,
                    body: stream::iter(chunks).boxed(),
                })
            }
            Script::BrokenBody {
                status,
                prefix,
                kind,
            } => {
                let declared = (prefix.len() * 2) as u64;
                let chunks: Vec<std::result::Result<Bytes, TransportError>> = vec![
                    Ok(Bytes::from(prefix)),
                    Err(TransportError::new(kind, "scripted stream failure")),
                ];
                Ok(TransportReply {
                    final_url: request.url.clone(),
                    status,
                    headers: HashMap::new(),
                    content_length: Some(declared),
                    body: stream::iter(chunks).boxed(),
                })
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingObserver {
    pub requests: AtomicU32,
    pub responses: AtomicU32,
}

impl AttemptObserver for RecordingObserver {
    fn on_request(&self, _method: &str, _url: &str, _headers: &HashMap<String, String>) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    fn on_response(&self, _url: &str, _status: u16, _headers: &HashMap<String, String>) {
        self.responses.fetch_add(1, Ordering::SeqCst);
    }
}
