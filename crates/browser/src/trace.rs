//! HAR 1.2 export of recorded network activity.
//!
//! Field names are an external contract consumed by trace-analysis tools;
//! do not rename them. Entries pair requests and responses by position,
//! which is approximate under concurrent navigation (the per-event
//! correlation ids exist for callers that need exact pairing).

use std::path::Path;

use serde::Serialize;
use tracing::info;
use webgrip_core::Result;

use crate::recorder::{NetworkRecorder, RequestEvent, ResponseEvent};

const HAR_VERSION: &str = "1.2";

#[derive(Serialize)]
struct Har {
    log: HarLog,
}

#[derive(Serialize)]
struct HarLog {
    version: &'static str,
    creator: HarCreator,
    entries: Vec<HarEntry>,
}

#[derive(Serialize)]
struct HarCreator {
    name: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct HarEntry {
    #[serde(rename = "startedDateTime")]
    started_date_time: String,
    request: HarRequest,
    response: HarResponse,
}

#[derive(Serialize)]
struct HarRequest {
    method: String,
    url: String,
    headers: Vec<HarHeader>,
}

#[derive(Serialize)]
struct HarResponse {
    status: u16,
    headers: Vec<HarHeader>,
}

#[derive(Serialize)]
struct HarHeader {
    name: String,
    value: String,
}

impl NetworkRecorder {
    /// Serialize the buffered activity as a HAR document. Exporting does
    /// not clear the buffer; two exports with no new events are
    /// byte-identical.
    pub fn export_trace(&self) -> Result<String> {
        let (requests, responses) = self.events_snapshot();

        let entries = requests
            .into_iter()
            .zip(responses)
            .map(|(request, response)| har_entry(request, response))
            .collect();

        let har = Har {
            log: HarLog {
                version: HAR_VERSION,
                creator: HarCreator {
                    name: "webgrip",
                    version: env!("CARGO_PKG_VERSION"),
                },
                entries,
            },
        };

        Ok(serde_json::to_string_pretty(&har)?)
    }

    /// Export to a file and return its contents' byte length.
    pub fn export_trace_to_file(&self, path: &Path) -> Result<u64> {
        let content = self.export_trace()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &content)?;
        info!(path = %path.display(), "Trace exported");
        Ok(content.len() as u64)
    }
}

fn har_entry(request: RequestEvent, response: ResponseEvent) -> HarEntry {
    HarEntry {
        started_date_time: request.timestamp,
        request: HarRequest {
            method: request.method,
            url: request.url,
            headers: header_list(request.headers),
        },
        response: HarResponse {
            status: response.status,
            headers: header_list(response.headers),
        },
    }
}

fn header_list(headers: std::collections::HashMap<String, String>) -> Vec<HarHeader> {
    let mut list: Vec<HarHeader> = headers
        .into_iter()
        .map(|(name, value)| HarHeader { name, value })
        .collect();
    list.sort_by(|a, b| a.name.cmp(&b.name));
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use webgrip_core::config::RecorderConfig;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn populated_recorder() -> NetworkRecorder {
        let rec = NetworkRecorder::new(&RecorderConfig::default());
        let id = rec.record_request(
            "GET",
            "https://example.com/",
            &headers(&[("accept", "text/html"), ("user-agent", "webgrip")]),
            "document",
        );
        rec.record_response(
            "https://example.com/",
            200,
            &headers(&[("content-type", "text/html")]),
            id,
        );
        rec
    }

    #[test]
    fn test_export_field_names_are_stable() {
        let rec = populated_recorder();
        let har: serde_json::Value = serde_json::from_str(&rec.export_trace().unwrap()).unwrap();

        assert_eq!(har["log"]["version"], "1.2");
        assert_eq!(har["log"]["creator"]["name"], "webgrip");
        let entry = &har["log"]["entries"][0];
        assert!(entry["startedDateTime"].is_string());
        assert_eq!(entry["request"]["method"], "GET");
        assert_eq!(entry["request"]["url"], "https://example.com/");
        assert_eq!(entry["request"]["headers"][0]["name"], "accept");
        assert_eq!(entry["response"]["status"], 200);
        assert_eq!(entry["response"]["headers"][0]["name"], "content-type");
    }

    #[test]
    fn test_export_is_idempotent() {
        let rec = populated_recorder();
        let first = rec.export_trace().unwrap();
        let second = rec.export_trace().unwrap();
        assert_eq!(first, second);
        // Exporting did not clear anything.
        assert_eq!(rec.summary().total_requests, 1);
    }

    #[test]
    fn test_export_zips_to_shorter_sequence() {
        let rec = populated_recorder();
        // A request still in flight has no response yet.
        rec.record_request("GET", "https://example.com/slow", &headers(&[]), "xhr");

        let har: serde_json::Value = serde_json::from_str(&rec.export_trace().unwrap()).unwrap();
        assert_eq!(har["log"]["entries"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_export_to_file() {
        let rec = populated_recorder();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traces").join("network.har");

        let bytes = rec.export_trace_to_file(&path).unwrap();
        assert!(bytes > 0);
        assert_eq!(std::fs::read(&path).unwrap().len() as u64, bytes);
    }
}
