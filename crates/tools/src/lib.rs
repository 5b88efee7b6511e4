//! Typed tool-call dispatch.
//!
//! Every operation an LLM client can invoke is one variant of [`ToolCall`],
//! carrying a strongly typed argument record. Dispatch is a single
//! exhaustive match in [`ToolHost::execute`]; there is no string-to-handler
//! table to fall out of sync.

pub mod host;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use host::ToolHost;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    Fetch(FetchArgs),
    FetchJson(FetchArgs),
    Download(DownloadArgs),
    BatchFetch(BatchArgs),
    SessionSave(SessionSaveArgs),
    SessionLoad(SessionLoadArgs),
    SessionList,
    SessionDelete(SessionNameArgs),
    SessionInfo(SessionNameArgs),
    NetworkSummary,
    NetworkClear,
    ExportTrace(ExportTraceArgs),
    Navigate(NavigateArgs),
    Click(SelectorArgs),
    Fill(FillArgs),
    Screenshot(ScreenshotArgs),
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::Fetch(_) => "fetch",
            ToolCall::FetchJson(_) => "fetch_json",
            ToolCall::Download(_) => "download",
            ToolCall::BatchFetch(_) => "batch_fetch",
            ToolCall::SessionSave(_) => "session_save",
            ToolCall::SessionLoad(_) => "session_load",
            ToolCall::SessionList => "session_list",
            ToolCall::SessionDelete(_) => "session_delete",
            ToolCall::SessionInfo(_) => "session_info",
            ToolCall::NetworkSummary => "network_summary",
            ToolCall::NetworkClear => "network_clear",
            ToolCall::ExportTrace(_) => "export_trace",
            ToolCall::Navigate(_) => "navigate",
            ToolCall::Click(_) => "click",
            ToolCall::Fill(_) => "fill",
            ToolCall::Screenshot(_) => "screenshot",
        }
    }

    /// Every dispatchable tool name, for help output.
    pub fn catalog() -> &'static [&'static str] {
        &[
            "fetch",
            "fetch_json",
            "download",
            "batch_fetch",
            "session_save",
            "session_load",
            "session_list",
            "session_delete",
            "session_info",
            "network_summary",
            "network_clear",
            "export_trace",
            "navigate",
            "click",
            "fill",
            "screenshot",
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchArgs {
    pub url: String,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadArgs {
    pub url: String,
    /// Relative names land in the downloads directory.
    pub filename: String,
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchArgs {
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSaveArgs {
    #[serde(default = "default_session_name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLoadArgs {
    #[serde(default = "default_session_name")]
    pub name: String,
    /// Navigating to the saved URL is this layer's decision; the store
    /// only hands the record back.
    #[serde(default)]
    pub auto_navigate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionNameArgs {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportTraceArgs {
    #[serde(default = "default_trace_filename")]
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigateArgs {
    pub url: String,
    #[serde(default = "default_navigate_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorArgs {
    pub selector: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillArgs {
    pub selector: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotArgs {
    #[serde(default = "default_screenshot_filename")]
    pub filename: String,
    #[serde(default = "default_true")]
    pub full_page: bool,
}

fn default_true() -> bool {
    true
}

fn default_session_name() -> String {
    "default".to_string()
}

fn default_trace_filename() -> String {
    "network.har".to_string()
}

fn default_screenshot_filename() -> String {
    "screenshot.png".to_string()
}

fn default_navigate_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch_call() {
        let call: ToolCall = serde_json::from_str(
            r#"{"name": "fetch", "arguments": {"url": "https://example.com"}}"#,
        )
        .unwrap();
        match call {
            ToolCall::Fetch(args) => {
                assert_eq!(args.url, "https://example.com");
                assert!(args.headers.is_none());
            }
            other => panic!("parsed wrong variant: {}", other.name()),
        }
    }

    #[test]
    fn test_parse_unit_variant_without_arguments() {
        let call: ToolCall = serde_json::from_str(r#"{"name": "session_list"}"#).unwrap();
        assert_eq!(call.name(), "session_list");
    }

    #[test]
    fn test_parse_defaults() {
        let call: ToolCall =
            serde_json::from_str(r#"{"name": "session_load", "arguments": {}}"#).unwrap();
        match call {
            ToolCall::SessionLoad(args) => {
                assert_eq!(args.name, "default");
                assert!(!args.auto_navigate);
            }
            other => panic!("parsed wrong variant: {}", other.name()),
        }
    }

    #[test]
    fn test_unknown_tool_name_is_rejected() {
        let result: Result<ToolCall, _> =
            serde_json::from_str(r#"{"name": "rm_rf", "arguments": {}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_catalog_matches_variants() {
        assert!(ToolCall::catalog().contains(&"batch_fetch"));
        assert!(ToolCall::catalog().contains(&"export_trace"));
        assert_eq!(ToolCall::catalog().len(), 16);
    }
}
