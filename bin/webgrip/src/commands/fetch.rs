use std::io::Write as _;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use webgrip_fetcher::{Progress, ProgressSink};
use webgrip_tools::{BatchArgs, DownloadArgs, FetchArgs, ToolCall};

const CONTENT_PREVIEW_CHARS: usize = 500;
const JSON_PREVIEW_CHARS: usize = 1000;

pub async fn fetch(url: String, timeout: Option<u64>) -> anyhow::Result<()> {
    let host = super::host()?;
    let result = host
        .execute(ToolCall::Fetch(FetchArgs {
            url,
            headers: None,
            timeout_secs: timeout,
        }))
        .await;
    print_fetch_result(&result);
    Ok(())
}

pub async fn json(url: String) -> anyhow::Result<()> {
    let host = super::host()?;
    let result = host
        .execute(ToolCall::FetchJson(FetchArgs {
            url,
            headers: None,
            timeout_secs: None,
        }))
        .await;

    if result["success"] == true {
        println!("Status: {}", result["status"]);
        println!("Elapsed: {:.2}s", result["elapsed"].as_f64().unwrap_or(0.0));
        let pretty = serde_json::to_string_pretty(&result["json"])?;
        println!("\n{}", preview(&pretty, JSON_PREVIEW_CHARS));
    } else {
        print_failure(&result);
    }
    Ok(())
}

pub async fn download(url: String, filename: String, show_progress: bool) -> anyhow::Result<()> {
    let progress: Option<Arc<dyn ProgressSink>> = if show_progress {
        Some(Arc::new(ConsoleProgress::default()))
    } else {
        None
    };
    let host = super::host_with_progress(progress)?;

    let result = host
        .execute(ToolCall::Download(DownloadArgs {
            url,
            filename,
            show_progress,
        }))
        .await;

    if result["success"] == true {
        println!(
            "Downloaded {} bytes to {} in {:.2}s",
            result["size"],
            result["output_path"].as_str().unwrap_or("?"),
            result["elapsed"].as_f64().unwrap_or(0.0)
        );
    } else {
        print_failure(&result);
    }
    Ok(())
}

pub async fn batch(urls: Vec<String>) -> anyhow::Result<()> {
    if urls.is_empty() {
        println!("No URLs given");
        return Ok(());
    }

    let host = super::host()?;
    println!("Fetching {} URLs concurrently...", urls.len());
    let results = host.execute(ToolCall::BatchFetch(BatchArgs { urls })).await;

    let empty = Vec::new();
    let results = results.as_array().unwrap_or(&empty);
    let mut successful = 0;
    for (i, result) in results.iter().enumerate() {
        if result["success"] == true {
            successful += 1;
            println!(
                "  {}. ok   {} ({}) - {} bytes",
                i + 1,
                result["url"].as_str().unwrap_or("?"),
                result["status"],
                result["size"]
            );
        } else {
            println!(
                "  {}. FAIL {} - {}",
                i + 1,
                result["url"].as_str().unwrap_or("?"),
                result["error"].as_str().unwrap_or("unknown error")
            );
        }
    }
    println!("{}/{} successful", successful, results.len());
    Ok(())
}

fn print_fetch_result(result: &Value) {
    if result["success"] == true {
        println!("Status: {}", result["status"]);
        println!("Size: {} bytes", result["size"]);
        println!("Elapsed: {:.2}s", result["elapsed"].as_f64().unwrap_or(0.0));
        println!("SSL verified: {}", result["ssl_verified"]);
        if let Some(content) = result["content"].as_str() {
            println!("\n{}", preview(content, CONTENT_PREVIEW_CHARS));
        }
    } else {
        print_failure(result);
    }
}

fn print_failure(result: &Value) {
    println!(
        "Error ({}): {}",
        result["error_type"].as_str().unwrap_or("error"),
        result["error"].as_str().unwrap_or("unknown error")
    );
}

fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Renders a one-line progress bar, redrawn in place per chunk.
#[derive(Default)]
struct ConsoleProgress {
    state: Mutex<Option<Progress>>,
}

impl ProgressSink for ConsoleProgress {
    fn advance(&self, current: u64, total: u64) {
        let mut guard = self.state.lock().unwrap();
        let progress = guard.get_or_insert_with(|| Progress::new(Some(total)));
        progress.set(current);

        let percent = progress.percent().unwrap_or(0.0);
        let bar_len = 40usize;
        let filled = ((bar_len as f64 * percent / 100.0) as usize).min(bar_len);
        let bar = format!("{}{}", "#".repeat(filled), "-".repeat(bar_len - filled));

        let mb = 1024.0 * 1024.0;
        print!(
            "\rDownloading: [{}] {:.1}% ({:.2}/{:.2} MB) @ {:.2} MB/s",
            bar,
            percent,
            current as f64 / mb,
            total as f64 / mb,
            progress.rate_bytes_per_sec() / mb
        );
        let _ = std::io::stdout().flush();

        if current >= total {
            println!();
        }
    }
}
