use serde_json::Value;
use webgrip_tools::{ExportTraceArgs, ToolCall};

pub async fn summary() -> anyhow::Result<()> {
    let host = super::host()?;
    let result = host.execute(ToolCall::NetworkSummary).await;
    print_summary(&result);
    Ok(())
}

pub async fn export(filename: &str) -> anyhow::Result<()> {
    let host = super::host()?;
    let result = host
        .execute(ToolCall::ExportTrace(ExportTraceArgs {
            filename: filename.to_string(),
        }))
        .await;

    if result["success"] == true {
        println!(
            "Trace exported: {} ({} bytes)",
            result["path"].as_str().unwrap_or("?"),
            result["bytes"]
        );
    } else {
        println!("{}", result["error"].as_str().unwrap_or("export failed"));
    }
    Ok(())
}

pub async fn clear() -> anyhow::Result<()> {
    let host = super::host()?;
    host.execute(ToolCall::NetworkClear).await;
    println!("Network recorder cleared");
    Ok(())
}

pub fn print_summary(summary: &Value) {
    println!("Network summary:");
    println!("  Total requests:  {}", summary["total_requests"]);
    println!("  Total responses: {}", summary["total_responses"]);
    println!("  Failed:          {}", summary["failed_responses"]);

    if let Some(requests) = summary["requests"].as_array() {
        if !requests.is_empty() {
            println!("  Recent requests:");
            for request in requests {
                println!(
                    "    -> {} {}",
                    request["method"].as_str().unwrap_or("?"),
                    request["url"].as_str().unwrap_or("?")
                );
            }
        }
    }
    if let Some(responses) = summary["responses"].as_array() {
        if !responses.is_empty() {
            println!("  Recent responses:");
            for response in responses {
                println!(
                    "    <- {} {}",
                    response["status"],
                    response["url"].as_str().unwrap_or("?")
                );
            }
        }
    }
}
