use webgrip_tools::{SessionLoadArgs, SessionNameArgs, SessionSaveArgs, ToolCall};

pub async fn save(name: &str) -> anyhow::Result<()> {
    let host = super::host()?;
    let result = host
        .execute(ToolCall::SessionSave(SessionSaveArgs {
            name: name.to_string(),
        }))
        .await;

    if result["success"] == true {
        println!(
            "Session saved: {} ({} cookies) -> {}",
            name,
            result["cookie_count"],
            result["path"].as_str().unwrap_or("?")
        );
    } else {
        println!("{}", result["error"].as_str().unwrap_or("save failed"));
    }
    host.shutdown().await;
    Ok(())
}

pub async fn load(name: &str, navigate: bool) -> anyhow::Result<()> {
    let host = super::host()?;
    let result = host
        .execute(ToolCall::SessionLoad(SessionLoadArgs {
            name: name.to_string(),
            auto_navigate: navigate,
        }))
        .await;

    if result["success"] == true {
        let domains = result["domains"].as_array().map(|d| d.len()).unwrap_or(0);
        println!(
            "Session loaded: {} ({} cookies from {} domains)",
            name, result["cookie_count"], domains
        );
        if let Some(url) = result["saved_url"].as_str() {
            if let Some(navigated) = result["navigated"].as_str() {
                println!("Navigated to {}", navigated);
            } else {
                println!("Saved URL: {} (use --navigate to open it)", url);
            }
        }
    } else {
        println!("{}", result["error"].as_str().unwrap_or("load failed"));
    }
    host.shutdown().await;
    Ok(())
}

pub async fn list() -> anyhow::Result<()> {
    let host = super::host()?;
    let result = host.execute(ToolCall::SessionList).await;

    let empty = Vec::new();
    let sessions = result["sessions"].as_array().unwrap_or(&empty);
    if sessions.is_empty() {
        println!("No saved sessions");
        return Ok(());
    }
    println!("Saved sessions ({}):", sessions.len());
    for session in sessions {
        if let Some(name) = session.as_str() {
            println!("  - {}", name);
        }
    }
    Ok(())
}

pub async fn delete(name: &str) -> anyhow::Result<()> {
    let host = super::host()?;
    let result = host
        .execute(ToolCall::SessionDelete(SessionNameArgs {
            name: name.to_string(),
        }))
        .await;

    if result["deleted"] == true {
        println!("Session deleted: {}", name);
    } else {
        println!("No session named '{}'", name);
    }
    Ok(())
}

pub async fn info(name: &str) -> anyhow::Result<()> {
    let host = super::host()?;
    let result = host
        .execute(ToolCall::SessionInfo(SessionNameArgs {
            name: name.to_string(),
        }))
        .await;

    if result["success"] == true {
        println!("Session: {}", name);
        println!("  Saved at: {}", result["saved_at"].as_str().unwrap_or("?"));
        println!("  Cookies: {}", result["cookie_count"]);
        let domains: Vec<&str> = result["domains"]
            .as_array()
            .map(|d| d.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();
        println!("  Domains: {}", domains.join(", "));
        if let Some(url) = result["current_url"].as_str() {
            println!("  URL: {}", url);
        }
    } else {
        println!("{}", result["error"].as_str().unwrap_or("not found"));
    }
    Ok(())
}
