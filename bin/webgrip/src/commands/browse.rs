//! Interactive browsing shell: one long-lived host, commands on stdin.

use std::io::Write as _;

use webgrip_tools::{
    ExportTraceArgs, FillArgs, NavigateArgs, ScreenshotArgs, SelectorArgs, SessionLoadArgs,
    SessionNameArgs, SessionSaveArgs, ToolCall,
};

pub async fn run() -> anyhow::Result<()> {
    let host = super::host()?;

    println!("webgrip interactive browser");
    println!("WARNING: TLS certificate verification is DISABLED");
    print_help();

    let stdin = std::io::stdin();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.splitn(3, char::is_whitespace);
        let action = parts.next().unwrap_or_default().to_lowercase();
        let arg1 = parts.next().map(str::trim);
        let arg2 = parts.next().map(str::trim);

        match action.as_str() {
            "quit" | "exit" => break,
            "help" => print_help(),

            "nav" | "navigate" => {
                let Some(url) = arg1 else {
                    println!("Usage: nav <url>");
                    continue;
                };
                let result = host
                    .execute(ToolCall::Navigate(NavigateArgs {
                        url: url.to_string(),
                        timeout_secs: 30,
                    }))
                    .await;
                if result["success"] == true {
                    println!(
                        "Loaded: {} ({})",
                        result["title"].as_str().unwrap_or(""),
                        result["url"].as_str().unwrap_or("")
                    );
                } else {
                    println!("{}", result["error"].as_str().unwrap_or("navigation failed"));
                }
            }

            "click" => {
                let Some(selector) = arg1 else {
                    println!("Usage: click <selector>");
                    continue;
                };
                let result = host
                    .execute(ToolCall::Click(SelectorArgs {
                        selector: selector.to_string(),
                    }))
                    .await;
                print_outcome(&result);
            }

            "fill" => {
                let (Some(selector), Some(text)) = (arg1, arg2) else {
                    println!("Usage: fill <selector> <text>");
                    continue;
                };
                let result = host
                    .execute(ToolCall::Fill(FillArgs {
                        selector: selector.to_string(),
                        text: text.to_string(),
                    }))
                    .await;
                print_outcome(&result);
            }

            "screenshot" => {
                let filename = arg1.unwrap_or("screenshot.png");
                let result = host
                    .execute(ToolCall::Screenshot(ScreenshotArgs {
                        filename: filename.to_string(),
                        full_page: true,
                    }))
                    .await;
                if result["success"] == true {
                    println!("Screenshot saved: {}", result["path"].as_str().unwrap_or("?"));
                } else {
                    print_outcome(&result);
                }
            }

            "network" => {
                let summary = host.execute(ToolCall::NetworkSummary).await;
                super::network::print_summary(&summary);
            }

            "export-har" => {
                let filename = arg1.unwrap_or("network.har");
                let result = host
                    .execute(ToolCall::ExportTrace(ExportTraceArgs {
                        filename: filename.to_string(),
                    }))
                    .await;
                if result["success"] == true {
                    println!("HAR exported: {}", result["path"].as_str().unwrap_or("?"));
                } else {
                    print_outcome(&result);
                }
            }

            "clear" => {
                host.execute(ToolCall::NetworkClear).await;
                println!("Network recorder cleared");
            }

            "save-session" => {
                let name = arg1.unwrap_or("default");
                let result = host
                    .execute(ToolCall::SessionSave(SessionSaveArgs {
                        name: name.to_string(),
                    }))
                    .await;
                if result["success"] == true {
                    println!("Session saved: {} ({} cookies)", name, result["cookie_count"]);
                } else {
                    print_outcome(&result);
                }
            }

            "load-session" => {
                let name = arg1.unwrap_or("default");
                let auto_navigate = arg2 == Some("-n") || arg2 == Some("--nav");
                let result = host
                    .execute(ToolCall::SessionLoad(SessionLoadArgs {
                        name: name.to_string(),
                        auto_navigate,
                    }))
                    .await;
                if result["success"] == true {
                    let domains = result["domains"].as_array().map(|d| d.len()).unwrap_or(0);
                    println!(
                        "Session loaded: {} ({} cookies from {} domains)",
                        name, result["cookie_count"], domains
                    );
                    if let Some(url) = result["saved_url"].as_str() {
                        match result["navigated"].as_str() {
                            Some(navigated) => println!("Navigated to {}", navigated),
                            None => println!("Saved URL: {} (load-session {} -n to open)", url, name),
                        }
                    }
                } else {
                    print_outcome(&result);
                }
            }

            "sessions" => {
                let result = host.execute(ToolCall::SessionList).await;
                let empty = Vec::new();
                let sessions = result["sessions"].as_array().unwrap_or(&empty);
                if sessions.is_empty() {
                    println!("No saved sessions");
                } else {
                    for session in sessions {
                        println!("  - {}", session.as_str().unwrap_or("?"));
                    }
                }
            }

            "session-info" => {
                let name = arg1.unwrap_or("default");
                let result = host
                    .execute(ToolCall::SessionInfo(SessionNameArgs {
                        name: name.to_string(),
                    }))
                    .await;
                if result["success"] == true {
                    println!("Saved at: {}", result["saved_at"].as_str().unwrap_or("?"));
                    println!("Cookies: {}", result["cookie_count"]);
                } else {
                    print_outcome(&result);
                }
            }

            unknown => {
                println!("Unknown command: {} (try 'help')", unknown);
            }
        }
    }

    host.shutdown().await;
    println!("Browser closed");
    Ok(())
}

fn print_outcome(result: &serde_json::Value) {
    if result["success"] == true {
        println!("{}", result["message"].as_str().unwrap_or("ok"));
    } else {
        println!("{}", result["error"].as_str().unwrap_or("failed"));
    }
}

fn print_help() {
    println!("Commands:");
    println!("  nav <url>                 Navigate to URL");
    println!("  click <selector>          Click element");
    println!("  fill <selector> <text>    Fill input field");
    println!("  screenshot [name]         Capture full-page screenshot");
    println!("  network                   Show network activity summary");
    println!("  export-har [name]         Export network trace as HAR");
    println!("  clear                     Clear the network recorder");
    println!("  save-session [name]       Save cookies under a name");
    println!("  load-session [name] [-n]  Restore cookies (-n: open saved URL)");
    println!("  sessions                  List saved sessions");
    println!("  session-info [name]       Show session details");
    println!("  quit                      Exit");
}
