use webgrip_tools::ToolCall;

pub async fn run(payload: Option<String>, list: bool) -> anyhow::Result<()> {
    if list {
        println!("Dispatchable tools:");
        for name in ToolCall::catalog() {
            println!("  - {}", name);
        }
        return Ok(());
    }

    let Some(payload) = payload else {
        anyhow::bail!("Provide a JSON payload or --list. Example: webgrip call '{{\"name\": \"fetch\", \"arguments\": {{\"url\": \"https://example.com\"}}}}'");
    };

    let call: ToolCall = serde_json::from_str(&payload).map_err(|e| {
        anyhow::anyhow!(
            "Invalid tool call: {}\nUse `webgrip call --list` to see dispatchable tools.",
            e
        )
    })?;

    let host = super::host()?;
    let result = host.execute(call).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    host.shutdown().await;
    Ok(())
}
