pub mod browse;
pub mod call;
pub mod fetch;
pub mod init;
pub mod network;
pub mod session;

use std::sync::Arc;

use webgrip_core::{Config, Paths};
use webgrip_fetcher::ProgressSink;
use webgrip_tools::ToolHost;

pub fn host() -> anyhow::Result<ToolHost> {
    host_with_progress(None)
}

pub fn host_with_progress(progress: Option<Arc<dyn ProgressSink>>) -> anyhow::Result<ToolHost> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    Ok(ToolHost::with_progress(config, paths, progress)?)
}
