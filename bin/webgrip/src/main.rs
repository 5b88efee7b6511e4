mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "webgrip")]
#[command(about = "Resilient web fetching and browser automation for LLM tool bridges", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL and print the result
    Fetch {
        url: String,

        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Fetch a URL and parse the body as JSON
    Json { url: String },

    /// Download a URL to a file
    Download {
        url: String,

        /// Destination filename (relative names land in the downloads dir)
        filename: String,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Fetch multiple URLs concurrently
    Batch { urls: Vec<String> },

    /// Manage saved browser sessions
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Inspect and export recorded network activity
    Network {
        #[command(subcommand)]
        command: NetworkCommands,
    },

    /// Interactive browser automation
    Browse,

    /// Execute a raw tool call from a JSON payload
    Call {
        /// JSON payload: {"name": "...", "arguments": {...}}
        payload: Option<String>,

        /// List dispatchable tool names
        #[arg(long)]
        list: bool,
    },

    /// Write a default config file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Save the active browser session's cookies
    Save {
        #[arg(default_value = "default")]
        name: String,
    },

    /// Restore a saved session into the browser
    Load {
        #[arg(default_value = "default")]
        name: String,

        /// Navigate to the saved URL after restoring
        #[arg(short = 'n', long)]
        navigate: bool,
    },

    /// List saved sessions
    List,

    /// Delete a saved session
    Delete { name: String },

    /// Show a saved session's details
    Info {
        #[arg(default_value = "default")]
        name: String,
    },
}

#[derive(Subcommand)]
enum NetworkCommands {
    /// Show request/response counts and recent activity
    Summary,

    /// Export recorded activity as a HAR file
    Export {
        #[arg(default_value = "network.har")]
        filename: String,
    },

    /// Clear the recording buffers
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Fetch { url, timeout } => {
            commands::fetch::fetch(url, timeout).await?;
        }
        Commands::Json { url } => {
            commands::fetch::json(url).await?;
        }
        Commands::Download {
            url,
            filename,
            no_progress,
        } => {
            commands::fetch::download(url, filename, !no_progress).await?;
        }
        Commands::Batch { urls } => {
            commands::fetch::batch(urls).await?;
        }
        Commands::Session { command } => match command {
            SessionCommands::Save { name } => commands::session::save(&name).await?,
            SessionCommands::Load { name, navigate } => {
                commands::session::load(&name, navigate).await?
            }
            SessionCommands::List => commands::session::list().await?,
            SessionCommands::Delete { name } => commands::session::delete(&name).await?,
            SessionCommands::Info { name } => commands::session::info(&name).await?,
        },
        Commands::Network { command } => match command {
            NetworkCommands::Summary => commands::network::summary().await?,
            NetworkCommands::Export { filename } => commands::network::export(&filename).await?,
            NetworkCommands::Clear => commands::network::clear().await?,
        },
        Commands::Browse => {
            commands::browse::run().await?;
        }
        Commands::Call { payload, list } => {
            commands::call::run(payload, list).await?;
        }
        Commands::Init { force } => {
            commands::init::run(force)?;
        }
    }

    Ok(())
}
