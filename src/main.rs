mod connector;
mod editor;
mod error;
mod lsp_proxy;
mod probe;
mod socket_io;

use std::{fs, path::PathBuf, sync::Mutex};

use clap::{Args, Parser, Subcommand};
use socket_io::ClientOptions;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aiderdesk-connector")]
#[command(about = "Forward the files open in your editor to AiderDesk")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as LSP proxy between the editor and an optional language server
    Serve {
        #[command(flatten)]
        endpoint: Endpoint,
        /// Log file (defaults to the user cache directory)
        #[arg(long, env = "AIDERDESK_CONNECTOR_LOG")]
        log_file: Option<PathBuf>,
        /// Language server command to wrap, e.g. `-- typescript-language-server --stdio`
        #[arg(last = true)]
        command: Vec<String>,
    },
    /// Check that AiderDesk is reachable
    Ping {
        #[command(flatten)]
        endpoint: Endpoint,
    },
}

#[derive(Args)]
struct Endpoint {
    /// AiderDesk host
    #[arg(long, env = "AIDERDESK_HOST", default_value = "localhost")]
    host: String,
    /// AiderDesk connector port
    #[arg(long, env = "AIDERDESK_PORT", default_value_t = 24337)]
    port: u16,
}

impl Endpoint {
    fn client_options(&self) -> ClientOptions {
        ClientOptions {
            url: format!("http://{}:{}", self.host, self.port),
            ..ClientOptions::default()
        }
    }
}

fn default_log_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("aiderdesk-connector/connector.log")
}

/// Stdout carries the LSP stream, so logs go to a file.
fn init_file_logging(log_file: Option<PathBuf>) -> error::Result<()> {
    let path = log_file.unwrap_or_else(default_log_path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("aiderdesk_connector=info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            endpoint,
            log_file,
            command,
        } => match init_file_logging(log_file) {
            Ok(()) => lsp_proxy::run(endpoint.client_options(), command).await,
            Err(e) => Err(e),
        },
        Commands::Ping { endpoint } => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_writer(std::io::stderr)
                .init();
            probe::run(endpoint.client_options()).await
        }
    };

    let code = match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };
    // The blocking stdin reader would otherwise hold up runtime shutdown.
    std::process::exit(code);
}
