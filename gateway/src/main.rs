use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use gateway::{AppState, KeyTable, app, init_logging, shutdown_signal};
use relay::config::{DEFAULT_BASE_URL, DEFAULT_CHAT_PATH, DEFAULT_MODEL};
use relay::{FrameFormat, Relay, RelayConfig};
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Framing {
    Ndjson,
    EventStream,
}

impl From<Framing> for FrameFormat {
    fn from(framing: Framing) -> Self {
        match framing {
            Framing::Ndjson => FrameFormat::Ndjson,
            Framing::EventStream => FrameFormat::EventStream,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Address to bind the HTTP server
    #[arg(long, env = "RELAY_ADDR", default_value = "127.0.0.1:8000")]
    addr: SocketAddr,

    /// Base URL of the upstream Ollama server
    #[arg(long, env = "OLLAMA_URL", default_value = DEFAULT_BASE_URL)]
    ollama_url: String,

    /// Path of the upstream streaming endpoint
    #[arg(long, env = "OLLAMA_CHAT_PATH", default_value = DEFAULT_CHAT_PATH)]
    chat_path: String,

    /// Wire format spoken by the upstream
    #[arg(long, env = "RELAY_FRAMING", value_enum, default_value_t = Framing::Ndjson)]
    framing: Framing,

    /// Model used when a request does not name one
    #[arg(long, env = "DEFAULT_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// JSON file of accepted API keys; authentication is off without it
    #[arg(long, env = "API_KEYS_FILE")]
    keys: Option<PathBuf>,

    /// Seconds allowed for connecting to the upstream
    #[arg(long, env = "CONNECT_TIMEOUT_SECS", default_value_t = 60)]
    connect_timeout: u64,

    /// Seconds allowed for one whole upstream call
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 300)]
    timeout: u64,

    /// Seconds allowed for each search or weather side-call
    #[arg(long, env = "TOOL_TIMEOUT_SECS", default_value_t = 10)]
    tool_timeout: u64,

    /// How long the upstream keeps the model loaded after a call
    #[arg(long, env = "OLLAMA_KEEP_ALIVE", default_value = "10m")]
    keep_alive: String,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            base_url: self.ollama_url.clone(),
            chat_path: self.chat_path.clone(),
            frame_format: self.framing.into(),
            default_model: self.model.clone(),
            keep_alive: Some(self.keep_alive.clone()).filter(|k| !k.is_empty()),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            total_timeout: Duration::from_secs(self.timeout),
            tool_timeout: Duration::from_secs(self.tool_timeout),
            ..RelayConfig::default()
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let relay = Relay::from_config(cli.relay_config()).context("building relay")?;
    let mut state = AppState::new(relay);
    if let Some(path) = &cli.keys {
        let keys = KeyTable::load(path)?;
        info!(keys = keys.len(), path = %path.display(), "api key authentication enabled");
        state = state.with_keys(Arc::new(keys));
    }

    info!(addr = %cli.addr, upstream = %cli.ollama_url, model = %cli.model, "listening");
    let listener = tokio::net::TcpListener::bind(cli.addr).await?;
    axum::serve(listener, app(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
