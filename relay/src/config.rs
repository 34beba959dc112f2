//! Construction-time settings for a [`crate::Relay`].
//!
//! Every knob the relay needs lives in [`RelayConfig`]; nothing is read from
//! the environment here. Binaries build one from their CLI and hand it over.

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_CHAT_PATH: &str = "/api/chat";
pub const DEFAULT_MODEL: &str = "qwen2.5:3b";
pub const DEFAULT_SEARCH_URL: &str = "https://api.duckduckgo.com";
pub const DEFAULT_WEATHER_URL: &str = "https://wttr.in";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful coding assistant.";
pub const SEARCH_SYSTEM_PROMPT: &str = "You are a helpful assistant with web search.
Use the search results only for real-time info. Summarize results concisely.
Final answer format: Clear, direct response.";

/// Wire format spoken by the upstream server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameFormat {
    /// One JSON object per line, Ollama style (`message.content` or `response`).
    #[default]
    Ndjson,
    /// Structured agent events, optionally framed as server-sent events.
    EventStream,
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Base URL of the upstream server, without trailing slash.
    pub base_url: String,
    /// Path of the streaming chat endpoint below `base_url`.
    pub chat_path: String,
    pub frame_format: FrameFormat,
    /// Model used when a request does not name one.
    pub default_model: String,
    pub default_temperature: f32,
    pub default_max_tokens: u32,
    pub system_prompt: String,
    /// System prompt used when web search augmentation is requested.
    pub search_system_prompt: String,
    /// How long the upstream should keep the model loaded after a call.
    pub keep_alive: Option<String>,
    pub connect_timeout: Duration,
    /// Upper bound for one whole upstream call, first byte to last.
    pub total_timeout: Duration,
    /// Upper bound for each augmentation side-call.
    pub tool_timeout: Duration,
    /// Events buffered between a session task and its consumer.
    pub channel_capacity: usize,
    /// Longest upstream line accepted before it is discarded.
    pub max_frame_bytes: usize,
    pub search_url: String,
    pub weather_url: String,
    pub max_search_results: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            chat_path: DEFAULT_CHAT_PATH.into(),
            frame_format: FrameFormat::Ndjson,
            default_model: DEFAULT_MODEL.into(),
            default_temperature: 0.5,
            default_max_tokens: 2048,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            search_system_prompt: SEARCH_SYSTEM_PROMPT.into(),
            keep_alive: Some("10m".into()),
            connect_timeout: Duration::from_secs(60),
            total_timeout: Duration::from_secs(300),
            tool_timeout: Duration::from_secs(10),
            channel_capacity: 8,
            max_frame_bytes: 1024 * 1024,
            search_url: DEFAULT_SEARCH_URL.into(),
            weather_url: DEFAULT_WEATHER_URL.into(),
            max_search_results: 3,
        }
    }
}

impl RelayConfig {
    /// Full URL of the streaming chat endpoint.
    pub fn chat_url(&self) -> String {
        join_url(&self.base_url, &self.chat_path)
    }

    /// URL probed by health checks.
    pub fn tags_url(&self) -> String {
        join_url(&self.base_url, "/api/tags")
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
