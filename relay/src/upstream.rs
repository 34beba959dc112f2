//! HTTP client for the upstream text-generation server.
//!
//! [`Upstream`] is the seam between the relay and whatever produces tokens.
//! [`HttpUpstream`] speaks the Ollama chat protocol over a pooled
//! `reqwest::Client`; tests substitute in-process implementations.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use serde::Serialize;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::frame::ErrorBody;

/// Raw body chunks of an open upstream response.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Bytes, RelayError>> + Send>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub num_predict: u32,
}

/// Body of one upstream chat call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatPayload {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: GenerationOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<String>,
}

#[async_trait]
pub trait Upstream: Send + Sync {
    /// Start one streaming call.
    ///
    /// Returns `UpstreamUnreachable` when no connection could be made and
    /// `UpstreamStatus` when the server answered with a non-success status.
    async fn open(&self, payload: &ChatPayload) -> Result<FrameStream, RelayError>;

    /// Cheap liveness probe.
    async fn is_reachable(&self) -> bool {
        true
    }
}

pub struct HttpUpstream {
    client: reqwest::Client,
    chat_url: String,
    tags_url: String,
}

impl HttpUpstream {
    pub fn new(config: &RelayConfig) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .map_err(|e| RelayError::Setup(e.to_string()))?;
        Ok(Self {
            client,
            chat_url: config.chat_url(),
            tags_url: config.tags_url(),
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn open(&self, payload: &ChatPayload) -> Result<FrameStream, RelayError> {
        debug!(url = %self.chat_url, model = %payload.model, "opening upstream stream");
        let response = self
            .client
            .post(&self.chat_url)
            .json(payload)
            .send()
            .await
            .map_err(|e| RelayError::UpstreamUnreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
            warn!(status = status.as_u16(), %message, "upstream rejected request");
            return Err(RelayError::UpstreamStatus {
                status: status.as_u16(),
                message,
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| RelayError::UpstreamMidStream(e.to_string())));
        Ok(Box::pin(stream))
    }

    async fn is_reachable(&self) -> bool {
        match self.client.get(&self.tags_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "upstream health probe failed");
                false
            }
        }
    }
}

/// Pull a readable message out of an error response body.
fn error_message(body: &str) -> Option<String> {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return Some(parsed.error);
    }
    let body = body.trim();
    (!body.is_empty()).then(|| body.chars().take(200).collect())
}
