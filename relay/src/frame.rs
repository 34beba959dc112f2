//! Upstream frame schemas.
//!
//! Each line received from the upstream is parsed into an [`UpstreamFrame`].
//! Parsing never fails: shapes that cannot be understood become
//! [`UpstreamFrame::Malformed`] and carry no content, so a bad line never
//! interrupts the stream around it.

use std::fmt;

use serde::Deserialize;

use crate::config::FrameFormat;

/// A non-empty fragment of generated text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentDelta(String);

impl ContentDelta {
    /// Wrap `text`, or `None` when there is nothing to show.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        (!text.is_empty()).then_some(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ContentDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Agent events as emitted by an event-streaming upstream.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "event")]
pub enum AgentEvent {
    #[serde(rename = "on_chat_model_stream")]
    ModelStream {
        #[serde(default)]
        data: StreamData,
    },
    #[serde(rename = "on_tool_start")]
    ToolStart {
        #[serde(default)]
        name: String,
    },
    #[serde(rename = "on_tool_end")]
    ToolEnd {
        #[serde(default)]
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct StreamData {
    #[serde(default)]
    pub chunk: StreamChunk,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub content: String,
}

/// One parsed line of upstream output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpstreamFrame {
    /// Ollama chat or generate chunk.
    Chat { content: Option<String>, done: bool },
    Event(AgentEvent),
    /// The upstream reported an error inside the stream.
    Failure(String),
    /// Explicit end-of-stream marker.
    Done,
    /// Framing that carries no payload (blank lines, SSE fields).
    Ignored,
    Malformed,
}

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub(crate) error: String,
}

impl UpstreamFrame {
    pub fn parse(format: FrameFormat, line: &[u8]) -> Self {
        let Ok(text) = std::str::from_utf8(line) else {
            return Self::Malformed;
        };
        let text = text.trim();
        if text.is_empty() {
            return Self::Ignored;
        }
        match format {
            FrameFormat::Ndjson => parse_ndjson(text),
            FrameFormat::EventStream => parse_event(text),
        }
    }

    /// Text this frame contributes to the transcript, if any.
    pub fn delta(&self) -> Option<ContentDelta> {
        match self {
            Self::Chat {
                content: Some(content),
                ..
            } => ContentDelta::new(content.as_str()),
            Self::Event(AgentEvent::ModelStream { data }) => {
                ContentDelta::new(data.chunk.content.as_str())
            }
            _ => None,
        }
    }

    /// Auxiliary progress note, surfaced apart from content.
    pub fn status(&self) -> Option<String> {
        match self {
            Self::Event(AgentEvent::ToolStart { name }) => Some(format!("Using tool: {name}")),
            Self::Event(AgentEvent::ToolEnd { name }) => Some(format!("Tool finished: {name}")),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Failure(message) => Some(message),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done | Self::Chat { done: true, .. })
    }
}

/// Extract the content delta carried by one upstream line.
pub fn decode(format: FrameFormat, line: &[u8]) -> Option<ContentDelta> {
    UpstreamFrame::parse(format, line).delta()
}

fn parse_ndjson(text: &str) -> UpstreamFrame {
    match serde_json::from_str::<OllamaChunk>(text) {
        Ok(OllamaChunk {
            error: Some(error), ..
        }) => UpstreamFrame::Failure(error),
        Ok(chunk) => UpstreamFrame::Chat {
            content: chunk.message.map(|m| m.content).or(chunk.response),
            done: chunk.done,
        },
        Err(_) => UpstreamFrame::Malformed,
    }
}

fn parse_event(text: &str) -> UpstreamFrame {
    let payload = match text.strip_prefix("data:") {
        Some(rest) => rest.trim_start(),
        None if is_sse_field(text) => return UpstreamFrame::Ignored,
        None => text,
    };
    if payload == "[DONE]" {
        return UpstreamFrame::Done;
    }
    if let Ok(event) = serde_json::from_str::<AgentEvent>(payload) {
        return UpstreamFrame::Event(event);
    }
    match serde_json::from_str::<ErrorBody>(payload) {
        Ok(body) => UpstreamFrame::Failure(body.error),
        Err(_) => UpstreamFrame::Malformed,
    }
}

fn is_sse_field(line: &str) -> bool {
    line.starts_with(':')
        || line.starts_with("event:")
        || line.starts_with("id:")
        || line.starts_with("retry:")
}
