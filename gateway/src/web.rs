use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use futures::{Stream, StreamExt, future};
use relay::{GenerationRequest, Relay, RelayEvent, RelayStream, Termination};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::auth::{KeyStore, api_key};
use crate::error::GatewayError;

pub const NDJSON: &str = "application/x-ndjson";
const PLAIN_TEXT: &str = "text/plain; charset=utf-8";

/// State shared across HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    /// `None` disables authentication.
    pub keys: Option<Arc<dyn KeyStore>>,
}

impl AppState {
    pub fn new(relay: Relay) -> Self {
        Self {
            relay: Arc::new(relay),
            keys: None,
        }
    }

    pub fn with_keys(mut self, keys: Arc<dyn KeyStore>) -> Self {
        self.keys = Some(keys);
        self
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), GatewayError> {
        let Some(keys) = &self.keys else {
            return Ok(());
        };
        match api_key(headers) {
            Some(key) if keys.is_authorized(key) => Ok(()),
            _ => Err(GatewayError::Unauthorized),
        }
    }
}

/// How a streaming response body is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyFormat {
    /// Rendered text only; errors appear inline as `[Error: ...]`.
    Text,
    /// One JSON object per event.
    Ndjson,
}

impl BodyFormat {
    pub fn negotiate(headers: &HeaderMap) -> Self {
        let wants_ndjson = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains(NDJSON));
        if wants_ndjson { Self::Ndjson } else { Self::Text }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum NdjsonLine<'a> {
    Content(&'a str),
    Status(&'a str),
    Error(&'a str),
    Done(bool),
}

impl<'a> From<&'a RelayEvent> for NdjsonLine<'a> {
    fn from(event: &'a RelayEvent) -> Self {
        match event {
            RelayEvent::Content(delta) => Self::Content(delta.as_str()),
            RelayEvent::Status(status) => Self::Status(status),
            RelayEvent::Error(message) => Self::Error(message),
        }
    }
}

fn ndjson_bytes(line: &NdjsonLine<'_>) -> Bytes {
    let mut buf = serde_json::to_vec(line).unwrap_or_default();
    buf.push(b'\n');
    Bytes::from(buf)
}

fn text_body(stream: RelayStream) -> impl Stream<Item = Result<Bytes, Infallible>> {
    stream.filter_map(|event| {
        future::ready(
            event
                .render_text()
                .map(|text| Ok::<_, Infallible>(Bytes::from(text))),
        )
    })
}

/// NDJSON events, closed by `{"done":true}` when the session completed.
fn ndjson_body(stream: RelayStream) -> impl Stream<Item = Result<Bytes, Infallible>> {
    futures::stream::unfold(Some(stream), |state| async move {
        let Some(mut stream) = state else {
            return None;
        };
        match stream.next().await {
            Some(event) => {
                let line = ndjson_bytes(&NdjsonLine::from(&event));
                Some((Ok::<_, Infallible>(line), Some(stream)))
            }
            None => match stream.finish().await {
                Termination::Completed => Some((Ok(ndjson_bytes(&NdjsonLine::Done(true))), None)),
                _ => None,
            },
        }
    })
}

pub async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Streaming relay is running. POST /generate or /chat to start."
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let upstream = if state.relay.upstream_reachable().await {
        "reachable"
    } else {
        "unreachable"
    };
    Json(json!({
        "status": "healthy",
        "model": state.relay.config().default_model,
        "upstream": upstream,
    }))
}

/// `POST /generate` and `POST /chat`.
pub async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Response, GatewayError> {
    state.authorize(&headers)?;
    let Json(request) = body.map_err(|e| GatewayError::InvalidRequest(e.body_text()))?;
    let request = state.relay.validate(&request)?;
    info!(
        model = %request.model,
        stream = request.stream,
        web_search = request.augment.web_search,
        "generation requested"
    );

    if !request.stream {
        let response = state.relay.complete(&request).await?;
        return Ok(Json(json!({ "response": response })).into_response());
    }

    let stream = state.relay.submit(&request).await?;
    let format = BodyFormat::negotiate(&headers);
    debug!(?format, "streaming response");
    let response = match format {
        BodyFormat::Text => (
            [(header::CONTENT_TYPE, PLAIN_TEXT)],
            Body::from_stream(text_body(stream)),
        )
            .into_response(),
        BodyFormat::Ndjson => (
            [(header::CONTENT_TYPE, NDJSON)],
            Body::from_stream(ndjson_body(stream)),
        )
            .into_response(),
    };
    Ok(response)
}

/// Build the application router with the provided state.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/generate", post(generate))
        .route("/chat", post(generate))
        .with_state(state)
}
