//! The relay proper: one upstream call in, one ordered event stream out.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{FrameFormat, RelayConfig};
use crate::error::RelayError;
use crate::frame::{ContentDelta, UpstreamFrame};
use crate::line::LineBuffer;
use crate::request::{GenerationRequest, ValidatedRequest};
use crate::session::{RelaySession, Termination};
use crate::tools::{self, Augmenter, DuckDuckGoSearch, SearchProvider, WeatherProvider, WttrWeather};
use crate::upstream::{
    ChatMessage, ChatPayload, FrameStream, GenerationOptions, HttpUpstream, Upstream,
};

/// What a caller receives from a relay stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayEvent {
    Content(ContentDelta),
    /// Auxiliary progress (tool activity); not part of the transcript.
    Status(String),
    /// Terminal failure, always the last event of its stream.
    Error(String),
}

impl RelayEvent {
    /// Text written to a plain content stream. Status events render nothing.
    pub fn render_text(&self) -> Option<String> {
        match self {
            Self::Content(delta) => Some(delta.as_str().to_string()),
            Self::Status(_) => None,
            Self::Error(message) => Some(format!("[Error: {message}]")),
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Content(delta) => Some(delta.as_str()),
            _ => None,
        }
    }
}

/// Live output of one relay session.
///
/// Dropping the stream cancels the session; the upstream response is released
/// as soon as the session task notices, without waiting for another frame.
pub struct RelayStream {
    events: ReceiverStream<RelayEvent>,
    session: JoinHandle<Termination>,
}

impl RelayStream {
    /// Stop consuming and wait for the session's terminal state.
    pub async fn finish(self) -> Termination {
        let Self { events, session } = self;
        drop(events);
        session.await.unwrap_or_else(|e| {
            error!(error = %e, "relay session task failed");
            Termination::UpstreamError
        })
    }
}

impl Stream for RelayStream {
    type Item = RelayEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

pub struct Relay {
    config: Arc<RelayConfig>,
    upstream: Arc<dyn Upstream>,
    augmenter: Augmenter,
}

impl Relay {
    /// Relay over `upstream` with no side-call providers attached.
    pub fn new(config: RelayConfig, upstream: Arc<dyn Upstream>) -> Self {
        let augmenter = Augmenter::new(config.tool_timeout, config.max_search_results);
        Self {
            config: Arc::new(config),
            upstream,
            augmenter,
        }
    }

    /// Relay over HTTP with DuckDuckGo search and wttr.in weather.
    pub fn from_config(config: RelayConfig) -> Result<Self, RelayError> {
        let upstream = Arc::new(HttpUpstream::new(&config)?);
        let client = tools::http_client(config.tool_timeout)
            .map_err(|e| RelayError::Setup(e.to_string()))?;
        let search = Arc::new(DuckDuckGoSearch::new(client.clone(), config.search_url.clone()));
        let weather = Arc::new(WttrWeather::new(client, config.weather_url.clone()));
        Ok(Self::new(config, upstream)
            .with_search(search)
            .with_weather(weather))
    }

    pub fn with_search(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.augmenter = self.augmenter.with_search(provider);
        self
    }

    pub fn with_weather(mut self, provider: Arc<dyn WeatherProvider>) -> Self {
        self.augmenter = self.augmenter.with_weather(provider);
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn validate(&self, request: &GenerationRequest) -> Result<ValidatedRequest, RelayError> {
        request.validate(&self.config)
    }

    pub async fn upstream_reachable(&self) -> bool {
        self.upstream.is_reachable().await
    }

    /// Build the upstream payload, running any requested side-calls first.
    pub async fn build_payload(&self, request: &ValidatedRequest) -> ChatPayload {
        let base = if request.augment.web_search {
            &self.config.search_system_prompt
        } else {
            &self.config.system_prompt
        };
        let system = match self.augmenter.context(&request.prompt, &request.augment).await {
            Some(context) => format!("{base}\n\n{context}"),
            None => base.clone(),
        };
        ChatPayload {
            model: request.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(&request.prompt)],
            stream: true,
            options: GenerationOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
            keep_alive: self.config.keep_alive.clone(),
        }
    }

    /// Open the upstream call and return the live event stream.
    ///
    /// Fails only when the upstream cannot be reached at all. A non-success
    /// upstream status still yields a stream, holding a single error event.
    pub async fn submit(&self, request: &ValidatedRequest) -> Result<RelayStream, RelayError> {
        let payload = self.build_payload(request).await;
        let span = info_span!("relay", model = %payload.model);
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        let session = match self.upstream.open(&payload).instrument(span.clone()).await {
            Ok(frames) => {
                let pump = Pump {
                    frames,
                    lines: LineBuffer::new(self.config.max_frame_bytes),
                    format: self.config.frame_format,
                    tx,
                    deadline: Instant::now() + self.config.total_timeout,
                    total_timeout: self.config.total_timeout,
                };
                tokio::spawn(pump.run().instrument(span))
            }
            Err(err @ RelayError::UpstreamStatus { .. }) => {
                tokio::spawn(reject(err, tx).instrument(span))
            }
            Err(err) => {
                warn!(error = %err, "could not open upstream stream");
                return Err(err);
            }
        };

        Ok(RelayStream {
            events: ReceiverStream::new(rx),
            session,
        })
    }

    /// Run a request to completion and return everything it rendered.
    pub async fn complete(&self, request: &ValidatedRequest) -> Result<String, RelayError> {
        let mut stream = self.submit(request).await?;
        let mut response = String::new();
        while let Some(event) = stream.next().await {
            if let Some(text) = event.render_text() {
                response.push_str(&text);
            }
        }
        Ok(response)
    }
}

async fn reject(err: RelayError, tx: mpsc::Sender<RelayEvent>) -> Termination {
    let mut session = RelaySession::new();
    let reason = match tx.send(RelayEvent::Error(err.to_string())).await {
        Ok(()) => Termination::UpstreamError,
        Err(_) => Termination::ClientCancelled,
    };
    let reason = session.finalize(reason);
    info!(reason = reason.as_str(), "relay session finished");
    reason
}

/// Moves frames from one upstream response into one event channel.
struct Pump {
    frames: FrameStream,
    lines: LineBuffer,
    format: FrameFormat,
    tx: mpsc::Sender<RelayEvent>,
    deadline: Instant,
    total_timeout: Duration,
}

impl Pump {
    async fn run(mut self) -> Termination {
        let mut session = RelaySession::new();
        let reason = self.pump(&mut session).await;
        let reason = session.finalize(reason);
        info!(
            reason = reason.as_str(),
            bytes = session.bytes_received(),
            frames = session.frames(),
            deltas = session.deltas_emitted(),
            "relay session finished"
        );
        reason
    }

    async fn pump(&mut self, session: &mut RelaySession) -> Termination {
        let deadline = tokio::time::sleep_until(self.deadline);
        tokio::pin!(deadline);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.tx.closed() => {
                    debug!("caller went away, closing upstream");
                    return Termination::ClientCancelled;
                }
                _ = &mut deadline => Some(Err(timeout_error(self.total_timeout))),
                chunk = self.frames.next() => chunk,
            };

            match next {
                Some(Ok(bytes)) => {
                    session.record_bytes(bytes.len());
                    for line in self.lines.push(&bytes) {
                        if let Some(reason) = self.handle_line(session, &line).await {
                            return reason;
                        }
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, deltas = session.deltas_emitted(), "upstream failed mid-stream");
                    return self.fail(err.to_string()).await;
                }
                None => {
                    if let Some(line) = self.lines.finish() {
                        if let Some(reason) = self.handle_line(session, &line).await {
                            return reason;
                        }
                    }
                    return Termination::Completed;
                }
            }
        }
    }

    /// Decode and forward one line; `Some` means the session is over.
    async fn handle_line(
        &mut self,
        session: &mut RelaySession,
        line: &[u8],
    ) -> Option<Termination> {
        session.record_frame();
        let frame = UpstreamFrame::parse(self.format, line);
        if frame == UpstreamFrame::Malformed {
            debug!(len = line.len(), "dropping malformed upstream frame");
            return None;
        }
        if let Some(message) = frame.failure() {
            warn!(%message, "upstream reported an error");
            return Some(self.fail(message.to_string()).await);
        }
        if let Some(delta) = frame.delta() {
            if let Err(reason) = self.emit(RelayEvent::Content(delta)).await {
                return Some(reason);
            }
            session.record_delta();
        }
        if let Some(status) = frame.status() {
            if let Err(reason) = self.emit(RelayEvent::Status(status)).await {
                return Some(reason);
            }
        }
        frame.is_done().then_some(Termination::Completed)
    }

    /// Send one event, waiting for channel space no later than the deadline.
    ///
    /// A caller that stops reading without disconnecting ends the session
    /// with `UpstreamError` once the deadline passes.
    async fn emit(&mut self, event: RelayEvent) -> Result<(), Termination> {
        match tokio::time::timeout_at(self.deadline, self.tx.send(event)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Termination::ClientCancelled),
            Err(_) => {
                warn!("caller stopped reading, abandoning upstream at deadline");
                let message = timeout_error(self.total_timeout).to_string();
                let _ = self.tx.try_send(RelayEvent::Error(message));
                Err(Termination::UpstreamError)
            }
        }
    }

    async fn fail(&mut self, message: String) -> Termination {
        match self.emit(RelayEvent::Error(message)).await {
            Ok(()) => Termination::UpstreamError,
            Err(reason) => reason,
        }
    }
}

fn timeout_error(total: Duration) -> RelayError {
    RelayError::UpstreamMidStream(format!("no completion within {total:?}"))
}
