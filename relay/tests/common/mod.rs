#![allow(dead_code)]

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use relay::{
    ChatPayload, FrameStream, RelayError, SearchHit, SearchProvider, ToolError, Upstream,
    WeatherProvider,
};

/// Sets its flag when dropped.
struct DropSignal(Arc<AtomicBool>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct Guarded {
    inner: BoxStream<'static, Result<Bytes, RelayError>>,
    _signal: DropSignal,
}

impl Stream for Guarded {
    type Item = Result<Bytes, RelayError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

enum Script {
    Chunks { chunks: Vec<Result<Bytes, RelayError>>, hang: bool },
    Status(u16, String),
    Unreachable,
}

/// In-process upstream that replays a fixed script.
pub struct ScriptedUpstream {
    script: Mutex<Option<Script>>,
    opens: AtomicUsize,
    payloads: Mutex<Vec<ChatPayload>>,
    released: Arc<AtomicBool>,
}

impl ScriptedUpstream {
    fn with(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(Some(script)),
            opens: AtomicUsize::new(0),
            payloads: Mutex::new(Vec::new()),
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Serve `lines` as one NDJSON body, one chunk per line.
    pub fn lines(lines: &[&str]) -> Arc<Self> {
        Self::chunks(lines.iter().map(|l| format!("{l}\n")).collect(), false)
    }

    /// Serve `lines`, then keep the response open without sending more.
    pub fn lines_then_hang(lines: &[&str]) -> Arc<Self> {
        Self::chunks(lines.iter().map(|l| format!("{l}\n")).collect(), true)
    }

    pub fn chunks(chunks: Vec<String>, hang: bool) -> Arc<Self> {
        let chunks = chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
        Self::with(Script::Chunks { chunks, hang })
    }

    pub fn failing_after(lines: &[&str], reason: &str) -> Arc<Self> {
        let mut chunks: Vec<Result<Bytes, RelayError>> = lines
            .iter()
            .map(|l| Ok(Bytes::from(format!("{l}\n"))))
            .collect();
        chunks.push(Err(RelayError::UpstreamMidStream(reason.into())));
        Self::with(Script::Chunks { chunks, hang: false })
    }

    pub fn status(status: u16, message: &str) -> Arc<Self> {
        Self::with(Script::Status(status, message.into()))
    }

    pub fn unreachable() -> Arc<Self> {
        Self::with(Script::Unreachable)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn last_payload(&self) -> Option<ChatPayload> {
        self.payloads.lock().unwrap().last().cloned()
    }

    /// Whether the response handed out by `open` has been dropped.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn open(&self, payload: &ChatPayload) -> Result<FrameStream, RelayError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload.clone());
        let script = self.script.lock().unwrap().take().expect("scripted upstream opened twice");
        match script {
            Script::Chunks { chunks, hang } => {
                let tail = if hang {
                    stream::pending().boxed()
                } else {
                    stream::empty().boxed()
                };
                Ok(Box::pin(Guarded {
                    inner: stream::iter(chunks).chain(tail).boxed(),
                    _signal: DropSignal(self.released.clone()),
                }))
            }
            Script::Status(status, message) => Err(RelayError::UpstreamStatus { status, message }),
            Script::Unreachable => Err(RelayError::UpstreamUnreachable("connection refused".into())),
        }
    }
}

/// Search provider returning canned hits after an optional delay.
pub struct CannedSearch {
    pub hits: Vec<SearchHit>,
    pub delay: Duration,
}

#[async_trait]
impl SearchProvider for CannedSearch {
    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<SearchHit>, ToolError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.hits.iter().take(limit).cloned().collect())
    }
}

/// Weather provider answering after `delay`; `None` reports an unusable reply.
pub struct CannedWeather {
    pub report: Option<String>,
    pub delay: Duration,
}

#[async_trait]
impl WeatherProvider for CannedWeather {
    async fn current(&self, _location: &str) -> Result<String, ToolError> {
        tokio::time::sleep(self.delay).await;
        self.report.clone().ok_or(ToolError::InvalidResponse)
    }
}
