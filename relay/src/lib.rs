//! Streaming relay between HTTP callers and an upstream text-generation server.
//!
//! The `relay` crate turns one [`GenerationRequest`] into a live, ordered
//! stream of [`RelayEvent`]s. A [`Relay`] optionally enriches the prompt
//! context through side-calls (see [`tools`]), opens a single streaming call
//! through an [`Upstream`], decodes the upstream framing line by line (see
//! [`frame`]) and forwards content fragments as they arrive. Failures after the
//! stream has started are reported in-band, never retried.

pub mod config;
pub mod error;
pub mod frame;
pub mod line;
pub mod relay;
pub mod request;
pub mod session;
pub mod tools;
pub mod upstream;

pub use config::{FrameFormat, RelayConfig};
pub use error::RelayError;
pub use frame::{decode, AgentEvent, ContentDelta, UpstreamFrame};
pub use line::LineBuffer;
pub use relay::{Relay, RelayEvent, RelayStream};
pub use request::{Augmentation, GenerationRequest, ValidatedRequest};
pub use session::{RelaySession, Termination};
pub use tools::{Augmenter, SearchHit, SearchProvider, ToolError, WeatherProvider};
pub use upstream::{ChatMessage, ChatPayload, FrameStream, GenerationOptions, HttpUpstream, Role, Upstream};
