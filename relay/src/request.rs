use serde::{Deserialize, Serialize};

use crate::config::RelayConfig;
use crate::error::RelayError;

pub const MAX_PROMPT_CHARS: usize = 4000;
pub const MAX_MODEL_CHARS: usize = 50;
pub const MIN_MAX_TOKENS: u32 = 100;
pub const MAX_MAX_TOKENS: u32 = 8192;
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Body of a generation call as sent by a caller.
///
/// Optional fields fall back to the relay's configured defaults during
/// [`GenerationRequest::validate`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub enable_web_search: bool,
    #[serde(default)]
    pub weather_location: Option<String>,
    #[serde(default)]
    pub include_time: bool,
}

/// Side-calls requested alongside a generation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Augmentation {
    pub web_search: bool,
    pub weather_location: Option<String>,
    pub current_time: bool,
}

impl Augmentation {
    pub fn is_empty(&self) -> bool {
        !self.web_search && self.weather_location.is_none() && !self.current_time
    }
}

/// A request whose fields are all present and within range.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
    pub augment: Augmentation,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, value: f32) -> Self {
        self.temperature = Some(value);
        self
    }

    pub fn max_tokens(mut self, value: u32) -> Self {
        self.max_tokens = Some(value);
        self
    }

    pub fn streaming(mut self, value: bool) -> Self {
        self.stream = Some(value);
        self
    }

    pub fn web_search(mut self, value: bool) -> Self {
        self.enable_web_search = value;
        self
    }

    pub fn weather(mut self, location: impl Into<String>) -> Self {
        self.weather_location = Some(location.into());
        self
    }

    /// Check ranges and fill in defaults.
    ///
    /// Temperatures outside `[0, 2]` and a zero token limit are rejected;
    /// other token limits are clamped into `[100, 8192]`.
    pub fn validate(&self, config: &RelayConfig) -> Result<ValidatedRequest, RelayError> {
        if self.prompt.trim().is_empty() {
            return Err(RelayError::invalid("prompt must not be empty"));
        }
        if self.prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(RelayError::invalid(format!(
                "prompt exceeds {MAX_PROMPT_CHARS} characters"
            )));
        }

        let model = match self.model.as_deref().map(str::trim) {
            Some("") => return Err(RelayError::invalid("model must not be empty")),
            Some(model) if model.chars().count() > MAX_MODEL_CHARS => {
                return Err(RelayError::invalid(format!(
                    "model exceeds {MAX_MODEL_CHARS} characters"
                )));
            }
            Some(model) => model.to_string(),
            None => config.default_model.clone(),
        };

        let temperature = self.temperature.unwrap_or(config.default_temperature);
        if !temperature.is_finite() || !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
            return Err(RelayError::invalid(format!(
                "temperature must be between 0 and {MAX_TEMPERATURE}"
            )));
        }

        let max_tokens = match self.max_tokens {
            Some(0) => return Err(RelayError::invalid("max_tokens must be positive")),
            Some(n) => n.clamp(MIN_MAX_TOKENS, MAX_MAX_TOKENS),
            None => config.default_max_tokens,
        };

        let weather_location = self
            .weather_location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string);

        Ok(ValidatedRequest {
            prompt: self.prompt.clone(),
            model,
            temperature,
            max_tokens,
            stream: self.stream.unwrap_or(true),
            augment: Augmentation {
                web_search: self.enable_web_search,
                weather_location,
                current_time: self.include_time,
            },
        })
    }
}
