//! Best-effort context side-calls: web search, weather and clock.
//!
//! An [`Augmenter`] runs the side-calls a request asks for, each under its own
//! timeout, and renders the results as plain text for the system prompt. A
//! failing side-call is rendered as a placeholder line and never fails the
//! generation it belongs to.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::request::Augmentation;

const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid response")]
    InvalidResponse,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ToolError>;
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// One-line description of current conditions at `location`.
    async fn current(&self, location: &str) -> Result<String, ToolError>;
}

/// Client shared by the HTTP side-call providers.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, ToolError> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("relay/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Search through the DuckDuckGo instant-answer API.
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RelatedTopic {
    #[serde(default)]
    text: String,
    #[serde(default, rename = "FirstURL")]
    first_url: String,
    #[serde(default)]
    topics: Vec<RelatedTopic>,
}

impl DuckDuckGoSearch {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ToolError> {
        let url = format!(
            "{}/?q={}&format=json&no_html=1&skip_disambig=1",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(query)
        );
        debug!(%url, "web search");
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let answer: InstantAnswer =
            serde_json::from_str(&body).map_err(|_| ToolError::InvalidResponse)?;
        Ok(answer.into_hits(limit))
    }
}

impl InstantAnswer {
    fn into_hits(self, limit: usize) -> Vec<SearchHit> {
        let mut hits = Vec::new();
        if !self.abstract_text.is_empty() {
            hits.push(SearchHit {
                title: self.heading,
                url: self.abstract_url,
                snippet: self.abstract_text,
            });
        }
        let mut pending = self.related_topics;
        pending.reverse();
        while let Some(topic) = pending.pop() {
            if hits.len() >= limit {
                break;
            }
            if !topic.topics.is_empty() {
                pending.extend(topic.topics.into_iter().rev());
                continue;
            }
            if topic.text.is_empty() {
                continue;
            }
            let title = topic
                .text
                .split(" - ")
                .next()
                .unwrap_or(&topic.text)
                .to_string();
            hits.push(SearchHit {
                title,
                url: topic.first_url,
                snippet: topic.text,
            });
        }
        hits.truncate(limit);
        hits
    }
}

/// Current conditions from wttr.in.
pub struct WttrWeather {
    client: reqwest::Client,
    base_url: String,
}

impl WttrWeather {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl WeatherProvider for WttrWeather {
    async fn current(&self, location: &str) -> Result<String, ToolError> {
        let url = format!(
            "{}/{}?format=3",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(location)
        );
        let text = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ToolError::InvalidResponse);
        }
        Ok(text.to_string())
    }
}

/// Runs requested side-calls and folds their output into prompt context.
pub struct Augmenter {
    search: Option<Arc<dyn SearchProvider>>,
    weather: Option<Arc<dyn WeatherProvider>>,
    timeout: Duration,
    max_results: usize,
}

impl Augmenter {
    pub fn new(timeout: Duration, max_results: usize) -> Self {
        Self {
            search: None,
            weather: None,
            timeout,
            max_results,
        }
    }

    pub fn with_search(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(provider);
        self
    }

    pub fn with_weather(mut self, provider: Arc<dyn WeatherProvider>) -> Self {
        self.weather = Some(provider);
        self
    }

    /// Plain-text context for `prompt`, or `None` when nothing was requested.
    pub async fn context(&self, prompt: &str, augment: &Augmentation) -> Option<String> {
        let mut sections = Vec::new();
        if augment.web_search {
            sections.push(format!("Web search results:\n{}", self.search_text(prompt).await));
        }
        if let Some(location) = &augment.weather_location {
            sections.push(format!("Current weather: {}", self.weather_text(location).await));
        }
        if augment.current_time {
            sections.push(format!(
                "Current time (UTC): {}",
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
        }
        (!sections.is_empty()).then(|| sections.join("\n\n"))
    }

    async fn search_text(&self, query: &str) -> String {
        let Some(provider) = &self.search else {
            return "Search failed: no search provider configured".into();
        };
        let outcome = tokio::time::timeout(self.timeout, provider.search(query, self.max_results))
            .await
            .unwrap_or(Err(ToolError::Timeout(self.timeout)));
        match outcome {
            Ok(hits) => render_hits(&hits),
            Err(e) => {
                warn!(error = %e, "web search side-call failed");
                format!("Search failed: {e}")
            }
        }
    }

    async fn weather_text(&self, location: &str) -> String {
        let Some(provider) = &self.weather else {
            return "Weather lookup failed: no weather provider configured".into();
        };
        let outcome = tokio::time::timeout(self.timeout, provider.current(location))
            .await
            .unwrap_or(Err(ToolError::Timeout(self.timeout)));
        match outcome {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, %location, "weather side-call failed");
                format!("Weather lookup failed: {e}")
            }
        }
    }
}

/// Render hits the way they are shown to the model.
pub fn render_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No relevant results found.".into();
    }
    hits.iter()
        .map(|hit| {
            let snippet: String = hit.snippet.chars().take(SNIPPET_CHARS).collect();
            format!("• {}\n  {}\n  {}...", hit.title, hit.url, snippet)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
