use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use axum::http::{HeaderMap, header};
use serde::Deserialize;

/// Decides which API keys may use the gateway.
pub trait KeyStore: Send + Sync {
    fn is_authorized(&self, key: &str) -> bool;
}

/// Keys loaded from a JSON file of the form `{"keys": {"<key>": true}}`.
///
/// A key mapped to `false` is known but disabled.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct KeyTable {
    #[serde(default)]
    keys: HashMap<String, bool>,
}

impl KeyTable {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading key file {}", path.display()))?;
        let table: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing key file {}", path.display()))?;
        Ok(table)
    }

    /// Table in which every given key is enabled.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(|k| (k.into(), true)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyStore for KeyTable {
    fn is_authorized(&self, key: &str) -> bool {
        self.keys.get(key).copied().unwrap_or(false)
    }
}

/// Key presented by the caller, from `x-api-key` or a bearer token.
pub fn api_key(headers: &HeaderMap) -> Option<&str> {
    let direct = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty());
    if direct.is_some() {
        return direct;
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|k| !k.is_empty())
}
