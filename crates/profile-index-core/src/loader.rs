//! Document and schema loading
//!
//! Profiles and schemas are both plain JSON documents behind a URL. The
//! HTTP implementation lives in `client::http`; `StaticLoader` serves
//! documents from memory.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::FetchError;

/// Fetches JSON documents by URL
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Raw response body of a successful GET
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// Body decoded as JSON
    async fn load_json(&self, url: &str) -> Result<Value, FetchError> {
        let bytes = self.get_bytes(url).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Default)]
struct StaticDocuments {
    bodies: HashMap<String, Vec<u8>>,
    fetches: HashMap<String, usize>,
}

/// Loader over an in-memory URL → body map
///
/// Counts fetches per URL so callers can assert how much work was done.
#[derive(Default)]
pub struct StaticLoader {
    inner: Mutex<StaticDocuments>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` at `url`
    pub fn insert(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.bodies.insert(url.into(), body.into());
        }
    }

    /// Serve a JSON value at `url`
    pub fn insert_json(&self, url: impl Into<String>, value: &Value) {
        self.insert(url, value.to_string());
    }

    /// Stop serving `url`
    pub fn remove(&self, url: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.bodies.remove(url);
        }
    }

    /// Number of fetches attempted for `url`
    pub fn fetches(&self, url: &str) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.fetches.get(url).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentLoader for StaticLoader {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        *inner.fetches.entry(url.to_string()).or_insert(0) += 1;
        inner
            .bodies
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Missing(url.to_string()))
    }
}
