//! Audio retrieval boundary.
//!
//! The synthesis worker writes audio into a store keyed by the opaque
//! identifier it returns; `GET /play/{id}` serves those bytes to the
//! overlay. The store itself is an external collaborator, so it sits behind
//! a trait: HTTP-backed in production wiring, in-memory for tests and local
//! runs.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;

/// Read side of the audio store.
#[async_trait]
pub trait AudioStore: Send + Sync {
    /// Raw audio bytes for `audio_id`, or `None` when unknown/expired.
    async fn fetch(&self, audio_id: &str) -> Option<Bytes>;
}

/// Fetches audio from the worker's store over HTTP.
pub struct HttpAudioStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAudioStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AudioStore for HttpAudioStore {
    async fn fetch(&self, audio_id: &str) -> Option<Bytes> {
        let url = format!("{}/{audio_id}", self.base_url.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => response.bytes().await.ok(),
            Ok(response) => {
                debug!(audio_id, status = %response.status(), "audio not found in store");
                None
            }
            Err(err) => {
                debug!(audio_id, error = %err, "audio store unreachable");
                None
            }
        }
    }
}

/// In-memory store for tests and local runs without a worker-side store.
#[derive(Default)]
pub struct MemoryAudioStore {
    entries: DashMap<String, Bytes>,
}

impl MemoryAudioStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, audio_id: impl Into<String>, bytes: impl Into<Bytes>) {
        let _ = self.entries.insert(audio_id.into(), bytes.into());
    }
}

#[async_trait]
impl AudioStore for MemoryAudioStore {
    async fn fetch(&self, audio_id: &str) -> Option<Bytes> {
        self.entries.get(audio_id).map(|entry| entry.value().clone())
    }
}
