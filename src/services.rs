//! Capability traits for external collaborators, plus one production
//! implementation each. The pipeline only sees the traits; tests swap in
//! hand-rolled fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PosterResult;
use crate::fingerprint::Fingerprint;

pub mod ratelimit;
pub mod repository;
pub mod summarizer;

/// One stored media item as reported by a repository listing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MediaItem {
    pub name: String,
    pub url: String,
    /// Content identity of the stored item, carried into resolutions.
    pub fingerprint: Fingerprint,
}

impl MediaItem {
    /// Item whose content fingerprint is derived from its storage URL.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        MediaItem {
            name: name.into(),
            fingerprint: Fingerprint::of_fields(["media", url.as_str()]),
            url,
        }
    }
}

/// Durable media storage that can enumerate, serve, and accept assets.
#[async_trait]
pub trait AssetRepository: Send + Sync {
    /// Enumerate stored items. An empty query lists everything up to
    /// `page_size` items.
    async fn list(&self, query: &str, page_size: u32) -> PosterResult<Vec<MediaItem>>;

    /// Download one asset's bytes.
    async fn fetch(&self, url: &str) -> PosterResult<Vec<u8>>;

    /// Store a finished poster, returning its public URL.
    async fn upload(&self, name: &str, content_type: &str, bytes: Vec<u8>)
    -> PosterResult<String>;
}

/// Condenses event descriptions to poster-sized text.
#[async_trait]
pub trait TextSummarizer: Send + Sync {
    async fn summarize(&self, text: &str, max_chars: usize) -> PosterResult<String>;
}

/// Admission control per caller identity.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// `Ok(false)` denies the request; `Err` means the limiter backend
    /// failed and the caller decides (the pipeline fails open).
    async fn allow(&self, identity: &str) -> PosterResult<bool>;
}
