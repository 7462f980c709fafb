// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One listing entry exactly as the content source hands it over.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawItem {
    pub id: String,
    pub title: String,
    pub channel: String,
    pub author: Option<String>,
    pub score: i64,
    pub created_utc: f64, // unix seconds, fractional
    pub permalink: String,
    pub selftext: String,
    pub num_comments: u64,
}

/// Normalized content unit produced by the fetcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub channel: String,
    pub author: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub url: String,
    pub body: String,
    pub num_comments: u64,
}

/// Failures reported by a content source. All of them are per-channel and
/// recoverable from the pipeline's point of view.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("channel not accessible: {0}")]
    Inaccessible(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::Decode(e.to_string())
        } else {
            SourceError::Network(e.to_string())
        }
    }
}

/// Content source client. Implementations need not tolerate concurrent use;
/// the pipeline only ever reaches them through [`crate::ingest::guard::SharedSource`].
#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    /// `Ok(false)` for private, banned or nonexistent channels.
    async fn channel_exists(&self, name: &str) -> Result<bool, SourceError>;

    /// Newest items first, at most `count`.
    async fn list_newest(&self, channel: &str, count: usize) -> Result<Vec<RawItem>, SourceError>;

    /// Cheap credential check used by the connection probe.
    async fn verify(&self) -> Result<(), SourceError> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}
