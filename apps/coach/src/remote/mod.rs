//! Remote Service: the backend the resilience layer protects.
//!
//! Calls may be slow, fail, or return semantically wrong content; nothing here
//! retries. Retry, deadlines, and fallback belong to `resilience` and `coach`.

use async_trait::async_trait;
use thiserror::Error;

use crate::content::models::{QuizSet, StudyPlan};

pub mod http;

#[cfg(test)]
pub(crate) mod testing;

pub use http::HttpRemote;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("remote returned empty content")]
    EmptyContent,

    #[error("remote unavailable: {0}")]
    Unavailable(String),
}

/// Backend contract. `submit_unit_complete` must be idempotent server-side:
/// queued completions are replayed at least once.
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn fetch_quiz(&self, topic_key: &str, count: usize) -> Result<QuizSet, RemoteError>;

    async fn fetch_plan(&self, topic_key: &str) -> Result<StudyPlan, RemoteError>;

    async fn submit_unit_complete(&self, unit_id: u32) -> Result<(), RemoteError>;
}
