//! Provider-agnostic model capabilities.
//!
//! The pipeline only ever sees these traits; concrete providers live in
//! sibling modules. Model failures are never fatal at the page level, so the
//! error type distinguishes transient faults (retried inside the clients)
//! from everything else (logged and skipped by the callers).

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use thiserror::Error;

pub type GenericRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared per-second rate limiter for a model provider.
pub fn per_second_limiter(requests: u32) -> Arc<GenericRateLimiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests.max(1)).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model returned an empty response")]
    Empty,
    #[error("failed to parse model response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ModelError {
    /// Transient faults are retried inside the provider clients; anything
    /// else surfaces immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Http(err) => err.is_timeout() || err.is_connect(),
            ModelError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// One piece of multimodal request content.
#[derive(Debug, Clone)]
pub enum Part {
    Text(String),
    Image { bytes: Vec<u8>, mime_type: String },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    pub fn image(bytes: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Part::Image {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Generation parameters the pipeline cares about.
#[derive(Debug, Clone, Default)]
pub struct GenerateConfig {
    pub temperature: Option<f32>,
    pub response_mime_type: Option<&'static str>,
    pub max_tokens: Option<u32>,
}

impl GenerateConfig {
    /// Low-temperature JSON extraction, used for every slice call.
    pub fn json_extraction() -> Self {
        Self {
            temperature: Some(0.1),
            response_mime_type: Some("application/json"),
            max_tokens: None,
        }
    }
}

/// A vision-capable generative model.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, parts: &[Part], config: &GenerateConfig)
        -> Result<String, ModelError>;
}

/// A text embedding model.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError>;
}
