//! Claude REST client used as the QA verification model.
//!
//! Verification runs on a different provider than extraction to avoid
//! self-agreement; when Claude is unavailable the extractor verifies its own
//! output as a degraded fallback.

use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bon::Builder;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use super::model::{GenerateConfig, GenerativeModel, GenericRateLimiter, ModelError, Part};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_TRANSIENT_RETRIES: usize = 3;

#[derive(Clone, Builder)]
pub struct AnthropicClient {
    #[builder(into)]
    api_key: String,
    #[builder(into)]
    model: String,
    #[builder(into, default = DEFAULT_BASE_URL.to_string())]
    base_url: String,
    limiter: Option<Arc<GenericRateLimiter>>,
    #[builder(default = default_http_client())]
    http: reqwest::Client,
}

fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

impl AnthropicClient {
    /// Build from `ANTHROPIC_API_KEY`; `None` when the key is absent, in
    /// which case callers fall back to the extraction model for QA.
    pub fn from_env(model: impl Into<String>, limiter: Option<Arc<GenericRateLimiter>>) -> Option<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").ok()?;
        Some(
            Self::builder()
                .api_key(api_key)
                .model(model)
                .maybe_limiter(limiter)
                .build(),
        )
    }
}

#[async_trait::async_trait]
impl GenerativeModel for AnthropicClient {
    async fn generate(
        &self,
        parts: &[Part],
        config: &GenerateConfig,
    ) -> Result<String, ModelError> {
        let content: Vec<JsonValue> = parts
            .iter()
            .map(|part| match part {
                Part::Text(text) => json!({ "type": "text", "text": text }),
                Part::Image { bytes, mime_type } => json!({
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": mime_type,
                        "data": BASE64_STANDARD.encode(bytes),
                    }
                }),
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "max_tokens": config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": [{ "role": "user", "content": content }],
        });
        if let Some(temperature) = config.temperature {
            body["temperature"] = json!(temperature);
        }

        let url = format!("{}/v1/messages", self.base_url);
        let attempt = || async {
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            let response = self
                .http
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ModelError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            Ok(response.json::<JsonValue>().await?)
        };

        let response = attempt
            .retry(ExponentialBuilder::default().with_max_times(MAX_TRANSIENT_RETRIES))
            .when(ModelError::is_transient)
            .await?;

        let parsed: MessageResponse = serde_json::from_value(response)?;
        let text = parsed
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ModelError::Empty);
        }
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}
