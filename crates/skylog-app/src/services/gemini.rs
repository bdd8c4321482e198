//! Gemini REST client behind the model capabilities.

use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bon::Builder;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use super::model::{
    EmbeddingModel, GenerateConfig, GenerativeModel, GenericRateLimiter, ModelError, Part,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_TRANSIENT_RETRIES: usize = 3;

/// Low-level Gemini API client shared by the generation and embedding
/// adapters. Holds the HTTP client, credentials, and the provider-wide rate
/// limiter.
#[derive(Clone, Builder)]
pub struct GeminiClient {
    #[builder(into)]
    api_key: String,
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

impl GeminiClient {
    /// Build from `GEMINI_API_KEY` (or `GOOGLE_AI_API_KEY`).
    pub fn from_env(limiter: Option<Arc<GenericRateLimiter>>) -> Option<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_AI_API_KEY"))
            .ok()?;
        Some(Self::builder().api_key(api_key).maybe_limiter(limiter).build())
    }

    pub async fn generate_content(
        &self,
        model: &str,
        parts: &[Part],
        config: &GenerateConfig,
    ) -> Result<String, ModelError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        let body = generate_request_body(parts, config);

        let response = self.post_with_retry(&url, &body).await?;
        let parsed: GenerateResponse = serde_json::from_value(response)?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ModelError::Empty);
        }
        Ok(text)
    }

    pub async fn embed_content(
        &self,
        model: &str,
        text: &str,
        output_dimensionality: usize,
    ) -> Result<Vec<f32>, ModelError> {
        let url = format!("{}/v1beta/models/{}:embedContent", self.base_url, model);
        let body = json!({
            "content": { "parts": [{ "text": text }] },
            "outputDimensionality": output_dimensionality,
        });

        let response = self.post_with_retry(&url, &body).await?;
        let parsed: EmbedResponse = serde_json::from_value(response)?;

        let values = parsed.embedding.map(|e| e.values).unwrap_or_default();
        if values.is_empty() {
            return Err(ModelError::Empty);
        }
        Ok(values)
    }

    async fn post_with_retry(&self, url: &str, body: &JsonValue) -> Result<JsonValue, ModelError> {
        let attempt = || async {
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            let response = self
                .http
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(body)
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

        attempt
            .retry(ExponentialBuilder::default().with_max_times(MAX_TRANSIENT_RETRIES))
            .when(ModelError::is_transient)
            .await
    }
}

fn generate_request_body(parts: &[Part], config: &GenerateConfig) -> JsonValue {
    let wire_parts: Vec<JsonValue> = parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => json!({ "text": text }),
            Part::Image { bytes, mime_type } => json!({
                "inline_data": {
                    "mime_type": mime_type,
                    "data": BASE64_STANDARD.encode(bytes),
                }
            }),
        })
        .collect();

    let mut generation_config = serde_json::Map::new();
    if let Some(temperature) = config.temperature {
        generation_config.insert("temperature".into(), json!(temperature));
    }
    if let Some(mime) = config.response_mime_type {
        generation_config.insert("responseMimeType".into(), json!(mime));
    }
    if let Some(max_tokens) = config.max_tokens {
        generation_config.insert("maxOutputTokens".into(), json!(max_tokens));
    }

    let mut body = json!({
        "contents": [{ "role": "user", "parts": wire_parts }],
    });
    if !generation_config.is_empty() {
        body["generationConfig"] = JsonValue::Object(generation_config);
    }
    body
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Option<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

/// [`GenerativeModel`] adapter pinning a Gemini model id.
#[derive(Clone)]
pub struct GeminiVisionModel {
    client: GeminiClient,
    model: String,
}

impl GeminiVisionModel {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl GenerativeModel for GeminiVisionModel {
    async fn generate(
        &self,
        parts: &[Part],
        config: &GenerateConfig,
    ) -> Result<String, ModelError> {
        self.client.generate_content(&self.model, parts, config).await
    }
}

/// [`EmbeddingModel`] adapter pinning a Gemini embedding model id and output
/// dimensionality.
#[derive(Clone)]
pub struct GeminiEmbedder {
    client: GeminiClient,
    model: String,
    dim: usize,
}

impl GeminiEmbedder {
    pub fn new(client: GeminiClient, model: impl Into<String>, dim: usize) -> Self {
        Self {
            client,
            model: model.into(),
            dim,
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingModel for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        self.client.embed_content(&self.model, text, self.dim).await
    }
}
