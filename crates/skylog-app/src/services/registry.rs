//! FAA registry enrichment.
//!
//! Looks up make/model/serial for a tail number and writes it onto the
//! aircraft row. Strictly best-effort: a short timeout, failures logged,
//! never fatal to the caller.

use std::time::Duration;

use bon::Builder;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use super::store::Store;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("registry returned status {0}")]
    Status(u16),
    #[error("failed to parse registry response: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryRecord {
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
}

#[derive(Clone, Builder)]
pub struct FaaRegistryClient {
    #[builder(into)]
    base_url: String,
    #[builder(into)]
    api_key: String,
    #[builder(default = default_http_client())]
    http: reqwest::Client,
}

fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(LOOKUP_TIMEOUT)
        .build()
        .unwrap_or_default()
}

impl FaaRegistryClient {
    /// Build from `FAA_REGISTRY_URL` and `FAA_REGISTRY_API_KEY`; `None` when
    /// either is absent and enrichment is simply skipped.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("FAA_REGISTRY_URL").ok()?;
        let api_key = std::env::var("FAA_REGISTRY_API_KEY").ok()?;
        Some(Self::builder().base_url(base_url).api_key(api_key).build())
    }

    pub async fn lookup(&self, tail_number: &str) -> Result<RegistryRecord, RegistryError> {
        let url = format!("{}/registry/{}", self.base_url, tail_number);
        let response = self
            .http
            .get(&url)
            .header("x-api-key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status(status.as_u16()));
        }
        Ok(response.json::<RegistryRecord>().await?)
    }
}

/// Run enrichment and update the aircraft row. Never fails: every error is
/// logged as a warning and swallowed.
pub async fn enrich_aircraft(
    client: Option<&FaaRegistryClient>,
    store: &dyn Store,
    aircraft_id: Uuid,
    tail_number: &str,
) {
    let Some(client) = client else {
        return;
    };

    match client.lookup(tail_number).await {
        Ok(record) => {
            if let Err(err) = store
                .update_aircraft_registry(
                    aircraft_id,
                    &record.manufacturer,
                    &record.model,
                    &record.serial_number,
                )
                .await
            {
                tracing::warn!(tail_number, error = %err, "FAA enrichment update failed");
            }
        }
        Err(err) => {
            tracing::warn!(tail_number, error = %err, "FAA enrichment lookup failed");
        }
    }
}
