//! Shared doubles for the pipeline integration tests.

use std::sync::Mutex;

use async_trait::async_trait;

use skylog_app::services::model::{
    EmbeddingModel, GenerateConfig, GenerativeModel, ModelError, Part,
};
use skylog_app::pdf::{PageRasterizer, RasterizeError};

/// Vision double keyed on the image bytes it receives: each page/slice body
/// selects its scripted extraction. Records every image it saw.
pub struct KeyedVision {
    responses: Vec<(Vec<u8>, String)>,
    default_response: String,
    pub seen: Mutex<Vec<Vec<u8>>>,
}

impl KeyedVision {
    pub fn new(responses: Vec<(Vec<u8>, String)>, default_response: impl Into<String>) -> Self {
        Self {
            responses,
            default_response: default_response.into(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().expect("seen lock").len()
    }
}

#[async_trait]
impl GenerativeModel for KeyedVision {
    async fn generate(
        &self,
        parts: &[Part],
        _config: &GenerateConfig,
    ) -> Result<String, ModelError> {
        let image = parts
            .iter()
            .find_map(|p| match p {
                Part::Image { bytes, .. } => Some(bytes.clone()),
                _ => None,
            })
            .unwrap_or_default();
        self.seen.lock().expect("seen lock").push(image.clone());

        let response = self
            .responses
            .iter()
            .find(|(key, _)| *key == image)
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.default_response.clone());
        Ok(response)
    }
}

/// Verifier double returning the same verdict for every slice.
pub struct StaticVision(pub String);

#[async_trait]
impl GenerativeModel for StaticVision {
    async fn generate(
        &self,
        _parts: &[Part],
        _config: &GenerateConfig,
    ) -> Result<String, ModelError> {
        Ok(self.0.clone())
    }
}

pub struct StaticEmbedder(pub Vec<f32>);

#[async_trait]
impl EmbeddingModel for StaticEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ModelError> {
        Ok(self.0.clone())
    }
}

/// Rasterizer double returning fixed page bodies.
pub struct FakeRasterizer(pub Vec<Vec<u8>>);

impl PageRasterizer for FakeRasterizer {
    fn rasterize(&self, _pdf_bytes: &[u8]) -> Result<Vec<Vec<u8>>, RasterizeError> {
        Ok(self.0.clone())
    }
}

pub fn extraction_response(date: &str, narrative: &str) -> String {
    format!(
        r#"{{"pageType":"maintenance_entry","entries":[{{"date":"{date}","maintenanceNarrative":"{narrative}","entryType":"maintenance","confidence":0.95}}]}}"#
    )
}

pub fn extraction_with_serial(date: &str, narrative: &str, serial: &str) -> String {
    format!(
        r#"{{"pageType":"maintenance_entry","entries":[{{"date":"{date}","maintenanceNarrative":"{narrative}","aircraftSerial":"{serial}","entryType":"maintenance"}}]}}"#
    )
}

pub fn qa_pass_response() -> String {
    r#"{"results":[{"entryIndex":0,"verdict":"pass","issues":[],"summary":"faithful"}]}"#.to_string()
}
