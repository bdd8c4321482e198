//! Analyze stage: one queued page per invocation.
//!
//! Download, slice, run the extract-and-verify loop per slice, reconcile
//! identity, persist entries, then roll the batch status up. Infrastructure
//! failures fail the page (and surface so the queue redelivers); model
//! failures never do.

use std::sync::Arc;

use thiserror::Error;

use crate::media::{content_type_for, file_extension};
use crate::models::{ExtractionResult, ExtractionStatus};
use crate::services::model::{EmbeddingModel, GenerativeModel};
use crate::services::object_store::{slice_key, ObjectStore, ObjectStoreError};
use crate::services::queue::PageTask;
use crate::services::store::{Store, StoreError};
use crate::slicer::{slice_image, SliceOptions};

use super::extract::extract_and_verify;
use super::identity::check_aircraft_identity;
use super::persist::persist_entry;

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),
}

pub struct AnalyzeService {
    store: Arc<dyn Store>,
    objects: Arc<dyn ObjectStore>,
    extractor: Arc<dyn GenerativeModel>,
    verifier: Option<Arc<dyn GenerativeModel>>,
    embedder: Option<Arc<dyn EmbeddingModel>>,
    extraction_model_id: String,
    slice_options: SliceOptions,
}

impl AnalyzeService {
    pub fn new(
        store: Arc<dyn Store>,
        objects: Arc<dyn ObjectStore>,
        extractor: Arc<dyn GenerativeModel>,
        verifier: Option<Arc<dyn GenerativeModel>>,
        embedder: Option<Arc<dyn EmbeddingModel>>,
        extraction_model_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            objects,
            extractor,
            verifier,
            embedder,
            extraction_model_id: extraction_model_id.into(),
            slice_options: SliceOptions::default(),
        }
    }

    /// Process one task, marking the page failed before surfacing any error
    /// so the queue's redelivery policy takes over.
    pub async fn handle(&self, task: &PageTask) -> Result<(), AnalyzeError> {
        match self.process_page(task).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::error!(page_id = %task.page_id, error = %err, "page processing failed");
                if let Err(mark_err) = self
                    .store
                    .set_page_status(task.page_id, ExtractionStatus::Failed)
                    .await
                {
                    tracing::warn!(page_id = %task.page_id, error = %mark_err, "could not mark page failed");
                }
                self.check_batch_completion(task).await;
                Err(err)
            }
        }
    }

    async fn process_page(&self, task: &PageTask) -> Result<(), AnalyzeError> {
        // Redelivery guard: a completed page is never reprocessed, so a
        // duplicate message cannot duplicate its entries.
        if self.store.page_extraction_status(task.page_id).await?
            == Some(ExtractionStatus::Completed)
        {
            tracing::info!(page_id = %task.page_id, "page already completed, skipping redelivery");
            return Ok(());
        }

        self.store
            .set_page_status(task.page_id, ExtractionStatus::Processing)
            .await?;

        let image_bytes = self.objects.get(&task.s3_key).await?;
        let ext = file_extension(&task.s3_key);
        let page_mime = content_type_for(&ext);

        // Slicer failure is not a page failure: fall back to the whole page
        // with its original bytes and MIME type.
        let slices: Vec<(Vec<u8>, &str)> = match slice_image(&image_bytes, &self.slice_options) {
            Ok(slices) => slices
                .into_iter()
                .map(|s| (s.image_data, "image/jpeg"))
                .collect(),
            Err(err) => {
                tracing::warn!(page_id = %task.page_id, error = %err, "slicer failed, using full image");
                vec![(image_bytes.clone(), page_mime)]
            }
        };
        tracing::info!(page_id = %task.page_id, strips = slices.len(), "page sliced");

        let batch_key = task.upload_id.to_string();
        let mut all_entries = Vec::new();
        let mut last_page_type = String::new();

        for (index, (slice_bytes, slice_mime)) in slices.iter().enumerate() {
            let audit_key = slice_key(&batch_key, task.page_number, index);
            if let Err(err) = self.objects.put(&audit_key, "image/jpeg", slice_bytes).await {
                tracing::warn!(key = %audit_key, error = %err, "slice audit upload failed");
            }

            let outcome = extract_and_verify(
                self.extractor.as_ref(),
                self.verifier.as_deref(),
                slice_bytes,
                slice_mime,
            )
            .await;

            all_entries.extend(outcome.entries);
            if !outcome.page_type.is_empty() {
                last_page_type = outcome.page_type;
            }
        }

        let mut extraction = ExtractionResult {
            page_type: if last_page_type.is_empty() {
                "other".to_string()
            } else {
                last_page_type
            },
            entries: all_entries,
        };

        let raw = serde_json::to_value(&extraction).unwrap_or_default();
        self.store
            .store_page_extraction(
                task.page_id,
                &raw,
                &extraction.page_type,
                &self.extraction_model_id,
            )
            .await?;

        let identity = self.store.batch_aircraft_identity(task.upload_id).await?;

        for entry in extraction.entries.iter_mut() {
            check_aircraft_identity(entry, &identity);
            if let Err(err) = persist_entry(
                self.store.as_ref(),
                self.embedder.as_deref(),
                identity.aircraft_id,
                task.page_id,
                entry,
            )
            .await
            {
                tracing::warn!(page_id = %task.page_id, error = %err, "save entry failed");
            }
        }

        let needs_review = extraction.entries.iter().any(|e| e.needs_review);
        self.store.complete_page(task.page_id, needs_review).await?;

        self.check_batch_completion(task).await;

        tracing::info!(
            page_id = %task.page_id,
            entries = extraction.entries.len(),
            "page analysis complete"
        );
        Ok(())
    }

    /// Roll the batch up once every page has resolved. Best-effort: rollup
    /// problems are logged and the next page completion retries naturally.
    async fn check_batch_completion(&self, task: &PageTask) {
        let counts = match self.store.page_counts(task.upload_id).await {
            Ok(counts) => counts,
            Err(err) => {
                tracing::warn!(batch_id = %task.upload_id, error = %err, "batch completion check failed");
                return;
            }
        };

        if let Some(status) = counts.terminal_status() {
            if let Err(err) = self.store.finish_batch(task.upload_id, status).await {
                tracing::warn!(batch_id = %task.upload_id, error = %err, "batch status update failed");
            } else {
                tracing::info!(batch_id = %task.upload_id, status = %status, "batch reached terminal status");
            }
        }
    }
}
