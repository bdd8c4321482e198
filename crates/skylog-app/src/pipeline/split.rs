//! Split stage: object-arrival dispatch.
//!
//! Fires on every object-created event. Uploads under `uploads/` are
//! rasterized (PDF) or normalized (single image) into page images; arrivals
//! under `pages/` rejoin the pipeline and are queued for analysis. Anything
//! else is ignored.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::media::{file_extension, is_image_extension};
use crate::pdf::{PageRasterizer, RasterizeError};
use crate::services::object_store::{page_key, ObjectStore, ObjectStoreError};
use crate::services::queue::{PageTask, QueueError, WorkQueue};
use crate::services::store::{NewPage, Store, StoreError};

const PAGE_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("unsupported file type: {0}")]
    UnsupportedFile(String),
    #[error("failed to decode image: {0}")]
    ImageDecode(#[source] image::ImageError),
    #[error("failed to re-encode image: {0}")]
    ImageEncode(#[source] image::ImageError),
    #[error(transparent)]
    Rasterize(#[from] RasterizeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

pub struct SplitService {
    store: Arc<dyn Store>,
    objects: Arc<dyn ObjectStore>,
    queue: Arc<dyn WorkQueue>,
    rasterizer: Arc<dyn PageRasterizer>,
}

impl SplitService {
    pub fn new(
        store: Arc<dyn Store>,
        objects: Arc<dyn ObjectStore>,
        queue: Arc<dyn WorkQueue>,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Self {
        Self {
            store,
            objects,
            queue,
            rasterizer,
        }
    }

    /// Dispatch one object-created event by key prefix.
    pub async fn handle_object_created(&self, key: &str) -> Result<(), SplitError> {
        let parts: Vec<&str> = key.split('/').collect();
        if parts.len() < 3 {
            tracing::info!(key, "ignoring object with unexpected key format");
            return Ok(());
        }

        match parts[0] {
            "pages" => self.handle_page_arrival(parts[1], key).await,
            "uploads" => {
                let filename = parts[2..].join("/");
                self.handle_upload_arrival(parts[1], &filename, key).await
            }
            _ => {
                tracing::info!(key, "ignoring object outside uploads/ and pages/");
                Ok(())
            }
        }
    }

    /// A page image landed (multi-image client PUT, or our own PDF output
    /// re-triggering). Look up the pre-inserted page row and queue it.
    async fn handle_page_arrival(&self, batch_id: &str, key: &str) -> Result<(), SplitError> {
        let Ok(batch_id) = Uuid::parse_str(batch_id) else {
            tracing::warn!(key, "could not parse batch id from page key");
            return Ok(());
        };
        let Some(page_number) = parse_page_number(key) else {
            tracing::warn!(key, "could not parse page number from page key");
            return Ok(());
        };

        let Some(page_id) = self.store.find_page(batch_id, page_number).await? else {
            tracing::warn!(%batch_id, page_number, "no page record found, skipping");
            return Ok(());
        };

        self.store.set_batch_processing(batch_id, true).await?;

        self.queue
            .send(&PageTask {
                upload_id: batch_id,
                page_id,
                page_number,
                s3_key: key.to_string(),
            })
            .await?;
        Ok(())
    }

    /// A raw upload landed: rasterize or normalize into page images, create
    /// page rows, and queue each page. Any fatal error fails the batch.
    async fn handle_upload_arrival(
        &self,
        batch_id: &str,
        filename: &str,
        key: &str,
    ) -> Result<(), SplitError> {
        let Ok(batch_id) = Uuid::parse_str(batch_id) else {
            tracing::warn!(key, "could not parse batch id from upload key");
            return Ok(());
        };

        self.store.set_batch_processing(batch_id, false).await?;

        match self.materialize_pages(batch_id, filename, key).await {
            Ok(page_keys) => {
                self.store
                    .set_batch_page_count(batch_id, page_keys.len() as u32)
                    .await?;

                for (i, page_image_key) in page_keys.iter().enumerate() {
                    let page_number = i as u32 + 1;
                    let page_id = self
                        .store
                        .insert_page(&NewPage {
                            batch_id,
                            page_number,
                            image_key: page_image_key.clone(),
                        })
                        .await?;
                    self.queue
                        .send(&PageTask {
                            upload_id: batch_id,
                            page_id,
                            page_number,
                            s3_key: page_image_key.clone(),
                        })
                        .await?;
                }

                tracing::info!(%batch_id, pages = page_keys.len(), "queued pages for analysis");
                Ok(())
            }
            Err(err) => {
                tracing::error!(%batch_id, error = %err, "split failed, marking batch failed");
                self.store.set_batch_failed(batch_id).await?;
                Err(err)
            }
        }
    }

    async fn materialize_pages(
        &self,
        batch_id: Uuid,
        filename: &str,
        key: &str,
    ) -> Result<Vec<String>, SplitError> {
        let ext = file_extension(filename);
        let bytes = self.objects.get(key).await?;

        let pages = if ext == ".pdf" {
            self.rasterizer.rasterize(&bytes)?
        } else if is_image_extension(&ext) {
            vec![normalize_image(bytes, &ext)?]
        } else {
            return Err(SplitError::UnsupportedFile(ext));
        };

        let batch = batch_id.to_string();
        let mut page_keys = Vec::with_capacity(pages.len());
        for (i, page_bytes) in pages.iter().enumerate() {
            let page_image_key = page_key(&batch, i as u32 + 1, ".jpg");
            self.objects
                .put(&page_image_key, "image/jpeg", page_bytes)
                .await?;
            page_keys.push(page_image_key);
        }
        Ok(page_keys)
    }
}

/// Parse the 1-indexed page number out of `pages/<batch>/page_<NNNN>.<ext>`.
fn parse_page_number(key: &str) -> Option<u32> {
    let filename = key.rsplit('/').next()?;
    let stem = filename.split('.').next()?;
    let digits = stem.strip_prefix("page_")?;
    digits.parse().ok()
}

/// Normalize a single uploaded image to something downstream decoders
/// handle: JPEG/PNG pass through, HEIC/HEIF go through the bundled
/// converter, the rest re-encode natively.
fn normalize_image(bytes: Vec<u8>, ext: &str) -> Result<Vec<u8>, SplitError> {
    match ext {
        ".jpg" | ".jpeg" | ".png" => Ok(bytes),
        ".heic" | ".heif" => crate::slicer::convert::to_jpeg(&bytes).map_err(|err| {
            SplitError::ImageDecode(image::ImageError::IoError(err))
        }),
        _ => {
            let img = image::load_from_memory(&bytes).map_err(SplitError::ImageDecode)?;
            let mut encoded = Vec::new();
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut encoded, PAGE_JPEG_QUALITY);
            img.write_with_encoder(encoder)
                .map_err(SplitError::ImageEncode)?;
            Ok(encoded)
        }
    }
}
