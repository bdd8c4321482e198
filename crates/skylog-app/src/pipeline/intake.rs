//! Upload intake: validate, classify, create the batch, hand back presigned
//! PUT URLs.
//!
//! A PDF upload creates the batch only; pages appear when Split rasterizes
//! the document. A multi-image upload pre-creates one page row per file so
//! the page-arrival path can find them as the client PUTs each image.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::constants::{MAX_FILES_PER_UPLOAD, PRESIGN_TTL_SECS};
use crate::media::{content_type_for, file_extension, is_image_extension, is_pdf_extension};
use crate::models::UploadType;
use crate::services::object_store::{page_key, upload_key, ObjectStore, ObjectStoreError};
use crate::services::registry::{enrich_aircraft, FaaRegistryClient};
use crate::services::store::{NewBatch, NewPage, Store, StoreError};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub tail_number: String,
    #[serde(default)]
    pub log_type: String,
    #[serde(default)]
    pub files: Vec<UploadFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadFile {
    #[serde(default)]
    pub filename: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub upload_id: Uuid,
    pub upload_type: UploadType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    pub files: Vec<UploadResponseFile>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponseFile {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    pub upload_url: String,
    pub s3_key: String,
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),
}

pub struct IntakeService {
    store: Arc<dyn Store>,
    objects: Arc<dyn ObjectStore>,
    registry: Option<FaaRegistryClient>,
}

impl IntakeService {
    pub fn new(
        store: Arc<dyn Store>,
        objects: Arc<dyn ObjectStore>,
        registry: Option<FaaRegistryClient>,
    ) -> Self {
        Self {
            store,
            objects,
            registry,
        }
    }

    pub async fn handle_upload(
        &self,
        request: UploadRequest,
    ) -> Result<UploadResponse, IntakeError> {
        let tail = request.tail_number.trim().to_uppercase();
        if tail.is_empty() {
            return Err(IntakeError::InvalidInput("tailNumber is required"));
        }
        if request.files.is_empty() {
            return Err(IntakeError::InvalidInput("files array is required"));
        }
        if request.files.len() > MAX_FILES_PER_UPLOAD {
            return Err(IntakeError::InvalidInput("Maximum 500 files per upload"));
        }

        let mut pdf_files = Vec::new();
        let mut image_files = Vec::new();
        for file in &request.files {
            let ext = file_extension(&file.filename);
            if is_pdf_extension(&ext) {
                pdf_files.push(file.clone());
            } else if is_image_extension(&ext) {
                image_files.push(file.clone());
            } else {
                return Err(IntakeError::InvalidInput(
                    "Files must be PDF (.pdf) or images (.jpg, .jpeg, .png, etc.)",
                ));
            }
        }

        if !pdf_files.is_empty() && !image_files.is_empty() {
            return Err(IntakeError::InvalidInput(
                "Cannot mix PDF and image files in one upload",
            ));
        }
        if pdf_files.len() > 1 {
            return Err(IntakeError::InvalidInput("Only one PDF per upload"));
        }

        let aircraft_id = self.store.upsert_aircraft(&tail).await?;

        // Best-effort registry enrichment, bounded by the client's timeout.
        enrich_aircraft(self.registry.as_ref(), self.store.as_ref(), aircraft_id, &tail).await;

        let batch_id = Uuid::new_v4();
        if let Some(pdf) = pdf_files.into_iter().next() {
            self.handle_pdf_upload(batch_id, aircraft_id, &request.log_type, pdf)
                .await
        } else {
            self.handle_multi_image_upload(batch_id, aircraft_id, &request.log_type, image_files)
                .await
        }
    }

    async fn handle_pdf_upload(
        &self,
        batch_id: Uuid,
        aircraft_id: Uuid,
        log_type: &str,
        file: UploadFile,
    ) -> Result<UploadResponse, IntakeError> {
        let filename = if file.filename.is_empty() {
            "logbook.pdf".to_string()
        } else {
            file.filename
        };
        let s3_key = upload_key(&batch_id.to_string(), &filename);

        self.store
            .insert_batch(&NewBatch {
                id: batch_id,
                aircraft_id,
                logbook_type: log_type.to_string(),
                upload_type: UploadType::Pdf,
                source_filename: filename.clone(),
                s3_key: Some(s3_key.clone()),
                page_count: None,
            })
            .await?;

        let upload_url = self
            .objects
            .presign_put(&s3_key, "application/pdf", Duration::from_secs(PRESIGN_TTL_SECS))
            .await?;

        tracing::info!(%batch_id, filename, "created pdf upload batch");

        Ok(UploadResponse {
            upload_id: batch_id,
            upload_type: UploadType::Pdf,
            page_count: None,
            files: vec![UploadResponseFile {
                filename,
                page_number: None,
                upload_url,
                s3_key,
            }],
        })
    }

    async fn handle_multi_image_upload(
        &self,
        batch_id: Uuid,
        aircraft_id: Uuid,
        log_type: &str,
        files: Vec<UploadFile>,
    ) -> Result<UploadResponse, IntakeError> {
        let page_count = files.len() as u32;
        let source_name = if files.len() > 1 {
            format!("{} images", files.len())
        } else {
            files[0].filename.clone()
        };

        self.store
            .insert_batch(&NewBatch {
                id: batch_id,
                aircraft_id,
                logbook_type: log_type.to_string(),
                upload_type: UploadType::MultiImage,
                source_filename: source_name,
                s3_key: None,
                page_count: Some(page_count),
            })
            .await?;

        let mut response_files = Vec::with_capacity(files.len());
        for (i, file) in files.into_iter().enumerate() {
            let page_number = i as u32 + 1;
            let filename = if file.filename.is_empty() {
                format!("page_{page_number:04}.jpg")
            } else {
                file.filename
            };
            let ext = file_extension(&filename);
            let content_type = content_type_for(&ext);
            let image_key = page_key(&batch_id.to_string(), page_number, &ext);

            self.store
                .insert_page(&NewPage {
                    batch_id,
                    page_number,
                    image_key: image_key.clone(),
                })
                .await?;

            let upload_url = self
                .objects
                .presign_put(&image_key, content_type, Duration::from_secs(PRESIGN_TTL_SECS))
                .await?;

            response_files.push(UploadResponseFile {
                filename,
                page_number: Some(page_number),
                upload_url,
                s3_key: image_key,
            });
        }

        tracing::info!(%batch_id, page_count, "created multi-image upload batch");

        Ok(UploadResponse {
            upload_id: batch_id,
            upload_type: UploadType::MultiImage,
            page_count: Some(page_count),
            files: response_files,
        })
    }
}
