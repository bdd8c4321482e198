//! Typed persistence capability.
//!
//! The pipeline talks to [`Store`]; `PgStore` binds it to Postgres with the
//! halfvec embedding column, and `MemStore` backs the local runner and the
//! integration tests. Queries are typed per operation rather than exposing a
//! generic row-map shape.

pub mod memory;
pub mod pg;

pub use memory::MemStore;
pub use pg::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{BatchStatus, ExtractionStatus, ReviewStatus, UploadType};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("unexpected value in column {column}: {value}")]
    Decode {
        column: &'static str,
        value: String,
    },
}

/// Authoritative aircraft identity backing a batch, used by identity
/// reconciliation.
#[derive(Debug, Clone)]
pub struct AircraftIdentity {
    pub aircraft_id: Uuid,
    pub registration: String,
    pub serial_number: String,
    pub make: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct NewBatch {
    pub id: Uuid,
    pub aircraft_id: Uuid,
    pub logbook_type: String,
    pub upload_type: UploadType,
    pub source_filename: String,
    pub s3_key: Option<String>,
    pub page_count: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct NewPage {
    pub batch_id: Uuid,
    pub page_number: u32,
    pub image_key: String,
}

/// Aggregate page progress for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCounts {
    pub total: u64,
    pub done: u64,
    pub failed: u64,
}

impl PageCounts {
    /// Terminal batch status once every page has resolved; `None` while any
    /// page is still outstanding. Idempotent and monotonic in `(done,
    /// failed)`, so concurrent rollups computing the same answer are
    /// harmless.
    pub fn terminal_status(&self) -> Option<BatchStatus> {
        if self.total == 0 || self.done + self.failed != self.total {
            return None;
        }
        Some(if self.failed == 0 {
            BatchStatus::Completed
        } else if self.done == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::CompletedWithErrors
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewEntry {
    pub aircraft_id: Uuid,
    pub page_id: Uuid,
    pub entry_type: String,
    pub entry_date: NaiveDate,
    pub hobbs_time: Option<f64>,
    pub tach_time: Option<f64>,
    pub flight_time: Option<f64>,
    pub time_since_overhaul: Option<f64>,
    pub shop_name: String,
    pub shop_address: String,
    pub shop_phone: String,
    pub repair_station_number: String,
    pub mechanic_name: String,
    pub mechanic_certificate: String,
    pub work_order_number: String,
    pub maintenance_narrative: String,
    pub confidence_score: Option<f64>,
    pub needs_review: bool,
    pub missing_data: Vec<String>,
    pub extraction_notes: String,
}

#[derive(Debug, Clone)]
pub struct NewPartsAction {
    pub action: String,
    pub part_name: String,
    pub part_number: String,
    pub serial_number: String,
    pub old_part_number: String,
    pub old_serial_number: String,
    pub quantity: u32,
    pub notes: String,
}

#[derive(Debug, Clone)]
pub struct NewAdCompliance {
    pub ad_number: String,
    pub compliance_date: NaiveDate,
    pub method: Option<String>,
    pub notes: String,
}

#[derive(Debug, Clone)]
pub struct NewInspectionRecord {
    pub inspection_type: String,
    pub inspection_date: NaiveDate,
    pub aircraft_hours: Option<f64>,
    pub far_reference: String,
    pub inspector_name: String,
    pub inspector_certificate: String,
}

/// Aggregated batch progress exposed by the status operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatusReport {
    pub upload_id: Uuid,
    pub status: BatchStatus,
    pub filename: String,
    pub log_type: String,
    pub upload_type: UploadType,
    pub page_count: u64,
    pub completed_pages: u64,
    pub failed_pages: u64,
    pub needs_review_pages: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_page_numbers: Vec<u32>,
    pub created_at: DateTime<Utc>,
}

/// Filters for the entry listing operation. `page` is 1-based.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub entry_type: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub needs_review: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub const DEFAULT_PAGE_LIMIT: u32 = 25;
pub const MAX_PAGE_LIMIT: u32 = 100;

impl EntryFilter {
    /// Effective `(page, limit, offset)` with defaults and the max-limit cap
    /// applied.
    pub fn pagination(&self) -> (u32, u32, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        let offset = u64::from(page - 1) * u64::from(limit);
        (page, limit, offset)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySummary {
    pub id: Uuid,
    pub entry_type: String,
    pub entry_date: NaiveDate,
    pub hobbs_time: Option<f64>,
    pub tach_time: Option<f64>,
    pub flight_time: Option<f64>,
    pub shop_name: String,
    pub mechanic_name: String,
    pub maintenance_narrative: String,
    pub confidence_score: Option<f64>,
    pub needs_review: bool,
    pub review_status: ReviewStatus,
    pub missing_data: Vec<String>,
    pub extraction_notes: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryListing {
    pub entries: Vec<EntrySummary>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

/// Patchable review fields. `Approved`/`Rejected` clear `needs_review`.
#[derive(Debug, Clone, Default)]
pub struct ReviewUpdate {
    pub review_status: Option<ReviewStatus>,
    pub reviewed_by: Option<String>,
    pub entry_date: Option<NaiveDate>,
    pub maintenance_narrative: Option<String>,
    pub shop_name: Option<String>,
    pub mechanic_name: Option<String>,
    pub work_order_number: Option<String>,
    pub hobbs_time: Option<f64>,
    pub tach_time: Option<f64>,
    pub flight_time: Option<f64>,
}

impl ReviewUpdate {
    pub fn is_empty(&self) -> bool {
        self.review_status.is_none()
            && self.reviewed_by.is_none()
            && self.entry_date.is_none()
            && self.maintenance_narrative.is_none()
            && self.shop_name.is_none()
            && self.mechanic_name.is_none()
            && self.work_order_number.is_none()
            && self.hobbs_time.is_none()
            && self.tach_time.is_none()
            && self.flight_time.is_none()
    }
}

/// One retrieval hit for RAG answering.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedEntry {
    pub entry_id: Uuid,
    pub entry_date: NaiveDate,
    pub entry_type: String,
    pub inspection_type: Option<String>,
    pub maintenance_narrative: String,
    pub chunk_text: String,
    pub chunk_type: String,
    pub similarity: f64,
}

#[async_trait]
pub trait Store: Send + Sync {
    // Aircraft.
    async fn upsert_aircraft(&self, registration: &str) -> Result<Uuid, StoreError>;
    async fn find_aircraft(&self, registration: &str) -> Result<Option<Uuid>, StoreError>;
    async fn update_aircraft_registry(
        &self,
        aircraft_id: Uuid,
        make: &str,
        model: &str,
        serial_number: &str,
    ) -> Result<(), StoreError>;
    async fn batch_aircraft_identity(&self, batch_id: Uuid)
        -> Result<AircraftIdentity, StoreError>;

    // Batches.
    async fn insert_batch(&self, batch: &NewBatch) -> Result<(), StoreError>;
    /// Move a batch to `processing`; with `only_if_pending` the transition is
    /// guarded so terminal batches are never reopened.
    async fn set_batch_processing(
        &self,
        batch_id: Uuid,
        only_if_pending: bool,
    ) -> Result<(), StoreError>;
    async fn set_batch_failed(&self, batch_id: Uuid) -> Result<(), StoreError>;
    async fn set_batch_page_count(&self, batch_id: Uuid, page_count: u32)
        -> Result<(), StoreError>;
    async fn finish_batch(&self, batch_id: Uuid, status: BatchStatus) -> Result<(), StoreError>;
    async fn batch_status_report(
        &self,
        batch_id: Uuid,
    ) -> Result<Option<BatchStatusReport>, StoreError>;

    // Pages.
    async fn insert_page(&self, page: &NewPage) -> Result<Uuid, StoreError>;
    async fn find_page(&self, batch_id: Uuid, page_number: u32)
        -> Result<Option<Uuid>, StoreError>;
    async fn page_extraction_status(
        &self,
        page_id: Uuid,
    ) -> Result<Option<ExtractionStatus>, StoreError>;
    async fn set_page_status(
        &self,
        page_id: Uuid,
        status: ExtractionStatus,
    ) -> Result<(), StoreError>;
    async fn store_page_extraction(
        &self,
        page_id: Uuid,
        raw_extraction: &serde_json::Value,
        page_type: &str,
        extraction_model: &str,
    ) -> Result<(), StoreError>;
    async fn complete_page(&self, page_id: Uuid, needs_review: bool) -> Result<(), StoreError>;
    async fn page_counts(&self, batch_id: Uuid) -> Result<PageCounts, StoreError>;

    // Entries and child rows.
    async fn insert_entry(&self, entry: &NewEntry) -> Result<Uuid, StoreError>;
    async fn insert_parts_action(
        &self,
        entry_id: Uuid,
        action: &NewPartsAction,
    ) -> Result<(), StoreError>;
    async fn insert_ad_compliance(
        &self,
        entry_id: Uuid,
        aircraft_id: Uuid,
        compliance: &NewAdCompliance,
    ) -> Result<(), StoreError>;
    async fn insert_inspection_record(
        &self,
        entry_id: Uuid,
        aircraft_id: Uuid,
        record: &NewInspectionRecord,
    ) -> Result<(), StoreError>;
    async fn upsert_narrative_embedding(
        &self,
        entry_id: Uuid,
        vector: &[f32],
        chunk_text: &str,
    ) -> Result<(), StoreError>;

    // Query side.
    async fn list_entries(
        &self,
        aircraft_id: Uuid,
        filter: &EntryFilter,
    ) -> Result<EntryListing, StoreError>;
    async fn update_entry_review(
        &self,
        aircraft_id: Uuid,
        entry_id: Uuid,
        update: &ReviewUpdate,
    ) -> Result<bool, StoreError>;
    async fn similar_entries(
        &self,
        aircraft_id: Uuid,
        query_vector: &[f32],
        limit: u32,
    ) -> Result<Vec<RetrievedEntry>, StoreError>;
}

/// Render a vector as the `[v1,v2,…]` text literal the halfvec column
/// accepts, with the shortest lossless representation per float.
pub fn format_vector(vector: &[f32]) -> String {
    let mut out = String::with_capacity(vector.len() * 8 + 2);
    out.push('[');
    for (i, value) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        // `Display` for f32 is the shortest representation that round-trips.
        out.push_str(&value.to_string());
    }
    out.push(']');
    out
}
