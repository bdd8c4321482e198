//! In-memory implementation of the persistence capability.
//!
//! Backs the local pipeline runner and the integration tests; mirrors the
//! Postgres semantics the pipeline relies on (status guards, embedding
//! upsert keyed on `(entry, chunk_type)`, cosine ordering for retrieval).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{BatchStatus, ExtractionStatus, ReviewStatus};

use super::{
    AircraftIdentity, BatchStatusReport, EntryFilter, EntryListing, EntrySummary, NewAdCompliance,
    NewBatch, NewEntry, NewInspectionRecord, NewPage, NewPartsAction, PageCounts, RetrievedEntry,
    ReviewUpdate, Store, StoreError,
};

#[derive(Debug, Clone)]
struct AircraftRecord {
    registration: String,
    serial_number: String,
    make: String,
    model: String,
}

#[derive(Debug, Clone)]
struct BatchRecord {
    batch: NewBatch,
    status: BatchStatus,
    page_count: Option<u32>,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PageRecord {
    id: Uuid,
    batch_id: Uuid,
    page_number: u32,
    #[allow(dead_code)]
    image_key: String,
    status: ExtractionStatus,
    needs_review: bool,
    raw_extraction: Option<serde_json::Value>,
    page_type: Option<String>,
    extraction_model: Option<String>,
}

/// A persisted maintenance entry with its review state, exposed to tests.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub id: Uuid,
    pub entry: NewEntry,
    pub review_status: ReviewStatus,
}

#[derive(Debug, Clone)]
struct EmbeddingRecord {
    vector: Vec<f32>,
    chunk_text: String,
}

#[derive(Default)]
struct Inner {
    aircraft: HashMap<Uuid, AircraftRecord>,
    registration_index: HashMap<String, Uuid>,
    batches: HashMap<Uuid, BatchRecord>,
    pages: HashMap<Uuid, PageRecord>,
    entries: Vec<StoredEntry>,
    parts: Vec<(Uuid, NewPartsAction)>,
    compliances: Vec<(Uuid, NewAdCompliance)>,
    inspections: Vec<(Uuid, NewInspectionRecord)>,
    embeddings: HashMap<(Uuid, String), EmbeddingRecord>,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Snapshot accessors for the local runner and tests.

    pub fn batch_status(&self, batch_id: Uuid) -> Option<BatchStatus> {
        self.lock().batches.get(&batch_id).map(|b| b.status)
    }

    pub fn batch_page_count(&self, batch_id: Uuid) -> Option<u32> {
        self.lock().batches.get(&batch_id).and_then(|b| b.page_count)
    }

    pub fn entries(&self) -> Vec<StoredEntry> {
        self.lock().entries.clone()
    }

    pub fn entries_for_aircraft(&self, aircraft_id: Uuid) -> Vec<StoredEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.entry.aircraft_id == aircraft_id)
            .cloned()
            .collect()
    }

    pub fn narrative_embedding(&self, entry_id: Uuid) -> Option<(Vec<f32>, String)> {
        self.lock()
            .embeddings
            .get(&(entry_id, "narrative".to_string()))
            .map(|e| (e.vector.clone(), e.chunk_text.clone()))
    }

    pub fn embedding_count(&self) -> usize {
        self.lock().embeddings.len()
    }

    pub fn parts_for(&self, entry_id: Uuid) -> Vec<NewPartsAction> {
        self.lock()
            .parts
            .iter()
            .filter(|(id, _)| *id == entry_id)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn compliances_for(&self, entry_id: Uuid) -> Vec<NewAdCompliance> {
        self.lock()
            .compliances
            .iter()
            .filter(|(id, _)| *id == entry_id)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn inspections_for(&self, entry_id: Uuid) -> Vec<NewInspectionRecord> {
        self.lock()
            .inspections
            .iter()
            .filter(|(id, _)| *id == entry_id)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Seed the authoritative identity fields for an aircraft.
    pub fn set_aircraft_identity(
        &self,
        aircraft_id: Uuid,
        serial_number: &str,
        make: &str,
        model: &str,
    ) {
        let mut inner = self.lock();
        if let Some(record) = inner.aircraft.get_mut(&aircraft_id) {
            record.serial_number = serial_number.to_string();
            record.make = make.to_string();
            record.model = model.to_string();
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0f64;
    let mut norm_a = 0f64;
    let mut norm_b = 0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl Store for MemStore {
    async fn upsert_aircraft(&self, registration: &str) -> Result<Uuid, StoreError> {
        let mut inner = self.lock();
        if let Some(id) = inner.registration_index.get(registration) {
            return Ok(*id);
        }
        let id = Uuid::new_v4();
        inner.aircraft.insert(
            id,
            AircraftRecord {
                registration: registration.to_string(),
                serial_number: String::new(),
                make: String::new(),
                model: String::new(),
            },
        );
        inner.registration_index.insert(registration.to_string(), id);
        Ok(id)
    }

    async fn find_aircraft(&self, registration: &str) -> Result<Option<Uuid>, StoreError> {
        Ok(self.lock().registration_index.get(registration).copied())
    }

    async fn update_aircraft_registry(
        &self,
        aircraft_id: Uuid,
        make: &str,
        model: &str,
        serial_number: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(record) = inner.aircraft.get_mut(&aircraft_id) {
            record.make = make.to_string();
            record.model = model.to_string();
            record.serial_number = serial_number.to_string();
        }
        Ok(())
    }

    async fn batch_aircraft_identity(
        &self,
        batch_id: Uuid,
    ) -> Result<AircraftIdentity, StoreError> {
        let inner = self.lock();
        let batch = inner
            .batches
            .get(&batch_id)
            .ok_or(StoreError::NotFound("upload batch"))?;
        let aircraft = inner
            .aircraft
            .get(&batch.batch.aircraft_id)
            .ok_or(StoreError::NotFound("aircraft"))?;
        Ok(AircraftIdentity {
            aircraft_id: batch.batch.aircraft_id,
            registration: aircraft.registration.clone(),
            serial_number: aircraft.serial_number.clone(),
            make: aircraft.make.clone(),
            model: aircraft.model.clone(),
        })
    }

    async fn insert_batch(&self, batch: &NewBatch) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.batches.insert(
            batch.id,
            BatchRecord {
                batch: batch.clone(),
                status: BatchStatus::Pending,
                page_count: batch.page_count,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn set_batch_processing(
        &self,
        batch_id: Uuid,
        only_if_pending: bool,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(record) = inner.batches.get_mut(&batch_id) {
            if !only_if_pending || record.status == BatchStatus::Pending {
                record.status = BatchStatus::Processing;
            }
        }
        Ok(())
    }

    async fn set_batch_failed(&self, batch_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(record) = inner.batches.get_mut(&batch_id) {
            record.status = BatchStatus::Failed;
        }
        Ok(())
    }

    async fn set_batch_page_count(
        &self,
        batch_id: Uuid,
        page_count: u32,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(record) = inner.batches.get_mut(&batch_id) {
            record.page_count = Some(page_count);
        }
        Ok(())
    }

    async fn finish_batch(&self, batch_id: Uuid, status: BatchStatus) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(record) = inner.batches.get_mut(&batch_id) {
            record.status = status;
        }
        Ok(())
    }

    async fn batch_status_report(
        &self,
        batch_id: Uuid,
    ) -> Result<Option<BatchStatusReport>, StoreError> {
        let inner = self.lock();
        let Some(record) = inner.batches.get(&batch_id) else {
            return Ok(None);
        };

        let pages: Vec<&PageRecord> = inner
            .pages
            .values()
            .filter(|p| p.batch_id == batch_id)
            .collect();
        let completed = pages
            .iter()
            .filter(|p| p.status == ExtractionStatus::Completed)
            .count() as u64;
        let failed_pages: Vec<&&PageRecord> = pages
            .iter()
            .filter(|p| p.status == ExtractionStatus::Failed)
            .collect();
        let needs_review = pages.iter().filter(|p| p.needs_review).count() as u64;

        let mut failed_page_numbers: Vec<u32> =
            failed_pages.iter().map(|p| p.page_number).collect();
        failed_page_numbers.sort_unstable();

        let page_count = record
            .page_count
            .filter(|c| *c > 0)
            .map(u64::from)
            .unwrap_or(pages.len() as u64);

        Ok(Some(BatchStatusReport {
            upload_id: batch_id,
            status: record.status,
            filename: record.batch.source_filename.clone(),
            log_type: record.batch.logbook_type.clone(),
            upload_type: record.batch.upload_type,
            page_count,
            completed_pages: completed,
            failed_pages: failed_pages.len() as u64,
            needs_review_pages: needs_review,
            failed_page_numbers,
            created_at: record.created_at,
        }))
    }

    async fn insert_page(&self, page: &NewPage) -> Result<Uuid, StoreError> {
        let mut inner = self.lock();
        let id = Uuid::new_v4();
        inner.pages.insert(
            id,
            PageRecord {
                id,
                batch_id: page.batch_id,
                page_number: page.page_number,
                image_key: page.image_key.clone(),
                status: ExtractionStatus::Pending,
                needs_review: false,
                raw_extraction: None,
                page_type: None,
                extraction_model: None,
            },
        );
        Ok(id)
    }

    async fn find_page(
        &self,
        batch_id: Uuid,
        page_number: u32,
    ) -> Result<Option<Uuid>, StoreError> {
        Ok(self
            .lock()
            .pages
            .values()
            .find(|p| p.batch_id == batch_id && p.page_number == page_number)
            .map(|p| p.id))
    }

    async fn page_extraction_status(
        &self,
        page_id: Uuid,
    ) -> Result<Option<ExtractionStatus>, StoreError> {
        Ok(self.lock().pages.get(&page_id).map(|p| p.status))
    }

    async fn set_page_status(
        &self,
        page_id: Uuid,
        status: ExtractionStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(page) = inner.pages.get_mut(&page_id) {
            page.status = status;
        }
        Ok(())
    }

    async fn store_page_extraction(
        &self,
        page_id: Uuid,
        raw_extraction: &serde_json::Value,
        page_type: &str,
        extraction_model: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(page) = inner.pages.get_mut(&page_id) {
            page.raw_extraction = Some(raw_extraction.clone());
            page.page_type = Some(page_type.to_string());
            page.extraction_model = Some(extraction_model.to_string());
        }
        Ok(())
    }

    async fn complete_page(&self, page_id: Uuid, needs_review: bool) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(page) = inner.pages.get_mut(&page_id) {
            page.status = ExtractionStatus::Completed;
            page.needs_review = needs_review;
        }
        Ok(())
    }

    async fn page_counts(&self, batch_id: Uuid) -> Result<PageCounts, StoreError> {
        let inner = self.lock();
        let mut counts = PageCounts::default();
        for page in inner.pages.values().filter(|p| p.batch_id == batch_id) {
            counts.total += 1;
            match page.status {
                ExtractionStatus::Completed | ExtractionStatus::Skipped => counts.done += 1,
                ExtractionStatus::Failed => counts.failed += 1,
                ExtractionStatus::Pending | ExtractionStatus::Processing => {}
            }
        }
        Ok(counts)
    }

    async fn insert_entry(&self, entry: &NewEntry) -> Result<Uuid, StoreError> {
        let mut inner = self.lock();
        let id = Uuid::new_v4();
        inner.entries.push(StoredEntry {
            id,
            entry: entry.clone(),
            review_status: ReviewStatus::Pending,
        });
        Ok(id)
    }

    async fn insert_parts_action(
        &self,
        entry_id: Uuid,
        action: &NewPartsAction,
    ) -> Result<(), StoreError> {
        self.lock().parts.push((entry_id, action.clone()));
        Ok(())
    }

    async fn insert_ad_compliance(
        &self,
        entry_id: Uuid,
        _aircraft_id: Uuid,
        compliance: &NewAdCompliance,
    ) -> Result<(), StoreError> {
        self.lock().compliances.push((entry_id, compliance.clone()));
        Ok(())
    }

    async fn insert_inspection_record(
        &self,
        entry_id: Uuid,
        _aircraft_id: Uuid,
        record: &NewInspectionRecord,
    ) -> Result<(), StoreError> {
        self.lock().inspections.push((entry_id, record.clone()));
        Ok(())
    }

    async fn upsert_narrative_embedding(
        &self,
        entry_id: Uuid,
        vector: &[f32],
        chunk_text: &str,
    ) -> Result<(), StoreError> {
        self.lock().embeddings.insert(
            (entry_id, "narrative".to_string()),
            EmbeddingRecord {
                vector: vector.to_vec(),
                chunk_text: chunk_text.to_string(),
            },
        );
        Ok(())
    }

    async fn list_entries(
        &self,
        aircraft_id: Uuid,
        filter: &EntryFilter,
    ) -> Result<EntryListing, StoreError> {
        let (page, limit, offset) = filter.pagination();
        let inner = self.lock();

        let mut matching: Vec<&StoredEntry> = inner
            .entries
            .iter()
            .filter(|e| e.entry.aircraft_id == aircraft_id)
            .filter(|e| {
                filter
                    .entry_type
                    .as_ref()
                    .is_none_or(|t| &e.entry.entry_type == t)
            })
            .filter(|e| filter.date_from.is_none_or(|d| e.entry.entry_date >= d))
            .filter(|e| filter.date_to.is_none_or(|d| e.entry.entry_date <= d))
            .filter(|e| filter.needs_review != Some(true) || e.entry.needs_review)
            .collect();
        matching.sort_by(|a, b| b.entry.entry_date.cmp(&a.entry.entry_date));

        let total = matching.len() as u64;
        let entries = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|e| EntrySummary {
                id: e.id,
                entry_type: e.entry.entry_type.clone(),
                entry_date: e.entry.entry_date,
                hobbs_time: e.entry.hobbs_time,
                tach_time: e.entry.tach_time,
                flight_time: e.entry.flight_time,
                shop_name: e.entry.shop_name.clone(),
                mechanic_name: e.entry.mechanic_name.clone(),
                maintenance_narrative: e.entry.maintenance_narrative.clone(),
                confidence_score: e.entry.confidence_score,
                needs_review: e.entry.needs_review,
                review_status: e.review_status,
                missing_data: e.entry.missing_data.clone(),
                extraction_notes: e.entry.extraction_notes.clone(),
            })
            .collect();

        Ok(EntryListing {
            entries,
            total,
            page,
            limit,
        })
    }

    async fn update_entry_review(
        &self,
        aircraft_id: Uuid,
        entry_id: Uuid,
        update: &ReviewUpdate,
    ) -> Result<bool, StoreError> {
        if update.is_empty() {
            return Ok(false);
        }
        let mut inner = self.lock();
        let Some(stored) = inner
            .entries
            .iter_mut()
            .find(|e| e.id == entry_id && e.entry.aircraft_id == aircraft_id)
        else {
            return Ok(false);
        };

        if let Some(date) = update.entry_date {
            stored.entry.entry_date = date;
        }
        if let Some(narrative) = &update.maintenance_narrative {
            stored.entry.maintenance_narrative = narrative.clone();
        }
        if let Some(shop_name) = &update.shop_name {
            stored.entry.shop_name = shop_name.clone();
        }
        if let Some(mechanic_name) = &update.mechanic_name {
            stored.entry.mechanic_name = mechanic_name.clone();
        }
        if let Some(work_order) = &update.work_order_number {
            stored.entry.work_order_number = work_order.clone();
        }
        if let Some(hobbs) = update.hobbs_time {
            stored.entry.hobbs_time = Some(hobbs);
        }
        if let Some(tach) = update.tach_time {
            stored.entry.tach_time = Some(tach);
        }
        if let Some(flight) = update.flight_time {
            stored.entry.flight_time = Some(flight);
        }
        if let Some(status) = update.review_status {
            stored.review_status = status;
            if matches!(status, ReviewStatus::Approved | ReviewStatus::Rejected) {
                stored.entry.needs_review = false;
            }
        }
        Ok(true)
    }

    async fn similar_entries(
        &self,
        aircraft_id: Uuid,
        query_vector: &[f32],
        limit: u32,
    ) -> Result<Vec<RetrievedEntry>, StoreError> {
        let inner = self.lock();
        let mut hits: Vec<RetrievedEntry> = Vec::new();

        for ((entry_id, chunk_type), embedding) in &inner.embeddings {
            let Some(stored) = inner.entries.iter().find(|e| e.id == *entry_id) else {
                continue;
            };
            if stored.entry.aircraft_id != aircraft_id {
                continue;
            }
            let inspection_type = inner
                .inspections
                .iter()
                .find(|(id, _)| id == entry_id)
                .map(|(_, r)| r.inspection_type.clone());

            hits.push(RetrievedEntry {
                entry_id: *entry_id,
                entry_date: stored.entry.entry_date,
                entry_type: stored.entry.entry_type.clone(),
                inspection_type,
                maintenance_narrative: stored.entry.maintenance_narrative.clone(),
                chunk_text: embedding.chunk_text.clone(),
                chunk_type: chunk_type.clone(),
                similarity: cosine_similarity(query_vector, &embedding.vector),
            });
        }

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit as usize);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_entry(aircraft_id: Uuid, date: &str) -> NewEntry {
        NewEntry {
            aircraft_id,
            page_id: Uuid::new_v4(),
            entry_type: "maintenance".into(),
            entry_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("valid date"),
            hobbs_time: None,
            tach_time: None,
            flight_time: None,
            time_since_overhaul: None,
            shop_name: String::new(),
            shop_address: String::new(),
            shop_phone: String::new(),
            repair_station_number: String::new(),
            mechanic_name: String::new(),
            mechanic_certificate: String::new(),
            work_order_number: String::new(),
            maintenance_narrative: "Replaced oil filter, serviced engine.".into(),
            confidence_score: Some(0.95),
            needs_review: false,
            missing_data: Vec::new(),
            extraction_notes: String::new(),
        }
    }

    #[tokio::test]
    async fn aircraft_upsert_is_idempotent() {
        let store = MemStore::new();
        let first = store.upsert_aircraft("N123AB").await.expect("upsert");
        let second = store.upsert_aircraft("N123AB").await.expect("upsert");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn terminal_batch_is_not_reopened_by_guarded_transition() {
        let store = MemStore::new();
        let aircraft_id = store.upsert_aircraft("N1").await.expect("upsert");
        let batch_id = Uuid::new_v4();
        store
            .insert_batch(&NewBatch {
                id: batch_id,
                aircraft_id,
                logbook_type: "airframe".into(),
                upload_type: crate::models::UploadType::Pdf,
                source_filename: "log.pdf".into(),
                s3_key: None,
                page_count: None,
            })
            .await
            .expect("insert batch");

        store
            .finish_batch(batch_id, BatchStatus::Completed)
            .await
            .expect("finish");
        store
            .set_batch_processing(batch_id, true)
            .await
            .expect("guarded transition");
        assert_eq!(store.batch_status(batch_id), Some(BatchStatus::Completed));
    }

    #[tokio::test]
    async fn review_approval_clears_needs_review() {
        let store = MemStore::new();
        let aircraft_id = store.upsert_aircraft("N1").await.expect("upsert");
        let mut entry = sample_entry(aircraft_id, "2024-01-15");
        entry.needs_review = true;
        let entry_id = store.insert_entry(&entry).await.expect("insert");

        let updated = store
            .update_entry_review(
                aircraft_id,
                entry_id,
                &ReviewUpdate {
                    review_status: Some(ReviewStatus::Approved),
                    ..Default::default()
                },
            )
            .await
            .expect("update");
        assert!(updated);

        let stored = &store.entries()[0];
        assert_eq!(stored.review_status, ReviewStatus::Approved);
        assert!(!stored.entry.needs_review);
    }

    #[tokio::test]
    async fn listing_filters_by_needs_review_and_paginates() {
        let store = MemStore::new();
        let aircraft_id = store.upsert_aircraft("N1").await.expect("upsert");
        for (date, flagged) in [("2024-01-01", true), ("2024-02-01", false), ("2024-03-01", true)]
        {
            let mut entry = sample_entry(aircraft_id, date);
            entry.needs_review = flagged;
            store.insert_entry(&entry).await.expect("insert");
        }

        let listing = store
            .list_entries(
                aircraft_id,
                &EntryFilter {
                    needs_review: Some(true),
                    ..Default::default()
                },
            )
            .await
            .expect("list");
        assert_eq!(listing.total, 2);
        // Newest first.
        assert_eq!(
            listing.entries[0].entry_date,
            NaiveDate::parse_from_str("2024-03-01", "%Y-%m-%d").expect("date")
        );
    }

    #[tokio::test]
    async fn similarity_orders_by_cosine() {
        let store = MemStore::new();
        let aircraft_id = store.upsert_aircraft("N1").await.expect("upsert");
        let near = store
            .insert_entry(&sample_entry(aircraft_id, "2024-01-01"))
            .await
            .expect("insert");
        let far = store
            .insert_entry(&sample_entry(aircraft_id, "2024-02-01"))
            .await
            .expect("insert");

        store
            .upsert_narrative_embedding(near, &[1.0, 0.0, 0.0], "near text")
            .await
            .expect("embed");
        store
            .upsert_narrative_embedding(far, &[0.0, 1.0, 0.0], "far text")
            .await
            .expect("embed");

        let hits = store
            .similar_entries(aircraft_id, &[1.0, 0.1, 0.0], 10)
            .await
            .expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entry_id, near);
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[tokio::test]
    async fn embedding_upsert_replaces_existing_chunk() {
        let store = MemStore::new();
        let aircraft_id = store.upsert_aircraft("N1").await.expect("upsert");
        let entry_id = store
            .insert_entry(&sample_entry(aircraft_id, "2024-01-01"))
            .await
            .expect("insert");

        store
            .upsert_narrative_embedding(entry_id, &[1.0], "old")
            .await
            .expect("embed");
        store
            .upsert_narrative_embedding(entry_id, &[2.0], "new")
            .await
            .expect("embed");

        assert_eq!(store.embedding_count(), 1);
        let (vector, text) = store.narrative_embedding(entry_id).expect("present");
        assert_eq!(vector, vec![2.0]);
        assert_eq!(text, "new");
    }
}
