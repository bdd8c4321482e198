//! Postgres implementation of the persistence capability.
//!
//! Statements mirror the production schema: `aircraft`, `upload_batches`,
//! `upload_pages`, `maintenance_entries`, `parts_actions`, `ad_compliance`,
//! `inspection_records`, `maintenance_embeddings` (halfvec column).
//! Embeddings are bound as `[v1,v2,…]` text literals cast to `::halfvec`.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::models::{BatchStatus, ExtractionStatus, ReviewStatus, UploadType};

use super::{
    format_vector, AircraftIdentity, BatchStatusReport, EntryFilter, EntryListing, EntrySummary,
    NewAdCompliance, NewBatch, NewEntry, NewInspectionRecord, NewPage, NewPartsAction, PageCounts,
    RetrievedEntry, ReviewUpdate, Store, StoreError,
};

/// Pool size stays small: each worker invocation is single-flight and the
/// database sits behind a connection-limited serverless proxy.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 2;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await?;
        tracing::info!(max_connections, "database connection pool established");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_column<T: FromStr>(value: String, column: &'static str) -> Result<T, StoreError> {
    T::from_str(&value).map_err(|_| StoreError::Decode { column, value })
}

#[async_trait]
impl Store for PgStore {
    async fn upsert_aircraft(&self, registration: &str) -> Result<Uuid, StoreError> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO aircraft (registration) VALUES ($1)
             ON CONFLICT (registration) DO UPDATE SET updated_at = NOW()
             RETURNING id",
        )
        .bind(registration)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn find_aircraft(&self, registration: &str) -> Result<Option<Uuid>, StoreError> {
        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM aircraft WHERE registration = $1")
            .bind(registration)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn update_aircraft_registry(
        &self,
        aircraft_id: Uuid,
        make: &str,
        model: &str,
        serial_number: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE aircraft SET make = $1, model = $2, serial_number = $3, updated_at = NOW()
             WHERE id = $4",
        )
        .bind(make)
        .bind(model)
        .bind(serial_number)
        .bind(aircraft_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn batch_aircraft_identity(
        &self,
        batch_id: Uuid,
    ) -> Result<AircraftIdentity, StoreError> {
        let row = sqlx::query(
            "SELECT ub.aircraft_id, a.registration,
                    COALESCE(a.serial_number, '') AS serial_number,
                    COALESCE(a.make, '') AS make,
                    COALESCE(a.model, '') AS model
             FROM upload_batches ub
             JOIN aircraft a ON ub.aircraft_id = a.id
             WHERE ub.id = $1",
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("upload batch"))?;

        Ok(AircraftIdentity {
            aircraft_id: row.get("aircraft_id"),
            registration: row.get("registration"),
            serial_number: row.get("serial_number"),
            make: row.get("make"),
            model: row.get("model"),
        })
    }

    async fn insert_batch(&self, batch: &NewBatch) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO upload_batches
             (id, aircraft_id, logbook_type, upload_type, source_filename, s3_key,
              page_count, processing_status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')",
        )
        .bind(batch.id)
        .bind(batch.aircraft_id)
        .bind(&batch.logbook_type)
        .bind(batch.upload_type.as_ref())
        .bind(&batch.source_filename)
        .bind(&batch.s3_key)
        .bind(batch.page_count.map(|c| c as i32))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_batch_processing(
        &self,
        batch_id: Uuid,
        only_if_pending: bool,
    ) -> Result<(), StoreError> {
        let sql = if only_if_pending {
            "UPDATE upload_batches SET processing_status = 'processing', updated_at = NOW()
             WHERE id = $1 AND processing_status = 'pending'"
        } else {
            "UPDATE upload_batches SET processing_status = 'processing', updated_at = NOW()
             WHERE id = $1"
        };
        sqlx::query(sql).bind(batch_id).execute(&self.pool).await?;
        Ok(())
    }

    async fn set_batch_failed(&self, batch_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE upload_batches SET processing_status = 'failed', updated_at = NOW()
             WHERE id = $1",
        )
        .bind(batch_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_batch_page_count(
        &self,
        batch_id: Uuid,
        page_count: u32,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE upload_batches SET page_count = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(page_count as i32)
        .bind(batch_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finish_batch(&self, batch_id: Uuid, status: BatchStatus) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE upload_batches SET processing_status = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(status.as_ref())
        .bind(batch_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn batch_status_report(
        &self,
        batch_id: Uuid,
    ) -> Result<Option<BatchStatusReport>, StoreError> {
        let row = sqlx::query(
            "SELECT ub.id, ub.processing_status, ub.page_count,
                    COALESCE(ub.source_filename, '') AS source_filename,
                    COALESCE(ub.logbook_type, '') AS logbook_type,
                    ub.upload_type, ub.created_at,
                    COUNT(up.id) FILTER (WHERE up.extraction_status = 'completed') AS completed_pages,
                    COUNT(up.id) FILTER (WHERE up.extraction_status = 'failed') AS failed_pages,
                    COUNT(up.id) FILTER (WHERE up.needs_review = TRUE) AS needs_review_pages,
                    COUNT(up.id) AS total_pages
             FROM upload_batches ub
             LEFT JOIN upload_pages up ON up.document_id = ub.id
             WHERE ub.id = $1
             GROUP BY ub.id",
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: BatchStatus =
            parse_column(row.get::<String, _>("processing_status"), "processing_status")?;
        let upload_type: UploadType =
            parse_column(row.get::<String, _>("upload_type"), "upload_type")?;
        let recorded_page_count = row.get::<Option<i32>, _>("page_count").unwrap_or(0);
        let total_pages: i64 = row.get("total_pages");
        let failed_pages: i64 = row.get("failed_pages");

        let failed_page_numbers = if failed_pages > 0 {
            sqlx::query_scalar::<_, i32>(
                "SELECT page_number FROM upload_pages
                 WHERE document_id = $1 AND extraction_status = 'failed'
                 ORDER BY page_number",
            )
            .bind(batch_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|n| n as u32)
            .collect()
        } else {
            Vec::new()
        };

        Ok(Some(BatchStatusReport {
            upload_id: row.get("id"),
            status,
            filename: row.get("source_filename"),
            log_type: row.get("logbook_type"),
            upload_type,
            page_count: if recorded_page_count > 0 {
                recorded_page_count as u64
            } else {
                total_pages as u64
            },
            completed_pages: row.get::<i64, _>("completed_pages") as u64,
            failed_pages: failed_pages as u64,
            needs_review_pages: row.get::<i64, _>("needs_review_pages") as u64,
            failed_page_numbers,
            created_at: row.get("created_at"),
        }))
    }

    async fn insert_page(&self, page: &NewPage) -> Result<Uuid, StoreError> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO upload_pages (document_id, page_number, image_path, extraction_status)
             VALUES ($1, $2, $3, 'pending')
             RETURNING id",
        )
        .bind(page.batch_id)
        .bind(page.page_number as i32)
        .bind(&page.image_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn find_page(
        &self,
        batch_id: Uuid,
        page_number: u32,
    ) -> Result<Option<Uuid>, StoreError> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM upload_pages WHERE document_id = $1 AND page_number = $2",
        )
        .bind(batch_id)
        .bind(page_number as i32)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn page_extraction_status(
        &self,
        page_id: Uuid,
    ) -> Result<Option<ExtractionStatus>, StoreError> {
        let status = sqlx::query_scalar::<_, String>(
            "SELECT extraction_status FROM upload_pages WHERE id = $1",
        )
        .bind(page_id)
        .fetch_optional(&self.pool)
        .await?;
        status
            .map(|s| parse_column(s, "extraction_status"))
            .transpose()
    }

    async fn set_page_status(
        &self,
        page_id: Uuid,
        status: ExtractionStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE upload_pages SET extraction_status = $1 WHERE id = $2")
            .bind(status.as_ref())
            .bind(page_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn store_page_extraction(
        &self,
        page_id: Uuid,
        raw_extraction: &serde_json::Value,
        page_type: &str,
        extraction_model: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE upload_pages
             SET raw_extraction = $1, page_type = $2, extraction_model = $3,
                 extraction_timestamp = NOW()
             WHERE id = $4",
        )
        .bind(raw_extraction)
        .bind(page_type)
        .bind(extraction_model)
        .bind(page_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_page(&self, page_id: Uuid, needs_review: bool) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE upload_pages SET extraction_status = 'completed', needs_review = $1
             WHERE id = $2",
        )
        .bind(needs_review)
        .bind(page_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn page_counts(&self, batch_id: Uuid) -> Result<PageCounts, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE extraction_status IN ('completed', 'skipped')) AS done,
                    COUNT(*) FILTER (WHERE extraction_status = 'failed') AS failed
             FROM upload_pages
             WHERE document_id = $1",
        )
        .bind(batch_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(PageCounts {
            total: row.get::<i64, _>("total") as u64,
            done: row.get::<i64, _>("done") as u64,
            failed: row.get::<i64, _>("failed") as u64,
        })
    }

    async fn insert_entry(&self, entry: &NewEntry) -> Result<Uuid, StoreError> {
        let missing_data = (!entry.missing_data.is_empty()).then_some(&entry.missing_data);
        let id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO maintenance_entries
             (aircraft_id, page_id, entry_type, entry_date, hobbs_time, tach_time,
              flight_time, time_since_overhaul, shop_name, shop_address, shop_phone,
              repair_station_number, mechanic_name, mechanic_certificate,
              work_order_number, maintenance_narrative, confidence_score,
              needs_review, missing_data, extraction_notes)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20)
             RETURNING id",
        )
        .bind(entry.aircraft_id)
        .bind(entry.page_id)
        .bind(&entry.entry_type)
        .bind(entry.entry_date)
        .bind(entry.hobbs_time)
        .bind(entry.tach_time)
        .bind(entry.flight_time)
        .bind(entry.time_since_overhaul)
        .bind(&entry.shop_name)
        .bind(&entry.shop_address)
        .bind(&entry.shop_phone)
        .bind(&entry.repair_station_number)
        .bind(&entry.mechanic_name)
        .bind(&entry.mechanic_certificate)
        .bind(&entry.work_order_number)
        .bind(&entry.maintenance_narrative)
        .bind(entry.confidence_score)
        .bind(entry.needs_review)
        .bind(missing_data)
        .bind(&entry.extraction_notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn insert_parts_action(
        &self,
        entry_id: Uuid,
        action: &NewPartsAction,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO parts_actions
             (entry_id, action_type, part_name, part_number, serial_number,
              old_part_number, old_serial_number, quantity, notes)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(entry_id)
        .bind(&action.action)
        .bind(&action.part_name)
        .bind(&action.part_number)
        .bind(&action.serial_number)
        .bind(&action.old_part_number)
        .bind(&action.old_serial_number)
        .bind(action.quantity as i32)
        .bind(&action.notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_ad_compliance(
        &self,
        entry_id: Uuid,
        aircraft_id: Uuid,
        compliance: &NewAdCompliance,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO ad_compliance
             (entry_id, aircraft_id, ad_number, compliance_date, compliance_method, notes)
             VALUES ($1,$2,$3,$4,$5,$6)",
        )
        .bind(entry_id)
        .bind(aircraft_id)
        .bind(&compliance.ad_number)
        .bind(compliance.compliance_date)
        .bind(&compliance.method)
        .bind(&compliance.notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_inspection_record(
        &self,
        entry_id: Uuid,
        aircraft_id: Uuid,
        record: &NewInspectionRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO inspection_records
             (aircraft_id, entry_id, inspection_type, inspection_date,
              aircraft_hours, far_reference, inspector_name, inspector_certificate)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
        )
        .bind(aircraft_id)
        .bind(entry_id)
        .bind(&record.inspection_type)
        .bind(record.inspection_date)
        .bind(record.aircraft_hours)
        .bind(&record.far_reference)
        .bind(&record.inspector_name)
        .bind(&record.inspector_certificate)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_narrative_embedding(
        &self,
        entry_id: Uuid,
        vector: &[f32],
        chunk_text: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO maintenance_embeddings (entry_id, embedding, chunk_text, chunk_type)
             VALUES ($1, $2::halfvec, $3, 'narrative')
             ON CONFLICT (entry_id, chunk_type)
             DO UPDATE SET embedding = EXCLUDED.embedding, chunk_text = EXCLUDED.chunk_text",
        )
        .bind(entry_id)
        .bind(format_vector(vector))
        .bind(chunk_text)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_entries(
        &self,
        aircraft_id: Uuid,
        filter: &EntryFilter,
    ) -> Result<EntryListing, StoreError> {
        let (page, limit, offset) = filter.pagination();

        let mut count_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) FROM maintenance_entries me WHERE me.aircraft_id = ",
        );
        count_builder.push_bind(aircraft_id);
        push_entry_filters(&mut count_builder, filter);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT me.id, me.entry_type, me.entry_date, me.hobbs_time, me.tach_time,
                    me.flight_time,
                    COALESCE(me.shop_name, '') AS shop_name,
                    COALESCE(me.mechanic_name, '') AS mechanic_name,
                    COALESCE(me.maintenance_narrative, '') AS maintenance_narrative,
                    me.confidence_score, me.needs_review,
                    COALESCE(me.review_status, 'pending') AS review_status,
                    me.missing_data,
                    COALESCE(me.extraction_notes, '') AS extraction_notes
             FROM maintenance_entries me
             WHERE me.aircraft_id = ",
        );
        builder.push_bind(aircraft_id);
        push_entry_filters(&mut builder, filter);
        builder.push(" ORDER BY me.entry_date DESC LIMIT ");
        builder.push_bind(i64::from(limit));
        builder.push(" OFFSET ");
        builder.push_bind(offset as i64);

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let review_status: ReviewStatus =
                parse_column(row.get::<String, _>("review_status"), "review_status")?;
            entries.push(EntrySummary {
                id: row.get("id"),
                entry_type: row.get("entry_type"),
                entry_date: row.get("entry_date"),
                hobbs_time: row.get("hobbs_time"),
                tach_time: row.get("tach_time"),
                flight_time: row.get("flight_time"),
                shop_name: row.get("shop_name"),
                mechanic_name: row.get("mechanic_name"),
                maintenance_narrative: row.get("maintenance_narrative"),
                confidence_score: row.get("confidence_score"),
                needs_review: row.get("needs_review"),
                review_status,
                missing_data: row
                    .get::<Option<Vec<String>>, _>("missing_data")
                    .unwrap_or_default(),
                extraction_notes: row.get("extraction_notes"),
            });
        }

        Ok(EntryListing {
            entries,
            total: total as u64,
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

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE maintenance_entries SET ");
        let mut set = builder.separated(", ");

        if let Some(date) = update.entry_date {
            set.push("entry_date = ");
            set.push_bind_unseparated(date);
        }
        if let Some(narrative) = &update.maintenance_narrative {
            set.push("maintenance_narrative = ");
            set.push_bind_unseparated(narrative.clone());
        }
        if let Some(shop_name) = &update.shop_name {
            set.push("shop_name = ");
            set.push_bind_unseparated(shop_name.clone());
        }
        if let Some(mechanic_name) = &update.mechanic_name {
            set.push("mechanic_name = ");
            set.push_bind_unseparated(mechanic_name.clone());
        }
        if let Some(work_order) = &update.work_order_number {
            set.push("work_order_number = ");
            set.push_bind_unseparated(work_order.clone());
        }
        if let Some(hobbs) = update.hobbs_time {
            set.push("hobbs_time = ");
            set.push_bind_unseparated(hobbs);
        }
        if let Some(tach) = update.tach_time {
            set.push("tach_time = ");
            set.push_bind_unseparated(tach);
        }
        if let Some(flight) = update.flight_time {
            set.push("flight_time = ");
            set.push_bind_unseparated(flight);
        }
        if let Some(status) = update.review_status {
            set.push("review_status = ");
            set.push_bind_unseparated(status.as_ref().to_string());
            set.push("reviewed_at = NOW()");
            if let Some(reviewed_by) = &update.reviewed_by {
                set.push("reviewed_by = ");
                set.push_bind_unseparated(reviewed_by.clone());
            }
            if matches!(status, ReviewStatus::Approved | ReviewStatus::Rejected) {
                set.push("needs_review = FALSE");
            }
        }
        set.push("updated_at = NOW()");
        drop(set);

        builder.push(" WHERE id = ");
        builder.push_bind(entry_id);
        builder.push(" AND aircraft_id = ");
        builder.push_bind(aircraft_id);

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn similar_entries(
        &self,
        aircraft_id: Uuid,
        query_vector: &[f32],
        limit: u32,
    ) -> Result<Vec<RetrievedEntry>, StoreError> {
        let literal = format_vector(query_vector);
        let rows = sqlx::query(
            "SELECT m.id, m.entry_date, m.entry_type,
                    COALESCE(m.maintenance_narrative, '') AS maintenance_narrative,
                    me.chunk_text, me.chunk_type,
                    ir.inspection_type,
                    1 - (me.embedding <=> $1::halfvec) AS similarity
             FROM maintenance_embeddings me
             JOIN maintenance_entries m ON me.entry_id = m.id
             LEFT JOIN inspection_records ir ON ir.entry_id = m.id
             WHERE m.aircraft_id = $2
             ORDER BY me.embedding <=> $1::halfvec
             LIMIT $3",
        )
        .bind(&literal)
        .bind(aircraft_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| RetrievedEntry {
                entry_id: row.get("id"),
                entry_date: row.get("entry_date"),
                entry_type: row.get("entry_type"),
                inspection_type: row.get("inspection_type"),
                maintenance_narrative: row.get("maintenance_narrative"),
                chunk_text: row.get("chunk_text"),
                chunk_type: row.get("chunk_type"),
                similarity: row.get::<f64, _>("similarity"),
            })
            .collect())
    }
}

fn push_entry_filters(builder: &mut QueryBuilder<Postgres>, filter: &EntryFilter) {
    if let Some(entry_type) = &filter.entry_type {
        builder.push(" AND me.entry_type = ");
        builder.push_bind(entry_type.clone());
    }
    if let Some(date_from) = filter.date_from {
        builder.push(" AND me.entry_date >= ");
        builder.push_bind(date_from);
    }
    if let Some(date_to) = filter.date_to {
        builder.push(" AND me.entry_date <= ");
        builder.push_bind(date_to);
    }
    if filter.needs_review == Some(true) {
        builder.push(" AND me.needs_review = TRUE");
    }
}
