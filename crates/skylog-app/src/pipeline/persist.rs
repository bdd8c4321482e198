//! Entry persistence.
//!
//! Normalizes an extracted entry into the closed vocabularies and writes the
//! entry row plus its children. Child-row failures (parts, AD compliance,
//! inspection record, embedding) are warnings; only the entry insert itself
//! is fatal for the entry, and even then the rest of the page continues.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{normalize_action, normalize_entry_type, normalize_inspection_type,
    normalize_method, ExtractedEntry};
use crate::services::model::EmbeddingModel;
use crate::services::store::{
    NewAdCompliance, NewEntry, NewInspectionRecord, NewPartsAction, Store, StoreError,
};

/// Narratives at or below this length carry no searchable content.
const MIN_EMBEDDABLE_NARRATIVE: usize = 10;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Persist one extracted entry. Returns `Ok(None)` when the entry is dropped
/// (no usable date), `Ok(Some(id))` once the entry row exists.
pub async fn persist_entry(
    store: &dyn Store,
    embedder: Option<&dyn EmbeddingModel>,
    aircraft_id: Uuid,
    page_id: Uuid,
    entry: &mut ExtractedEntry,
) -> Result<Option<Uuid>, StoreError> {
    normalize_entry_type(entry);

    if entry.date.is_empty() {
        tracing::info!(
            narrative = %truncate(&entry.maintenance_narrative, 80),
            "skipping entry with no date"
        );
        return Ok(None);
    }

    let entry_date = match NaiveDate::parse_from_str(&entry.date, DATE_FORMAT) {
        Ok(date) => date,
        Err(err) => {
            tracing::warn!(date = %entry.date, error = %err, "skipping entry with unparseable date");
            return Ok(None);
        }
    };

    let entry_id = store
        .insert_entry(&NewEntry {
            aircraft_id,
            page_id,
            entry_type: entry.entry_type.clone(),
            entry_date,
            hobbs_time: entry.hobbs_time,
            tach_time: entry.tach_time,
            flight_time: entry.flight_time,
            time_since_overhaul: entry.time_since_overhaul,
            shop_name: entry.shop_name.clone(),
            shop_address: entry.shop_address.clone(),
            shop_phone: entry.shop_phone.clone(),
            repair_station_number: entry.repair_station_number.clone(),
            mechanic_name: entry.mechanic_name.clone(),
            mechanic_certificate: entry.mechanic_certificate.clone(),
            work_order_number: entry.work_order_number.clone(),
            maintenance_narrative: entry.maintenance_narrative.clone(),
            confidence_score: entry.confidence,
            needs_review: entry.needs_review,
            missing_data: entry.missing_data.clone(),
            extraction_notes: entry.extraction_notes.clone(),
        })
        .await?;

    for part in &entry.parts_actions {
        let action = NewPartsAction {
            action: normalize_action(&part.action).to_string(),
            part_name: part.part_name.clone(),
            part_number: part.part_number.clone(),
            serial_number: part.serial_number.clone(),
            old_part_number: part.old_part_number.clone(),
            old_serial_number: part.old_serial_number.clone(),
            quantity: part.quantity.unwrap_or(1),
            notes: part.notes.clone(),
        };
        if let Err(err) = store.insert_parts_action(entry_id, &action).await {
            tracing::warn!(%entry_id, error = %err, "insert parts action failed");
        }
    }

    for compliance in &entry.ad_compliance {
        let record = NewAdCompliance {
            ad_number: compliance.ad_number.clone(),
            compliance_date: entry_date,
            method: normalize_method(&compliance.method).map(|m| m.to_string()),
            notes: compliance.notes.clone(),
        };
        if let Err(err) = store
            .insert_ad_compliance(entry_id, aircraft_id, &record)
            .await
        {
            tracing::warn!(%entry_id, error = %err, "insert AD compliance failed");
        }
    }

    if !entry.inspection_type.is_empty() {
        let record = NewInspectionRecord {
            inspection_type: normalize_inspection_type(&entry.inspection_type).to_string(),
            inspection_date: entry_date,
            aircraft_hours: entry.flight_time,
            far_reference: entry.far_reference.clone(),
            inspector_name: entry.mechanic_name.clone(),
            inspector_certificate: entry.mechanic_certificate.clone(),
        };
        if let Err(err) = store
            .insert_inspection_record(entry_id, aircraft_id, &record)
            .await
        {
            tracing::warn!(%entry_id, error = %err, "insert inspection record failed");
        }
    }

    if entry.maintenance_narrative.len() > MIN_EMBEDDABLE_NARRATIVE {
        if let Some(embedder) = embedder {
            match embedder.embed(&entry.maintenance_narrative).await {
                Ok(vector) => {
                    if let Err(err) = store
                        .upsert_narrative_embedding(entry_id, &vector, &entry.maintenance_narrative)
                        .await
                    {
                        tracing::warn!(%entry_id, error = %err, "store narrative embedding failed");
                    }
                }
                Err(err) => {
                    tracing::warn!(%entry_id, error = %err, "narrative embedding generation failed");
                }
            }
        }
    }

    Ok(Some(entry_id))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdComplianceRecord, PartsActionRecord};
    use crate::services::model::ModelError;
    use crate::services::store::MemStore;
    use async_trait::async_trait;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingModel for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ModelError> {
            Ok(vec![0.5, 0.5, 0.5])
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingModel for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ModelError> {
            Err(ModelError::Empty)
        }
    }

    fn base_entry() -> ExtractedEntry {
        ExtractedEntry {
            date: "2024-01-15".into(),
            maintenance_narrative: "Drained oil, replaced filter, serviced engine.".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn entry_without_date_is_dropped() {
        let store = MemStore::new();
        let aircraft_id = store.upsert_aircraft("N1").await.expect("upsert");
        let mut entry = base_entry();
        entry.date = String::new();

        let result = persist_entry(&store, None, aircraft_id, Uuid::new_v4(), &mut entry)
            .await
            .expect("persist");
        assert_eq!(result, None);
        assert!(store.entries().is_empty());
    }

    #[tokio::test]
    async fn long_narrative_gets_exactly_one_embedding() {
        let store = MemStore::new();
        let aircraft_id = store.upsert_aircraft("N1").await.expect("upsert");
        let mut entry = base_entry();

        let entry_id = persist_entry(&store, Some(&FixedEmbedder), aircraft_id, Uuid::new_v4(), &mut entry)
            .await
            .expect("persist")
            .expect("inserted");

        assert_eq!(store.embedding_count(), 1);
        let (vector, text) = store.narrative_embedding(entry_id).expect("embedding row");
        assert_eq!(vector.len(), 3);
        assert_eq!(text, "Drained oil, replaced filter, serviced engine.");
    }

    #[tokio::test]
    async fn short_narrative_is_not_embedded() {
        let store = MemStore::new();
        let aircraft_id = store.upsert_aircraft("N1").await.expect("upsert");
        let mut entry = base_entry();
        entry.maintenance_narrative = "Oil chg".into();

        persist_entry(&store, Some(&FixedEmbedder), aircraft_id, Uuid::new_v4(), &mut entry)
            .await
            .expect("persist")
            .expect("inserted");
        assert_eq!(store.embedding_count(), 0);
    }

    #[tokio::test]
    async fn embedding_failure_keeps_the_entry() {
        let store = MemStore::new();
        let aircraft_id = store.upsert_aircraft("N1").await.expect("upsert");
        let mut entry = base_entry();

        let result = persist_entry(
            &store,
            Some(&FailingEmbedder),
            aircraft_id,
            Uuid::new_v4(),
            &mut entry,
        )
        .await
        .expect("persist");
        assert!(result.is_some());
        assert_eq!(store.embedding_count(), 0);
        assert_eq!(store.entries().len(), 1);
    }

    #[tokio::test]
    async fn parts_actions_are_normalized_with_default_quantity() {
        let store = MemStore::new();
        let aircraft_id = store.upsert_aircraft("N1").await.expect("upsert");
        let mut entry = base_entry();
        entry.parts_actions = vec![
            PartsActionRecord {
                action: "serviced".into(),
                part_name: "oil filter".into(),
                ..Default::default()
            },
            PartsActionRecord {
                action: String::new(),
                part_name: "spark plug".into(),
                quantity: Some(8),
                ..Default::default()
            },
        ];

        let entry_id = persist_entry(&store, None, aircraft_id, Uuid::new_v4(), &mut entry)
            .await
            .expect("persist")
            .expect("inserted");

        let parts = store.parts_for(entry_id);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].action, "repaired");
        assert_eq!(parts[0].quantity, 1);
        assert_eq!(parts[1].action, "installed");
        assert_eq!(parts[1].quantity, 8);
    }

    #[tokio::test]
    async fn ad_methods_outside_vocabulary_become_other() {
        let store = MemStore::new();
        let aircraft_id = store.upsert_aircraft("N1").await.expect("upsert");
        let mut entry = base_entry();
        entry.ad_compliance = vec![AdComplianceRecord {
            ad_number: "2020-06-14".into(),
            method: "complied per note".into(),
            notes: String::new(),
        }];

        let entry_id = persist_entry(&store, None, aircraft_id, Uuid::new_v4(), &mut entry)
            .await
            .expect("persist")
            .expect("inserted");

        let compliances = store.compliances_for(entry_id);
        assert_eq!(compliances.len(), 1);
        assert_eq!(compliances[0].method.as_deref(), Some("other"));
        assert_eq!(compliances[0].compliance_date.to_string(), "2024-01-15");
    }

    #[tokio::test]
    async fn legacy_annual_alias_produces_inspection_record() {
        let store = MemStore::new();
        let aircraft_id = store.upsert_aircraft("N1").await.expect("upsert");
        let mut entry = base_entry();
        entry.entry_type = "annual".into();
        entry.mechanic_name = "J. Smith".into();
        entry.mechanic_certificate = "A&P 1234567".into();

        let entry_id = persist_entry(&store, None, aircraft_id, Uuid::new_v4(), &mut entry)
            .await
            .expect("persist")
            .expect("inserted");

        let stored = &store.entries()[0];
        assert_eq!(stored.entry.entry_type, "inspection");

        let inspections = store.inspections_for(entry_id);
        assert_eq!(inspections.len(), 1);
        assert_eq!(inspections[0].inspection_type, "annual");
        assert_eq!(inspections[0].inspector_name, "J. Smith");
    }

    #[tokio::test]
    async fn unparseable_date_is_dropped_with_warning() {
        let store = MemStore::new();
        let aircraft_id = store.upsert_aircraft("N1").await.expect("upsert");
        let mut entry = base_entry();
        entry.date = "January 15th".into();

        let result = persist_entry(&store, None, aircraft_id, Uuid::new_v4(), &mut entry)
            .await
            .expect("persist");
        assert_eq!(result, None);
        assert!(store.entries().is_empty());
    }
}
