//! Question answering over the maintenance history.
//!
//! Embed the question, retrieve the ten closest narrative chunks by cosine
//! distance over the halfvec column, and synthesize an answer grounded only
//! in those records. The top five hits come back as citations.

use serde::Serialize;
use thiserror::Error;

use super::model::{EmbeddingModel, GenerateConfig, GenerativeModel, ModelError, Part};
use super::store::{RetrievedEntry, Store, StoreError};

const RETRIEVAL_LIMIT: u32 = 10;
const SOURCE_LIMIT: usize = 5;
const SYNTHESIS_TEMPERATURE: f32 = 0.2;

pub const NO_RECORDS_ANSWER: &str = "No maintenance records found for this aircraft.";

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("question is required")]
    EmptyQuestion,
    #[error("aircraft {0} not found")]
    AircraftNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSource {
    pub date: String,
    pub entry_type: String,
    pub inspection_type: Option<String>,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub tail_number: String,
    pub question: String,
    pub answer: String,
    pub sources: Vec<AnswerSource>,
}

pub async fn answer_question(
    store: &dyn Store,
    embedder: &dyn EmbeddingModel,
    model: &dyn GenerativeModel,
    tail_number: &str,
    question: &str,
) -> Result<Answer, AnswerError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(AnswerError::EmptyQuestion);
    }

    let tail = tail_number.trim().to_uppercase();
    let aircraft_id = store
        .find_aircraft(&tail)
        .await?
        .ok_or_else(|| AnswerError::AircraftNotFound(tail.clone()))?;

    let query_vector = embedder.embed(question).await?;
    let hits = store
        .similar_entries(aircraft_id, &query_vector, RETRIEVAL_LIMIT)
        .await?;

    if hits.is_empty() {
        return Ok(Answer {
            tail_number: tail,
            question: question.to_string(),
            answer: NO_RECORDS_ANSWER.to_string(),
            sources: Vec::new(),
        });
    }

    let prompt = synthesis_prompt(&tail, question, &hits);
    let answer = model
        .generate(
            &[Part::text(prompt)],
            &GenerateConfig {
                temperature: Some(SYNTHESIS_TEMPERATURE),
                ..Default::default()
            },
        )
        .await?;

    let sources = hits
        .iter()
        .take(SOURCE_LIMIT)
        .map(|hit| AnswerSource {
            date: hit.entry_date.to_string(),
            entry_type: hit.entry_type.clone(),
            inspection_type: hit.inspection_type.clone(),
            similarity: hit.similarity,
        })
        .collect();

    Ok(Answer {
        tail_number: tail,
        question: question.to_string(),
        answer,
        sources,
    })
}

fn synthesis_prompt(tail: &str, question: &str, hits: &[RetrievedEntry]) -> String {
    let context = hits
        .iter()
        .map(|hit| {
            let label = match &hit.inspection_type {
                Some(subtype) => format!("{}/{}", hit.entry_type, subtype),
                None => hit.entry_type.clone(),
            };
            format!("[{}] ({}) {}", hit.entry_date, label, hit.maintenance_narrative)
        })
        .collect::<Vec<_>>()
        .join("\n---\n");

    format!(
        "You are an aircraft maintenance expert assistant. Answer the question based ONLY on \
         the maintenance records provided below.\n\n\
         Aircraft: {tail}\n\n\
         MAINTENANCE RECORDS:\n{context}\n\n\
         QUESTION: {question}\n\n\
         Provide a clear, accurate answer. Cite specific dates and entries. If the records \
         don't contain enough information, say so."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::{MemStore, NewEntry};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use uuid::Uuid;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl EmbeddingModel for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ModelError> {
            Ok(self.0.clone())
        }
    }

    struct EchoModel;

    #[async_trait]
    impl GenerativeModel for EchoModel {
        async fn generate(
            &self,
            parts: &[Part],
            config: &GenerateConfig,
        ) -> Result<String, ModelError> {
            assert_eq!(config.temperature, Some(0.2));
            let prompt = match &parts[0] {
                Part::Text(text) => text.clone(),
                _ => panic!("expected a text prompt"),
            };
            assert!(prompt.contains("MAINTENANCE RECORDS"));
            Ok("The last oil change was on 2024-01-15.".to_string())
        }
    }

    fn entry(aircraft_id: Uuid, date: &str, narrative: &str) -> NewEntry {
        NewEntry {
            aircraft_id,
            page_id: Uuid::new_v4(),
            entry_type: "maintenance".into(),
            entry_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("date"),
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
            maintenance_narrative: narrative.into(),
            confidence_score: None,
            needs_review: false,
            missing_data: Vec::new(),
            extraction_notes: String::new(),
        }
    }

    #[tokio::test]
    async fn no_records_yields_fixed_answer_and_empty_sources() {
        let store = MemStore::new();
        store.upsert_aircraft("N999").await.expect("upsert");

        let answer = answer_question(
            &store,
            &FixedEmbedder(vec![1.0, 0.0]),
            &EchoModel,
            "n999",
            "When was the last annual?",
        )
        .await
        .expect("answer");

        assert_eq!(answer.tail_number, "N999");
        assert_eq!(answer.answer, NO_RECORDS_ANSWER);
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn answers_cite_top_sources() {
        let store = MemStore::new();
        let aircraft_id = store.upsert_aircraft("N123AB").await.expect("upsert");
        let entry_id = store
            .insert_entry(&entry(aircraft_id, "2024-01-15", "Drained oil, replaced filter."))
            .await
            .expect("insert");
        store
            .upsert_narrative_embedding(entry_id, &[1.0, 0.0], "Drained oil, replaced filter.")
            .await
            .expect("embed");

        let answer = answer_question(
            &store,
            &FixedEmbedder(vec![1.0, 0.0]),
            &EchoModel,
            "N123AB",
            "When was the last oil change?",
        )
        .await
        .expect("answer");

        assert!(answer.answer.contains("2024-01-15"));
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].date, "2024-01-15");
    }

    #[tokio::test]
    async fn unknown_aircraft_is_an_error() {
        let store = MemStore::new();
        let err = answer_question(
            &store,
            &FixedEmbedder(vec![1.0]),
            &EchoModel,
            "N404",
            "anything?",
        )
        .await
        .expect_err("must fail");
        assert!(matches!(err, AnswerError::AircraftNotFound(_)));
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let store = MemStore::new();
        let err = answer_question(&store, &FixedEmbedder(vec![1.0]), &EchoModel, "N1", "  ")
            .await
            .expect_err("must fail");
        assert!(matches!(err, AnswerError::EmptyQuestion));
    }
}
