//! End-to-end pipeline runs against the local capability implementations:
//! in-memory store, filesystem object store, in-memory queue, scripted
//! models.

mod helpers;

use std::sync::Arc;

use tempfile::TempDir;

use helpers::{
    extraction_response, extraction_with_serial, qa_pass_response, FakeRasterizer, KeyedVision,
    StaticEmbedder, StaticVision,
};
use skylog_app::models::BatchStatus;
use skylog_app::pipeline::{
    run_analyze_worker, AnalyzeService, IntakeService, SplitService, UploadFile, UploadRequest,
    IDENTITY_MISMATCH_TAG,
};
use skylog_app::services::answers::{answer_question, NO_RECORDS_ANSWER};
use skylog_app::services::object_store::{FsObjectStore, ObjectStore};
use skylog_app::services::queue::{InMemoryQueue, WorkQueue};
use skylog_app::services::store::{MemStore, Store};

struct Rig {
    _dir: TempDir,
    store: Arc<MemStore>,
    objects: Arc<FsObjectStore>,
    queue: Arc<InMemoryQueue>,
}

impl Rig {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let objects = Arc::new(FsObjectStore::new(dir.path()));
        Self {
            _dir: dir,
            store: Arc::new(MemStore::new()),
            objects,
            queue: Arc::new(InMemoryQueue::new()),
        }
    }

    fn intake(&self) -> IntakeService {
        IntakeService::new(self.store.clone(), self.objects.clone(), None)
    }

    fn split(&self, rasterizer: FakeRasterizer) -> SplitService {
        SplitService::new(
            self.store.clone(),
            self.objects.clone(),
            self.queue.clone(),
            Arc::new(rasterizer),
        )
    }

    fn analyze(&self, extractor: Arc<KeyedVision>) -> Arc<AnalyzeService> {
        Arc::new(AnalyzeService::new(
            self.store.clone(),
            self.objects.clone(),
            extractor,
            Some(Arc::new(StaticVision(qa_pass_response()))),
            Some(Arc::new(StaticEmbedder(vec![0.1, 0.2, 0.3]))),
            "gemini-2.5-flash",
        ))
    }
}

fn upload_request(tail: &str, filenames: &[&str]) -> UploadRequest {
    UploadRequest {
        tail_number: tail.into(),
        log_type: "airframe".into(),
        files: filenames
            .iter()
            .map(|f| UploadFile {
                filename: (*f).into(),
            })
            .collect(),
    }
}

#[tokio::test]
async fn pdf_two_page_upload_flows_to_completed_batch() {
    let rig = Rig::new();

    // Intake: one PDF, one presigned URL.
    let response = rig
        .intake()
        .handle_upload(upload_request("N123AB", &["log.pdf"]))
        .await
        .expect("intake");
    assert_eq!(response.upload_type.as_ref(), "pdf");
    assert_eq!(response.files.len(), 1);
    let batch_id = response.upload_id;

    // Simulated client PUT, then the object-created event.
    rig.objects
        .put(&response.files[0].s3_key, "application/pdf", b"%PDF-1.4")
        .await
        .expect("client put");
    rig.split(FakeRasterizer(vec![b"page-one".to_vec(), b"page-two".to_vec()]))
        .handle_object_created(&response.files[0].s3_key)
        .await
        .expect("split");

    assert_eq!(rig.store.batch_status(batch_id), Some(BatchStatus::Processing));
    assert_eq!(rig.queue.len(), 2);

    // Analyze both pages. The page bodies are not decodable images, so the
    // slicer falls back to a single full-page slice per page.
    let extractor = Arc::new(KeyedVision::new(
        vec![
            (
                b"page-one".to_vec(),
                extraction_response("2024-01-15", "Replaced oil filter and serviced engine."),
            ),
            (
                b"page-two".to_vec(),
                extraction_response("2024-01-16", "Performed compression check on all cylinders."),
            ),
        ],
        r#"{"pageType":"blank","entries":[]}"#,
    ));
    run_analyze_worker(rig.analyze(extractor), rig.queue.clone(), 5)
        .await
        .expect("worker");

    // Two entries, correct dates, batch completed.
    let entries = rig.store.entries();
    assert_eq!(entries.len(), 2);
    let mut dates: Vec<String> = entries
        .iter()
        .map(|e| e.entry.entry_date.to_string())
        .collect();
    dates.sort();
    assert_eq!(dates, vec!["2024-01-15", "2024-01-16"]);
    assert_eq!(rig.store.batch_status(batch_id), Some(BatchStatus::Completed));

    // Narratives were long enough to embed.
    assert_eq!(rig.store.embedding_count(), 2);

    let report = rig
        .store
        .batch_status_report(batch_id)
        .await
        .expect("report")
        .expect("present");
    assert_eq!(report.completed_pages, 2);
    assert_eq!(report.failed_pages, 0);
    assert_eq!(report.page_count, 2);
}

#[tokio::test]
async fn multi_image_upload_flows_through_page_arrival_path() {
    let rig = Rig::new();

    let response = rig
        .intake()
        .handle_upload(upload_request("N777XY", &["a.jpg", "b.jpg", "c.jpg"]))
        .await
        .expect("intake");
    assert_eq!(response.upload_type.as_ref(), "multi_image");
    assert_eq!(response.page_count, Some(3));
    let batch_id = response.upload_id;

    // Client PUTs each page image; every arrival re-enters the pipeline.
    let split = rig.split(FakeRasterizer(vec![]));
    for (i, file) in response.files.iter().enumerate() {
        let body = format!("image-{}", i + 1);
        rig.objects
            .put(&file.s3_key, "image/jpeg", body.as_bytes())
            .await
            .expect("client put");
        split
            .handle_object_created(&file.s3_key)
            .await
            .expect("page arrival");
    }
    assert_eq!(rig.queue.len(), 3);

    let extractor = Arc::new(KeyedVision::new(
        vec![],
        extraction_response("2023-11-02", "Installed new ELT battery, ops check good."),
    ));
    run_analyze_worker(rig.analyze(extractor), rig.queue.clone(), 5)
        .await
        .expect("worker");

    assert_eq!(rig.store.entries().len(), 3);
    assert_eq!(rig.store.batch_status(batch_id), Some(BatchStatus::Completed));
}

#[tokio::test]
async fn undecodable_page_gets_exactly_one_full_image_extraction() {
    let rig = Rig::new();

    let response = rig
        .intake()
        .handle_upload(upload_request("N55FG", &["scan.jpg"]))
        .await
        .expect("intake");
    let file = &response.files[0];

    rig.objects
        .put(&file.s3_key, "image/jpeg", b"definitely not a jpeg")
        .await
        .expect("client put");
    rig.split(FakeRasterizer(vec![]))
        .handle_object_created(&file.s3_key)
        .await
        .expect("page arrival");

    let extractor = Arc::new(KeyedVision::new(
        vec![],
        extraction_response("2022-05-01", "Annual inspection performed per FAR 43 App D."),
    ));
    run_analyze_worker(rig.analyze(extractor.clone()), rig.queue.clone(), 5)
        .await
        .expect("worker");

    // Slicer could not decode, so exactly one extraction call was made,
    // carrying the original bytes.
    assert_eq!(extractor.call_count(), 1);
    assert_eq!(
        extractor.seen.lock().expect("seen")[0],
        b"definitely not a jpeg".to_vec()
    );
    assert_eq!(rig.store.entries().len(), 1);
    assert_eq!(
        rig.store.batch_status(response.upload_id),
        Some(BatchStatus::Completed)
    );
}

#[tokio::test]
async fn identity_mismatch_flags_entry_for_review() {
    let rig = Rig::new();

    let response = rig
        .intake()
        .handle_upload(upload_request("N123AB", &["page.jpg"]))
        .await
        .expect("intake");
    let batch_id = response.upload_id;

    // Authoritative identity arrives from the registry.
    let identity = rig
        .store
        .batch_aircraft_identity(batch_id)
        .await
        .expect("identity");
    rig.store
        .set_aircraft_identity(identity.aircraft_id, "12345", "Cessna", "172S");

    let file = &response.files[0];
    rig.objects
        .put(&file.s3_key, "image/jpeg", b"page-image")
        .await
        .expect("client put");
    rig.split(FakeRasterizer(vec![]))
        .handle_object_created(&file.s3_key)
        .await
        .expect("page arrival");

    let extractor = Arc::new(KeyedVision::new(
        vec![],
        extraction_with_serial("2024-03-10", "Replaced vacuum pump.", "99999"),
    ));
    run_analyze_worker(rig.analyze(extractor), rig.queue.clone(), 5)
        .await
        .expect("worker");

    let entries = rig.store.entries();
    assert_eq!(entries.len(), 1);
    let stored = &entries[0];
    assert!(stored.entry.needs_review);
    assert!(stored
        .entry
        .missing_data
        .contains(&IDENTITY_MISMATCH_TAG.to_string()));
    assert!(stored.entry.extraction_notes.contains("Aircraft identity mismatch"));
}

#[tokio::test]
async fn missing_page_object_yields_completed_with_errors() {
    let rig = Rig::new();

    let response = rig
        .intake()
        .handle_upload(upload_request("N42GH", &["a.jpg", "b.jpg", "c.jpg"]))
        .await
        .expect("intake");
    let batch_id = response.upload_id;

    let split = rig.split(FakeRasterizer(vec![]));
    for (i, file) in response.files.iter().enumerate() {
        // Page 2's upload never lands, but all three events fire.
        if i != 1 {
            rig.objects
                .put(&file.s3_key, "image/jpeg", format!("img-{i}").as_bytes())
                .await
                .expect("client put");
        }
        split
            .handle_object_created(&file.s3_key)
            .await
            .expect("page arrival");
    }

    let extractor = Arc::new(KeyedVision::new(
        vec![],
        extraction_response("2024-06-01", "Lubricated all control surface hinges."),
    ));
    run_analyze_worker(rig.analyze(extractor), rig.queue.clone(), 5)
        .await
        .expect("worker");

    assert_eq!(
        rig.store.batch_status(batch_id),
        Some(BatchStatus::CompletedWithErrors)
    );

    let report = rig
        .store
        .batch_status_report(batch_id)
        .await
        .expect("report")
        .expect("present");
    assert_eq!(report.completed_pages, 2);
    assert_eq!(report.failed_pages, 1);
    assert_eq!(report.failed_page_numbers, vec![2]);
}

#[tokio::test]
async fn redelivered_page_task_does_not_duplicate_entries() {
    let rig = Rig::new();

    let response = rig
        .intake()
        .handle_upload(upload_request("N9GZ", &["only.jpg"]))
        .await
        .expect("intake");
    let file = &response.files[0];
    rig.objects
        .put(&file.s3_key, "image/jpeg", b"the-page")
        .await
        .expect("client put");
    rig.split(FakeRasterizer(vec![]))
        .handle_object_created(&file.s3_key)
        .await
        .expect("page arrival");

    let task = rig.queue.receive().await.expect("receive").expect("task");
    let extractor = Arc::new(KeyedVision::new(
        vec![],
        extraction_response("2024-02-02", "Replaced main tire, torqued axle nut."),
    ));
    let analyze = rig.analyze(extractor);

    analyze.handle(&task).await.expect("first delivery");
    analyze.handle(&task).await.expect("redelivery");

    assert_eq!(rig.store.entries().len(), 1, "redelivery must not duplicate entries");
}

#[tokio::test]
async fn query_after_ingest_cites_sources() {
    let rig = Rig::new();

    let response = rig
        .intake()
        .handle_upload(upload_request("N321CD", &["p.jpg"]))
        .await
        .expect("intake");
    let file = &response.files[0];
    rig.objects
        .put(&file.s3_key, "image/jpeg", b"oil-page")
        .await
        .expect("client put");
    rig.split(FakeRasterizer(vec![]))
        .handle_object_created(&file.s3_key)
        .await
        .expect("page arrival");

    let extractor = Arc::new(KeyedVision::new(
        vec![],
        extraction_response("2024-01-15", "Drained oil, installed new filter, run-up normal."),
    ));
    run_analyze_worker(rig.analyze(extractor), rig.queue.clone(), 5)
        .await
        .expect("worker");

    let answer = answer_question(
        rig.store.as_ref(),
        &StaticEmbedder(vec![0.1, 0.2, 0.3]),
        &StaticVision("The last oil change was 2024-01-15.".into()),
        "N321CD",
        "When was the last oil change?",
    )
    .await
    .expect("answer");
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].date, "2024-01-15");

    // An aircraft with no records gets the fixed empty-state answer.
    rig.store.upsert_aircraft("N999ZZ").await.expect("upsert");
    let empty = answer_question(
        rig.store.as_ref(),
        &StaticEmbedder(vec![0.1, 0.2, 0.3]),
        &StaticVision("unused".into()),
        "N999ZZ",
        "Anything?",
    )
    .await
    .expect("answer");
    assert_eq!(empty.answer, NO_RECORDS_ANSWER);
    assert!(empty.sources.is_empty());
}
