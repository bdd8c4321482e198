//! Skylog digitizes scanned aircraft maintenance logbooks into a queryable
//! structured database.
//!
//! Uploads flow through four event-driven stages: intake validates the
//! request and mints presigned PUT URLs, split materializes page images
//! (rasterizing PDFs), analyze cuts each page into per-entry strips and
//! transcribes them with a vision model under a QA verification loop, and a
//! rollup drives the batch to its terminal status. Persisted entries get
//! narrative embeddings for retrieval-augmented answering.
//!
//! IO runs behind capability traits (`services`): object store, work queue,
//! persistence, and the model providers, each with a local implementation so
//! the whole pipeline can run against the filesystem in tests and debugging.

pub mod cli;
pub mod config;
pub mod constants;
pub mod media;
pub mod models;
pub mod pdf;
pub mod pipeline;
pub mod services;
pub mod slicer;
