//! The four-stage ingestion pipeline and its pure helpers.
//!
//! Stages (`intake`, `split`, `analyze`, `worker`) orchestrate IO through
//! the capability traits in `crate::services`; `extract`, `identity`,
//! `persist`, and `prompts` hold the per-slice and per-entry logic they
//! compose.

pub mod analyze;
pub mod extract;
pub mod identity;
pub mod intake;
pub mod persist;
pub mod prompts;
pub mod split;
pub mod worker;

pub use analyze::{AnalyzeError, AnalyzeService};
pub use extract::{extract_and_verify, strip_markdown_fences, SliceExtraction};
pub use identity::{check_aircraft_identity, fuzzy_match, normalize, IDENTITY_MISMATCH_TAG};
pub use intake::{
    IntakeError, IntakeService, UploadFile, UploadRequest, UploadResponse, UploadResponseFile,
};
pub use persist::persist_entry;
pub use split::{SplitError, SplitService};
pub use worker::run_analyze_worker;
