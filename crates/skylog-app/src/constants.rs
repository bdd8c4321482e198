//! Cross-cutting application constants.

/// Default vision model used for slice extraction and RAG synthesis.
pub const DEFAULT_EXTRACTION_MODEL: &str = "gemini-2.5-flash";

/// Default QA verification model. A different provider than the extractor to
/// avoid self-agreement; the extractor is the fallback verifier.
pub const DEFAULT_VERIFICATION_MODEL: &str = "claude-sonnet-4-20250514";

/// Default embedding model for maintenance narratives.
pub const DEFAULT_EMBEDDING_MODEL: &str = "gemini-embedding-001";

/// Dimensionality of narrative embeddings (stored as halfvec).
pub const DEFAULT_EMBEDDING_DIM: usize = 3072;

/// Object-store prefix for raw user uploads: `uploads/<batchId>/<filename>`.
pub const UPLOADS_PREFIX: &str = "uploads";

/// Object-store prefix for normalized page images:
/// `pages/<batchId>/page_<NNNN>.<ext>`.
pub const PAGES_PREFIX: &str = "pages";

/// Object-store prefix for audit copies of entry slices:
/// `slices/<batchId>/page_<NNNN>/slice_<III>.jpg`.
pub const SLICES_PREFIX: &str = "slices";

/// Maximum number of files accepted in a single upload request.
pub const MAX_FILES_PER_UPLOAD: usize = 500;

/// Lifetime of presigned upload/download URLs.
pub const PRESIGN_TTL_SECS: u64 = 3600;

/// Reserved concurrency for the analyze worker, matching the vision model
/// quota.
pub const ANALYZE_CONCURRENCY: usize = 5;

/// Rasterization resolution for PDF pages.
pub const PDF_RENDER_DPI: f32 = 200.0;
