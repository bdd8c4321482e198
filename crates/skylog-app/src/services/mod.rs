//! IO-bound capabilities: storage, queueing, persistence, model providers.
//!
//! Modules here coordinate external systems and must avoid embedding pure
//! transforms. Keep stateless helpers in `crate::slicer`, `crate::models`,
//! or other dedicated modules so concurrency and resource accounting stay
//! localized.

pub mod answers;
pub mod anthropic;
pub mod gemini;
pub mod model;
pub mod object_store;
pub mod queue;
pub mod registry;
pub mod store;

pub use answers::{answer_question, Answer, AnswerError, AnswerSource, NO_RECORDS_ANSWER};
pub use anthropic::AnthropicClient;
pub use gemini::{GeminiClient, GeminiEmbedder, GeminiVisionModel};
pub use model::{
    per_second_limiter, EmbeddingModel, GenerateConfig, GenerativeModel, GenericRateLimiter,
    ModelError, Part,
};
pub use object_store::{
    page_key, slice_key, upload_key, FsObjectStore, ObjectStore, ObjectStoreError,
};
pub use queue::{InMemoryQueue, PageTask, QueueError, WorkQueue};
pub use registry::{enrich_aircraft, FaaRegistryClient, RegistryError, RegistryRecord};
pub use store::{MemStore, PgStore, Store, StoreError};
