//! Table-aware hybrid retrieval for document corpora where the facts live
//! in tables: rate schedules, allowance levels, per-location figures.
//!
//! The pipeline: detect and extract table structure at ingestion, split
//! with headers preserved across row-capped parts, retrieve with BM25 and
//! embeddings fused by reciprocal rank, then rerank with table-aware
//! signals so a query like "breakfast rate in Ottawa" surfaces the cell,
//! not the prose around it.

pub mod answer;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod processing;
pub mod providers;
pub mod query;
pub mod ranking;
pub mod search;
pub mod types;

// Re-export primary types for convenience
pub use answer::{Answer, SourceAttribution};
pub use config::{RagConfig, SplitStrategy};
pub use engine::{EngineStats, IngestRequest, RagEngine};
pub use error::{RagError, RetryPolicy};
pub use providers::{CompletionProvider, EmbeddingProvider, VectorIndex};
pub use types::{
    Chunk, ContentType, IndexReceipt, MetadataFilter, QueryOutcome, RankedResult, RetrievalMode,
    SourceRecord, TableStructure,
};

pub use uuid::Uuid;
