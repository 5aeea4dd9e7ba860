//! External collaborator interfaces.
//!
//! The engine's contract with each provider is "text in, vectors or
//! scored candidates out". Failures degrade gracefully at the call sites:
//! a failed sub-retriever is fused around, embedding failures fall back to
//! fixed-size chunking, completion failures fall back to extractive answers.

use async_trait::async_trait;

use crate::error::RagError;
use crate::types::MetadataFilter;

/// Text → fixed-dimension float vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RagError>;

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>, RagError>;

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_document(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize;
}

/// LLM completion, used for multi-query expansion and answer generation.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: usize) -> Result<String, RagError>;
}

/// A vector hit before fusion: chunk id plus similarity score.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
}

/// Nearest-neighbor search by vector with optional metadata filtering.
///
/// Building a new index structure is out of scope; implementations wrap an
/// existing store (or the provided in-memory scan, `InMemoryVectorIndex`).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, chunks: Vec<crate::types::Chunk>) -> Result<(), RagError>;

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorHit>, RagError>;

    async fn get(&self, id: &str) -> Result<Option<crate::types::Chunk>, RagError>;

    async fn delete_by_source(&self, source_id: &str) -> Result<usize, RagError>;

    async fn count(&self) -> Result<usize, RagError>;
}
